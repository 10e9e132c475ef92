pub mod cache;
pub mod filesystem;
pub mod parser;
pub mod pipeline;
pub mod references;
pub mod symbols;
