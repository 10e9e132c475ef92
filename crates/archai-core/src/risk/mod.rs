//! Risk engine: bounded backward traversal, refusal protocol and graded
//! impact assessments.

pub mod engine;
pub mod guards;
pub mod signals;

pub use engine::{assess, assess_match};
