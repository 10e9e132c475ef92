//! ArchAI core: architecture-aware change analysis.
//!
//! The engine indexes a source tree into a dependency graph, folds in change
//! history, grades the blast radius of a change (refusing to grade when the
//! evidence is incomplete), turns a goal into epics and tickets, schedules
//! them against team capacity and simulates the sprint with a seeded
//! generator. The same operations are exposed to Python as `archai_core`
//! when built with the `python` feature.

pub mod api;
pub mod config;
pub mod errors;
pub mod graph;
pub mod history;
pub mod indexer;
pub mod models;
pub mod planning;
pub mod risk;
pub mod simulation;

#[cfg(feature = "python")]
pub mod bindings;

pub use api::{assess_impact, plan_sprint, simulate_sprint, AnalysisSession};
pub use config::EngineConfig;
pub use errors::{ArchaiError, ArchaiResult};

#[cfg(feature = "python")]
use pyo3::prelude::*;

// ---------------------------------------------------------------------------
// Top-level Python module: archai_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn archai_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("MAX_IMPACT_DEPTH", risk::guards::MAX_IMPACT_DEPTH)?;
    m.add("MAX_GRAPH_VISITED", risk::guards::MAX_GRAPH_VISITED)?;

    m.add_function(wrap_pyfunction!(bindings::assess_impact, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::plan_sprint, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::simulate_sprint, m)?)?;
    Ok(())
}
