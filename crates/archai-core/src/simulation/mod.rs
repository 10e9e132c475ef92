//! Seeded day-by-day sprint simulation and completion forecasting.

pub mod engine;
pub mod probability;

pub use engine::{recommendations, simulate, SimulationRun, TicketOutcome};
