//! Scheduling engine: goal to work items, dependency DAG and the
//! capacity-bounded sprint plan.

pub mod dag;
pub mod findings;
pub mod scheduler;

pub use dag::EpicOutcome;
pub use findings::{plan_work, TemplateText, TextGenerator};
pub use scheduler::{build_schedule, SprintSchedule};
