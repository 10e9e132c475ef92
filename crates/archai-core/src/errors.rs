//! Error types for the ArchAI core library.
//!
//! Only structural invariant violations surface as `Err`. File-, ticket- and
//! epic-scoped failures are reported as data on the enclosing result
//! (`FileStatus::Unresolvable`, `EpicOutcome::Aborted`, an UNKNOWN
//! assessment) so callers can always branch on a typed outcome.

/// Top-level error enum for the ArchAI core library.
#[derive(Debug, thiserror::Error)]
pub enum ArchaiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Dependency cycle among tickets: {}", ticket_ids.join(", "))]
    DependencyCycle { ticket_ids: Vec<String> },

    #[error("Ticket {ticket_id} depends on unknown ticket {dependency}")]
    UnknownDependency {
        ticket_id: String,
        dependency: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("History unavailable: {0}")]
    HistoryUnavailable(String),
}

#[cfg(feature = "python")]
impl From<ArchaiError> for pyo3::PyErr {
    fn from(err: ArchaiError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
        match &err {
            ArchaiError::Io(_) => PyIOError::new_err(err.to_string()),
            ArchaiError::HistoryUnavailable(_) => PyRuntimeError::new_err(err.to_string()),
            ArchaiError::Json(_)
            | ArchaiError::Parse { .. }
            | ArchaiError::DependencyCycle { .. }
            | ArchaiError::UnknownDependency { .. }
            | ArchaiError::InvalidInput(_)
            | ArchaiError::Config(_) => PyValueError::new_err(err.to_string()),
        }
    }
}

pub type ArchaiResult<T> = Result<T, ArchaiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_cycle_message_names_ids() {
        let err = ArchaiError::DependencyCycle {
            ticket_ids: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(err.to_string(), "Dependency cycle among tickets: A, B");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ArchaiError = io.into();
        assert!(matches!(err, ArchaiError::Io(_)));
    }
}
