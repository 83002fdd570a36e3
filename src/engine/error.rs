use crate::model::LodgeId;
use crate::repository::RepoError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid date format: {0:?} (expected YYYY-MM-DD)")]
    InvalidDateFormat(String),
    #[error("invalid range: check-out {check_out} is not after check-in {check_in}")]
    InvalidRange { check_in: String, check_out: String },
    #[error("check-in and check-out dates are both required")]
    IncompleteRange,
    #[error("lodge not found: {0}")]
    NotFound(LodgeId),
    #[error("availability update was not saved: {0}")]
    PersistenceFailure(String),
    #[error("repository error: {0}")]
    Repository(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

impl EngineError {
    /// Text shown to the guest or editor.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::InvalidDateFormat(s) => {
                format!("\"{s}\" is not a valid date. Use the format YYYY-MM-DD.")
            }
            EngineError::InvalidRange { .. } => "Check-out date must be after check-in date".into(),
            EngineError::IncompleteRange => "Please select both check-in and check-out dates".into(),
            EngineError::NotFound(_) => "Save the lodge first to manage its availability.".into(),
            EngineError::PersistenceFailure(_) => {
                "Failed to update availability. Please try again.".into()
            }
            EngineError::Repository(_) => {
                "Availability could not be loaded right now. Please try again.".into()
            }
            EngineError::LimitExceeded(what) => format!("Request too large: {what}."),
        }
    }

    /// Map a failed read (`get`/`list`).
    pub(crate) fn from_read(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Repository(other.to_string()),
        }
    }

    /// Map a failed `update`. Anything but a missing lodge means the write did not commit.
    pub(crate) fn from_write(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::PersistenceFailure(other.to_string()),
        }
    }
}
