use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeeError {
    #[error("fee record not found: {0}")]
    NotFound(String),

    #[error("student not found: {0}")]
    StudentNotFound(String),

    #[error("invalid action: {0} (expected paid or waived)")]
    InvalidAction(String),

    #[error("no unpaid fee cycles for student {0}")]
    NoUnpaidCycles(String),

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl FeeError {
    /// Stable code for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::StudentNotFound(_) => "not_found",
            Self::InvalidAction(_) => "invalid_action",
            Self::NoUnpaidCycles(_) => "no_unpaid_cycles",
            Self::Validation(_) => "bad_params",
            Self::Persistence(_) => "db_query_failed",
        }
    }
}

pub type FeeResult<T> = Result<T, FeeError>;
