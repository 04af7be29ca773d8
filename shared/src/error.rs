use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::models::CandidateId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    InvalidInput,
    ElectionClosed,
    AlreadyVoted,
    CandidateNotFound,
    AlreadyDeclared,
    BackendUnavailable,
    BackendConflict,
    Unauthorized,
    Forbidden,
    Conflict,
    RateLimited,
}

/// Failure of a ledger operation. No variant leaves a partial effect behind:
/// either the whole unit of work committed or none of it did, except for
/// `BackendUnavailable` raised after a submission whose outcome is unknown.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Voting has ended.")]
    ElectionClosed,
    #[error("You have already voted.")]
    AlreadyVoted,
    #[error("Candidate {0} not found.")]
    CandidateNotFound(CandidateId),
    #[error("Results have already been declared.")]
    AlreadyDeclared,
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Backend conflict: {0}")]
    BackendConflict(String),
}

impl LedgerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::BackendConflict(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::ElectionClosed => ErrorCode::ElectionClosed,
            Self::AlreadyVoted => ErrorCode::AlreadyVoted,
            Self::CandidateNotFound(_) => ErrorCode::CandidateNotFound,
            Self::AlreadyDeclared => ErrorCode::AlreadyDeclared,
            Self::BackendUnavailable(_) => ErrorCode::BackendUnavailable,
            Self::BackendConflict(_) => ErrorCode::BackendConflict,
        }
    }

    /// Whether resubmitting the same operation is known to be harmless.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendConflict(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self { error: error.into(), code }
    }
}

impl From<&LedgerError> for ErrorResponse {
    fn from(err: &LedgerError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
