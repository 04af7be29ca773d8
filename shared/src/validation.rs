use rustrict::CensorStr;

use crate::error::LedgerError;
use crate::models::{CandidateId, CandidateRef};

pub const MAX_CANDIDATE_NAME_LENGTH: usize = 64;
pub const MAX_USERNAME_LENGTH: usize = 32;
pub const MIN_PASSWORD_LENGTH: usize = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Candidate name is required.")]
    EmptyName,
    #[error("Candidate name exceeds maximum length of {MAX_CANDIDATE_NAME_LENGTH}")]
    NameTooLong,
    #[error("Possible profanity detected in candidate name: {0}")]
    InappropriateName(String),
    #[error("Candidate ID is required.")]
    MissingCandidate,
    #[error("Invalid candidate ID: {0}")]
    InvalidCandidate(String),
    #[error("Username and password are required.")]
    MissingCredentials,
    #[error("Username exceeds maximum length of {MAX_USERNAME_LENGTH}")]
    UsernameTooLong,
    #[error("Password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::InvalidInput(err.to_string())
    }
}

/// Returns the trimmed name that gets stored.
pub fn validate_candidate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() { return Err(ValidationError::EmptyName); }
    if name.chars().count() > MAX_CANDIDATE_NAME_LENGTH { return Err(ValidationError::NameTooLong); }
    if name.is_inappropriate() { return Err(ValidationError::InappropriateName(name.to_owned())); }
    Ok(name.to_owned())
}

pub fn require_candidate(id: Option<CandidateRef>) -> Result<CandidateId, ValidationError> {
    match id.ok_or(ValidationError::MissingCandidate)? {
        CandidateRef::Id(id) => Ok(CandidateId(id)),
        CandidateRef::Text(text) if text.trim().is_empty() => Err(ValidationError::MissingCandidate),
        CandidateRef::Text(text) => text.trim()
            .parse::<u64>()
            .map(CandidateId)
            .map_err(|_| ValidationError::InvalidCandidate(text)),
    }
}

pub fn validate_registration(username: &str, password: &str) -> Result<(), ValidationError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() { return Err(ValidationError::MissingCredentials); }
    if username.len() > MAX_USERNAME_LENGTH { return Err(ValidationError::UsernameTooLong); }
    if password.len() < MIN_PASSWORD_LENGTH { return Err(ValidationError::PasswordTooShort); }
    Ok(())
}
