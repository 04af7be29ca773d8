use rocket::http::Status;
use rocket::response::Responder;
use rocket::serde::json::Json;
use shared::{ErrorCode, ErrorResponse, LedgerError, ValidationError};
use thiserror::Error;

use crate::accounts::AccountError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Unauthorized. Please log in.")]
    Unauthorized,
    #[error("Invalid username or password.")]
    InvalidCredentials,
    #[error("Admin access required.")]
    AdminRequired,
    #[error("{0}")]
    Forbidden(String),
    #[error("Username already exists.")]
    UsernameTaken,
    #[error("{0}")]
    RateLimited(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Ledger(e) => match e {
                LedgerError::InvalidInput(_) => Status::BadRequest,
                LedgerError::ElectionClosed => Status::Forbidden,
                LedgerError::AlreadyVoted => Status::Forbidden,
                LedgerError::CandidateNotFound(_) => Status::NotFound,
                LedgerError::AlreadyDeclared => Status::Conflict,
                LedgerError::BackendConflict(_) => Status::Conflict,
                LedgerError::BackendUnavailable(_) => Status::ServiceUnavailable,
            },
            ApiError::Validation(_) => Status::BadRequest,
            ApiError::Unauthorized | ApiError::InvalidCredentials => Status::Unauthorized,
            ApiError::AdminRequired | ApiError::Forbidden(_) => Status::Forbidden,
            ApiError::UsernameTaken => Status::Conflict,
            ApiError::RateLimited(_) => Status::TooManyRequests,
            ApiError::Internal(_) => Status::InternalServerError,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Ledger(e) => e.code(),
            ApiError::Validation(_) => ErrorCode::InvalidInput,
            ApiError::Unauthorized | ApiError::InvalidCredentials => ErrorCode::Unauthorized,
            ApiError::AdminRequired | ApiError::Forbidden(_) => ErrorCode::Forbidden,
            ApiError::UsernameTaken => ErrorCode::Conflict,
            ApiError::RateLimited(_) => ErrorCode::RateLimited,
            ApiError::Internal(_) => ErrorCode::BackendUnavailable,
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::UsernameTaken => ApiError::UsernameTaken,
            AccountError::InvalidCredentials => ApiError::InvalidCredentials,
            AccountError::Invalid(e) => ApiError::Validation(e),
            AccountError::Database(e) => ApiError::Ledger(LedgerError::BackendUnavailable(e)),
            AccountError::Hashing => ApiError::Internal("password hashing failed".into()),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        let body = ErrorResponse::new(self.code(), self.to_string());

        rocket::Response::build_from(Json(body).respond_to(req)?)
            .status(status)
            .ok()
    }
}
