use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::{status::Custom, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::model::{common::election::ElectionId, mongodb::Id};
use crate::voting::{sealer::SealError, selection::SelectionError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // Catalog errors.
    #[error("Election {0} not found")]
    ElectionNotFound(ElectionId),
    #[error("Election {0} is not open for voting")]
    ElectionNotOpenForVoting(ElectionId),
    #[error("No results available for election {0}")]
    ResultsUnavailable(ElectionId),

    // Session errors.
    #[error("Voter has already voted in election {0}")]
    AlreadyVoted(ElectionId),
    #[error("Session {0} has expired")]
    SessionExpired(Id),
    #[error("Session {0} not found")]
    SessionNotFound(Id),
    #[error("A submission for session {0} is already in progress")]
    DuplicateSubmission(Id),
    #[error("No vote has been recorded for session {0}")]
    NoVoteRecord(Id),

    // Validation errors.
    #[error("Ballot is invalid: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error(transparent)]
    Selection(#[from] SelectionError),

    // Commit errors.
    #[error(transparent)]
    Sealing(#[from] SealError),

    // Internal errors.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl Error {
    /// Construct an invariant violation, logging it. These are programming
    /// contract failures and must never pass silently.
    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        error!("Invariant violation: {msg}");
        Self::InvariantViolation(msg)
    }

    /// HTTP status for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::ElectionNotFound(_)
            | Self::ResultsUnavailable(_)
            | Self::SessionNotFound(_)
            | Self::NoVoteRecord(_) => Status::NotFound,
            Self::ElectionNotOpenForVoting(_)
            | Self::AlreadyVoted(_)
            | Self::SessionExpired(_)
            | Self::DuplicateSubmission(_) => Status::Conflict,
            Self::Validation(_) | Self::Selection(_) => Status::UnprocessableEntity,
            Self::Sealing(_) => Status::ServiceUnavailable,
            Self::InvariantViolation(_) | Self::Db(_) => Status::InternalServerError,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ElectionNotFound(_) => "ElectionNotFound",
            Self::ElectionNotOpenForVoting(_) => "ElectionNotOpenForVoting",
            Self::ResultsUnavailable(_) => "ResultsUnavailable",
            Self::AlreadyVoted(_) => "AlreadyVoted",
            Self::SessionExpired(_) => "SessionExpired",
            Self::SessionNotFound(_) => "SessionNotFound",
            Self::DuplicateSubmission(_) => "DuplicateSubmission",
            Self::NoVoteRecord(_) => "NoVoteRecord",
            Self::Validation(_) => "ValidationFailed",
            Self::Selection(_) => "InvalidSelection",
            Self::Sealing(_) => "SealingUnavailable",
            Self::InvariantViolation(_) => "InternalError",
            Self::Db(_) => "InternalError",
        }
    }

    /// Can the caller retry the same request and expect a different outcome?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Sealing(_) | Self::Db(_))
    }
}

/// The JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl From<Error> for ErrorBody {
    fn from(err: Error) -> Self {
        let error = err.code();
        // Internal details stay in the logs.
        let message = match err {
            Error::InvariantViolation(_) | Error::Db(_) => "Internal server error".to_string(),
            ref other => other.to_string(),
        };
        let errors = match err {
            Error::Validation(errors) => errors,
            _ => Vec::new(),
        };
        Self {
            error,
            message,
            errors,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        match status.class() {
            StatusClass::ServerError => error!("{self}"),
            _ => debug!("{self}"),
        }
        Custom(status, Json(ErrorBody::from(self))).respond_to(req)
    }
}
