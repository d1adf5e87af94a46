use std::fmt::Display;

use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder, serde::json::Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong at the service boundary.
///
/// Business-rule violations carry user-facing messages and map to 4xx
/// responses; storage faults are wrapped transparently and surface as a
/// generic 500 without leaking internal detail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Too many code requests; wait before requesting another")]
    RateLimited,
    #[error("Could not deliver the code over any requested channel")]
    DeliveryFailed {
        email: Option<String>,
        sms: Option<String>,
    },
    #[error("Invalid code format: {0}")]
    InvalidFormat(String),
    #[error("No code is awaiting verification; request a new one")]
    NoPendingRequest,
    #[error("The code has expired; request a new one")]
    Expired,
    #[error("Too many incorrect attempts; request a new code")]
    AttemptsExceeded,
    #[error("Incorrect code")]
    InvalidCode { remaining_attempts: u32 },
    #[error("Verify your identity before voting")]
    VerificationRequired,
    #[error("{0}")]
    ElectionNotOpen(NotOpenReason),
    #[error("You have already voted in this election")]
    AlreadyVoted,
    #[error("That candidate is not standing in this election")]
    InvalidCandidate,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Why a vote against a published election was rejected on timing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotOpenReason {
    NotStarted,
    Ended,
}

impl Display for NotOpenReason {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(formatter, "Voting in this election has not started yet"),
            Self::Ended => write!(formatter, "Voting in this election has ended"),
        }
    }
}

impl Error {
    /// Convenience constructor for `NotFound`.
    pub fn not_found(what: impl Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::InvalidFormat(_) => "invalid_format",
            Self::NoPendingRequest => "no_pending_request",
            Self::Expired => "expired",
            Self::AttemptsExceeded => "attempts_exceeded",
            Self::InvalidCode { .. } => "invalid_code",
            Self::VerificationRequired => "verification_required",
            Self::ElectionNotOpen(_) => "election_not_open",
            Self::AlreadyVoted => "already_voted",
            Self::InvalidCandidate => "invalid_candidate",
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Db(_) => "storage_unavailable",
        }
    }

    fn status(&self) -> Status {
        match self {
            Self::RateLimited => Status::TooManyRequests,
            Self::DeliveryFailed { .. } => Status::BadGateway,
            Self::InvalidFormat(_) | Self::BadRequest(_) => Status::BadRequest,
            Self::NoPendingRequest | Self::NotFound(_) => Status::NotFound,
            Self::Expired | Self::AttemptsExceeded | Self::InvalidCode { .. } => {
                Status::Unauthorized
            }
            Self::VerificationRequired | Self::ElectionNotOpen(_) => Status::Forbidden,
            Self::AlreadyVoted => Status::Conflict,
            Self::InvalidCandidate => Status::UnprocessableEntity,
            Self::Db(_) => Status::InternalServerError,
        }
    }
}

/// The JSON body every error response carries.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotOpenReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<ChannelErrors>,
}

/// Per-channel delivery error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelErrors {
    pub email: Option<String>,
    pub sms: Option<String>,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        let message = match &self {
            // Storage faults are logged in full but never shown.
            Self::Db(err) => {
                error!("Storage failure: {err}");
                "Internal storage error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.code().to_string(),
            message,
            remaining_attempts: match &self {
                Self::InvalidCode { remaining_attempts } => Some(*remaining_attempts),
                _ => None,
            },
            reason: match &self {
                Self::ElectionNotOpen(reason) => Some(*reason),
                _ => None,
            },
            channels: match self {
                Self::DeliveryFailed { email, sms } => Some(ChannelErrors { email, sms }),
                _ => None,
            },
        };

        let mut response = Json(body).respond_to(req)?;
        response.set_status(status);
        Ok(response)
    }
}
