use serde_json::Value;
use thiserror::Error;

use crate::store::StoreError;

/// Failure surfaced by every gateway call.
///
/// Each variant maps onto the `{code, message, details?}` shape callers display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No token is stored; the request never left the process.
    #[error("not authenticated")]
    NotAuthenticated,
    /// The login endpoint rejected the credentials.
    #[error("{message}")]
    InvalidCredentials { message: String },
    /// The active session was invalidated by the server.
    #[error("session expired, please log in again")]
    SessionExpired,
    /// A request issued under an older session was rejected after a newer login.
    #[error("request expired, please retry")]
    RequestExpired,
    /// The server answered with a non-success status.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        details: Option<Value>,
    },
    /// Network failure or timeout with no server response.
    #[error("{message}")]
    Transport { message: String, timed_out: bool },
    /// A success response whose envelope or payload could not be decoded.
    #[error("invalid response: {message}")]
    Decode { message: String },
    /// Session fields could not be written to durable storage.
    #[error("session storage failed: {message}")]
    Storage { message: String },
}

impl ApiError {
    pub fn code(&self) -> u16 {
        match self {
            ApiError::NotAuthenticated
            | ApiError::InvalidCredentials { .. }
            | ApiError::SessionExpired
            | ApiError::RequestExpired => 401,
            ApiError::Http { status, .. } => *status,
            ApiError::Transport { .. } | ApiError::Decode { .. } | ApiError::Storage { .. } => 500,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Raw server error body, when the server sent one.
    pub fn details(&self) -> Option<&Value> {
        match self {
            ApiError::Http { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Whether repeating the same call may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::RequestExpired | ApiError::Transport { .. })
    }

    /// Whether the failure concerns authentication rather than the call itself.
    pub fn is_auth_failure(&self) -> bool {
        self.code() == 401 && !matches!(self, ApiError::Http { .. })
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Storage {
            message: err.to_string(),
        }
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::Transport {
            message: err.to_string(),
            timed_out: true,
        };
    }
    if err.is_decode() {
        return ApiError::Decode {
            message: err.to_string(),
        };
    }
    ApiError::Transport {
        message: err.to_string(),
        timed_out: false,
    }
}
