//! Dispatch error taxonomy
//!
//! Every stage of the request lifecycle reports failures through
//! [`DispatchError`]. Nothing is written to the client from inside a stage;
//! the dispatcher's error boundary turns the error into a JSON reply.

use hyper::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No registered route matches method + path
    #[error("Invalid route")]
    InvalidRoute,

    /// Handler returned nothing and nobody wrote a response
    #[error("No response")]
    NoResponse,

    /// Raised by a handler
    #[error("{0}")]
    Handler(String),

    /// Raised by a middleware
    #[error("{0}")]
    Middleware(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(u64),

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// Only produced when a stage timeout is configured
    #[error("{0} timed out")]
    StageTimeout(&'static str),

    /// A second write through the same response handle
    #[error("Response already written")]
    ResponseAlreadyWritten,
}

impl DispatchError {
    /// Wrap any displayable error raised inside a handler
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Self::Handler(err.to_string())
    }

    /// Wrap any displayable error raised inside a middleware
    pub fn middleware(err: impl std::fmt::Display) -> Self {
        Self::Middleware(err.to_string())
    }

    /// Status code sent to the client for this error
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BodyRead(_) => StatusCode::BAD_REQUEST,
            Self::StageTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::ResponseAlreadyWritten => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRoute | Self::NoResponse | Self::Handler(_) | Self::Middleware(_) => {
                StatusCode::NOT_FOUND
            }
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Handler(err.to_string())
    }
}
