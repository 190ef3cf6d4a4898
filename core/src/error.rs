//! Error types for the REST client.
//!
//! # Design
//! Four failure families reach the caller and none of them is retried here:
//! transport failures (`HttpStatus`, `Transport`, `Io`), remote domain errors
//! (`Remote`, carrying the parsed `error_response`), malformed or unexpected
//! response bodies (`Format`), and argument preconditions checked before any
//! network I/O (`Validation`). `HttpStatus` keeps the status and reason
//! phrase because the body of a failed HTTP exchange is never parsed.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Numeric error codes reported by the remote service.
pub mod codes {
    pub const UNKNOWN_ERROR: i32 = 1;
    pub const TEMP_UNAVAILABLE: i32 = 2;
    pub const UNKNOWN_METHOD: i32 = 3;
    pub const BUSY: i32 = 4;
    pub const IP_ADDR_DENIED: i32 = 5;
    pub const BAD_PARAMETER: i32 = 100;
    pub const UNKNOWN_API_KEY: i32 = 101;
    pub const SESSION_TIMEOUT: i32 = 102;
    pub const CALL_ID_EXPIRED: i32 = 103;
    pub const BAD_SIGNATURE: i32 = 104;
    pub const FQL_PARSE_ERROR: i32 = 601;
    pub const FQL_BAD_FIELD: i32 = 602;
    pub const FQL_BAD_TABLE: i32 = 603;
    pub const FQL_NO_INDEX: i32 = 604;
    pub const FQL_BAD_FUNCTION: i32 = 605;
    pub const FQL_WRONG_ARGUMENTS: i32 = 606;
}

/// A failure reported by the remote service inside an `error_response`
/// element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: i32,
    pub message: String,
    /// Echo of the request arguments, for diagnostics.
    pub params: BTreeMap<String, String>,
}

impl ErrorResponse {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn is(&self, code: i32) -> bool {
        self.code == code
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error {}: {}", self.code, self.message)
    }
}

/// Errors returned by the dispatcher, the response parsers and the client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with an HTTP status of 400 or above.
    #[error("HTTP {status} {reason}")]
    HttpStatus { status: u16, reason: String },

    /// The request never produced an HTTP response (connect failure, bad URL,
    /// timeout).
    #[error("transport failed: {0}")]
    Transport(String),

    /// Reading the response body failed.
    #[error("i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The remote service returned a well-formed `error_response`.
    #[error("{0}")]
    Remote(ErrorResponse),

    /// The response did not have the shape expected for the call.
    #[error("unexpected response format: {0}")]
    Format(String),

    /// A caller-supplied argument failed a precondition; nothing was sent.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// The client configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// The remote error code, if this is a domain error.
    pub fn remote_code(&self) -> Option<i32> {
        match self {
            ApiError::Remote(response) => Some(response.code),
            _ => None,
        }
    }
}

impl From<ErrorResponse> for ApiError {
    fn from(response: ErrorResponse) -> Self {
        ApiError::Remote(response)
    }
}
