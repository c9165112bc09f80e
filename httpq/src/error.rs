use protocol_httpq::ParseError;
use thiserror::Error;

use crate::status;

/// Errors returned by host operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Opening, creating or closing a request queue failed.
    #[error("queue bind failed: native error {code}")]
    Bind { code: u32 },
    /// A response send failed, or its buffers could not be allocated
    /// (`code` is then [`status::ERROR_NOT_ENOUGH_MEMORY`]). The request
    /// has been released.
    #[error("write failed: native error {code}")]
    Write { code: u32 },
    /// The call is not valid for the request or server in its current
    /// state. Nothing was changed.
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),
    /// A request head could not be parsed. Reported to the sink as an
    /// `Accept` server error carrying [`code`](Self::code).
    #[error("malformed request head: {0}")]
    Parse(#[from] ParseError),
    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),
}

impl Error {
    /// Event-level classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Bind { .. } | Error::Config(_) => ErrorKind::Bind,
            Error::Parse(_) => ErrorKind::Accept,
            Error::Write { .. } => ErrorKind::Write,
            Error::ContractViolation(_) => ErrorKind::ContractViolation,
        }
    }

    /// Native status code carried by the error, if any.
    pub fn code(&self) -> Option<u32> {
        match self {
            Error::Bind { code } | Error::Write { code } => Some(*code),
            // the head did not fit the receive buffer
            Error::Parse(e) if e.is_incomplete() => Some(status::ERROR_MORE_DATA),
            Error::Parse(_) => Some(status::ERROR_INVALID_DATA),
            Error::ContractViolation(_) | Error::Config(_) => None,
        }
    }

    /// Whether the failure was an allocation failure.
    pub fn is_out_of_memory(&self) -> bool {
        self.code() == Some(status::ERROR_NOT_ENOUGH_MEMORY)
    }
}

/// Classification carried by error events, and by [`Error::kind`] for
/// errors returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Bind,
    Accept,
    ReadBody,
    Write,
    OutOfMemory,
    ContractViolation,
    /// The listener was stopped while the request was in flight.
    Aborted,
}
