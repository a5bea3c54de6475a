//! Shared error type across walletlink crates.

use thiserror::Error;

use crate::CallId;

/// Caller-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The host bridge is not present or the channel could not be opened.
    ChannelUnavailable,
    /// No response arrived within the call timeout.
    CallTimedOut,
    /// A response payload failed to decode.
    MalformedResponse,
    /// A notification listener panicked during fan-out.
    ListenerError,
    /// The channel closed while the call was in flight.
    ChannelClosed,
    /// Too many calls are already waiting for a response.
    TooManyPending,
    /// Invalid input / malformed frame or config.
    BadRequest,
    /// Unsupported config or protocol version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ChannelUnavailable => "CHANNEL_UNAVAILABLE",
            ErrorCode::CallTimedOut => "CALL_TIMED_OUT",
            ErrorCode::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorCode::ListenerError => "LISTENER_ERROR",
            ErrorCode::ChannelClosed => "CHANNEL_CLOSED",
            ErrorCode::TooManyPending => "TOO_MANY_PENDING",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Unified error type used by core and bridge.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("call {id} timed out after {timeout_ms}ms")]
    CallTimedOut { id: CallId, timeout_ms: u64 },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("listener error: {0}")]
    ListenerError(String),
    #[error("channel closed")]
    ChannelClosed,
    #[error("too many pending calls (limit {limit})")]
    TooManyPending { limit: usize },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Map the error to a stable caller-facing code.
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::ChannelUnavailable(_) => ErrorCode::ChannelUnavailable,
            BridgeError::CallTimedOut { .. } => ErrorCode::CallTimedOut,
            BridgeError::MalformedResponse(_) => ErrorCode::MalformedResponse,
            BridgeError::ListenerError(_) => ErrorCode::ListenerError,
            BridgeError::ChannelClosed => ErrorCode::ChannelClosed,
            BridgeError::TooManyPending { .. } => ErrorCode::TooManyPending,
            BridgeError::BadRequest(_) => ErrorCode::BadRequest,
            BridgeError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            BridgeError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether a caller may reasonably retry the same call.
    ///
    /// Only transient conditions qualify. A missing host or a payload the
    /// caller cannot decode will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::CallTimedOut { .. } | BridgeError::TooManyPending { .. }
        )
    }
}
