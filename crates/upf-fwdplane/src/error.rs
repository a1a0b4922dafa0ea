//! Forwarding-plane error types and status handling.
//!
//! The remote control channel reports canonical RPC status codes. This module
//! maps raw codes into [`RpcCode`] and splits failures into two families:
//! transport failures, which mean the channel itself is unhealthy, and rule
//! rejections, which mean the switch refused one particular write.

use std::fmt;
use thiserror::Error;

/// Canonical RPC status codes returned by the switch control channel.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl RpcCode {
    /// Creates an RpcCode from a raw value. Unknown values map to `Unknown`.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => RpcCode::Ok,
            1 => RpcCode::Cancelled,
            3 => RpcCode::InvalidArgument,
            4 => RpcCode::DeadlineExceeded,
            5 => RpcCode::NotFound,
            6 => RpcCode::AlreadyExists,
            7 => RpcCode::PermissionDenied,
            8 => RpcCode::ResourceExhausted,
            9 => RpcCode::FailedPrecondition,
            10 => RpcCode::Aborted,
            11 => RpcCode::OutOfRange,
            12 => RpcCode::Unimplemented,
            13 => RpcCode::Internal,
            14 => RpcCode::Unavailable,
            15 => RpcCode::DataLoss,
            16 => RpcCode::Unauthenticated,
            _ => RpcCode::Unknown,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == RpcCode::Ok
    }

    /// Returns true if the code says the channel, not the request, failed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcCode::Unavailable | RpcCode::DeadlineExceeded | RpcCode::Cancelled
        )
    }

    /// Converts to a Result, returning Ok(()) for success.
    pub fn into_result(self) -> FwdResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(FwdError::from_code(self, self.to_string()))
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpcCode::Ok => "OK",
            RpcCode::Cancelled => "CANCELLED",
            RpcCode::Unknown => "UNKNOWN",
            RpcCode::InvalidArgument => "INVALID_ARGUMENT",
            RpcCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            RpcCode::NotFound => "NOT_FOUND",
            RpcCode::AlreadyExists => "ALREADY_EXISTS",
            RpcCode::PermissionDenied => "PERMISSION_DENIED",
            RpcCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            RpcCode::FailedPrecondition => "FAILED_PRECONDITION",
            RpcCode::Aborted => "ABORTED",
            RpcCode::OutOfRange => "OUT_OF_RANGE",
            RpcCode::Unimplemented => "UNIMPLEMENTED",
            RpcCode::Internal => "INTERNAL",
            RpcCode::Unavailable => "UNAVAILABLE",
            RpcCode::DataLoss => "DATA_LOSS",
            RpcCode::Unauthenticated => "UNAUTHENTICATED",
        };
        write!(f, "{}", s)
    }
}

/// Error type for forwarding-plane operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FwdError {
    /// The control session could not be established.
    #[error("Failed to connect to {target}: {message}")]
    Connect { target: String, message: String },

    /// The channel is not Ready.
    #[error("Forwarding plane not ready")]
    NotReady,

    /// The switch has no counter table with this name.
    #[error("Counter table not found: {name}")]
    CounterNotFound { name: String },

    /// No free counter identifier in the class.
    #[error("Counter pool exhausted: {class}")]
    ResourceExhausted { class: String },

    /// The switch refused a rule write.
    #[error("Rule rejected ({code}): {message}")]
    Rejected { code: RpcCode, message: String },

    /// The channel failed underneath a call.
    #[error("Transport failure ({code}): {message}")]
    Transport { code: RpcCode, message: String },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FwdError {
    /// Creates an error from a non-OK status code.
    pub fn from_code(code: RpcCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            RpcCode::Ok => FwdError::Internal {
                message: "from_code called with OK status".to_string(),
            },
            c if c.is_transport() => FwdError::Transport { code, message },
            _ => FwdError::Rejected { code, message },
        }
    }

    pub fn connect(target: impl Into<String>, message: impl Into<String>) -> Self {
        FwdError::Connect {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn counter_not_found(name: impl Into<String>) -> Self {
        FwdError::CounterNotFound { name: name.into() }
    }

    pub fn resource_exhausted(class: impl fmt::Display) -> Self {
        FwdError::ResourceExhausted {
            class: class.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        FwdError::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the channel should be considered lost.
    pub fn is_transport(&self) -> bool {
        matches!(self, FwdError::Transport { .. } | FwdError::NotReady)
    }
}

/// Result type for forwarding-plane operations.
pub type FwdResult<T> = Result<T, FwdError>;
