//! Error types for the PFCP agent.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use upf_fwdplane::FwdError;
use upf_pfcp::PfcpError;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, PfcpifaceError>;

#[derive(Debug, Error)]
pub enum PfcpifaceError {
    /// Configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid JSON for the expected schema.
    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration value failed validation.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// UDP socket operation failed.
    #[error("Socket {operation} failed: {source}")]
    Socket {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// A request lacks an IE the handler cannot do without.
    #[error("Mandatory IE missing: {ie}")]
    MissingIe { ie: &'static str },

    #[error("PFCP codec error: {0}")]
    Codec(#[from] PfcpError),

    #[error("Forwarding plane error: {0}")]
    Forwarding(#[from] FwdError),
}

impl PfcpifaceError {
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        PfcpifaceError::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn socket(operation: &'static str, source: io::Error) -> Self {
        PfcpifaceError::Socket { operation, source }
    }

    pub fn missing_ie(ie: &'static str) -> Self {
        PfcpifaceError::MissingIe { ie }
    }
}
