//! PFCP codec error types.

use thiserror::Error;

/// Errors raised while encoding or decoding PFCP datagrams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PfcpError {
    /// Buffer too short for the field being read.
    #[error("Buffer too short: needed {needed} bytes, available {available}")]
    BufferTooShort { needed: usize, available: usize },

    /// Structurally invalid message.
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    /// Message type byte outside the PFCP registry.
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    /// Cause value outside the PFCP registry.
    #[error("Invalid cause value: {0}")]
    InvalidCause(u8),

    /// Node ID type outside the PFCP registry.
    #[error("Invalid node ID type: {0}")]
    InvalidNodeIdType(u8),

    /// Interface value outside the PFCP registry.
    #[error("Invalid interface type: {0}")]
    InvalidInterfaceType(u8),

    /// A mandatory IE of a grouped IE is absent.
    #[error("Missing mandatory IE: {0}")]
    MissingMandatoryIe(&'static str),

    /// Encoded length does not fit the 16-bit length field.
    #[error("Message too long: {0} bytes")]
    MessageTooLong(usize),

    /// Header version other than 1.
    #[error("PFCP version not supported: {0}")]
    VersionNotSupported(u8),
}

impl PfcpError {
    /// Ensures `available` bytes cover `needed`.
    pub(crate) fn check_len(needed: usize, available: usize) -> PfcpResult<()> {
        if available < needed {
            Err(PfcpError::BufferTooShort { needed, available })
        } else {
            Ok(())
        }
    }
}

/// Result alias for codec operations.
pub type PfcpResult<T> = Result<T, PfcpError>;
