//! PFCP codec for the UPF control plane.
//!
//! This crate covers the part of 3GPP TS 29.244 that the control-plane engine
//! needs to talk to an SMF / SPGW-C peer:
//!
//! - [`header`]: the PFCP header with and without SEID
//! - [`ie`]: information element framing and the IE type registry
//! - [`types`]: scalar IEs (Cause, Node ID, F-SEID, F-TEID, ...)
//! - [`rules`]: grouped rule IEs (Create PDR, Create FAR, Update FAR)
//! - [`message`]: typed messages plus [`build_message`] / [`parse_message`]
//!
//! Message types that are valid PFCP but not handled by the engine decode as
//! [`PfcpMessage::Unhandled`] so callers can discard them without treating
//! them as malformed.
//!
//! # Example
//!
//! ```
//! use upf_pfcp::message::{build_message, parse_message, HeartbeatRequest, PfcpMessage};
//!
//! let request = PfcpMessage::HeartbeatRequest(HeartbeatRequest {
//!     recovery_time_stamp: Some(3_900_000_000),
//! });
//! let datagram = build_message(&request, 7, None).unwrap();
//!
//! let (header, decoded) = parse_message(&datagram).unwrap();
//! assert_eq!(header.sequence_number, 7);
//! assert_eq!(decoded, request);
//! ```

pub mod error;
pub mod header;
pub mod ie;
pub mod message;
pub mod rules;
pub mod types;

pub use error::{PfcpError, PfcpResult};
pub use header::{MessageType, PfcpHeader, PFCP_HEADER_LEN, PFCP_HEADER_LEN_WITH_SEID};
pub use message::{build_message, parse_message, PfcpMessage};
pub use types::{Cause, PFCP_UDP_PORT};
