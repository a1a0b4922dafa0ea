//! PFCP agent of the UPF control plane.
//!
//! Terminates N4 (PFCP) from an SMF / SPGW-C and programs the forwarding
//! plane through [`upf_fwdplane`].
//!
//! - [`config`]: JSON configuration and command-line overrides
//! - [`seid`]: local / peer SEID pairing
//! - [`session`]: the session registry
//! - [`rules`]: PFCP rule IEs to PDR / FAR records
//! - [`association`]: association state and the setup initiator
//! - [`engine`]: per-message handlers
//! - [`server`]: the UDP receive loop

pub mod association;
pub mod config;
pub mod engine;
pub mod error;
pub mod rules;
pub mod seid;
pub mod server;
pub mod session;

pub use association::{
    AssociationInitiator, AssociationState, InitiatorOutcome, RequestSink, RetryPolicy,
};
pub use config::{Conf, ConfigOverrides, Settings};
pub use engine::PfcpEngine;
pub use error::{PfcpifaceError, Result};
pub use seid::{local_seid, peer_seid};
pub use server::{PfcpServer, READ_TIMEOUT};
pub use session::{SessionRecord, SessionRegistry};
