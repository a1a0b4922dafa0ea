//! Transport seam to the switch control interface.
//!
//! [`SwitchConnector`] opens a control session; [`SwitchSession`] is the
//! small operation set the channel needs from it. Real RPC clients and the
//! in-process [`crate::simulated::SimulatedSwitch`] both sit behind these.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FwdResult;
use crate::rules::ForwardingRule;
use crate::types::{LinkStatus, RuleOp};

/// Where and how to reach the switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchTarget {
    /// `host:port` of the control endpoint.
    pub address: String,
    pub device_id: u64,
    pub timeout: Duration,
}

/// An open control session plus what the switch reported about itself.
pub struct SwitchLink {
    pub session: Box<dyn SwitchSession>,
    /// Access-side address configured on the switch, if it reports one.
    pub access_address: Option<Ipv4Addr>,
}

impl std::fmt::Debug for SwitchLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchLink")
            .field("access_address", &self.access_address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait SwitchConnector: Send + Sync {
    async fn connect(&self, target: &SwitchTarget) -> FwdResult<SwitchLink>;
}

#[async_trait]
pub trait SwitchSession: Send + Sync {
    /// Cheap liveness probe.
    async fn status(&self) -> LinkStatus;

    /// Size of the named counter table.
    async fn counter_capacity(&self, name: &str) -> FwdResult<u32>;

    async fn write_rule(&self, rule: &ForwardingRule, op: RuleOp) -> FwdResult<()>;
}
