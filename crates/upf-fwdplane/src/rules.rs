//! PDR and FAR records as programmed into the forwarding plane.

use std::net::Ipv4Addr;

use crate::types::{CounterId, RuleKind};

/// Traffic direction a PDR matches on, by source interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceIface {
    #[default]
    Access,
    Core,
    Other(u8),
}

/// GTP-U tunnel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tunnel {
    pub teid: u32,
    pub address: Ipv4Addr,
}

/// Packet Detection Rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdr {
    /// Peer-assigned id, unique within the session.
    pub pdr_id: u16,
    /// Local SEID of the owning session.
    pub session_seid: u64,
    /// Access-side address the session was programmed against.
    pub tunnel_endpoint: Ipv4Addr,
    /// Bound usage counter, [`CounterId::NONE`] until allocated.
    pub counter_id: CounterId,
    pub precedence: u32,
    pub source_iface: SourceIface,
    pub far_id: Option<u32>,
    /// Uplink match on the N3 tunnel.
    pub tunnel: Option<Tunnel>,
    /// Downlink match on the UE address.
    pub ue_address: Option<Ipv4Addr>,
    /// Strip the outer GTP-U header.
    pub decapsulate: bool,
}

/// Action a FAR applies to matched traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FarAction {
    Forward,
    #[default]
    Drop,
    Buffer,
    Notify,
}

/// Forwarding Action Rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Far {
    pub far_id: u32,
    pub session_seid: u64,
    pub tunnel_endpoint: Ipv4Addr,
    pub action: FarAction,
    pub destination: Option<SourceIface>,
    /// Outer header to push when forwarding.
    pub encapsulation: Option<Tunnel>,
}

/// One entry of a programming batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardingRule {
    Pdr(Pdr),
    Far(Far),
}

/// Switch-side identity of a rule: kind, owning session, rule id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    pub kind: RuleKind,
    pub session_seid: u64,
    pub rule_id: u32,
}

impl ForwardingRule {
    pub fn kind(&self) -> RuleKind {
        match self {
            ForwardingRule::Pdr(_) => RuleKind::Pdr,
            ForwardingRule::Far(_) => RuleKind::Far,
        }
    }

    pub fn key(&self) -> RuleKey {
        match self {
            ForwardingRule::Pdr(pdr) => RuleKey {
                kind: RuleKind::Pdr,
                session_seid: pdr.session_seid,
                rule_id: u32::from(pdr.pdr_id),
            },
            ForwardingRule::Far(far) => RuleKey {
                kind: RuleKind::Far,
                session_seid: far.session_seid,
                rule_id: far.far_id,
            },
        }
    }
}

impl From<Pdr> for ForwardingRule {
    fn from(pdr: Pdr) -> Self {
        ForwardingRule::Pdr(pdr)
    }
}

impl From<Far> for ForwardingRule {
    fn from(far: Far) -> Self {
        ForwardingRule::Far(far)
    }
}
