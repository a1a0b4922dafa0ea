//! Forwarding-plane vocabulary.

use std::fmt;

/// Usage-counter classes kept by the forwarding plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CounterClass {
    /// Counters read before QoS enforcement. PDRs draw from this class.
    PreQos,
    /// Counters read after QoS enforcement.
    PostQos,
}

impl CounterClass {
    pub const ALL: [CounterClass; 2] = [CounterClass::PreQos, CounterClass::PostQos];

    /// Name of the counter table backing this class on the switch.
    pub const fn table_name(&self) -> &'static str {
        match self {
            CounterClass::PreQos => "PreQosPipe.pre_qos_pdr_counter",
            CounterClass::PostQos => "PostQosPipe.post_qos_pdr_counter",
        }
    }
}

impl fmt::Display for CounterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// A counter identifier. 0 is reserved and never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CounterId(u32);

impl CounterId {
    /// The reserved "no counter" identifier.
    pub const NONE: CounterId = CounterId(0);

    /// Returns `None` for the reserved identifier.
    pub const fn new(raw: u32) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(CounterId(raw))
        }
    }

    pub const fn as_raw(&self) -> u32 {
        self.0
    }

    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    Pdr,
    Far,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleKind::Pdr => "PDR",
            RuleKind::Far => "FAR",
        })
    }
}

/// Rule programming operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleOp {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for RuleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleOp::Insert => "insert",
            RuleOp::Update => "update",
            RuleOp::Delete => "delete",
        })
    }
}

/// Forwarding-plane channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Ready => "ready",
        })
    }
}

/// Result of a liveness probe on an open control session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Ready,
    NotReady,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_id_zero_is_reserved() {
        assert_eq!(CounterId::new(0), None);
        assert_eq!(CounterId::new(5).map(|c| c.as_raw()), Some(5));
        assert!(CounterId::NONE.is_none());
    }

    #[test]
    fn test_counter_table_names() {
        assert_eq!(
            CounterClass::PreQos.table_name(),
            "PreQosPipe.pre_qos_pdr_counter"
        );
        assert_eq!(
            CounterClass::PostQos.to_string(),
            "PostQosPipe.post_qos_pdr_counter"
        );
    }
}
