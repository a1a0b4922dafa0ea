//! Forwarding-plane channel state machine.
//!
//! ```text
//! Disconnected --connect ok--> Ready
//!      ^                         |
//!      +--- probe fails / transport error on a write
//! ```
//!
//! Every entry into Ready bumps the generation and resizes the counter pools
//! from the switch's tables, so ids handed out over an older session are
//! forgotten. Callers compare generations to detect a reconnect.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::allocator::CounterAllocator;
use crate::error::{FwdError, FwdResult};
use crate::rules::ForwardingRule;
use crate::transport::{SwitchConnector, SwitchSession, SwitchTarget};
use crate::types::{ChannelState, CounterClass, LinkStatus, RuleOp};

/// Outcome of [`ForwardingPlaneChannel::ensure_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The existing session is still live.
    AlreadyReady,
    /// A new session was opened and the counter pools were reset.
    Reconnected { generation: u64 },
}

struct ChannelInner {
    state: ChannelState,
    session: Option<Box<dyn SwitchSession>>,
    access_address: Ipv4Addr,
    generation: u64,
}

impl ChannelInner {
    fn mark_disconnected(&mut self) {
        self.session = None;
        self.state = ChannelState::Disconnected;
    }
}

/// Connectivity to the switch control interface.
///
/// Shared by reference; reconnection is lazy and serialized by an async
/// mutex, so concurrent callers never initialize the pools twice for one
/// session.
pub struct ForwardingPlaneChannel {
    connector: Arc<dyn SwitchConnector>,
    target: SwitchTarget,
    allocator: Arc<CounterAllocator>,
    inner: Mutex<ChannelInner>,
}

impl ForwardingPlaneChannel {
    /// `access_address` is used until the switch reports its own.
    pub fn new(
        connector: Arc<dyn SwitchConnector>,
        target: SwitchTarget,
        access_address: Ipv4Addr,
    ) -> Self {
        Self {
            connector,
            target,
            allocator: Arc::new(CounterAllocator::new()),
            inner: Mutex::new(ChannelInner {
                state: ChannelState::Disconnected,
                session: None,
                access_address,
                generation: 0,
            }),
        }
    }

    pub fn allocator(&self) -> &Arc<CounterAllocator> {
        &self.allocator
    }

    pub fn target(&self) -> &SwitchTarget {
        &self.target
    }

    pub async fn state(&self) -> ChannelState {
        self.inner.lock().await.state
    }

    pub async fn generation(&self) -> u64 {
        self.inner.lock().await.generation
    }

    /// Access-side address of the forwarding plane.
    pub async fn access_address(&self) -> Ipv4Addr {
        self.inner.lock().await.access_address
    }

    /// Probes the current session and reconnects if it is gone.
    #[instrument(skip(self), fields(switch = %self.target.address))]
    pub async fn ensure_ready(&self) -> FwdResult<Readiness> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Some(session) = &inner.session {
            if session.status().await == LinkStatus::Ready {
                inner.state = ChannelState::Ready;
                return Ok(Readiness::AlreadyReady);
            }
            warn!("Forwarding plane session lost");
            inner.mark_disconnected();
        }

        inner.state = ChannelState::Connecting;
        let link = match self.connector.connect(&self.target).await {
            Ok(link) => link,
            Err(e) => {
                warn!(error = %e, "Forwarding plane connect failed");
                inner.mark_disconnected();
                return Err(e);
            }
        };

        if let Some(addr) = link.access_address {
            inner.access_address = addr;
        }

        for class in CounterClass::ALL {
            match link.session.counter_capacity(class.table_name()).await {
                Ok(size) => self.allocator.configure(class, size),
                Err(FwdError::CounterNotFound { name }) => {
                    warn!(counter = %name, "Counter table not found");
                    self.allocator.configure(class, 0);
                }
                Err(e) => {
                    warn!(%class, error = %e, "Counter sizing failed");
                    inner.mark_disconnected();
                    return Err(e);
                }
            }
        }

        inner.session = Some(link.session);
        inner.state = ChannelState::Ready;
        inner.generation += 1;
        info!(
            generation = inner.generation,
            access_address = %inner.access_address,
            "Forwarding plane ready"
        );
        Ok(Readiness::Reconnected {
            generation: inner.generation,
        })
    }

    /// Writes one rule. A transport failure drops the session.
    pub async fn program(&self, rule: &ForwardingRule, op: RuleOp) -> FwdResult<()> {
        let mut inner = self.inner.lock().await;
        let result = match &inner.session {
            Some(session) => session.write_rule(rule, op).await,
            None => return Err(FwdError::NotReady),
        };

        if let Err(e) = &result {
            if e.is_transport() {
                warn!(error = %e, "Forwarding plane transport failure");
                inner.mark_disconnected();
            }
        }
        result
    }
}

impl std::fmt::Debug for ForwardingPlaneChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingPlaneChannel")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Far, FarAction};
    use crate::simulated::SimulatedSwitch;
    use std::time::Duration;

    fn channel(switch: &SimulatedSwitch) -> ForwardingPlaneChannel {
        ForwardingPlaneChannel::new(
            Arc::new(switch.clone()),
            SwitchTarget {
                address: "onos:51001".to_string(),
                device_id: 1,
                timeout: Duration::from_secs(30),
            },
            Ipv4Addr::new(198, 18, 0, 1),
        )
    }

    fn far() -> ForwardingRule {
        ForwardingRule::Far(Far {
            far_id: 1,
            session_seid: 0x40,
            tunnel_endpoint: Ipv4Addr::new(198, 18, 0, 1),
            action: FarAction::Drop,
            destination: None,
            encapsulation: None,
        })
    }

    #[tokio::test]
    async fn test_first_ready_configures_pools() {
        let switch = SimulatedSwitch::new()
            .with_counter_size(CounterClass::PreQos, 128)
            .with_counter_size(CounterClass::PostQos, 256);
        let channel = channel(&switch);
        assert_eq!(channel.state().await, ChannelState::Disconnected);

        assert_eq!(
            channel.ensure_ready().await.unwrap(),
            Readiness::Reconnected { generation: 1 }
        );
        assert_eq!(channel.state().await, ChannelState::Ready);
        assert_eq!(channel.allocator().capacity(CounterClass::PreQos), 128);
        assert_eq!(channel.allocator().capacity(CounterClass::PostQos), 256);

        assert_eq!(channel.ensure_ready().await.unwrap(), Readiness::AlreadyReady);
        assert_eq!(switch.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_switch_reports_access_address() {
        let switch = SimulatedSwitch::new().with_access_address(Ipv4Addr::new(10, 128, 13, 29));
        let channel = channel(&switch);
        assert_eq!(channel.access_address().await, Ipv4Addr::new(198, 18, 0, 1));
        channel.ensure_ready().await.unwrap();
        assert_eq!(channel.access_address().await, Ipv4Addr::new(10, 128, 13, 29));
    }

    #[tokio::test]
    async fn test_missing_table_leaves_zero_capacity() {
        let switch = SimulatedSwitch::new().without_counter_table(CounterClass::PostQos);
        let channel = channel(&switch);
        channel.ensure_ready().await.unwrap();
        assert_eq!(channel.allocator().capacity(CounterClass::PostQos), 0);
        assert!(channel.allocator().allocate(CounterClass::PostQos).is_err());
    }

    #[tokio::test]
    async fn test_transport_failure_disconnects_then_reconnects_once() {
        let switch = SimulatedSwitch::new();
        let channel = channel(&switch);
        channel.ensure_ready().await.unwrap();
        let id = channel.allocator().allocate(CounterClass::PreQos).unwrap();

        switch.break_link_on_write(1);
        let err = channel.program(&far(), RuleOp::Insert).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(channel.state().await, ChannelState::Disconnected);
        assert!(matches!(
            channel.program(&far(), RuleOp::Insert).await,
            Err(FwdError::NotReady)
        ));

        assert_eq!(
            channel.ensure_ready().await.unwrap(),
            Readiness::Reconnected { generation: 2 }
        );
        assert_eq!(channel.ensure_ready().await.unwrap(), Readiness::AlreadyReady);
        assert_eq!(switch.connect_count(), 2);
        assert!(!channel.allocator().is_allocated(CounterClass::PreQos, id));
    }

    #[tokio::test]
    async fn test_probe_failure_triggers_reconnect() {
        let switch = SimulatedSwitch::new();
        let channel = channel(&switch);
        channel.ensure_ready().await.unwrap();
        switch.drop_link();
        assert_eq!(
            channel.ensure_ready().await.unwrap(),
            Readiness::Reconnected { generation: 2 }
        );
    }

    #[tokio::test]
    async fn test_rejection_keeps_channel_ready() {
        let switch = SimulatedSwitch::new();
        let channel = channel(&switch);
        channel.ensure_ready().await.unwrap();
        switch.reject_write(1);
        assert!(channel.program(&far(), RuleOp::Insert).await.is_err());
        assert_eq!(channel.state().await, ChannelState::Ready);
    }

    #[tokio::test]
    async fn test_connect_failure_stays_disconnected() {
        let switch = SimulatedSwitch::new();
        switch.fail_next_connects(1);
        let channel = channel(&switch);
        assert!(matches!(
            channel.ensure_ready().await,
            Err(FwdError::Connect { .. })
        ));
        assert_eq!(channel.state().await, ChannelState::Disconnected);
        assert_eq!(channel.generation().await, 0);
        channel.ensure_ready().await.unwrap();
    }
}
