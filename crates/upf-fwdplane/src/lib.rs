//! Forwarding-plane side of the UPF control plane.
//!
//! The control plane programs a P4Runtime-style switch with per-session
//! Packet Detection Rules and Forwarding Action Rules, each PDR bound to a
//! usage counter.
//!
//! # Architecture
//!
//! - [`types`]: counter classes, counter ids, rule kinds and operations
//! - [`error`]: RPC status codes and the error taxonomy
//! - [`rules`]: PDR / FAR records
//! - [`allocator`]: per-class counter id pools
//! - [`transport`]: connector and session traits toward the switch
//! - [`channel`]: the Disconnected / Ready state machine around a session
//! - [`batch`]: atomic insert, update and delete batches
//! - [`simulated`]: an in-process switch
//!
//! # Example
//!
//! ```
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use upf_fwdplane::{ForwardingPlaneChannel, Readiness, SimulatedSwitch, SwitchTarget};
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let channel = ForwardingPlaneChannel::new(
//!         Arc::new(SimulatedSwitch::new()),
//!         SwitchTarget {
//!             address: "onos:51001".to_string(),
//!             device_id: 1,
//!             timeout: Duration::from_secs(30),
//!         },
//!         Ipv4Addr::new(198, 18, 0, 1),
//!     );
//!     let readiness = channel.ensure_ready().await.unwrap();
//!     assert_eq!(readiness, Readiness::Reconnected { generation: 1 });
//! });
//! ```

pub mod allocator;
pub mod batch;
pub mod channel;
pub mod error;
pub mod rules;
pub mod simulated;
pub mod transport;
pub mod types;

pub use allocator::{CounterAllocator, CounterPool};
pub use batch::{RuleBatch, PDR_COUNTER_CLASS};
pub use channel::{ForwardingPlaneChannel, Readiness};
pub use error::{FwdError, FwdResult, RpcCode};
pub use rules::{Far, FarAction, ForwardingRule, Pdr, RuleKey, SourceIface, Tunnel};
pub use simulated::SimulatedSwitch;
pub use transport::{SwitchConnector, SwitchLink, SwitchSession, SwitchTarget};
pub use types::{ChannelState, CounterClass, CounterId, LinkStatus, RuleKind, RuleOp};
