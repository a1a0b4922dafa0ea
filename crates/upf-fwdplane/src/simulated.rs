//! In-process switch for simulation mode and tests.
//!
//! Keeps rule tables keyed by [`RuleKey`], reports counter table sizes and
//! records every write. Faults can be injected to exercise connect failures,
//! rule rejections and link loss. A successful connect models a fresh
//! pipeline: tables written over an older session are gone.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{FwdError, FwdResult, RpcCode};
use crate::rules::{ForwardingRule, RuleKey};
use crate::transport::{SwitchConnector, SwitchLink, SwitchSession, SwitchTarget};
use crate::types::{CounterClass, LinkStatus, RuleOp};

/// Default size of each counter table.
pub const DEFAULT_COUNTER_SIZE: u32 = 1024;

/// One recorded rule write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub key: RuleKey,
    pub op: RuleOp,
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct Faults {
    failed_connects: usize,
    /// Writes left before the next one is rejected.
    reject_countdown: Option<usize>,
    /// Writes left before the link breaks under a write.
    break_countdown: Option<usize>,
}

#[derive(Debug)]
struct SwitchState {
    tables: BTreeMap<RuleKey, ForwardingRule>,
    counter_sizes: HashMap<String, u32>,
    access_address: Option<Ipv4Addr>,
    write_log: Vec<WriteRecord>,
    connects: usize,
    /// Bumped per connect; sessions of older epochs are stale.
    epoch: u64,
    link_up: bool,
    faults: Faults,
}

impl Default for SwitchState {
    fn default() -> Self {
        let counter_sizes = CounterClass::ALL
            .iter()
            .map(|class| (class.table_name().to_string(), DEFAULT_COUNTER_SIZE))
            .collect();
        Self {
            tables: BTreeMap::new(),
            counter_sizes,
            access_address: None,
            write_log: Vec::new(),
            connects: 0,
            epoch: 0,
            link_up: false,
            faults: Faults::default(),
        }
    }
}

/// Shared handle to a simulated switch. Clones see the same switch.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSwitch {
    state: Arc<Mutex<SwitchState>>,
}

impl SimulatedSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `addr` as the switch's access-side address on connect.
    pub fn with_access_address(self, addr: Ipv4Addr) -> Self {
        self.state.lock().access_address = Some(addr);
        self
    }

    pub fn with_counter_size(self, class: CounterClass, size: u32) -> Self {
        self.state
            .lock()
            .counter_sizes
            .insert(class.table_name().to_string(), size);
        self
    }

    /// Removes a counter table from the pipeline.
    pub fn without_counter_table(self, class: CounterClass) -> Self {
        self.state.lock().counter_sizes.remove(class.table_name());
        self
    }

    /// Makes the next `count` connects fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().faults.failed_connects = count;
    }

    /// Rejects the `nth` write from now (1-based) with INVALID_ARGUMENT.
    pub fn reject_write(&self, nth: usize) {
        self.state.lock().faults.reject_countdown = Some(nth.saturating_sub(1));
    }

    /// Breaks the link under the `nth` write from now (1-based).
    pub fn break_link_on_write(&self, nth: usize) {
        self.state.lock().faults.break_countdown = Some(nth.saturating_sub(1));
    }

    /// Takes the link down; open sessions report NotReady.
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.link_up = false;
        info!("Simulated switch link dropped");
    }

    pub fn is_link_up(&self) -> bool {
        self.state.lock().link_up
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    pub fn rule(&self, key: &RuleKey) -> Option<ForwardingRule> {
        self.state.lock().tables.get(key).cloned()
    }

    pub fn rule_count(&self) -> usize {
        self.state.lock().tables.len()
    }

    pub fn session_rules(&self, session_seid: u64) -> Vec<ForwardingRule> {
        self.state
            .lock()
            .tables
            .iter()
            .filter(|(key, _)| key.session_seid == session_seid)
            .map(|(_, rule)| rule.clone())
            .collect()
    }

    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.state.lock().write_log.clone()
    }

    pub fn clear_write_log(&self) {
        self.state.lock().write_log.clear();
    }
}

#[async_trait]
impl SwitchConnector for SimulatedSwitch {
    async fn connect(&self, target: &SwitchTarget) -> FwdResult<SwitchLink> {
        let mut state = self.state.lock();
        if state.faults.failed_connects > 0 {
            state.faults.failed_connects -= 1;
            warn!(switch = %target.address, "Simulated connect failure");
            return Err(FwdError::connect(&target.address, "connection refused"));
        }

        state.connects += 1;
        state.epoch += 1;
        state.link_up = true;
        state.tables.clear();
        info!(
            switch = %target.address,
            device_id = target.device_id,
            epoch = state.epoch,
            "Simulated switch connected"
        );

        Ok(SwitchLink {
            session: Box::new(SimulatedSession {
                state: Arc::clone(&self.state),
                epoch: state.epoch,
            }),
            access_address: state.access_address,
        })
    }
}

struct SimulatedSession {
    state: Arc<Mutex<SwitchState>>,
    epoch: u64,
}

impl SimulatedSession {
    fn live(&self, state: &SwitchState) -> bool {
        state.link_up && state.epoch == self.epoch
    }
}

/// Decrements a fault countdown and reports whether it fired.
fn fire(countdown: &mut Option<usize>) -> bool {
    match countdown {
        Some(0) => {
            *countdown = None;
            true
        }
        Some(n) => {
            *n -= 1;
            false
        }
        None => false,
    }
}

#[async_trait]
impl SwitchSession for SimulatedSession {
    async fn status(&self) -> LinkStatus {
        if self.live(&self.state.lock()) {
            LinkStatus::Ready
        } else {
            LinkStatus::NotReady
        }
    }

    async fn counter_capacity(&self, name: &str) -> FwdResult<u32> {
        let state = self.state.lock();
        if !self.live(&state) {
            return Err(FwdError::from_code(RpcCode::Unavailable, "link down"));
        }
        state
            .counter_sizes
            .get(name)
            .copied()
            .ok_or_else(|| FwdError::counter_not_found(name))
    }

    async fn write_rule(&self, rule: &ForwardingRule, op: RuleOp) -> FwdResult<()> {
        let mut state = self.state.lock();
        if !self.live(&state) {
            return Err(FwdError::from_code(RpcCode::Unavailable, "link down"));
        }

        let key = rule.key();
        let result = if fire(&mut state.faults.break_countdown) {
            state.link_up = false;
            Err(FwdError::from_code(RpcCode::Unavailable, "link lost"))
        } else if fire(&mut state.faults.reject_countdown) {
            Err(FwdError::from_code(
                RpcCode::InvalidArgument,
                format!("{} {} rejected", rule.kind(), key.rule_id),
            ))
        } else {
            match op {
                RuleOp::Insert if state.tables.contains_key(&key) => Err(FwdError::from_code(
                    RpcCode::AlreadyExists,
                    format!("{} {} exists", rule.kind(), key.rule_id),
                )),
                RuleOp::Update | RuleOp::Delete if !state.tables.contains_key(&key) => {
                    Err(FwdError::from_code(
                        RpcCode::NotFound,
                        format!("{} {} not found", rule.kind(), key.rule_id),
                    ))
                }
                RuleOp::Insert | RuleOp::Update => {
                    state.tables.insert(key, rule.clone());
                    Ok(())
                }
                RuleOp::Delete => {
                    state.tables.remove(&key);
                    Ok(())
                }
            }
        };

        state.write_log.push(WriteRecord {
            key,
            op,
            accepted: result.is_ok(),
        });
        debug!(
            kind = %key.kind,
            seid = key.session_seid,
            rule_id = key.rule_id,
            %op,
            ok = result.is_ok(),
            "Simulated write"
        );
        result
    }
}
