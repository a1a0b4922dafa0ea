//! Programming batches.
//!
//! A batch is the rule set of one protocol request. Insert batches are
//! atomic: counters are staged before any write and a failed write unwinds
//! the writes already applied. Delete batches stop at the first failure but
//! always return the session's counters. Update batches have no unwind.

use tracing::{debug, instrument, warn};

use crate::channel::ForwardingPlaneChannel;
use crate::error::FwdResult;
use crate::rules::{Far, ForwardingRule, Pdr};
use crate::types::{CounterClass, CounterId, RuleOp};

/// Counter class PDRs draw from.
pub const PDR_COUNTER_CLASS: CounterClass = CounterClass::PreQos;

/// Runs programming batches against a channel.
#[derive(Debug, Clone, Copy)]
pub struct RuleBatch<'a> {
    channel: &'a ForwardingPlaneChannel,
}

impl<'a> RuleBatch<'a> {
    pub fn new(channel: &'a ForwardingPlaneChannel) -> Self {
        Self { channel }
    }

    /// Binds a fresh counter to every PDR, then inserts PDRs and FARs.
    ///
    /// On error nothing of the batch remains on the switch and every staged
    /// counter is released; `pdrs` are left without counters.
    #[instrument(skip_all, fields(pdrs = pdrs.len(), fars = fars.len()))]
    pub async fn insert(&self, pdrs: &mut [Pdr], fars: &[Far]) -> FwdResult<()> {
        self.stage_counters(pdrs)?;

        let rules: Vec<ForwardingRule> = pdrs
            .iter()
            .cloned()
            .map(ForwardingRule::from)
            .chain(fars.iter().cloned().map(ForwardingRule::from))
            .collect();

        for (applied, rule) in rules.iter().enumerate() {
            if let Err(e) = self.channel.program(rule, RuleOp::Insert).await {
                warn!(
                    kind = %rule.kind(),
                    rule_id = rule.key().rule_id,
                    error = %e,
                    "Insert failed, rolling back batch"
                );
                self.unwind(&rules[..applied]).await;
                self.release_counters(pdrs);
                clear_counters(pdrs);
                return Err(e);
            }
        }
        debug!("Insert batch applied");
        Ok(())
    }

    /// Rewrites FARs in place.
    #[instrument(skip_all, fields(fars = fars.len()))]
    pub async fn update(&self, fars: &[Far]) -> FwdResult<()> {
        for far in fars {
            let rule = ForwardingRule::Far(far.clone());
            self.channel.program(&rule, RuleOp::Update).await?;
        }
        debug!("Update batch applied");
        Ok(())
    }

    /// Deletes PDRs and FARs, then releases every PDR counter.
    #[instrument(skip_all, fields(pdrs = pdrs.len(), fars = fars.len()))]
    pub async fn delete(&self, pdrs: &[Pdr], fars: &[Far]) -> FwdResult<()> {
        let result = self.delete_rules(pdrs, fars).await;
        self.release_counters(pdrs);
        if let Err(e) = &result {
            warn!(error = %e, "Delete batch aborted");
        }
        result
    }

    async fn delete_rules(&self, pdrs: &[Pdr], fars: &[Far]) -> FwdResult<()> {
        for pdr in pdrs {
            let rule = ForwardingRule::Pdr(pdr.clone());
            self.channel.program(&rule, RuleOp::Delete).await?;
        }
        for far in fars {
            let rule = ForwardingRule::Far(far.clone());
            self.channel.program(&rule, RuleOp::Delete).await?;
        }
        Ok(())
    }

    fn stage_counters(&self, pdrs: &mut [Pdr]) -> FwdResult<()> {
        let allocator = self.channel.allocator();
        for staged in 0..pdrs.len() {
            match allocator.allocate(PDR_COUNTER_CLASS) {
                Ok(id) => pdrs[staged].counter_id = id,
                Err(e) => {
                    warn!(
                        pdr_id = pdrs[staged].pdr_id,
                        error = %e,
                        "Counter allocation failed"
                    );
                    self.release_counters(&pdrs[..staged]);
                    clear_counters(&mut pdrs[..staged]);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn release_counters(&self, pdrs: &[Pdr]) {
        let allocator = self.channel.allocator();
        for pdr in pdrs {
            if !pdr.counter_id.is_none() {
                allocator.release(PDR_COUNTER_CLASS, pdr.counter_id);
            }
        }
    }

    /// Deletes already applied rules in reverse order. Failures are logged.
    async fn unwind(&self, applied: &[ForwardingRule]) {
        for rule in applied.iter().rev() {
            if let Err(e) = self.channel.program(rule, RuleOp::Delete).await {
                warn!(
                    kind = %rule.kind(),
                    rule_id = rule.key().rule_id,
                    error = %e,
                    "Rollback delete failed"
                );
            }
        }
    }
}

fn clear_counters(pdrs: &mut [Pdr]) {
    for pdr in pdrs {
        pdr.counter_id = CounterId::NONE;
    }
}
