//! PFCP association state and the initiator retry task.
//!
//! When a peer address is configured the agent does not wait to be
//! contacted: [`AssociationInitiator`] sends Association Setup Requests on a
//! fixed window until the receive loop reports an answer through a
//! single-slot channel, or the attempt ceiling is reached.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Association with the control-plane peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssociationState {
    #[default]
    Idle,
    /// Setup requests are in flight from the initiator task.
    Pending,
    Established,
}

impl fmt::Display for AssociationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationState::Idle => write!(f, "idle"),
            AssociationState::Pending => write!(f, "pending"),
            AssociationState::Established => write!(f, "established"),
        }
    }
}

/// Fixed-window retransmission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub wait_window: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            wait_window: Duration::from_secs(2),
        }
    }
}

/// Where the initiator sends its Association Setup Requests.
///
/// Each call must build a new request with a fresh recovery timestamp.
#[async_trait]
pub trait RequestSink: Send + Sync {
    async fn send_setup_request(&self) -> Result<()>;
}

/// How an initiator run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorOutcome {
    Connected { attempts: u32 },
    /// The attempt ceiling was reached without an accepted answer.
    Exhausted { attempts: u32 },
}

/// Sends Association Setup Requests until answered.
pub struct AssociationInitiator<S> {
    sink: S,
    policy: RetryPolicy,
}

impl<S: RequestSink> AssociationInitiator<S> {
    pub fn new(sink: S, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    /// Runs to completion. `answers` carries `true` once the receive loop
    /// has seen an accepted setup exchange; `false` counts as no answer.
    pub async fn run(self, mut answers: mpsc::Receiver<bool>) -> InitiatorOutcome {
        let mut attempts = 0;
        while attempts < self.policy.max_attempts {
            attempts += 1;
            if let Err(e) = self.sink.send_setup_request().await {
                warn!(attempt = attempts, error = %e, "Failed to send association setup request");
            }

            // A refusal does not shorten the window.
            let deadline = Instant::now() + self.policy.wait_window;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    answer = answers.recv() => match answer {
                        Some(true) => {
                            info!(attempts, "Association with control plane established");
                            return InitiatorOutcome::Connected { attempts };
                        }
                        Some(false) => debug!(attempt = attempts, "Association setup refused"),
                        // Receive loop is gone.
                        None => return InitiatorOutcome::Exhausted { attempts },
                    },
                }
            }

            if attempts < self.policy.max_attempts {
                info!(attempt = attempts, "No response from control plane, retrying setup");
            }
        }

        warn!(attempts, "Association setup retransmissions exhausted");
        InitiatorOutcome::Exhausted { attempts }
    }
}
