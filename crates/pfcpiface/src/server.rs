//! N4 receive loop.
//!
//! One task reads the PFCP socket with a read deadline and feeds datagrams
//! to the [`PfcpEngine`]; a deadline expiry runs the engine's idle cleanup.
//! When a peer is configured, an [`AssociationInitiator`] task sends setup
//! requests over the same socket and its outcome is collected by the loop.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use upf_fwdplane::ForwardingPlaneChannel;
use upf_pfcp::message::AssociationSetupRequest;
use upf_pfcp::types::{recovery_timestamp_now, Interface, NodeId, UserPlaneIpResourceInformation};
use upf_pfcp::{build_message, PfcpMessage};

use crate::association::{AssociationInitiator, InitiatorOutcome, RequestSink, RetryPolicy};
use crate::engine::PfcpEngine;
use crate::error::{PfcpifaceError, Result};

/// Receive deadline; expiry counts as loss of the peer.
pub const READ_TIMEOUT: Duration = Duration::from_secs(25);

const PKT_BUF_SIZE: usize = 4096;

/// Sends Association Setup Requests to the configured peer.
struct UdpRequestSink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    node_addr: Ipv4Addr,
    channel: Arc<ForwardingPlaneChannel>,
    sequence: AtomicU32,
}

#[async_trait]
impl RequestSink for UdpRequestSink {
    async fn send_setup_request(&self) -> Result<()> {
        let req = PfcpMessage::AssociationSetupRequest(AssociationSetupRequest {
            node_id: Some(NodeId::Ipv4(self.node_addr)),
            recovery_time_stamp: Some(recovery_timestamp_now()),
            up_ip_resource: Some(UserPlaneIpResourceInformation::ipv4_for(
                self.channel.access_address().await,
                Interface::Access,
            )),
        });
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let datagram = build_message(&req, seq, None)?;
        self.socket
            .send_to(&datagram, self.peer)
            .await
            .map_err(|e| PfcpifaceError::socket("send", e))?;
        debug!(peer = %self.peer, seq, "Sent association setup request");
        Ok(())
    }
}

enum Event {
    Shutdown,
    Initiator(std::result::Result<InitiatorOutcome, JoinError>),
    Received(std::io::Result<(usize, SocketAddr)>),
    TimedOut,
}

/// PFCP agent bound to its N4 socket.
pub struct PfcpServer {
    socket: Arc<UdpSocket>,
    engine: PfcpEngine,
    peer: Option<SocketAddr>,
    read_timeout: Duration,
    retry: RetryPolicy,
}

impl PfcpServer {
    pub async fn bind(addr: SocketAddr, engine: PfcpEngine) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| PfcpifaceError::socket("bind", e))?;
        info!(local = %addr, "Listening for PFCP");
        Ok(Self {
            socket: Arc::new(socket),
            engine,
            peer: None,
            read_timeout: READ_TIMEOUT,
            retry: RetryPolicy::default(),
        })
    }

    /// Initiates the association toward `peer` instead of only answering.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| PfcpifaceError::socket("local_addr", e))
    }

    pub fn engine(&self) -> &PfcpEngine {
        &self.engine
    }

    /// Serves until `shutdown` resolves, then hands the engine back.
    ///
    /// Socket failures end the loop with an error.
    pub async fn run<F>(mut self, shutdown: F) -> Result<PfcpEngine>
    where
        F: Future<Output = ()>,
    {
        let mut initiator = self.start_initiator().await;
        let mut buf = vec![0u8; PKT_BUF_SIZE];
        tokio::pin!(shutdown);

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => Event::Shutdown,
                outcome = join_initiator(&mut initiator), if initiator.is_some() => {
                    Event::Initiator(outcome)
                }
                received = tokio::time::timeout(self.read_timeout, self.socket.recv_from(&mut buf)) => {
                    match received {
                        Ok(result) => Event::Received(result),
                        Err(_) => Event::TimedOut,
                    }
                }
            };

            match event {
                Event::Shutdown => {
                    info!("PFCP server shutting down");
                    if let Some(handle) = initiator.take() {
                        handle.abort();
                    }
                    return Ok(self.engine);
                }
                Event::Initiator(outcome) => {
                    initiator = None;
                    match outcome {
                        Ok(outcome) => self.engine.initiator_finished(outcome).await,
                        Err(e) => {
                            error!(error = %e, "Association initiator task failed");
                            self.engine
                                .initiator_finished(InitiatorOutcome::Exhausted { attempts: 0 })
                                .await;
                        }
                    }
                }
                Event::TimedOut => {
                    debug!(timeout = ?self.read_timeout, "Read timeout");
                    self.engine.on_read_timeout().await;
                }
                Event::Received(Err(e)) => {
                    error!(error = %e, "PFCP socket read failed");
                    return Err(PfcpifaceError::socket("recv", e));
                }
                Event::Received(Ok((len, from))) => {
                    self.handle_datagram(&buf[..len], from).await?;
                }
            }
        }
    }

    async fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) -> Result<()> {
        if self.engine.n4_addr().is_none() {
            match self.local_ipv4_toward(from).await {
                Ok(addr) => self.engine.learn_n4_addr(addr),
                Err(e) => warn!(%from, error = %e, "Cannot resolve local N4 address"),
            }
        }

        if let Some(reply) = self.engine.handle_datagram(datagram, from).await {
            self.socket
                .send_to(&reply, from)
                .await
                .map_err(|e| PfcpifaceError::socket("send", e))?;
        }
        Ok(())
    }

    async fn start_initiator(&mut self) -> Option<JoinHandle<InitiatorOutcome>> {
        let peer = self.peer?;

        if self.engine.n4_addr().is_none() {
            match self.local_ipv4_toward(peer).await {
                Ok(addr) => self.engine.learn_n4_addr(addr),
                Err(e) => warn!(%peer, error = %e, "Cannot resolve local N4 address"),
            }
        }

        let sink = UdpRequestSink {
            socket: Arc::clone(&self.socket),
            peer,
            node_addr: self.engine.n4_addr().unwrap_or(Ipv4Addr::UNSPECIFIED),
            channel: Arc::clone(self.engine.channel()),
            sequence: AtomicU32::new(1),
        };
        let (answers_tx, answers_rx) = mpsc::channel(1);
        self.engine.attach_initiator(answers_tx);

        info!(%peer, "Initiating PFCP association");
        let initiator = AssociationInitiator::new(sink, self.retry);
        Some(tokio::spawn(initiator.run(answers_rx)))
    }

    /// Local IPv4 address the kernel would use to reach `peer`.
    async fn local_ipv4_toward(&self, peer: SocketAddr) -> Result<Ipv4Addr> {
        if let Ok(SocketAddr::V4(local)) = self.socket.local_addr() {
            if !local.ip().is_unspecified() {
                return Ok(*local.ip());
            }
        }

        let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| PfcpifaceError::socket("bind", e))?;
        probe
            .connect(peer)
            .await
            .map_err(|e| PfcpifaceError::socket("connect", e))?;
        match probe.local_addr() {
            Ok(SocketAddr::V4(local)) => Ok(*local.ip()),
            Ok(SocketAddr::V6(local)) => Err(PfcpifaceError::invalid_config(
                "n4_addr",
                format!("resolved to IPv6 address {}", local.ip()),
            )),
            Err(e) => Err(PfcpifaceError::socket("local_addr", e)),
        }
    }
}

async fn join_initiator(
    handle: &mut Option<JoinHandle<InitiatorOutcome>>,
) -> std::result::Result<InitiatorOutcome, JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
