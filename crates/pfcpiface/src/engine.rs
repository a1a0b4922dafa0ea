//! PFCP protocol engine.
//!
//! The engine owns the session registry and the association state and is
//! driven by exactly one task: the receive loop hands it one datagram at a
//! time and sends back whatever reply it returns. Every handler runs to
//! completion, so requests for the same session never interleave.
//!
//! Rules reach the forwarding plane through [`RuleBatch`]. Before any batch
//! the engine makes sure the channel is Ready; if that required a reconnect,
//! every registered session is re-inserted first.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use upf_fwdplane::{
    CounterId, ForwardingPlaneChannel, FwdError, FwdResult, Readiness, RuleBatch,
};
use upf_pfcp::message::{
    AssociationReleaseRequest, AssociationReleaseResponse, AssociationSetupRequest,
    AssociationSetupResponse, HeartbeatRequest, HeartbeatResponse, SessionDeletionResponse,
    SessionEstablishmentRequest, SessionEstablishmentResponse, SessionModificationRequest,
    SessionModificationResponse,
};
use upf_pfcp::types::{
    recovery_timestamp_now, recovery_timestamp_to_unix, FSeid, Interface, NodeId,
    UserPlaneIpResourceInformation,
};
use upf_pfcp::{build_message, parse_message, Cause, PfcpHeader, PfcpMessage};

use crate::association::{AssociationState, InitiatorOutcome};
use crate::error::PfcpifaceError;
use crate::rules::{self, RuleContext};
use crate::seid::{local_seid, peer_seid};
use crate::session::{SessionRecord, SessionRegistry};

/// Cause for a failed forwarding-plane operation.
pub fn cause_for(err: &FwdError) -> Cause {
    match err {
        FwdError::ResourceExhausted { .. } => Cause::NoResourcesAvailable,
        FwdError::Rejected { .. } | FwdError::Transport { .. } | FwdError::NotReady => {
            Cause::RuleCreationModificationFailure
        }
        FwdError::Connect { .. } | FwdError::CounterNotFound { .. } | FwdError::Internal { .. } => {
            Cause::SystemFailure
        }
    }
}

/// Encodes a reply; a reply that cannot be encoded is logged and not sent.
fn encode_reply(rsp: &PfcpMessage, sequence_number: u32, seid: Option<u64>) -> Option<Bytes> {
    match build_message(rsp, sequence_number, seid) {
        Ok(datagram) => Some(datagram),
        Err(e) => {
            warn!(message_type = rsp.message_type().name(), error = %e, "Cannot encode reply");
            None
        }
    }
}

/// Dispatches PFCP requests and keeps session state in step with the
/// forwarding plane.
pub struct PfcpEngine {
    channel: Arc<ForwardingPlaneChannel>,
    registry: SessionRegistry,
    association: AssociationState,
    /// Local N4 address; learned from the first datagram when unset.
    n4_addr: Option<Ipv4Addr>,
    /// Single-slot hand-off to a running association initiator.
    initiator: Option<mpsc::Sender<bool>>,
}

impl PfcpEngine {
    pub fn new(
        channel: Arc<ForwardingPlaneChannel>,
        max_sessions: usize,
        n4_addr: Option<Ipv4Addr>,
    ) -> Self {
        Self {
            channel,
            registry: SessionRegistry::new(max_sessions),
            association: AssociationState::Idle,
            n4_addr,
            initiator: None,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn association(&self) -> AssociationState {
        self.association
    }

    pub fn channel(&self) -> &Arc<ForwardingPlaneChannel> {
        &self.channel
    }

    pub fn n4_addr(&self) -> Option<Ipv4Addr> {
        self.n4_addr
    }

    /// Address advertised in Node ID and F-SEID.
    fn node_addr(&self) -> Ipv4Addr {
        self.n4_addr.unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    /// Records the local N4 address once. Later calls are ignored.
    pub fn learn_n4_addr(&mut self, addr: Ipv4Addr) {
        if self.n4_addr.is_none() && !addr.is_unspecified() {
            info!(n4_addr = %addr, "Learned local N4 address");
            self.n4_addr = Some(addr);
        }
    }

    /// Connects the association initiator's answer channel.
    pub fn attach_initiator(&mut self, answers: mpsc::Sender<bool>) {
        self.initiator = Some(answers);
        if self.association == AssociationState::Idle {
            self.association = AssociationState::Pending;
        }
    }

    /// Collects the initiator's outcome. Giving up while still Pending
    /// returns the association to Idle and tears down every session.
    pub async fn initiator_finished(&mut self, outcome: InitiatorOutcome) {
        self.initiator = None;
        if let InitiatorOutcome::Exhausted { attempts } = outcome {
            warn!(attempts, "Giving up on association setup");
            if self.association == AssociationState::Pending {
                self.enter_idle().await;
            }
        }
    }

    fn notify_initiator(&mut self, connected: bool) {
        let Some(answers) = &self.initiator else {
            return;
        };
        match answers.try_send(connected) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Initiator has an unread answer pending");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.initiator = None;
            }
        }
    }

    /// Handles one datagram and returns the reply to send, if any.
    ///
    /// Undecodable datagrams and message types without a handler are
    /// dropped without a reply.
    pub async fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) -> Option<Bytes> {
        let (header, message) = match parse_message(datagram) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(%from, len = datagram.len(), error = %e, "Ignoring undecodable datagram");
                return None;
            }
        };

        match message {
            PfcpMessage::HeartbeatRequest(req) => self.handle_heartbeat(&header, req, from),
            PfcpMessage::AssociationSetupRequest(req) => {
                self.handle_association_setup_request(&header, req, from).await
            }
            PfcpMessage::AssociationSetupResponse(rsp) => {
                self.handle_association_setup_response(rsp, from);
                None
            }
            PfcpMessage::AssociationReleaseRequest(req) => {
                self.handle_association_release(&header, req, from).await
            }
            PfcpMessage::SessionEstablishmentRequest(req) => {
                self.handle_establishment(&header, req).await
            }
            PfcpMessage::SessionModificationRequest(req) => {
                self.handle_modification(&header, req).await
            }
            PfcpMessage::SessionDeletionRequest(_) => self.handle_deletion(&header).await,
            other => {
                debug!(
                    %from,
                    message_type = other.message_type().name(),
                    "Message type not supported"
                );
                None
            }
        }
    }

    fn handle_heartbeat(
        &self,
        header: &PfcpHeader,
        _req: HeartbeatRequest,
        from: SocketAddr,
    ) -> Option<Bytes> {
        debug!(%from, seq = header.sequence_number, "Heartbeat request");
        let rsp = PfcpMessage::HeartbeatResponse(HeartbeatResponse {
            recovery_time_stamp: Some(recovery_timestamp_now()),
        });
        encode_reply(&rsp, header.sequence_number, None)
    }

    async fn up_ip_resource(&self) -> UserPlaneIpResourceInformation {
        UserPlaneIpResourceInformation::ipv4_for(
            self.channel.access_address().await,
            Interface::Access,
        )
    }

    async fn handle_association_setup_request(
        &mut self,
        header: &PfcpHeader,
        req: AssociationSetupRequest,
        from: SocketAddr,
    ) -> Option<Bytes> {
        let Some(ts) = req.recovery_time_stamp else {
            warn!(%from, "Association setup request without recovery timestamp");
            return None;
        };
        info!(
            %from,
            recovery = recovery_timestamp_to_unix(ts),
            "Association setup request"
        );

        let rsp = PfcpMessage::AssociationSetupResponse(AssociationSetupResponse {
            node_id: Some(NodeId::Ipv4(self.node_addr())),
            cause: Some(Cause::RequestAccepted),
            recovery_time_stamp: Some(recovery_timestamp_now()),
            up_ip_resource: Some(self.up_ip_resource().await),
        });

        self.association = AssociationState::Established;
        self.notify_initiator(true);
        info!(%from, "PFCP association established");
        encode_reply(&rsp, header.sequence_number, None)
    }

    fn handle_association_setup_response(&mut self, rsp: AssociationSetupResponse, from: SocketAddr) {
        if self.initiator.is_none() || self.association != AssociationState::Pending {
            warn!(
                %from,
                association = %self.association,
                "Unsolicited association setup response"
            );
            return;
        }
        let accepted = rsp.cause.map_or(true, |cause| cause.is_accepted());
        match rsp.recovery_time_stamp {
            Some(ts) if accepted => {
                info!(
                    %from,
                    recovery = recovery_timestamp_to_unix(ts),
                    "PFCP association formed with control plane"
                );
                self.association = AssociationState::Established;
                self.notify_initiator(true);
            }
            Some(_) => {
                warn!(%from, cause = ?rsp.cause, "Association setup refused by peer");
                self.notify_initiator(false);
            }
            None => {
                warn!(%from, "Association setup response without recovery timestamp");
                self.notify_initiator(false);
            }
        }
    }

    async fn handle_association_release(
        &mut self,
        header: &PfcpHeader,
        _req: AssociationReleaseRequest,
        from: SocketAddr,
    ) -> Option<Bytes> {
        info!(%from, "Association release request");
        let rsp = PfcpMessage::AssociationReleaseResponse(AssociationReleaseResponse {
            node_id: Some(NodeId::Ipv4(self.node_addr())),
            cause: Some(Cause::RequestAccepted),
            recovery_time_stamp: Some(recovery_timestamp_now()),
            up_ip_resource: Some(self.up_ip_resource().await),
        });

        self.enter_idle().await;
        encode_reply(&rsp, header.sequence_number, None)
    }

    #[instrument(skip_all, fields(seq = header.sequence_number))]
    async fn handle_establishment(
        &mut self,
        header: &PfcpHeader,
        req: SessionEstablishmentRequest,
    ) -> Option<Bytes> {
        let node_addr = self.node_addr();
        let reply = |seid: u64, cause: Cause, up_f_seid: Option<FSeid>| {
            let rsp = PfcpMessage::SessionEstablishmentResponse(SessionEstablishmentResponse {
                node_id: Some(NodeId::Ipv4(node_addr)),
                cause: Some(cause),
                up_f_seid,
            });
            encode_reply(&rsp, header.sequence_number, Some(seid))
        };

        let Some(cp_f_seid) = req.cp_f_seid else {
            warn!("Session establishment request without CP F-SEID");
            return reply(0, Cause::MandatoryIeMissing, None);
        };
        let peer = cp_f_seid.seid;
        let local = local_seid(peer);

        if self.registry.contains(local) {
            debug!(local_seid = local, "Retransmitted establishment, session already exists");
            return reply(peer, Cause::RequestAccepted, Some(FSeid::new_ipv4(local, node_addr)));
        }
        if self.registry.is_full() {
            warn!(sessions = self.registry.len(), "Session registry full");
            return reply(peer, Cause::NoResourcesAvailable, None);
        }

        match self.establish(local, peer, &req).await {
            Ok(()) => {
                info!(
                    peer_seid = peer,
                    local_seid = local,
                    sessions = self.registry.len(),
                    "Session established"
                );
                reply(peer, Cause::RequestAccepted, Some(FSeid::new_ipv4(local, node_addr)))
            }
            Err(e) => {
                warn!(peer_seid = peer, error = %e, "Session establishment rejected");
                let cause = match &e {
                    PfcpifaceError::Forwarding(fwd) => cause_for(fwd),
                    PfcpifaceError::MissingIe { .. } => Cause::MandatoryIeMissing,
                    _ => Cause::SystemFailure,
                };
                reply(peer, cause, None)
            }
        }
    }

    async fn establish(
        &mut self,
        local: u64,
        peer: u64,
        req: &SessionEstablishmentRequest,
    ) -> crate::error::Result<()> {
        self.ensure_channel().await?;

        let ctx = RuleContext {
            local_seid: local,
            tunnel_endpoint: self.channel.access_address().await,
        };
        let (mut pdrs, fars) = rules::translate_session(&req.create_pdrs, &req.create_fars, ctx)?;

        RuleBatch::new(&self.channel).insert(&mut pdrs, &fars).await?;
        self.registry.put(local, SessionRecord::new(peer, pdrs, fars));
        Ok(())
    }

    #[instrument(skip_all, fields(seq = header.sequence_number, local_seid = header.seid))]
    async fn handle_modification(
        &mut self,
        header: &PfcpHeader,
        req: SessionModificationRequest,
    ) -> Option<Bytes> {
        let local = header.seid.unwrap_or_default();
        let cause = self.modify(local, &req).await;
        if cause.is_accepted() {
            debug!(updated = req.update_fars.len(), "Session modified");
        }
        let rsp = PfcpMessage::SessionModificationResponse(SessionModificationResponse {
            cause: Some(cause),
            up_f_seid: Some(FSeid::new_ipv4(local, self.node_addr())),
        });
        encode_reply(&rsp, header.sequence_number, Some(peer_seid(local)))
    }

    async fn modify(&mut self, local: u64, req: &SessionModificationRequest) -> Cause {
        if !self.registry.contains(local) {
            warn!("Modification for unknown session");
            return Cause::SessionContextNotFound;
        }
        if req.update_fars.is_empty() {
            return Cause::RequestAccepted;
        }
        if let Err(e) = self.ensure_channel().await {
            warn!(error = %e, "Forwarding plane unavailable");
            return Cause::SystemFailure;
        }

        // Replay may have dropped the session.
        let Some(record) = self.registry.get(local) else {
            return Cause::SessionContextNotFound;
        };
        let mut merged = Vec::with_capacity(req.update_fars.len());
        for update in &req.update_fars {
            match record.far(update.far_id) {
                Some(stored) => merged.push(rules::merge_update(stored, update)),
                None => {
                    warn!(far_id = update.far_id, "Update for unknown FAR");
                    return Cause::RuleCreationModificationFailure;
                }
            }
        }

        if let Err(e) = RuleBatch::new(&self.channel).update(&merged).await {
            warn!(error = %e, "FAR update failed");
            return cause_for(&e);
        }
        if let Some(record) = self.registry.get_mut(local) {
            for far in merged {
                record.replace_far(far);
            }
        }
        Cause::RequestAccepted
    }

    #[instrument(skip_all, fields(seq = header.sequence_number, local_seid = header.seid))]
    async fn handle_deletion(&mut self, header: &PfcpHeader) -> Option<Bytes> {
        let local = header.seid.unwrap_or_default();
        let cause = self.delete(local).await;
        let rsp = PfcpMessage::SessionDeletionResponse(SessionDeletionResponse {
            cause: Some(cause),
        });
        encode_reply(&rsp, header.sequence_number, Some(peer_seid(local)))
    }

    async fn delete(&mut self, local: u64) -> Cause {
        if !self.registry.contains(local) {
            debug!("Deletion for unknown session, nothing to remove");
            return Cause::RequestAccepted;
        }

        let ready = self.ensure_channel().await;
        let Some(record) = self.registry.delete(local) else {
            return Cause::RequestAccepted;
        };
        if let Err(e) = ready {
            // Pools are rebuilt on the next Ready, so the counters need no release.
            warn!(error = %e, "Forwarding plane unavailable, session dropped");
            return Cause::SystemFailure;
        }

        match RuleBatch::new(&self.channel)
            .delete(&record.pdrs, &record.fars)
            .await
        {
            Ok(()) => {
                info!(sessions = self.registry.len(), "Session deleted");
                Cause::RequestAccepted
            }
            Err(e) => {
                warn!(error = %e, "Session rules not fully removed");
                cause_for(&e)
            }
        }
    }

    /// Runs on a receive timeout. Tears down every session if the peer
    /// went quiet while associated, or if sessions exist without an
    /// association. A running initiator keeps its Pending state.
    pub async fn on_read_timeout(&mut self) {
        match self.association {
            AssociationState::Established => {
                warn!("No traffic from control plane, releasing association");
                self.enter_idle().await;
            }
            AssociationState::Idle if !self.registry.is_empty() => {
                warn!(
                    sessions = self.registry.len(),
                    "Sessions without an association, removing"
                );
                self.enter_idle().await;
            }
            _ => {}
        }
    }

    /// Moves to Idle. Sessions never outlive the association.
    async fn enter_idle(&mut self) {
        self.cleanup_sessions().await;
        self.association = AssociationState::Idle;
    }

    /// Removes every session and deletes its rules. Returns the number of
    /// sessions removed.
    pub async fn cleanup_sessions(&mut self) -> usize {
        let sessions = self.registry.drain();
        if sessions.is_empty() {
            return 0;
        }
        info!(sessions = sessions.len(), "Deleting all sessions");

        if let Err(e) = self.ensure_channel().await {
            warn!(error = %e, "Forwarding plane unavailable, dropping sessions locally");
            return sessions.len();
        }
        let batch = RuleBatch::new(&self.channel);
        for (seid, record) in &sessions {
            if let Err(e) = batch.delete(&record.pdrs, &record.fars).await {
                warn!(local_seid = seid, error = %e, "Session rules not fully removed");
            }
        }
        sessions.len()
    }

    /// Makes the channel Ready, replaying sessions after a reconnect.
    async fn ensure_channel(&mut self) -> FwdResult<()> {
        match self.channel.ensure_ready().await? {
            Readiness::AlreadyReady => Ok(()),
            Readiness::Reconnected { generation } => {
                if self.registry.is_empty() {
                    return Ok(());
                }
                self.replay(generation).await
            }
        }
    }

    /// Re-inserts every registered session with fresh counters.
    ///
    /// A session the switch refuses is dropped. A transport failure stops
    /// the replay; the next reconnect starts it over.
    async fn replay(&mut self, generation: u64) -> FwdResult<()> {
        let endpoint = self.channel.access_address().await;
        let seids = self.registry.seids();
        info!(generation, sessions = seids.len(), "Replaying sessions after reconnect");

        let batch = RuleBatch::new(&self.channel);
        for seid in seids {
            let Some(record) = self.registry.get_mut(seid) else {
                continue;
            };
            for pdr in record.pdrs.iter_mut() {
                pdr.counter_id = CounterId::NONE;
            }
            rules::restamp(&mut record.pdrs, &mut record.fars, endpoint);

            if let Err(e) = batch.insert(&mut record.pdrs, &record.fars).await {
                if e.is_transport() {
                    warn!(local_seid = seid, error = %e, "Replay interrupted");
                    return Err(e);
                }
                warn!(local_seid = seid, error = %e, "Replay refused, dropping session");
                self.registry.delete(seid);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for PfcpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PfcpEngine")
            .field("association", &self.association)
            .field("sessions", &self.registry.len())
            .field("n4_addr", &self.n4_addr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cause_mapping() {
        assert_eq!(
            cause_for(&FwdError::resource_exhausted("PreQosPipe.pre_qos_pdr_counter")),
            Cause::NoResourcesAvailable
        );
        assert_eq!(cause_for(&FwdError::NotReady), Cause::RuleCreationModificationFailure);
        assert_eq!(
            cause_for(&FwdError::connect("onos:51001", "refused")),
            Cause::SystemFailure
        );
        assert_eq!(
            cause_for(&FwdError::from_code(upf_fwdplane::RpcCode::InvalidArgument, "bad")),
            Cause::RuleCreationModificationFailure
        );
        assert_eq!(
            cause_for(&FwdError::from_code(upf_fwdplane::RpcCode::Unavailable, "down")),
            Cause::RuleCreationModificationFailure
        );
    }
}
