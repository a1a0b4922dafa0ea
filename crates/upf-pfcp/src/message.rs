//! Typed PFCP messages.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PfcpError, PfcpResult};
use crate::header::{MessageType, PfcpHeader};
use crate::ie::{for_each_ie, put_ie, put_u32_ie, put_u8_ie, IeType};
use crate::rules::{CreateFar, CreatePdr, UpdateFar};
use crate::types::{Cause, FSeid, NodeId, UserPlaneIpResourceInformation};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeartbeatRequest {
    pub recovery_time_stamp: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeartbeatResponse {
    pub recovery_time_stamp: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociationSetupRequest {
    pub node_id: Option<NodeId>,
    pub recovery_time_stamp: Option<u32>,
    pub up_ip_resource: Option<UserPlaneIpResourceInformation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociationSetupResponse {
    pub node_id: Option<NodeId>,
    pub cause: Option<Cause>,
    pub recovery_time_stamp: Option<u32>,
    pub up_ip_resource: Option<UserPlaneIpResourceInformation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociationReleaseRequest {
    pub node_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociationReleaseResponse {
    pub node_id: Option<NodeId>,
    pub cause: Option<Cause>,
    pub recovery_time_stamp: Option<u32>,
    pub up_ip_resource: Option<UserPlaneIpResourceInformation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionEstablishmentRequest {
    pub node_id: Option<NodeId>,
    /// CP F-SEID: the peer's SEID for this session.
    pub cp_f_seid: Option<FSeid>,
    pub create_pdrs: Vec<CreatePdr>,
    pub create_fars: Vec<CreateFar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionEstablishmentResponse {
    pub node_id: Option<NodeId>,
    pub cause: Option<Cause>,
    /// UP F-SEID: the SEID this node assigned.
    pub up_f_seid: Option<FSeid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionModificationRequest {
    pub cp_f_seid: Option<FSeid>,
    pub update_fars: Vec<UpdateFar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionModificationResponse {
    pub cause: Option<Cause>,
    /// UP F-SEID of the modified session.
    pub up_f_seid: Option<FSeid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionDeletionRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionDeletionResponse {
    pub cause: Option<Cause>,
}

/// A decoded PFCP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PfcpMessage {
    HeartbeatRequest(HeartbeatRequest),
    HeartbeatResponse(HeartbeatResponse),
    AssociationSetupRequest(AssociationSetupRequest),
    AssociationSetupResponse(AssociationSetupResponse),
    AssociationReleaseRequest(AssociationReleaseRequest),
    AssociationReleaseResponse(AssociationReleaseResponse),
    SessionEstablishmentRequest(SessionEstablishmentRequest),
    SessionEstablishmentResponse(SessionEstablishmentResponse),
    SessionModificationRequest(SessionModificationRequest),
    SessionModificationResponse(SessionModificationResponse),
    SessionDeletionRequest(SessionDeletionRequest),
    SessionDeletionResponse(SessionDeletionResponse),
    /// A valid PFCP message type this codec does not model. The body is kept
    /// undecoded.
    Unhandled {
        message_type: MessageType,
        body: Bytes,
    },
}

impl PfcpMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::HeartbeatRequest(_) => MessageType::HeartbeatRequest,
            Self::HeartbeatResponse(_) => MessageType::HeartbeatResponse,
            Self::AssociationSetupRequest(_) => MessageType::AssociationSetupRequest,
            Self::AssociationSetupResponse(_) => MessageType::AssociationSetupResponse,
            Self::AssociationReleaseRequest(_) => MessageType::AssociationReleaseRequest,
            Self::AssociationReleaseResponse(_) => MessageType::AssociationReleaseResponse,
            Self::SessionEstablishmentRequest(_) => MessageType::SessionEstablishmentRequest,
            Self::SessionEstablishmentResponse(_) => MessageType::SessionEstablishmentResponse,
            Self::SessionModificationRequest(_) => MessageType::SessionModificationRequest,
            Self::SessionModificationResponse(_) => MessageType::SessionModificationResponse,
            Self::SessionDeletionRequest(_) => MessageType::SessionDeletionRequest,
            Self::SessionDeletionResponse(_) => MessageType::SessionDeletionResponse,
            Self::Unhandled { message_type, .. } => *message_type,
        }
    }

    fn body_ies(&self) -> BodyIes {
        let mut ies = BodyIes::default();
        match self {
            Self::HeartbeatRequest(m) => ies.recovery_time_stamp = m.recovery_time_stamp,
            Self::HeartbeatResponse(m) => ies.recovery_time_stamp = m.recovery_time_stamp,
            Self::AssociationSetupRequest(m) => {
                ies.node_id = m.node_id.clone();
                ies.recovery_time_stamp = m.recovery_time_stamp;
                ies.up_ip_resource = m.up_ip_resource.clone();
            }
            Self::AssociationSetupResponse(m) => {
                ies.node_id = m.node_id.clone();
                ies.cause = m.cause;
                ies.recovery_time_stamp = m.recovery_time_stamp;
                ies.up_ip_resource = m.up_ip_resource.clone();
            }
            Self::AssociationReleaseRequest(m) => ies.node_id = m.node_id.clone(),
            Self::AssociationReleaseResponse(m) => {
                ies.node_id = m.node_id.clone();
                ies.cause = m.cause;
                ies.recovery_time_stamp = m.recovery_time_stamp;
                ies.up_ip_resource = m.up_ip_resource.clone();
            }
            Self::SessionEstablishmentRequest(m) => {
                ies.node_id = m.node_id.clone();
                ies.f_seid = m.cp_f_seid;
                ies.create_pdrs = m.create_pdrs.clone();
                ies.create_fars = m.create_fars.clone();
            }
            Self::SessionEstablishmentResponse(m) => {
                ies.node_id = m.node_id.clone();
                ies.cause = m.cause;
                ies.f_seid = m.up_f_seid;
            }
            Self::SessionModificationRequest(m) => {
                ies.f_seid = m.cp_f_seid;
                ies.update_fars = m.update_fars.clone();
            }
            Self::SessionModificationResponse(m) => {
                ies.cause = m.cause;
                ies.f_seid = m.up_f_seid;
            }
            Self::SessionDeletionRequest(_) => {}
            Self::SessionDeletionResponse(m) => ies.cause = m.cause,
            Self::Unhandled { .. } => {}
        }
        ies
    }

    fn from_body(message_type: MessageType, body: Bytes) -> PfcpResult<Self> {
        let ies = || BodyIes::decode(body.clone());
        Ok(match message_type {
            MessageType::HeartbeatRequest => Self::HeartbeatRequest(HeartbeatRequest {
                recovery_time_stamp: ies()?.recovery_time_stamp,
            }),
            MessageType::HeartbeatResponse => Self::HeartbeatResponse(HeartbeatResponse {
                recovery_time_stamp: ies()?.recovery_time_stamp,
            }),
            MessageType::AssociationSetupRequest => {
                let ies = ies()?;
                Self::AssociationSetupRequest(AssociationSetupRequest {
                    node_id: ies.node_id,
                    recovery_time_stamp: ies.recovery_time_stamp,
                    up_ip_resource: ies.up_ip_resource,
                })
            }
            MessageType::AssociationSetupResponse => {
                let ies = ies()?;
                Self::AssociationSetupResponse(AssociationSetupResponse {
                    node_id: ies.node_id,
                    cause: ies.cause,
                    recovery_time_stamp: ies.recovery_time_stamp,
                    up_ip_resource: ies.up_ip_resource,
                })
            }
            MessageType::AssociationReleaseRequest => {
                Self::AssociationReleaseRequest(AssociationReleaseRequest {
                    node_id: ies()?.node_id,
                })
            }
            MessageType::AssociationReleaseResponse => {
                let ies = ies()?;
                Self::AssociationReleaseResponse(AssociationReleaseResponse {
                    node_id: ies.node_id,
                    cause: ies.cause,
                    recovery_time_stamp: ies.recovery_time_stamp,
                    up_ip_resource: ies.up_ip_resource,
                })
            }
            MessageType::SessionEstablishmentRequest => {
                let ies = ies()?;
                Self::SessionEstablishmentRequest(SessionEstablishmentRequest {
                    node_id: ies.node_id,
                    cp_f_seid: ies.f_seid,
                    create_pdrs: ies.create_pdrs,
                    create_fars: ies.create_fars,
                })
            }
            MessageType::SessionEstablishmentResponse => {
                let ies = ies()?;
                Self::SessionEstablishmentResponse(SessionEstablishmentResponse {
                    node_id: ies.node_id,
                    cause: ies.cause,
                    up_f_seid: ies.f_seid,
                })
            }
            MessageType::SessionModificationRequest => {
                let ies = ies()?;
                Self::SessionModificationRequest(SessionModificationRequest {
                    cp_f_seid: ies.f_seid,
                    update_fars: ies.update_fars,
                })
            }
            MessageType::SessionModificationResponse => {
                let ies = ies()?;
                Self::SessionModificationResponse(SessionModificationResponse {
                    cause: ies.cause,
                    up_f_seid: ies.f_seid,
                })
            }
            MessageType::SessionDeletionRequest => {
                ies()?;
                Self::SessionDeletionRequest(SessionDeletionRequest {})
            }
            MessageType::SessionDeletionResponse => {
                Self::SessionDeletionResponse(SessionDeletionResponse {
                    cause: ies()?.cause,
                })
            }
            _ => Self::Unhandled {
                message_type,
                body: body.clone(),
            },
        })
    }
}

/// Every IE a modelled message can carry, collected in one pass.
#[derive(Debug, Default)]
struct BodyIes {
    node_id: Option<NodeId>,
    cause: Option<Cause>,
    f_seid: Option<FSeid>,
    recovery_time_stamp: Option<u32>,
    up_ip_resource: Option<UserPlaneIpResourceInformation>,
    create_pdrs: Vec<CreatePdr>,
    create_fars: Vec<CreateFar>,
    update_fars: Vec<UpdateFar>,
}

impl BodyIes {
    fn decode(mut body: Bytes) -> PfcpResult<Self> {
        let mut ies = BodyIes::default();
        for_each_ie(&mut body, |ie| {
            match ie.ie_type {
                t if IeType::NodeId.matches(t) => ies.node_id = Some(NodeId::decode(ie.data)?),
                t if IeType::Cause.matches(t) => ies.cause = Some(Cause::try_from(ie.get_u8()?)?),
                t if IeType::FSeid.matches(t) => ies.f_seid = Some(FSeid::decode(ie.data)?),
                t if IeType::RecoveryTimeStamp.matches(t) => {
                    ies.recovery_time_stamp = Some(ie.get_u32()?)
                }
                t if IeType::UserPlaneIpResourceInformation.matches(t) => {
                    ies.up_ip_resource = Some(UserPlaneIpResourceInformation::decode(ie.data)?)
                }
                t if IeType::CreatePdr.matches(t) => {
                    ies.create_pdrs.push(CreatePdr::decode(ie.data)?)
                }
                t if IeType::CreateFar.matches(t) => {
                    ies.create_fars.push(CreateFar::decode(ie.data)?)
                }
                t if IeType::UpdateFar.matches(t) => {
                    ies.update_fars.push(UpdateFar::decode(ie.data)?)
                }
                _ => {}
            }
            Ok(())
        })?;
        Ok(ies)
    }

    fn encode(&self, buf: &mut BytesMut) {
        if let Some(node_id) = &self.node_id {
            put_ie(buf, IeType::NodeId, |b| node_id.encode(b));
        }
        if let Some(cause) = self.cause {
            put_u8_ie(buf, IeType::Cause, cause as u8);
        }
        if let Some(f_seid) = &self.f_seid {
            put_ie(buf, IeType::FSeid, |b| f_seid.encode(b));
        }
        if let Some(ts) = self.recovery_time_stamp {
            put_u32_ie(buf, IeType::RecoveryTimeStamp, ts);
        }
        if let Some(info) = &self.up_ip_resource {
            put_ie(buf, IeType::UserPlaneIpResourceInformation, |b| info.encode(b));
        }
        for pdr in &self.create_pdrs {
            put_ie(buf, IeType::CreatePdr, |b| pdr.encode(b));
        }
        for far in &self.create_fars {
            put_ie(buf, IeType::CreateFar, |b| far.encode(b));
        }
        for far in &self.update_fars {
            put_ie(buf, IeType::UpdateFar, |b| far.encode(b));
        }
    }
}

/// Serializes `message` into a datagram.
///
/// Session messages always carry a SEID; `seid` defaults to 0 for them and is
/// ignored for node messages.
///
/// Fails with [`PfcpError::MessageTooLong`] when the encoded message does not
/// fit the 16-bit length field.
pub fn build_message(
    message: &PfcpMessage,
    sequence_number: u32,
    seid: Option<u64>,
) -> PfcpResult<Bytes> {
    let message_type = message.message_type();
    let header = if message_type.has_seid() {
        PfcpHeader::with_seid(message_type, seid.unwrap_or(0), sequence_number)
    } else {
        PfcpHeader::new(message_type, sequence_number)
    };

    let mut body = BytesMut::new();
    match message {
        PfcpMessage::Unhandled { body: raw, .. } => body.put_slice(raw),
        other => other.body_ies().encode(&mut body),
    }

    let mut buf = BytesMut::with_capacity(header.header_len() + body.len());
    header.encode(body.len(), &mut buf)?;
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Parses a datagram into its header and message.
///
/// Octets past the length declared in the header are ignored.
pub fn parse_message(datagram: &[u8]) -> PfcpResult<(PfcpHeader, PfcpMessage)> {
    let mut buf = Bytes::copy_from_slice(datagram);
    let header = PfcpHeader::decode(&mut buf)?;
    if header.message_type.has_seid() && header.seid.is_none() {
        return Err(PfcpError::InvalidFormat(format!(
            "{} without SEID",
            header.message_type
        )));
    }

    let body_len = header.body_len();
    PfcpError::check_len(body_len, buf.remaining())?;
    let body = buf.split_to(body_len);
    let message = PfcpMessage::from_body(header.message_type, body)?;
    Ok((header, message))
}
