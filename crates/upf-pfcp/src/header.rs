//! PFCP message header (TS 29.244 section 7.2.2).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PfcpError, PfcpResult};
use crate::types::PFCP_VERSION;

/// Header length of node related messages.
pub const PFCP_HEADER_LEN: usize = 8;

/// Header length of session related messages.
pub const PFCP_HEADER_LEN_WITH_SEID: usize = 16;

/// PFCP message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    HeartbeatRequest = 1,
    HeartbeatResponse = 2,
    PfdManagementRequest = 3,
    PfdManagementResponse = 4,
    AssociationSetupRequest = 5,
    AssociationSetupResponse = 6,
    AssociationUpdateRequest = 7,
    AssociationUpdateResponse = 8,
    AssociationReleaseRequest = 9,
    AssociationReleaseResponse = 10,
    VersionNotSupportedResponse = 11,
    NodeReportRequest = 12,
    NodeReportResponse = 13,
    SessionSetDeletionRequest = 14,
    SessionSetDeletionResponse = 15,
    SessionEstablishmentRequest = 50,
    SessionEstablishmentResponse = 51,
    SessionModificationRequest = 52,
    SessionModificationResponse = 53,
    SessionDeletionRequest = 54,
    SessionDeletionResponse = 55,
    SessionReportRequest = 56,
    SessionReportResponse = 57,
}

impl TryFrom<u8> for MessageType {
    type Error = PfcpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::HeartbeatRequest,
            2 => Self::HeartbeatResponse,
            3 => Self::PfdManagementRequest,
            4 => Self::PfdManagementResponse,
            5 => Self::AssociationSetupRequest,
            6 => Self::AssociationSetupResponse,
            7 => Self::AssociationUpdateRequest,
            8 => Self::AssociationUpdateResponse,
            9 => Self::AssociationReleaseRequest,
            10 => Self::AssociationReleaseResponse,
            11 => Self::VersionNotSupportedResponse,
            12 => Self::NodeReportRequest,
            13 => Self::NodeReportResponse,
            14 => Self::SessionSetDeletionRequest,
            15 => Self::SessionSetDeletionResponse,
            50 => Self::SessionEstablishmentRequest,
            51 => Self::SessionEstablishmentResponse,
            52 => Self::SessionModificationRequest,
            53 => Self::SessionModificationResponse,
            54 => Self::SessionDeletionRequest,
            55 => Self::SessionDeletionResponse,
            56 => Self::SessionReportRequest,
            57 => Self::SessionReportResponse,
            _ => return Err(PfcpError::InvalidMessageType(value)),
        })
    }
}

impl MessageType {
    /// Returns true for session related messages, which always carry a SEID.
    pub fn has_seid(&self) -> bool {
        (*self as u8) >= 50
    }

    /// Returns the message name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::HeartbeatRequest => "Heartbeat Request",
            Self::HeartbeatResponse => "Heartbeat Response",
            Self::PfdManagementRequest => "PFD Management Request",
            Self::PfdManagementResponse => "PFD Management Response",
            Self::AssociationSetupRequest => "Association Setup Request",
            Self::AssociationSetupResponse => "Association Setup Response",
            Self::AssociationUpdateRequest => "Association Update Request",
            Self::AssociationUpdateResponse => "Association Update Response",
            Self::AssociationReleaseRequest => "Association Release Request",
            Self::AssociationReleaseResponse => "Association Release Response",
            Self::VersionNotSupportedResponse => "Version Not Supported Response",
            Self::NodeReportRequest => "Node Report Request",
            Self::NodeReportResponse => "Node Report Response",
            Self::SessionSetDeletionRequest => "Session Set Deletion Request",
            Self::SessionSetDeletionResponse => "Session Set Deletion Response",
            Self::SessionEstablishmentRequest => "Session Establishment Request",
            Self::SessionEstablishmentResponse => "Session Establishment Response",
            Self::SessionModificationRequest => "Session Modification Request",
            Self::SessionModificationResponse => "Session Modification Response",
            Self::SessionDeletionRequest => "Session Deletion Request",
            Self::SessionDeletionResponse => "Session Deletion Response",
            Self::SessionReportRequest => "Session Report Request",
            Self::SessionReportResponse => "Session Report Response",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// PFCP header.
///
/// ```text
///  octet 1    | Ver(3) | spare(2) | FO | MP | S |
///  octet 2    | Message Type                    |
///  octet 3-4  | Message Length                  |
///  octet 5-12 | SEID (only when S = 1)          |
///  next 3     | Sequence Number                 |
///  last       | Priority(4) | spare(4)          |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfcpHeader {
    pub message_type: MessageType,
    /// Length of everything after the first 4 octets.
    pub length: u16,
    pub seid: Option<u64>,
    /// 24-bit sequence number, echoed in responses.
    pub sequence_number: u32,
    /// Message priority, present only when the MP flag is set.
    pub priority: Option<u8>,
}

impl PfcpHeader {
    /// Creates a node related header.
    pub fn new(message_type: MessageType, sequence_number: u32) -> Self {
        Self {
            message_type,
            length: 0,
            seid: None,
            sequence_number: sequence_number & 0x00FF_FFFF,
            priority: None,
        }
    }

    /// Creates a session related header.
    pub fn with_seid(message_type: MessageType, seid: u64, sequence_number: u32) -> Self {
        Self {
            seid: Some(seid),
            ..Self::new(message_type, sequence_number)
        }
    }

    /// Returns the encoded header length.
    pub fn header_len(&self) -> usize {
        if self.seid.is_some() {
            PFCP_HEADER_LEN_WITH_SEID
        } else {
            PFCP_HEADER_LEN
        }
    }

    /// Encodes the header for a body of `body_len` bytes.
    ///
    /// Fails without writing when the length field cannot hold the message.
    pub fn encode(&self, body_len: usize, buf: &mut BytesMut) -> PfcpResult<()> {
        let declared = self.header_len() - 4 + body_len;
        let length =
            u16::try_from(declared).map_err(|_| PfcpError::MessageTooLong(declared + 4))?;
        let flags = (PFCP_VERSION << 5)
            | (u8::from(self.priority.is_some()) << 1)
            | u8::from(self.seid.is_some());
        buf.put_u8(flags);
        buf.put_u8(self.message_type as u8);
        buf.put_u16(length);
        if let Some(seid) = self.seid {
            buf.put_u64(seid);
        }
        buf.put_slice(&self.sequence_number.to_be_bytes()[1..4]);
        buf.put_u8(self.priority.unwrap_or(0) << 4);
        Ok(())
    }

    /// Decodes a header, leaving `buf` positioned at the message body.
    pub fn decode(buf: &mut Bytes) -> PfcpResult<Self> {
        PfcpError::check_len(4, buf.remaining())?;

        let flags = buf.get_u8();
        let version = flags >> 5;
        if version != PFCP_VERSION {
            return Err(PfcpError::VersionNotSupported(version));
        }
        let seid_present = flags & 0x01 != 0;
        let priority_present = flags & 0x02 != 0;

        let message_type = MessageType::try_from(buf.get_u8())?;
        let length = buf.get_u16();

        let rest = if seid_present {
            PFCP_HEADER_LEN_WITH_SEID - 4
        } else {
            PFCP_HEADER_LEN - 4
        };
        PfcpError::check_len(rest, buf.remaining())?;
        if usize::from(length) < rest {
            return Err(PfcpError::InvalidFormat(format!(
                "message length {} shorter than header",
                length
            )));
        }

        let seid = seid_present.then(|| buf.get_u64());

        let mut seq = [0u8; 4];
        buf.copy_to_slice(&mut seq[1..4]);
        let last = buf.get_u8();

        Ok(Self {
            message_type,
            length,
            seid,
            sequence_number: u32::from_be_bytes(seq),
            priority: priority_present.then_some(last >> 4),
        })
    }

    /// Length of the body that follows this header.
    pub fn body_len(&self) -> usize {
        usize::from(self.length) + 4 - self.header_len()
    }
}
