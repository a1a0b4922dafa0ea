//! Scalar information elements and protocol constants.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::Utc;

use crate::error::{PfcpError, PfcpResult};

/// PFCP protocol version.
pub const PFCP_VERSION: u8 = 1;

/// Well-known PFCP UDP port.
pub const PFCP_UDP_PORT: u16 = 8805;

/// Seconds between 1900-01-01 (NTP era 0) and the Unix epoch.
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// Returns the current time as a Recovery Time Stamp value.
pub fn recovery_timestamp_now() -> u32 {
    (Utc::now().timestamp() + NTP_UNIX_OFFSET) as u32
}

/// Converts a Recovery Time Stamp value to Unix seconds.
pub fn recovery_timestamp_to_unix(value: u32) -> i64 {
    i64::from(value) - NTP_UNIX_OFFSET
}

/// PFCP cause values (TS 29.244 section 8.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cause {
    RequestAccepted = 1,
    RequestRejected = 64,
    SessionContextNotFound = 65,
    MandatoryIeMissing = 66,
    ConditionalIeMissing = 67,
    InvalidLength = 68,
    MandatoryIeIncorrect = 69,
    InvalidForwardingPolicy = 70,
    InvalidFTeidAllocationOption = 71,
    NoEstablishedPfcpAssociation = 72,
    RuleCreationModificationFailure = 73,
    PfcpEntityInCongestion = 74,
    NoResourcesAvailable = 75,
    ServiceNotSupported = 76,
    SystemFailure = 77,
}

impl TryFrom<u8> for Cause {
    type Error = PfcpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::RequestAccepted,
            64 => Self::RequestRejected,
            65 => Self::SessionContextNotFound,
            66 => Self::MandatoryIeMissing,
            67 => Self::ConditionalIeMissing,
            68 => Self::InvalidLength,
            69 => Self::MandatoryIeIncorrect,
            70 => Self::InvalidForwardingPolicy,
            71 => Self::InvalidFTeidAllocationOption,
            72 => Self::NoEstablishedPfcpAssociation,
            73 => Self::RuleCreationModificationFailure,
            74 => Self::PfcpEntityInCongestion,
            75 => Self::NoResourcesAvailable,
            76 => Self::ServiceNotSupported,
            77 => Self::SystemFailure,
            _ => return Err(PfcpError::InvalidCause(value)),
        })
    }
}

impl Cause {
    pub fn is_accepted(&self) -> bool {
        *self == Cause::RequestAccepted
    }
}

/// Source / Destination Interface value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Interface {
    #[default]
    Access = 0,
    Core = 1,
    SgiLan = 2,
    CpFunction = 3,
}

impl TryFrom<u8> for Interface {
    type Error = PfcpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value & 0x0F {
            0 => Ok(Self::Access),
            1 => Ok(Self::Core),
            2 => Ok(Self::SgiLan),
            3 => Ok(Self::CpFunction),
            other => Err(PfcpError::InvalidInterfaceType(other)),
        }
    }
}

fn get_ipv4(buf: &mut Bytes) -> PfcpResult<Ipv4Addr> {
    PfcpError::check_len(4, buf.remaining())?;
    Ok(Ipv4Addr::from(buf.get_u32()))
}

fn get_ipv6(buf: &mut Bytes) -> PfcpResult<Ipv6Addr> {
    PfcpError::check_len(16, buf.remaining())?;
    Ok(Ipv6Addr::from(buf.get_u128()))
}

/// Node ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeId {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Fqdn(String),
}

impl NodeId {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            NodeId::Ipv4(addr) => {
                buf.put_u8(0);
                buf.put_slice(&addr.octets());
            }
            NodeId::Ipv6(addr) => {
                buf.put_u8(1);
                buf.put_slice(&addr.octets());
            }
            NodeId::Fqdn(name) => {
                buf.put_u8(2);
                for label in name.split('.') {
                    buf.put_u8(label.len() as u8);
                    buf.put_slice(label.as_bytes());
                }
            }
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        PfcpError::check_len(1, buf.remaining())?;
        match buf.get_u8() & 0x0F {
            0 => Ok(NodeId::Ipv4(get_ipv4(&mut buf)?)),
            1 => Ok(NodeId::Ipv6(get_ipv6(&mut buf)?)),
            2 => {
                let mut labels = Vec::new();
                while buf.has_remaining() {
                    let len = usize::from(buf.get_u8());
                    PfcpError::check_len(len, buf.remaining())?;
                    labels.push(String::from_utf8_lossy(&buf.split_to(len)).into_owned());
                }
                Ok(NodeId::Fqdn(labels.join(".")))
            }
            other => Err(PfcpError::InvalidNodeIdType(other)),
        }
    }
}

/// F-SEID: a SEID plus the address of the node that allocated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FSeid {
    pub seid: u64,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

impl FSeid {
    pub fn new_ipv4(seid: u64, addr: Ipv4Addr) -> Self {
        Self {
            seid,
            ipv4: Some(addr),
            ipv6: None,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let flags = (u8::from(self.ipv4.is_some()) << 1) | u8::from(self.ipv6.is_some());
        buf.put_u8(flags);
        buf.put_u64(self.seid);
        if let Some(addr) = self.ipv4 {
            buf.put_slice(&addr.octets());
        }
        if let Some(addr) = self.ipv6 {
            buf.put_slice(&addr.octets());
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        PfcpError::check_len(9, buf.remaining())?;
        let flags = buf.get_u8();
        let seid = buf.get_u64();
        let ipv4 = if flags & 0x02 != 0 {
            Some(get_ipv4(&mut buf)?)
        } else {
            None
        };
        let ipv6 = if flags & 0x01 != 0 {
            Some(get_ipv6(&mut buf)?)
        } else {
            None
        };
        Ok(Self { seid, ipv4, ipv6 })
    }
}

/// F-TEID: a GTP-U tunnel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FTeid {
    pub teid: u32,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    /// CH flag: the UP function is asked to choose the TEID.
    pub choose: bool,
}

impl FTeid {
    pub fn new_ipv4(teid: u32, addr: Ipv4Addr) -> Self {
        Self {
            teid,
            ipv4: Some(addr),
            ..Default::default()
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let flags = u8::from(self.ipv4.is_some())
            | (u8::from(self.ipv6.is_some()) << 1)
            | (u8::from(self.choose) << 2);
        buf.put_u8(flags);
        if self.choose {
            return;
        }
        buf.put_u32(self.teid);
        if let Some(addr) = self.ipv4 {
            buf.put_slice(&addr.octets());
        }
        if let Some(addr) = self.ipv6 {
            buf.put_slice(&addr.octets());
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        PfcpError::check_len(1, buf.remaining())?;
        let flags = buf.get_u8();
        if flags & 0x04 != 0 {
            return Ok(Self {
                choose: true,
                ..Default::default()
            });
        }
        PfcpError::check_len(4, buf.remaining())?;
        let teid = buf.get_u32();
        let ipv4 = if flags & 0x01 != 0 {
            Some(get_ipv4(&mut buf)?)
        } else {
            None
        };
        let ipv6 = if flags & 0x02 != 0 {
            Some(get_ipv6(&mut buf)?)
        } else {
            None
        };
        Ok(Self {
            teid,
            ipv4,
            ipv6,
            choose: false,
        })
    }
}

/// UE IP Address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UeIpAddress {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    /// S/D flag: the address is a destination address.
    pub destination: bool,
}

impl UeIpAddress {
    pub fn encode(&self, buf: &mut BytesMut) {
        let flags = u8::from(self.ipv6.is_some())
            | (u8::from(self.ipv4.is_some()) << 1)
            | (u8::from(self.destination) << 2);
        buf.put_u8(flags);
        if let Some(addr) = self.ipv4 {
            buf.put_slice(&addr.octets());
        }
        if let Some(addr) = self.ipv6 {
            buf.put_slice(&addr.octets());
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        PfcpError::check_len(1, buf.remaining())?;
        let flags = buf.get_u8();
        let ipv4 = if flags & 0x02 != 0 {
            Some(get_ipv4(&mut buf)?)
        } else {
            None
        };
        let ipv6 = if flags & 0x01 != 0 {
            Some(get_ipv6(&mut buf)?)
        } else {
            None
        };
        Ok(Self {
            ipv4,
            ipv6,
            destination: flags & 0x04 != 0,
        })
    }
}

/// Apply Action flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ApplyAction(pub u8);

impl ApplyAction {
    pub const DROP: u8 = 0x01;
    pub const FORW: u8 = 0x02;
    pub const BUFF: u8 = 0x04;
    pub const NOCP: u8 = 0x08;
    pub const DUPL: u8 = 0x10;

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// Outer Header Creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OuterHeaderCreation {
    /// Description bitmap, first octet in the high byte.
    pub description: u16,
    pub teid: Option<u32>,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub port: Option<u16>,
}

impl OuterHeaderCreation {
    pub const GTPU_UDP_IPV4: u16 = 0x0100;
    pub const GTPU_UDP_IPV6: u16 = 0x0200;
    pub const UDP_IPV4: u16 = 0x0400;
    pub const UDP_IPV6: u16 = 0x0800;

    /// GTP-U/UDP/IPv4 encapsulation toward `addr` with `teid`.
    pub fn gtpu_ipv4(teid: u32, addr: Ipv4Addr) -> Self {
        Self {
            description: Self::GTPU_UDP_IPV4,
            teid: Some(teid),
            ipv4: Some(addr),
            ..Default::default()
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.description);
        if let Some(teid) = self.teid {
            buf.put_u32(teid);
        }
        if let Some(addr) = self.ipv4 {
            buf.put_slice(&addr.octets());
        }
        if let Some(addr) = self.ipv6 {
            buf.put_slice(&addr.octets());
        }
        if let Some(port) = self.port {
            buf.put_u16(port);
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        PfcpError::check_len(2, buf.remaining())?;
        let description = buf.get_u16();
        let gtpu = description & (Self::GTPU_UDP_IPV4 | Self::GTPU_UDP_IPV6) != 0;
        let v4 = description & (Self::GTPU_UDP_IPV4 | Self::UDP_IPV4) != 0;
        let v6 = description & (Self::GTPU_UDP_IPV6 | Self::UDP_IPV6) != 0;
        let udp = description & (Self::UDP_IPV4 | Self::UDP_IPV6) != 0;

        let teid = if gtpu {
            PfcpError::check_len(4, buf.remaining())?;
            Some(buf.get_u32())
        } else {
            None
        };
        let ipv4 = if v4 { Some(get_ipv4(&mut buf)?) } else { None };
        let ipv6 = if v6 { Some(get_ipv6(&mut buf)?) } else { None };
        let port = if udp {
            PfcpError::check_len(2, buf.remaining())?;
            Some(buf.get_u16())
        } else {
            None
        };
        Ok(Self {
            description,
            teid,
            ipv4,
            ipv6,
            port,
        })
    }
}

/// User Plane IP Resource Information.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserPlaneIpResourceInformation {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub network_instance: Option<Bytes>,
    pub source_interface: Option<Interface>,
}

impl UserPlaneIpResourceInformation {
    const V4: u8 = 0x01;
    const V6: u8 = 0x02;
    const TEIDRI_MASK: u8 = 0x1C;
    const ASSONI: u8 = 0x20;
    const ASSOSI: u8 = 0x40;

    /// IPv4 address bound to a source interface (flags 0x41).
    pub fn ipv4_for(addr: Ipv4Addr, source_interface: Interface) -> Self {
        Self {
            ipv4: Some(addr),
            source_interface: Some(source_interface),
            ..Default::default()
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let mut flags = 0;
        if self.ipv4.is_some() {
            flags |= Self::V4;
        }
        if self.ipv6.is_some() {
            flags |= Self::V6;
        }
        if self.network_instance.is_some() {
            flags |= Self::ASSONI;
        }
        if self.source_interface.is_some() {
            flags |= Self::ASSOSI;
        }
        buf.put_u8(flags);
        if let Some(addr) = self.ipv4 {
            buf.put_slice(&addr.octets());
        }
        if let Some(addr) = self.ipv6 {
            buf.put_slice(&addr.octets());
        }
        if let Some(instance) = &self.network_instance {
            buf.put_slice(instance);
        }
        if let Some(iface) = self.source_interface {
            buf.put_u8(iface as u8);
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        PfcpError::check_len(1, buf.remaining())?;
        let flags = buf.get_u8();
        if flags & Self::TEIDRI_MASK != 0 {
            PfcpError::check_len(1, buf.remaining())?;
            buf.advance(1);
        }
        let ipv4 = if flags & Self::V4 != 0 {
            Some(get_ipv4(&mut buf)?)
        } else {
            None
        };
        let ipv6 = if flags & Self::V6 != 0 {
            Some(get_ipv6(&mut buf)?)
        } else {
            None
        };
        let assosi = flags & Self::ASSOSI != 0;
        let network_instance = if flags & Self::ASSONI != 0 {
            let len = buf.remaining().saturating_sub(usize::from(assosi));
            Some(buf.split_to(len))
        } else {
            None
        };
        let source_interface = if assosi {
            PfcpError::check_len(1, buf.remaining())?;
            Some(Interface::try_from(buf.get_u8())?)
        } else {
            None
        };
        Ok(Self {
            ipv4,
            ipv6,
            network_instance,
            source_interface,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encoded<F: FnOnce(&mut BytesMut)>(f: F) -> Bytes {
        let mut buf = BytesMut::new();
        f(&mut buf);
        buf.freeze()
    }

    #[test]
    fn test_recovery_timestamp_is_ntp_era() {
        let now = recovery_timestamp_now();
        let unix = recovery_timestamp_to_unix(now);
        assert!((unix - Utc::now().timestamp()).abs() <= 1);
    }

    #[test]
    fn test_cause_values() {
        assert_eq!(Cause::try_from(1).unwrap(), Cause::RequestAccepted);
        assert_eq!(Cause::try_from(75).unwrap(), Cause::NoResourcesAvailable);
        assert!(Cause::try_from(2).is_err());
        assert!(Cause::RequestAccepted.is_accepted());
        assert!(!Cause::SystemFailure.is_accepted());
    }

    #[test]
    fn test_node_id_fqdn_labels() {
        let node = NodeId::Fqdn("upf.example.org".to_string());
        let bytes = encoded(|b| node.encode(b));
        assert_eq!(&bytes[..5], &[2, 3, b'u', b'p', b'f']);
        assert_eq!(NodeId::decode(bytes).unwrap(), node);
    }

    #[test]
    fn test_fseid_ipv4_flags() {
        let fseid = FSeid::new_ipv4(0x10, Ipv4Addr::new(10, 0, 0, 1));
        let bytes = encoded(|b| fseid.encode(b));
        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes.len(), 13);
        assert_eq!(FSeid::decode(bytes).unwrap(), fseid);
    }

    #[test]
    fn test_fteid_choose_carries_no_teid() {
        let fteid = FTeid {
            choose: true,
            ..Default::default()
        };
        let bytes = encoded(|b| fteid.encode(b));
        assert_eq!(bytes.len(), 1);
        assert!(FTeid::decode(bytes).unwrap().choose);
    }

    #[test]
    fn test_outer_header_creation_gtpu() {
        let ohc = OuterHeaderCreation::gtpu_ipv4(0xABCD, Ipv4Addr::new(192, 168, 1, 10));
        let bytes = encoded(|b| ohc.encode(b));
        assert_eq!(bytes.len(), 10);
        let decoded = OuterHeaderCreation::decode(bytes).unwrap();
        assert_eq!(decoded.teid, Some(0xABCD));
        assert_eq!(decoded.ipv4, Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(decoded.port, None);
    }

    #[test]
    fn test_user_plane_ip_resource_flags() {
        let info =
            UserPlaneIpResourceInformation::ipv4_for(Ipv4Addr::new(198, 18, 0, 1), Interface::Access);
        let bytes = encoded(|b| info.encode(b));
        assert_eq!(bytes[0], 0x41);
        assert_eq!(bytes.len(), 6);
        assert_eq!(UserPlaneIpResourceInformation::decode(bytes).unwrap(), info);
    }

    #[test]
    fn test_truncated_fseid() {
        let bytes = Bytes::from_static(&[0x02, 0, 0, 0, 0, 0, 0, 0, 1, 10, 0]);
        assert!(matches!(
            FSeid::decode(bytes),
            Err(PfcpError::BufferTooShort { needed: 4, .. })
        ));
    }
}
