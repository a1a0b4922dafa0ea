//! Information element framing (TS 29.244 section 8.1).
//!
//! Every IE is a 2-octet type, a 2-octet length and `length` octets of value.
//! Grouped IEs carry further IEs in their value.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PfcpError, PfcpResult};

/// IE types understood by this codec. Anything else is skipped on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum IeType {
    CreatePdr = 1,
    Pdi = 2,
    CreateFar = 3,
    ForwardingParameters = 4,
    UpdateFar = 10,
    UpdateForwardingParameters = 11,
    Cause = 19,
    SourceInterface = 20,
    FTeid = 21,
    NetworkInstance = 22,
    Precedence = 29,
    DestinationInterface = 42,
    ApplyAction = 44,
    PdrId = 56,
    FSeid = 57,
    NodeId = 60,
    OuterHeaderCreation = 84,
    UeIpAddress = 93,
    OuterHeaderRemoval = 95,
    RecoveryTimeStamp = 96,
    FarId = 108,
    UserPlaneIpResourceInformation = 116,
}

impl IeType {
    /// Returns true if `raw` is this IE type.
    pub fn matches(self, raw: u16) -> bool {
        self as u16 == raw
    }
}

/// IE type/length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IeHeader {
    pub ie_type: u16,
    pub length: u16,
}

impl IeHeader {
    pub const LEN: usize = 4;

    pub fn decode(buf: &mut Bytes) -> PfcpResult<Self> {
        PfcpError::check_len(Self::LEN, buf.remaining())?;
        Ok(Self {
            ie_type: buf.get_u16(),
            length: buf.get_u16(),
        })
    }
}

/// An undecoded IE: its type and value octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIe {
    pub ie_type: u16,
    pub data: Bytes,
}

impl RawIe {
    pub fn decode(buf: &mut Bytes) -> PfcpResult<Self> {
        let header = IeHeader::decode(buf)?;
        let len = usize::from(header.length);
        PfcpError::check_len(len, buf.remaining())?;
        Ok(Self {
            ie_type: header.ie_type,
            data: buf.split_to(len),
        })
    }

    pub fn get_u8(&self) -> PfcpResult<u8> {
        PfcpError::check_len(1, self.data.len())?;
        Ok(self.data[0])
    }

    pub fn get_u16(&self) -> PfcpResult<u16> {
        PfcpError::check_len(2, self.data.len())?;
        Ok(u16::from_be_bytes([self.data[0], self.data[1]]))
    }

    pub fn get_u32(&self) -> PfcpResult<u32> {
        PfcpError::check_len(4, self.data.len())?;
        Ok(u32::from_be_bytes([
            self.data[0],
            self.data[1],
            self.data[2],
            self.data[3],
        ]))
    }
}

/// Decodes consecutive IEs from `buf` and hands each one to `f`.
///
/// Trailing octets shorter than an IE header are ignored.
pub fn for_each_ie<F>(buf: &mut Bytes, mut f: F) -> PfcpResult<()>
where
    F: FnMut(RawIe) -> PfcpResult<()>,
{
    while buf.remaining() >= IeHeader::LEN {
        f(RawIe::decode(buf)?)?;
    }
    Ok(())
}

/// Writes an IE whose value is produced by `body`.
pub fn put_ie<F>(buf: &mut BytesMut, ie_type: IeType, body: F)
where
    F: FnOnce(&mut BytesMut),
{
    let mut value = BytesMut::new();
    body(&mut value);
    buf.put_u16(ie_type as u16);
    // Saturates; the enclosing message then exceeds the header limit and
    // build_message refuses it.
    buf.put_u16(u16::try_from(value.len()).unwrap_or(u16::MAX));
    buf.put_slice(&value);
}

pub fn put_u8_ie(buf: &mut BytesMut, ie_type: IeType, value: u8) {
    put_ie(buf, ie_type, |b| b.put_u8(value));
}

pub fn put_u16_ie(buf: &mut BytesMut, ie_type: IeType, value: u16) {
    put_ie(buf, ie_type, |b| b.put_u16(value));
}

pub fn put_u32_ie(buf: &mut BytesMut, ie_type: IeType, value: u32) {
    put_ie(buf, ie_type, |b| b.put_u32(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_skips_unknown_ies() {
        let mut buf = BytesMut::new();
        put_u32_ie(&mut buf, IeType::FarId, 7);
        buf.put_u16(0x7FFF);
        buf.put_u16(2);
        buf.put_u16(0xBEEF);
        put_u8_ie(&mut buf, IeType::Cause, 1);

        let mut seen = Vec::new();
        let mut bytes = buf.freeze();
        for_each_ie(&mut bytes, |ie| {
            seen.push(ie.ie_type);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![108, 0x7FFF, 19]);
    }

    #[test]
    fn test_truncated_value_is_an_error() {
        let mut bytes = Bytes::from_static(&[0x00, 0x6C, 0x00, 0x04, 0x00, 0x01]);
        assert!(matches!(
            RawIe::decode(&mut bytes),
            Err(PfcpError::BufferTooShort { needed: 4, available: 2 })
        ));
    }

    #[test]
    fn test_scalar_accessors_check_length() {
        let ie = RawIe {
            ie_type: IeType::Precedence as u16,
            data: Bytes::from_static(&[0, 0, 1]),
        };
        assert!(ie.get_u32().is_err());
        assert_eq!(ie.get_u16().unwrap(), 0);
    }
}
