//! Grouped rule IEs carried by session messages.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PfcpError, PfcpResult};
use crate::ie::{for_each_ie, put_ie, put_u16_ie, put_u32_ie, put_u8_ie, IeType};
use crate::types::{ApplyAction, FTeid, Interface, OuterHeaderCreation, UeIpAddress};

/// Packet Detection Information.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pdi {
    pub source_interface: Interface,
    pub f_teid: Option<FTeid>,
    pub network_instance: Option<Bytes>,
    pub ue_ip_address: Option<UeIpAddress>,
}

impl Pdi {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_u8_ie(buf, IeType::SourceInterface, self.source_interface as u8);
        if let Some(f_teid) = &self.f_teid {
            put_ie(buf, IeType::FTeid, |b| f_teid.encode(b));
        }
        if let Some(instance) = &self.network_instance {
            put_ie(buf, IeType::NetworkInstance, |b| b.put_slice(instance));
        }
        if let Some(ue) = &self.ue_ip_address {
            put_ie(buf, IeType::UeIpAddress, |b| ue.encode(b));
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        let mut source_interface = None;
        let mut pdi = Pdi::default();
        for_each_ie(&mut buf, |ie| {
            match ie.ie_type {
                t if IeType::SourceInterface.matches(t) => {
                    source_interface = Some(Interface::try_from(ie.get_u8()?)?)
                }
                t if IeType::FTeid.matches(t) => pdi.f_teid = Some(FTeid::decode(ie.data)?),
                t if IeType::NetworkInstance.matches(t) => pdi.network_instance = Some(ie.data),
                t if IeType::UeIpAddress.matches(t) => {
                    pdi.ue_ip_address = Some(UeIpAddress::decode(ie.data)?)
                }
                _ => {}
            }
            Ok(())
        })?;
        pdi.source_interface =
            source_interface.ok_or(PfcpError::MissingMandatoryIe("Source Interface"))?;
        Ok(pdi)
    }
}

/// Create PDR.
///
/// The PDI is kept optional on decode so that the session handler can answer
/// a request lacking it with a cause instead of dropping the datagram.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreatePdr {
    pub pdr_id: u16,
    pub precedence: u32,
    pub pdi: Option<Pdi>,
    pub outer_header_removal: Option<u8>,
    pub far_id: Option<u32>,
}

impl CreatePdr {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_u16_ie(buf, IeType::PdrId, self.pdr_id);
        put_u32_ie(buf, IeType::Precedence, self.precedence);
        if let Some(pdi) = &self.pdi {
            put_ie(buf, IeType::Pdi, |b| pdi.encode(b));
        }
        if let Some(removal) = self.outer_header_removal {
            put_u8_ie(buf, IeType::OuterHeaderRemoval, removal);
        }
        if let Some(far_id) = self.far_id {
            put_u32_ie(buf, IeType::FarId, far_id);
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        let mut pdr_id = None;
        let mut pdr = CreatePdr::default();
        for_each_ie(&mut buf, |ie| {
            match ie.ie_type {
                t if IeType::PdrId.matches(t) => pdr_id = Some(ie.get_u16()?),
                t if IeType::Precedence.matches(t) => pdr.precedence = ie.get_u32()?,
                t if IeType::Pdi.matches(t) => pdr.pdi = Some(Pdi::decode(ie.data)?),
                t if IeType::OuterHeaderRemoval.matches(t) => {
                    pdr.outer_header_removal = Some(ie.get_u8()?)
                }
                t if IeType::FarId.matches(t) => pdr.far_id = Some(ie.get_u32()?),
                _ => {}
            }
            Ok(())
        })?;
        pdr.pdr_id = pdr_id.ok_or(PfcpError::MissingMandatoryIe("PDR ID"))?;
        Ok(pdr)
    }
}

/// Forwarding Parameters, also used for Update Forwarding Parameters where
/// every field may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForwardingParameters {
    pub destination_interface: Option<Interface>,
    pub network_instance: Option<Bytes>,
    pub outer_header_creation: Option<OuterHeaderCreation>,
}

impl ForwardingParameters {
    pub fn encode(&self, buf: &mut BytesMut) {
        if let Some(iface) = self.destination_interface {
            put_u8_ie(buf, IeType::DestinationInterface, iface as u8);
        }
        if let Some(instance) = &self.network_instance {
            put_ie(buf, IeType::NetworkInstance, |b| b.put_slice(instance));
        }
        if let Some(ohc) = &self.outer_header_creation {
            put_ie(buf, IeType::OuterHeaderCreation, |b| ohc.encode(b));
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        let mut params = ForwardingParameters::default();
        for_each_ie(&mut buf, |ie| {
            match ie.ie_type {
                t if IeType::DestinationInterface.matches(t) => {
                    params.destination_interface = Some(Interface::try_from(ie.get_u8()?)?)
                }
                t if IeType::NetworkInstance.matches(t) => {
                    params.network_instance = Some(ie.data)
                }
                t if IeType::OuterHeaderCreation.matches(t) => {
                    params.outer_header_creation = Some(OuterHeaderCreation::decode(ie.data)?)
                }
                _ => {}
            }
            Ok(())
        })?;
        Ok(params)
    }
}

/// Create FAR.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateFar {
    pub far_id: u32,
    pub apply_action: ApplyAction,
    pub forwarding_parameters: Option<ForwardingParameters>,
}

impl CreateFar {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_u32_ie(buf, IeType::FarId, self.far_id);
        put_u8_ie(buf, IeType::ApplyAction, self.apply_action.0);
        if let Some(params) = &self.forwarding_parameters {
            put_ie(buf, IeType::ForwardingParameters, |b| params.encode(b));
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        let mut far_id = None;
        let mut apply_action = None;
        let mut forwarding_parameters = None;
        for_each_ie(&mut buf, |ie| {
            match ie.ie_type {
                t if IeType::FarId.matches(t) => far_id = Some(ie.get_u32()?),
                t if IeType::ApplyAction.matches(t) => {
                    apply_action = Some(ApplyAction(ie.get_u8()?))
                }
                t if IeType::ForwardingParameters.matches(t) => {
                    forwarding_parameters = Some(ForwardingParameters::decode(ie.data)?)
                }
                _ => {}
            }
            Ok(())
        })?;
        Ok(Self {
            far_id: far_id.ok_or(PfcpError::MissingMandatoryIe("FAR ID"))?,
            apply_action: apply_action.ok_or(PfcpError::MissingMandatoryIe("Apply Action"))?,
            forwarding_parameters,
        })
    }
}

/// Update FAR.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateFar {
    pub far_id: u32,
    pub apply_action: Option<ApplyAction>,
    pub update_forwarding_parameters: Option<ForwardingParameters>,
}

impl UpdateFar {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_u32_ie(buf, IeType::FarId, self.far_id);
        if let Some(action) = self.apply_action {
            put_u8_ie(buf, IeType::ApplyAction, action.0);
        }
        if let Some(params) = &self.update_forwarding_parameters {
            put_ie(buf, IeType::UpdateForwardingParameters, |b| params.encode(b));
        }
    }

    pub fn decode(mut buf: Bytes) -> PfcpResult<Self> {
        let mut far_id = None;
        let mut update = UpdateFar::default();
        for_each_ie(&mut buf, |ie| {
            match ie.ie_type {
                t if IeType::FarId.matches(t) => far_id = Some(ie.get_u32()?),
                t if IeType::ApplyAction.matches(t) => {
                    update.apply_action = Some(ApplyAction(ie.get_u8()?))
                }
                t if IeType::UpdateForwardingParameters.matches(t) => {
                    update.update_forwarding_parameters =
                        Some(ForwardingParameters::decode(ie.data)?)
                }
                _ => {}
            }
            Ok(())
        })?;
        update.far_id = far_id.ok_or(PfcpError::MissingMandatoryIe("FAR ID"))?;
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn uplink_pdr() -> CreatePdr {
        CreatePdr {
            pdr_id: 1,
            precedence: 255,
            pdi: Some(Pdi {
                source_interface: Interface::Access,
                f_teid: Some(FTeid::new_ipv4(0x100, Ipv4Addr::new(198, 18, 0, 1))),
                network_instance: None,
                ue_ip_address: Some(UeIpAddress {
                    ipv4: Some(Ipv4Addr::new(10, 250, 0, 1)),
                    ..Default::default()
                }),
            }),
            outer_header_removal: Some(0),
            far_id: Some(1),
        }
    }

    #[test]
    fn test_create_pdr_nested_ies() {
        let mut buf = BytesMut::new();
        uplink_pdr().encode(&mut buf);
        let decoded = CreatePdr::decode(buf.freeze()).unwrap();
        assert_eq!(decoded, uplink_pdr());
    }

    #[test]
    fn test_create_pdr_without_pdi_still_decodes() {
        let mut buf = BytesMut::new();
        put_u16_ie(&mut buf, IeType::PdrId, 4);
        let decoded = CreatePdr::decode(buf.freeze()).unwrap();
        assert_eq!(decoded.pdr_id, 4);
        assert!(decoded.pdi.is_none());
    }

    #[test]
    fn test_create_pdr_requires_pdr_id() {
        let mut buf = BytesMut::new();
        put_u32_ie(&mut buf, IeType::Precedence, 1);
        assert_eq!(
            CreatePdr::decode(buf.freeze()),
            Err(PfcpError::MissingMandatoryIe("PDR ID"))
        );
    }

    #[test]
    fn test_create_far_requires_apply_action() {
        let mut buf = BytesMut::new();
        put_u32_ie(&mut buf, IeType::FarId, 1);
        assert_eq!(
            CreateFar::decode(buf.freeze()),
            Err(PfcpError::MissingMandatoryIe("Apply Action"))
        );
    }

    #[test]
    fn test_update_far_partial() {
        let update = UpdateFar {
            far_id: 2,
            apply_action: Some(ApplyAction(ApplyAction::FORW)),
            update_forwarding_parameters: Some(ForwardingParameters {
                outer_header_creation: Some(OuterHeaderCreation::gtpu_ipv4(
                    0x77,
                    Ipv4Addr::new(192, 168, 0, 9),
                )),
                ..Default::default()
            }),
        };
        let mut buf = BytesMut::new();
        update.encode(&mut buf);
        let decoded = UpdateFar::decode(buf.freeze()).unwrap();
        assert_eq!(decoded, update);
        assert_eq!(
            decoded
                .update_forwarding_parameters
                .and_then(|p| p.destination_interface),
            None
        );
    }
}
