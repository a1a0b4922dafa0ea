//! Translation of PFCP rule IEs into forwarding-plane records.

use std::net::Ipv4Addr;

use upf_fwdplane::{CounterId, Far, FarAction, Pdr, SourceIface, Tunnel};
use upf_pfcp::rules::{CreateFar, CreatePdr, ForwardingParameters, UpdateFar};
use upf_pfcp::types::{ApplyAction, Interface, OuterHeaderCreation};

use crate::error::{PfcpifaceError, Result};

/// Session attributes stamped onto every rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleContext {
    pub local_seid: u64,
    pub tunnel_endpoint: Ipv4Addr,
}

fn source_iface(iface: Interface) -> SourceIface {
    match iface {
        Interface::Access => SourceIface::Access,
        Interface::Core => SourceIface::Core,
        other => SourceIface::Other(other as u8),
    }
}

fn far_action(action: ApplyAction) -> FarAction {
    if action.contains(ApplyAction::DROP) {
        FarAction::Drop
    } else if action.contains(ApplyAction::FORW) {
        FarAction::Forward
    } else if action.contains(ApplyAction::BUFF) {
        FarAction::Buffer
    } else if action.contains(ApplyAction::NOCP) {
        FarAction::Notify
    } else {
        FarAction::Drop
    }
}

/// Only GTP-U over IPv4 is programmable.
fn encapsulation(ohc: &OuterHeaderCreation) -> Option<Tunnel> {
    if ohc.description & OuterHeaderCreation::GTPU_UDP_IPV4 == 0 {
        return None;
    }
    Some(Tunnel {
        teid: ohc.teid?,
        address: ohc.ipv4?,
    })
}

/// Builds a PDR without a counter; counters are bound by the insert batch.
pub fn pdr_from_create(create: &CreatePdr, ctx: RuleContext) -> Result<Pdr> {
    let pdi = create.pdi.as_ref().ok_or_else(|| PfcpifaceError::missing_ie("PDI"))?;

    // CH set: the TEID is ours to pick, so the tunnel lands on our endpoint.
    let tunnel = pdi.f_teid.and_then(|fteid| match (fteid.ipv4, fteid.choose) {
        (Some(address), _) => Some(Tunnel {
            teid: fteid.teid,
            address,
        }),
        (None, true) => Some(Tunnel {
            teid: fteid.teid,
            address: ctx.tunnel_endpoint,
        }),
        (None, false) => None,
    });

    Ok(Pdr {
        pdr_id: create.pdr_id,
        session_seid: ctx.local_seid,
        tunnel_endpoint: ctx.tunnel_endpoint,
        counter_id: CounterId::NONE,
        precedence: create.precedence,
        source_iface: source_iface(pdi.source_interface),
        far_id: create.far_id,
        tunnel,
        ue_address: pdi.ue_ip_address.and_then(|ue| ue.ipv4),
        decapsulate: create.outer_header_removal.is_some(),
    })
}

pub fn far_from_create(create: &CreateFar, ctx: RuleContext) -> Far {
    let params = create.forwarding_parameters.as_ref();
    Far {
        far_id: create.far_id,
        session_seid: ctx.local_seid,
        tunnel_endpoint: ctx.tunnel_endpoint,
        action: far_action(create.apply_action),
        destination: params
            .and_then(|p| p.destination_interface)
            .map(source_iface),
        encapsulation: params
            .and_then(|p| p.outer_header_creation.as_ref())
            .and_then(encapsulation),
    }
}

/// Translates the rule IEs of an establishment request.
pub fn translate_session(
    create_pdrs: &[CreatePdr],
    create_fars: &[CreateFar],
    ctx: RuleContext,
) -> Result<(Vec<Pdr>, Vec<Far>)> {
    let pdrs = create_pdrs
        .iter()
        .map(|create| pdr_from_create(create, ctx))
        .collect::<Result<Vec<_>>>()?;
    let fars = create_fars
        .iter()
        .map(|create| far_from_create(create, ctx))
        .collect();
    Ok((pdrs, fars))
}

/// Merges an Update FAR over the stored FAR. Absent fields keep their value.
pub fn merge_update(stored: &Far, update: &UpdateFar) -> Far {
    let mut far = stored.clone();
    if let Some(action) = update.apply_action {
        far.action = far_action(action);
    }
    if let Some(ForwardingParameters {
        destination_interface,
        outer_header_creation,
        ..
    }) = &update.update_forwarding_parameters
    {
        if let Some(iface) = destination_interface {
            far.destination = Some(source_iface(*iface));
        }
        if let Some(ohc) = outer_header_creation {
            far.encapsulation = encapsulation(ohc);
        }
    }
    far
}

/// Points every rule at a new access-side endpoint.
pub fn restamp(pdrs: &mut [Pdr], fars: &mut [Far], tunnel_endpoint: Ipv4Addr) {
    for pdr in pdrs.iter_mut() {
        pdr.tunnel_endpoint = tunnel_endpoint;
    }
    for far in fars.iter_mut() {
        far.tunnel_endpoint = tunnel_endpoint;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use upf_pfcp::rules::Pdi;
    use upf_pfcp::types::{FTeid, UeIpAddress};

    const CTX: RuleContext = RuleContext {
        local_seid: 0x40,
        tunnel_endpoint: Ipv4Addr::new(198, 18, 0, 1),
    };

    fn uplink_pdr() -> CreatePdr {
        CreatePdr {
            pdr_id: 1,
            precedence: 255,
            pdi: Some(Pdi {
                source_interface: Interface::Access,
                f_teid: Some(FTeid::new_ipv4(0x1234, Ipv4Addr::new(198, 18, 0, 1))),
                network_instance: None,
                ue_ip_address: Some(UeIpAddress {
                    ipv4: Some(Ipv4Addr::new(16, 0, 0, 1)),
                    ipv6: None,
                    destination: false,
                }),
            }),
            outer_header_removal: Some(0),
            far_id: Some(1),
        }
    }

    fn downlink_far() -> CreateFar {
        CreateFar {
            far_id: 2,
            apply_action: ApplyAction(ApplyAction::FORW),
            forwarding_parameters: Some(ForwardingParameters {
                destination_interface: Some(Interface::Access),
                network_instance: None,
                outer_header_creation: Some(OuterHeaderCreation::gtpu_ipv4(
                    0xBEEF,
                    Ipv4Addr::new(10, 0, 0, 9),
                )),
            }),
        }
    }

    #[test]
    fn test_uplink_pdr() {
        let pdr = pdr_from_create(&uplink_pdr(), CTX).unwrap();
        assert_eq!(
            pdr,
            Pdr {
                pdr_id: 1,
                session_seid: 0x40,
                tunnel_endpoint: Ipv4Addr::new(198, 18, 0, 1),
                counter_id: CounterId::NONE,
                precedence: 255,
                source_iface: SourceIface::Access,
                far_id: Some(1),
                tunnel: Some(Tunnel {
                    teid: 0x1234,
                    address: Ipv4Addr::new(198, 18, 0, 1),
                }),
                ue_address: Some(Ipv4Addr::new(16, 0, 0, 1)),
                decapsulate: true,
            }
        );
    }

    #[test]
    fn test_choose_flag_uses_local_endpoint() {
        let mut create = uplink_pdr();
        if let Some(pdi) = create.pdi.as_mut() {
            pdi.f_teid = Some(FTeid {
                teid: 7,
                ipv4: None,
                ipv6: None,
                choose: true,
            });
        }
        let pdr = pdr_from_create(&create, CTX).unwrap();
        assert_eq!(
            pdr.tunnel,
            Some(Tunnel {
                teid: 7,
                address: CTX.tunnel_endpoint,
            })
        );
    }

    #[test]
    fn test_pdr_without_pdi_is_rejected() {
        let mut create = uplink_pdr();
        create.pdi = None;
        assert!(matches!(
            pdr_from_create(&create, CTX),
            Err(PfcpifaceError::MissingIe { ie: "PDI" })
        ));
    }

    #[test]
    fn test_far_translation() {
        let far = far_from_create(&downlink_far(), CTX);
        assert_eq!(far.action, FarAction::Forward);
        assert_eq!(far.destination, Some(SourceIface::Access));
        assert_eq!(
            far.encapsulation,
            Some(Tunnel {
                teid: 0xBEEF,
                address: Ipv4Addr::new(10, 0, 0, 9),
            })
        );
        assert_eq!(far.session_seid, 0x40);
    }

    #[test]
    fn test_apply_action_precedence() {
        assert_eq!(far_action(ApplyAction(ApplyAction::DROP | ApplyAction::FORW)), FarAction::Drop);
        assert_eq!(far_action(ApplyAction(ApplyAction::BUFF | ApplyAction::NOCP)), FarAction::Buffer);
        assert_eq!(far_action(ApplyAction(ApplyAction::NOCP)), FarAction::Notify);
        assert_eq!(far_action(ApplyAction(0)), FarAction::Drop);
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let stored = far_from_create(&downlink_far(), CTX);

        let buffered = merge_update(
            &stored,
            &UpdateFar {
                far_id: 2,
                apply_action: Some(ApplyAction(ApplyAction::BUFF)),
                update_forwarding_parameters: None,
            },
        );
        assert_eq!(buffered.action, FarAction::Buffer);
        assert_eq!(buffered.encapsulation, stored.encapsulation);

        let moved = merge_update(
            &stored,
            &UpdateFar {
                far_id: 2,
                apply_action: None,
                update_forwarding_parameters: Some(ForwardingParameters {
                    destination_interface: None,
                    network_instance: None,
                    outer_header_creation: Some(OuterHeaderCreation::gtpu_ipv4(
                        0xCAFE,
                        Ipv4Addr::new(10, 0, 0, 10),
                    )),
                }),
            },
        );
        assert_eq!(moved.action, FarAction::Forward);
        assert_eq!(moved.destination, Some(SourceIface::Access));
        assert_eq!(
            moved.encapsulation,
            Some(Tunnel {
                teid: 0xCAFE,
                address: Ipv4Addr::new(10, 0, 0, 10),
            })
        );
    }

    #[test]
    fn test_restamp() {
        let (mut pdrs, mut fars) =
            translate_session(&[uplink_pdr()], &[downlink_far()], CTX).unwrap();
        let endpoint = Ipv4Addr::new(10, 128, 13, 29);
        restamp(&mut pdrs, &mut fars, endpoint);
        assert!(pdrs.iter().all(|p| p.tunnel_endpoint == endpoint));
        assert!(fars.iter().all(|f| f.tunnel_endpoint == endpoint));
    }
}
