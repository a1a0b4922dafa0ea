//! N4 socket loop over loopback UDP.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use upf_fwdplane::{ForwardingPlaneChannel, SimulatedSwitch, SwitchTarget};
use upf_pfcp::message::{
    AssociationSetupRequest, AssociationSetupResponse, HeartbeatRequest,
    SessionEstablishmentRequest,
};
use upf_pfcp::types::{FSeid, NodeId};
use upf_pfcp::{build_message, parse_message, Cause, PfcpHeader, PfcpMessage};
use upf_pfcpiface::{AssociationState, PfcpEngine, PfcpServer, Result, RetryPolicy};

const ACCESS: Ipv4Addr = Ipv4Addr::new(198, 18, 0, 1);
const LOOPBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

fn engine(switch: &SimulatedSwitch) -> PfcpEngine {
    let channel = Arc::new(ForwardingPlaneChannel::new(
        Arc::new(switch.clone()),
        SwitchTarget {
            address: "onos:51001".to_string(),
            device_id: 1,
            timeout: Duration::from_secs(30),
        },
        ACCESS,
    ));
    PfcpEngine::new(channel, 100, None)
}

async fn bind_server(switch: &SimulatedSwitch) -> PfcpServer {
    PfcpServer::bind(SocketAddr::new(LOOPBACK.into(), 0), engine(switch))
        .await
        .unwrap()
}

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<PfcpEngine>>,
}

impl Running {
    fn start(server: PfcpServer) -> Self {
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run(async move {
            let _ = stopped.await;
        }));
        Self { addr, stop, task }
    }

    async fn finish(self) -> PfcpEngine {
        self.stop.send(()).unwrap();
        self.task.await.unwrap().unwrap()
    }
}

async fn recv(socket: &UdpSocket) -> Option<(PfcpHeader, PfcpMessage, SocketAddr)> {
    let mut buf = [0u8; 2048];
    let (len, from) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .ok()?
        .ok()?;
    let (header, message) = parse_message(&buf[..len]).unwrap();
    Some((header, message, from))
}

fn heartbeat() -> PfcpMessage {
    PfcpMessage::HeartbeatRequest(HeartbeatRequest {
        recovery_time_stamp: Some(3_900_000_000),
    })
}

#[tokio::test]
async fn test_heartbeat_round_trip_learns_n4_address() {
    let switch = SimulatedSwitch::new();
    let running = Running::start(bind_server(&switch).await);
    let client = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();

    client
        .send_to(&build_message(&heartbeat(), 42, None).unwrap(), running.addr)
        .await
        .unwrap();
    let (header, reply, from) = recv(&client).await.expect("heartbeat reply");
    assert_eq!(from, running.addr);
    assert_eq!(header.sequence_number, 42);
    assert!(matches!(reply, PfcpMessage::HeartbeatResponse(_)));

    let engine = running.finish().await;
    assert_eq!(engine.n4_addr(), Some(LOOPBACK));
}

#[tokio::test]
async fn test_garbage_does_not_stop_the_loop() {
    let switch = SimulatedSwitch::new();
    let running = Running::start(bind_server(&switch).await);
    let client = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();

    client.send_to(&[0xFF; 3], running.addr).await.unwrap();
    client
        .send_to(&build_message(&heartbeat(), 7, None).unwrap(), running.addr)
        .await
        .unwrap();
    let (header, _, _) = recv(&client).await.expect("heartbeat reply");
    assert_eq!(header.sequence_number, 7);

    running.finish().await;
}

#[tokio::test]
async fn test_initiator_associates_with_peer() {
    let switch = SimulatedSwitch::new();
    let smf = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
    let server = bind_server(&switch)
        .await
        .with_peer(smf.local_addr().unwrap());
    let running = Running::start(server);

    let (header, request, from) = recv(&smf).await.expect("setup request");
    let PfcpMessage::AssociationSetupRequest(request) = request else {
        panic!("unexpected request {:?}", request);
    };
    assert_eq!(request.node_id, Some(NodeId::Ipv4(LOOPBACK)));
    assert!(request.recovery_time_stamp.is_some());
    assert_eq!(request.up_ip_resource.and_then(|r| r.ipv4), Some(ACCESS));

    let response = PfcpMessage::AssociationSetupResponse(AssociationSetupResponse {
        node_id: Some(NodeId::Ipv4(LOOPBACK)),
        cause: Some(Cause::RequestAccepted),
        recovery_time_stamp: Some(3_900_000_000),
        up_ip_resource: None,
    });
    let datagram = build_message(&response, header.sequence_number, None).unwrap();
    smf.send_to(&datagram, from).await.unwrap();

    // Datagrams are handled in order: once this is answered, so was the setup.
    smf.send_to(&build_message(&heartbeat(), 99, None).unwrap(), from)
        .await
        .unwrap();
    loop {
        let (header, message, _) = recv(&smf).await.expect("heartbeat reply");
        if header.sequence_number == 99 && matches!(message, PfcpMessage::HeartbeatResponse(_)) {
            break;
        }
    }

    let engine = running.finish().await;
    assert_eq!(engine.association(), AssociationState::Established);
}

#[tokio::test]
async fn test_initiator_gives_up_after_ceiling() {
    let switch = SimulatedSwitch::new();
    let smf = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
    let server = bind_server(&switch)
        .await
        .with_peer(smf.local_addr().unwrap())
        .with_retry_policy(RetryPolicy {
            max_attempts: 3,
            wait_window: Duration::from_millis(50),
        });
    let running = Running::start(server);

    let mut requests = 0;
    let mut buf = [0u8; 2048];
    while let Ok(Ok((len, _))) =
        timeout(Duration::from_millis(500), smf.recv_from(&mut buf)).await
    {
        let (_, message) = parse_message(&buf[..len]).unwrap();
        assert!(matches!(message, PfcpMessage::AssociationSetupRequest(_)));
        requests += 1;
    }
    assert_eq!(requests, 3);

    let engine = running.finish().await;
    assert_eq!(engine.association(), AssociationState::Idle);
}

#[tokio::test]
async fn test_read_timeout_releases_quiet_peer() {
    let switch = SimulatedSwitch::new();
    let server = bind_server(&switch)
        .await
        .with_read_timeout(Duration::from_millis(200));
    let running = Running::start(server);
    let smf = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();

    let setup = PfcpMessage::AssociationSetupRequest(AssociationSetupRequest {
        node_id: Some(NodeId::Ipv4(LOOPBACK)),
        recovery_time_stamp: Some(3_900_000_000),
        up_ip_resource: None,
    });
    smf.send_to(&build_message(&setup, 1, None).unwrap(), running.addr)
        .await
        .unwrap();
    recv(&smf).await.expect("setup reply");

    let establishment = PfcpMessage::SessionEstablishmentRequest(SessionEstablishmentRequest {
        node_id: Some(NodeId::Ipv4(LOOPBACK)),
        cp_f_seid: Some(FSeid::new_ipv4(0x10, LOOPBACK)),
        create_pdrs: vec![],
        create_fars: vec![],
    });
    smf.send_to(&build_message(&establishment, 2, Some(0)).unwrap(), running.addr)
        .await
        .unwrap();
    let (_, reply, _) = recv(&smf).await.expect("establishment reply");
    let PfcpMessage::SessionEstablishmentResponse(rsp) = reply else {
        panic!("unexpected reply {:?}", reply);
    };
    assert_eq!(rsp.cause, Some(Cause::RequestAccepted));

    tokio::time::sleep(Duration::from_millis(600)).await;
    let engine = running.finish().await;
    assert!(engine.registry().is_empty());
    assert_eq!(engine.association(), AssociationState::Idle);
}
