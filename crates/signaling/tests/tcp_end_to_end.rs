//! End-to-End-Test ueber einen echten TCP-Listener
//!
//! Zwei Clients verbinden sich per `ClientCodec`, fuehren den Handshake
//! durch, rufen sich an und tauschen einen ICE-Kandidaten aus.

use callrelay_core::{ConnectionId, RoomKey};
use callrelay_observability::RelayMetrics;
use callrelay_protocol::events::{
    AnswerRequest, CallRequest, ClientEvent, HandshakeAuth, IceRelayRequest, PeerRef,
    PingMessage, ServerEvent,
};
use callrelay_protocol::wire::ClientCodec;
use callrelay_signaling::{SignalingConfig, SignalingServer, SignalingState};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::Framed;

type Client = Framed<TcpStream, ClientCodec>;

async fn server_starten(config: SignalingConfig) -> (SocketAddr, Arc<SignalingState>, watch::Sender<bool>) {
    let state = SignalingState::neu(config, RelayMetrics::neu().unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = SignalingServer::neu(Arc::clone(&state), addr);
    tokio::spawn(async move {
        server.mit_listener_starten(listener, shutdown_rx).await.unwrap();
    });
    (addr, state, shutdown_tx)
}

async fn client_verbinden(addr: SocketAddr, lobby: &str, acc: &str) -> Client {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut client = Framed::new(stream, ClientCodec::new());
    client
        .send(ClientEvent::Connect(HandshakeAuth {
            auth_code: Some(lobby.into()),
            acc: Some(acc.into()),
        }))
        .await
        .unwrap();
    client
}

/// Liest Events bis eines `passt`; Keepalive-Pings werden uebersprungen
async fn warten_auf<F>(client: &mut Client, passt: F) -> ServerEvent
where
    F: Fn(&ServerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = client.next().await.expect("Verbindung geschlossen").unwrap();
            if passt(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timeout beim Warten auf Event")
}

async fn eigene_id(client: &mut Client, acc: &str) -> ConnectionId {
    let acc = acc.to_string();
    let event = warten_auf(client, |e| {
        matches!(e, ServerEvent::UserList(m) if m.user_list.iter().any(|p| p.identity == acc))
    })
    .await;
    match event {
        ServerEvent::UserList(m) => {
            m.user_list
                .iter()
                .find(|p| p.identity == acc)
                .unwrap()
                .socket_id
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn anruf_und_ice_ueber_tcp() {
    let (addr, state, shutdown_tx) = server_starten(SignalingConfig::default()).await;

    let mut a = client_verbinden(addr, "L1", "a").await;
    let id_a = eigene_id(&mut a, "a").await;
    let mut b = client_verbinden(addr, "L1", "b").await;
    let id_b = eigene_id(&mut b, "b").await;

    // A sieht B in der Lobby
    warten_auf(&mut a, |e| matches!(e, ServerEvent::UserList(m) if m.user_list.len() == 2)).await;

    a.send(ClientEvent::PhoneCall(CallRequest {
        sender: None,
        target: PeerRef::neu(id_b, "b"),
        room_id: RoomKey::from("R1"),
    }))
    .await
    .unwrap();

    let anruf = warten_auf(&mut b, |e| matches!(e, ServerEvent::PhoneCall(_))).await;
    match anruf {
        ServerEvent::PhoneCall(m) => {
            assert_eq!(m.caller.socket_id, id_a);
            assert_eq!(m.room_id, RoomKey::from("R1"));
        }
        _ => unreachable!(),
    }

    b.send(ClientEvent::PhoneAnswer(AnswerRequest {
        sender: None,
        target: PeerRef::neu(id_a, "a"),
        room_id: Some(RoomKey::from("R1")),
    }))
    .await
    .unwrap();
    warten_auf(&mut a, |e| matches!(e, ServerEvent::RoomJoined(m) if m.socket_id == id_b)).await;

    let kandidat = json!({"candidate": "candidate:1 1 udp 1 10.0.0.1 9 typ host"});
    a.send(ClientEvent::IceCandidate(IceRelayRequest {
        sender: None,
        target: PeerRef::neu(id_b, "b"),
        room_id: Some(RoomKey::from("R1")),
        ice: kandidat.clone(),
    }))
    .await
    .unwrap();
    let ice = warten_auf(&mut b, |e| matches!(e, ServerEvent::IceCandidate(_))).await;
    match ice {
        ServerEvent::IceCandidate(m) => {
            assert_eq!(m.ice, kandidat);
            assert_eq!(m.user.socket_id, id_a);
        }
        _ => unreachable!(),
    }

    // B trennt; A bekommt die Lobby-Liste ohne B
    drop(b);
    warten_auf(&mut a, |e| matches!(e, ServerEvent::UserList(m) if m.user_list.len() == 1)).await;
    assert!(!state.registry.ist_verbunden(&id_b));

    shutdown_tx.send(true).unwrap();
}

#[tokio::test]
async fn ping_wird_mit_pong_beantwortet() {
    let (addr, _state, shutdown_tx) = server_starten(SignalingConfig::default()).await;
    let mut a = client_verbinden(addr, "L1", "a").await;

    a.send(ClientEvent::Ping(PingMessage { timestamp_ms: 1234 }))
        .await
        .unwrap();
    let pong = warten_auf(&mut a, |e| matches!(e, ServerEvent::Pong(_))).await;
    match pong {
        ServerEvent::Pong(p) => assert_eq!(p.echo_timestamp_ms, 1234),
        _ => unreachable!(),
    }

    shutdown_tx.send(true).unwrap();
}

#[tokio::test]
async fn shutdown_raeumt_verbindungen_auf() {
    let (addr, state, shutdown_tx) = server_starten(SignalingConfig::default()).await;
    let mut a = client_verbinden(addr, "L1", "a").await;
    eigene_id(&mut a, "a").await;
    assert_eq!(state.registry.anzahl(), 1);

    shutdown_tx.send(true).unwrap();

    let geschlossen = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(_)) = a.next().await {}
    })
    .await;
    assert!(geschlossen.is_ok());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.registry.anzahl(), 0);
    assert_eq!(state.delivery.client_anzahl(), 0);
}

#[tokio::test]
async fn ungueltiger_frame_trennt_nur_diese_verbindung() {
    use tokio::io::AsyncWriteExt;

    let (addr, state, shutdown_tx) = server_starten(SignalingConfig::default()).await;
    let mut a = client_verbinden(addr, "L1", "a").await;
    eigene_id(&mut a, "a").await;

    let mut roh = TcpStream::connect(addr).await.unwrap();
    let muell = b"kein json";
    roh.write_all(&(muell.len() as u32).to_be_bytes()).await.unwrap();
    roh.write_all(muell).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.registry.anzahl(), 1);

    a.send(ClientEvent::Ping(PingMessage { timestamp_ms: 1 }))
        .await
        .unwrap();
    warten_auf(&mut a, |e| matches!(e, ServerEvent::Pong(_))).await;

    shutdown_tx.send(true).unwrap();
}
