//! Message-Dispatcher – Routet Client-Events an die zustaendige Komponente
//!
//! Der Dispatcher empfaengt `ClientEvent`s einer Verbindung und ruft die
//! Anruf-Zustandsmaschine oder den Signaling-Router auf. Direkte Antworten
//! gibt es nur fuer `ping`; alles andere wird ueber die Send-Queues
//! zugestellt.
//!
//! ## Zustandspruefung
//! - `connect` ist nur als erstes Event erlaubt
//! - Anruf- und Weiterleitungs-Events nur nach erfolgreichem Handshake
//! - `ping`/`pong` immer
//!
//! Das optionale `self`-Feld eingehender Events wird nie als Absender
//! verwendet; der Absender ist immer die Verbindung selbst.

use callrelay_core::{ConnectionId, RoomKey};
use callrelay_protocol::events::{ClientEvent, HandshakeAuth, PeerRef, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::call::InviteOutcome;
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
#[derive(Debug, Clone)]
pub struct DispatcherContext {
    /// Vom Transport vergebene Verbindungs-ID
    pub connection_id: ConnectionId,
    /// Peer-Adresse (nur fuer Logs)
    pub peer_addr: Option<SocketAddr>,
    /// Erstes Event wurde verarbeitet
    pub handshake_erledigt: bool,
    /// Handshake war gueltig, Verbindung ist in der Registry
    pub authentifiziert: bool,
}

impl DispatcherContext {
    pub fn neu(connection_id: ConnectionId, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            connection_id,
            peer_addr,
            handshake_erledigt: false,
            authentifiziert: false,
        }
    }
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet ein eingehendes Event
    ///
    /// Gibt `Some` zurueck wenn direkt auf derselben Verbindung geantwortet
    /// werden soll.
    pub fn dispatch(&self, event: ClientEvent, ctx: &mut DispatcherContext) -> Option<ServerEvent> {
        let id = ctx.connection_id;

        match event {
            // -------------------------------------------------------------------
            // Keepalive (immer erlaubt)
            // -------------------------------------------------------------------
            ClientEvent::Ping(ping) => {
                let server_ts = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                return Some(ServerEvent::pong(ping.timestamp_ms, server_ts));
            }
            ClientEvent::Pong(_) => return None,

            // -------------------------------------------------------------------
            // Handshake
            // -------------------------------------------------------------------
            ClientEvent::Connect(auth) => {
                self.handshake(auth, ctx);
                return None;
            }
            _ => {}
        }

        ctx.handshake_erledigt = true;
        if !ctx.authentifiziert {
            tracing::warn!(connection_id = %id, event = event.name(), "Event vor Authentifizierung verworfen");
            self.state.metriken.verworfen("unauthenticated");
            return None;
        }

        match event {
            // -------------------------------------------------------------------
            // Anruf-Lebenszyklus
            // -------------------------------------------------------------------
            ClientEvent::StatusCode(req) => {
                if let Err(e) = self.state.calls.status_ueberschreiben(id, req.code) {
                    tracing::warn!(connection_id = %id, code = req.code, fehler = %e, "Statuscode abgelehnt");
                    self.state.metriken.verworfen("invalid-status");
                }
            }

            ClientEvent::PhoneCall(req) => {
                absender_pruefen(id, &req.sender);
                let ziel = req.target.socket_id;
                let raum = req.room_id;
                if self.state.calls.anrufen(id, ziel, raum.clone()) == InviteOutcome::Klingelt {
                    self.klingel_timer_starten(id, ziel, raum);
                }
            }

            ClientEvent::PhoneAttendees(req) => {
                absender_pruefen(id, &req.sender);
                self.state
                    .calls
                    .teilnehmer_weiterreichen(id, req.target.socket_id, req.attendees);
            }

            ClientEvent::PhoneHangup(req) => {
                absender_pruefen(id, &req.sender);
                self.state
                    .calls
                    .auflegen(id, req.room_id, req.target.map(|t| t.socket_id));
            }

            ClientEvent::PhoneAnswer(req) => {
                absender_pruefen(id, &req.sender);
                self.state.calls.annehmen(id, req.target.socket_id);
            }

            // -------------------------------------------------------------------
            // Punkt-zu-Punkt-Weiterleitung
            // -------------------------------------------------------------------
            ClientEvent::Offer(req) => {
                absender_pruefen(id, &req.sender);
                self.state
                    .router
                    .offer_weiterleiten(id, req.target.socket_id, req.local_description);
            }

            ClientEvent::Answer(req) => {
                absender_pruefen(id, &req.sender);
                self.state
                    .router
                    .answer_weiterleiten(id, req.target.socket_id, req.local_description);
            }

            ClientEvent::IceCandidate(req) => {
                absender_pruefen(id, &req.sender);
                self.state.router.ice_weiterleiten(id, req.target.socket_id, req.ice);
            }

            ClientEvent::Connect(_) | ClientEvent::Ping(_) | ClientEvent::Pong(_) => {}
        }

        None
    }

    /// Verarbeitet den Handshake (nur als erstes Event gueltig)
    fn handshake(&self, auth: HandshakeAuth, ctx: &mut DispatcherContext) {
        let id = ctx.connection_id;
        if ctx.handshake_erledigt {
            tracing::warn!(connection_id = %id, "Wiederholter Handshake verworfen");
            self.state.metriken.verworfen("repeated-handshake");
            return;
        }
        ctx.handshake_erledigt = true;

        match auth.lobby_und_identitaet() {
            Some((lobby, identity)) => {
                ctx.authentifiziert = self.state.calls.verbinden(id, identity, lobby);
            }
            None => {
                tracing::warn!(
                    connection_id = %id,
                    peer = ?ctx.peer_addr,
                    "Handshake ohne authCode/acc – Verbindung bleibt unauthentifiziert"
                );
                self.state.metriken.verworfen("unauthenticated");
            }
        }
    }

    /// Startet den Klingel-Timer, falls eine Klingelzeit konfiguriert ist
    fn klingel_timer_starten(&self, anrufer: ConnectionId, ziel: ConnectionId, raum: RoomKey) {
        let dauer = match self.state.calls.klingel_timeout() {
            Some(d) => d,
            None => return,
        };
        let calls = self.state.calls.clone();
        tokio::spawn(async move {
            tokio::time::sleep(dauer).await;
            calls.klingeln_abgelaufen(anrufer, ziel, &raum);
        });
    }

    /// Raeumt alle Ressourcen einer beendeten Verbindung auf
    pub fn client_cleanup(&self, ctx: &DispatcherContext) {
        if ctx.authentifiziert {
            self.state.calls.trennen(ctx.connection_id);
        }
        self.state.delivery.client_entfernen(&ctx.connection_id);
        tracing::debug!(connection_id = %ctx.connection_id, "Verbindungs-Ressourcen bereinigt");
    }
}

/// Loggt ein abweichendes `self`-Feld
fn absender_pruefen(id: ConnectionId, sender: &Option<PeerRef>) {
    if let Some(peer) = sender {
        if peer.socket_id != id {
            tracing::debug!(
                connection_id = %id,
                angegeben = %peer.socket_id,
                "Abweichendes Absenderfeld ignoriert"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CallStatus;
    use crate::server_state::SignalingConfig;
    use callrelay_observability::RelayMetrics;
    use callrelay_protocol::events::{
        CallRequest, HangupRequest, IceRelayRequest, PingMessage, StatusCodeRequest,
    };
    use tokio::sync::mpsc::Receiver;

    fn state() -> Arc<SignalingState> {
        SignalingState::neu(SignalingConfig::default(), RelayMetrics::neu().unwrap())
    }

    fn connect(auth_code: &str, acc: &str) -> ClientEvent {
        ClientEvent::Connect(HandshakeAuth {
            auth_code: Some(auth_code.into()),
            acc: Some(acc.into()),
        })
    }

    fn verbunden(
        state: &Arc<SignalingState>,
        dispatcher: &MessageDispatcher,
        acc: &str,
    ) -> (DispatcherContext, Receiver<ServerEvent>) {
        let mut ctx = DispatcherContext::neu(ConnectionId::new(), None);
        let rx = state.delivery.client_registrieren(ctx.connection_id);
        dispatcher.dispatch(connect("L", acc), &mut ctx);
        assert!(ctx.authentifiziert);
        (ctx, rx)
    }

    fn peer(ctx: &DispatcherContext) -> PeerRef {
        PeerRef::neu(ctx.connection_id, "egal")
    }

    #[test]
    fn ping_wird_direkt_beantwortet() {
        let dispatcher = MessageDispatcher::neu(state());
        let mut ctx = DispatcherContext::neu(ConnectionId::new(), None);
        let antwort = dispatcher.dispatch(ClientEvent::Ping(PingMessage { timestamp_ms: 5 }), &mut ctx);
        match antwort {
            Some(ServerEvent::Pong(p)) => assert_eq!(p.echo_timestamp_ms, 5),
            _ => panic!("Erwartet Pong"),
        }
        assert!(!ctx.handshake_erledigt);
    }

    #[test]
    fn handshake_ohne_auth_code_bleibt_unauthentifiziert() {
        let state = state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut ctx = DispatcherContext::neu(ConnectionId::new(), None);

        dispatcher.dispatch(
            ClientEvent::Connect(HandshakeAuth {
                auth_code: None,
                acc: Some("alice".into()),
            }),
            &mut ctx,
        );
        assert!(ctx.handshake_erledigt);
        assert!(!ctx.authentifiziert);
        assert_eq!(state.registry.anzahl(), 0);
    }

    #[test]
    fn zweiter_handshake_wird_ignoriert() {
        let state = state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (mut ctx, _rx) = verbunden(&state, &dispatcher, "alice");

        dispatcher.dispatch(connect("ANDERE", "mallory"), &mut ctx);
        let verbindung = state.registry.get(&ctx.connection_id).unwrap();
        assert_eq!(verbindung.identity, "alice");
        assert_eq!(verbindung.lobby, RoomKey::from("L"));
    }

    #[test]
    fn connect_nach_anderem_event_ist_kein_handshake() {
        let state = state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut ctx = DispatcherContext::neu(ConnectionId::new(), None);

        dispatcher.dispatch(
            ClientEvent::StatusCode(StatusCodeRequest { code: 0 }),
            &mut ctx,
        );
        dispatcher.dispatch(connect("L", "alice"), &mut ctx);
        assert!(!ctx.authentifiziert);
        assert_eq!(state.registry.anzahl(), 0);
    }

    #[test]
    fn nicht_authentifizierte_events_werden_verworfen() {
        let state = state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (ctx_b, mut rx_b) = verbunden(&state, &dispatcher, "bob");
        while rx_b.try_recv().is_ok() {}

        let mut fremd = DispatcherContext::neu(ConnectionId::new(), None);
        fremd.handshake_erledigt = true;
        dispatcher.dispatch(
            ClientEvent::IceCandidate(IceRelayRequest {
                sender: None,
                target: peer(&ctx_b),
                room_id: None,
                ice: serde_json::json!({}),
            }),
            &mut fremd,
        );
        assert!(rx_b.try_recv().is_err());
        assert!(
            state
                .metriken
                .dropped_total
                .with_label_values(&["unauthenticated"])
                .get()
                >= 1
        );
    }

    #[test]
    fn gefaelschter_absender_wird_ignoriert() {
        let state = state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (mut ctx_a, _rx_a) = verbunden(&state, &dispatcher, "alice");
        let (ctx_b, mut rx_b) = verbunden(&state, &dispatcher, "bob");
        let (ctx_c, _rx_c) = verbunden(&state, &dispatcher, "carol");
        while rx_b.try_recv().is_ok() {}

        dispatcher.dispatch(
            ClientEvent::PhoneCall(CallRequest {
                sender: Some(peer(&ctx_c)),
                target: peer(&ctx_b),
                room_id: RoomKey::from("R1"),
            }),
            &mut ctx_a,
        );

        match rx_b.try_recv().unwrap() {
            ServerEvent::PhoneCall(m) => assert_eq!(m.caller.socket_id, ctx_a.connection_id),
            andere => panic!("Erwartet phone-call, erhalten {}", andere.name()),
        }
        assert_eq!(
            state.registry.status(&ctx_c.connection_id).unwrap(),
            CallStatus::idle()
        );
    }

    #[test]
    fn hangup_ohne_raum_und_ziel_setzt_nur_idle() {
        let state = state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (mut ctx_a, _rx_a) = verbunden(&state, &dispatcher, "alice");

        dispatcher.dispatch(
            ClientEvent::PhoneHangup(HangupRequest {
                sender: None,
                target: None,
                room_id: None,
            }),
            &mut ctx_a,
        );
        assert_eq!(
            state.registry.status(&ctx_a.connection_id).unwrap(),
            CallStatus::idle()
        );
    }

    #[test]
    fn cleanup_entfernt_alles() {
        let state = state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (ctx_a, _rx_a) = verbunden(&state, &dispatcher, "alice");

        dispatcher.client_cleanup(&ctx_a);
        assert!(!state.registry.ist_verbunden(&ctx_a.connection_id));
        assert!(!state.delivery.ist_registriert(&ctx_a.connection_id));
        assert_eq!(state.rooms.raum_anzahl(), 0);
    }
}
