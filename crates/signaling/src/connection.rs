//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Der Task liest Frames, uebergibt sie dem Dispatcher und
//! schreibt alles aus der eigenen Send-Queue auf den Socket.
//!
//! ## Lebenszyklus
//! ```text
//! Akzeptiert -> (connect) -> Authentifiziert -> Getrennt
//!      |                                          ^
//!      +-------- kein/ungueltiger Handshake ------+
//! ```
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Jeder eingehende Frame zaehlt als Lebenszeichen
//! - Nach `verbindungs_timeout_sek` ohne Frame wird getrennt

use callrelay_core::{ConnectionId, RelayError};
use callrelay_protocol::wire::ServerCodec;
use callrelay_protocol::ServerEvent;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

type FramedStream = Framed<TcpStream, ServerCodec>;

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne TCP-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
    connection_id: ConnectionId,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection mit frischer Verbindungs-ID
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            connection_id: ConnectionId::new(),
        }
    }

    /// Vom Transport vergebene Verbindungs-ID
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal
    /// eingeht. Danach wird die Verbindung ueberall entfernt.
    pub async fn verarbeiten(self, stream: TcpStream, shutdown_rx: watch::Receiver<bool>) {
        let peer_addr = self.peer_addr;
        let connection_id = self.connection_id;
        tracing::info!(peer = %peer_addr, connection_id = %connection_id, "Neue Verbindung");

        let codec = ServerCodec::with_max_size(self.state.config.max_frame_bytes);
        let mut framed = Framed::new(stream, codec);
        let mut sende_rx = self.state.delivery.client_registrieren(connection_id);
        let mut ctx = DispatcherContext::neu(connection_id, Some(peer_addr));
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        let ergebnis = self
            .schleife(&mut framed, &mut sende_rx, &dispatcher, &mut ctx, shutdown_rx)
            .await;

        match ergebnis {
            Ok(()) => {
                tracing::info!(peer = %peer_addr, connection_id = %connection_id, "Verbindung beendet");
            }
            Err(e) => {
                tracing::warn!(
                    peer = %peer_addr,
                    connection_id = %connection_id,
                    fehler = %e,
                    "Verbindung mit Fehler beendet"
                );
            }
        }

        dispatcher.client_cleanup(&ctx);
    }

    async fn schleife(
        &self,
        framed: &mut FramedStream,
        sende_rx: &mut mpsc::Receiver<ServerEvent>,
        dispatcher: &MessageDispatcher,
        ctx: &mut DispatcherContext,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> SignalingResult<()> {
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek);
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        let mut letzter_empfang = Instant::now();
        let mut naechster_ping = Instant::now() + keepalive_intervall;

        loop {
            let jetzt = Instant::now();

            if jetzt.duration_since(letzter_empfang) > timeout_dauer {
                return Err(RelayError::Zeitlimit(format!(
                    "{}s ohne Lebenszeichen",
                    timeout_dauer.as_secs()
                ))
                .into());
            }

            let ping_verzoegerung = naechster_ping
                .checked_duration_since(jetzt)
                .unwrap_or(Duration::from_millis(1));

            tokio::select! {
                // Eingehendes Event vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(event)) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(
                                connection_id = %ctx.connection_id,
                                event = event.name(),
                                "Event empfangen"
                            );
                            if let Some(antwort) = dispatcher.dispatch(event, ctx) {
                                framed.send(antwort).await?;
                            }
                        }
                        Some(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                            return Err(RelayError::UngueltigeNachricht(e.to_string()).into());
                        }
                        Some(Err(e)) => return Err(SignalingError::Io(e)),
                        None => {
                            tracing::debug!(connection_id = %ctx.connection_id, "Verbindung vom Client geschlossen");
                            return Ok(());
                        }
                    }
                }

                // Ausgehendes Event aus der Send-Queue
                ausgehend = sende_rx.recv() => {
                    match ausgehend {
                        Some(event) => framed.send(event).await?,
                        None => {
                            return Err(RelayError::Getrennt("Send-Queue geschlossen".into()).into());
                        }
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung) => {
                    if Instant::now() >= naechster_ping {
                        let ts = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_millis() as u64;
                        framed.send(ServerEvent::ping(ts)).await?;
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(connection_id = %ctx.connection_id, "Shutdown-Signal – Verbindung wird getrennt");
                        return Ok(());
                    }
                }
            }
        }
    }
}
