//! Zustellung – Send-Queues aller offenen Verbindungen
//!
//! Jede Verbindung bekommt beim Aufbau eine begrenzte Queue. Die
//! `ClientConnection` liest daraus und schreibt auf den Socket. Zustellung
//! ist nicht-blockierend: ist eine Queue voll, wird das Event fuer diese
//! eine Verbindung verworfen und gezaehlt. Die Reihenfolge pro Verbindung
//! bleibt erhalten.

use callrelay_core::ConnectionId;
use callrelay_observability::RelayMetrics;
use callrelay_protocol::ServerEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse der Send-Queue pro Verbindung
pub const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub connection_id: ConnectionId,
    pub tx: mpsc::Sender<ServerEvent>,
}

/// Warum ein Event nicht eingereiht werden konnte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZustellFehler {
    /// Keine Queue fuer diese Verbindung
    Unbekannt,
    /// Queue voll (langsamer Client)
    QueueVoll,
    /// Queue geschlossen (Verbindung beendet)
    Geschlossen,
}

impl ZustellFehler {
    /// Label fuer `callrelay_dropped_total`
    pub fn grund(self) -> &'static str {
        match self {
            Self::Unbekannt => "no-queue",
            Self::QueueVoll => "queue-full",
            Self::Geschlossen => "queue-closed",
        }
    }
}

impl ClientSender {
    /// Reiht ein Event nicht-blockierend ein
    pub fn senden(&self, event: ServerEvent) -> Result<(), ZustellFehler> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    event = event.name(),
                    "Send-Queue voll – Event verworfen"
                );
                Err(ZustellFehler::QueueVoll)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    "Send-Queue geschlossen (Verbindung beendet)"
                );
                Err(ZustellFehler::Geschlossen)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryHub
// ---------------------------------------------------------------------------

/// Zentrale Zustellung an alle offenen Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct DeliveryHub {
    clients: Arc<DashMap<ConnectionId, ClientSender>>,
    metriken: RelayMetrics,
}

impl DeliveryHub {
    /// Erstellt einen leeren DeliveryHub
    pub fn neu(metriken: RelayMetrics) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            metriken,
        }
    }

    /// Legt die Queue einer Verbindung an und gibt das Empfangsende zurueck
    ///
    /// Eine bestehende Queue derselben Verbindung wird ersetzt.
    pub fn client_registrieren(&self, connection_id: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        self.clients
            .insert(connection_id, ClientSender { connection_id, tx });
        tracing::debug!(connection_id = %connection_id, "Send-Queue angelegt");
        rx
    }

    /// Entfernt die Queue einer Verbindung (idempotent)
    pub fn client_entfernen(&self, connection_id: &ConnectionId) {
        if self.clients.remove(connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "Send-Queue entfernt");
        }
    }

    /// Sendet ein Event an eine einzelne Verbindung
    ///
    /// Gibt `true` zurueck wenn das Event eingereiht wurde.
    pub fn an_client_senden(&self, connection_id: &ConnectionId, event: ServerEvent) -> bool {
        // Sender klonen, damit der Shard-Lock nicht ueber try_send gehalten wird
        let sender = match self.clients.get(connection_id) {
            Some(sender) => sender.clone(),
            None => {
                tracing::debug!(connection_id = %connection_id, "Keine Send-Queue fuer Verbindung");
                self.metriken.verworfen(ZustellFehler::Unbekannt.grund());
                return false;
            }
        };

        match sender.senden(event) {
            Ok(()) => true,
            Err(fehler) => {
                self.metriken.verworfen(fehler.grund());
                false
            }
        }
    }

    /// Sendet dasselbe Event an mehrere Verbindungen
    ///
    /// Gibt die Anzahl erfolgreicher Zustellungen zurueck.
    pub fn an_mehrere_senden(&self, empfaenger: &[ConnectionId], event: &ServerEvent) -> usize {
        empfaenger
            .iter()
            .filter(|id| self.an_client_senden(id, event.clone()))
            .count()
    }

    /// Prueft ob fuer eine Verbindung eine Queue existiert
    pub fn ist_registriert(&self, connection_id: &ConnectionId) -> bool {
        self.clients.contains_key(connection_id)
    }

    /// Anzahl offener Queues
    pub fn client_anzahl(&self) -> usize {
        self.clients.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
