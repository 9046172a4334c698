//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle Komponenten des Relays. Jede Komponente teilt ihren inneren
//! Zustand per Clone, daher halten Router, Zustandsmaschine und
//! Broadcaster dieselbe Registry und dieselben Raeume.

use callrelay_observability::RelayMetrics;
use callrelay_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::call::CallStateMachine;
use crate::delivery::DeliveryHub;
use crate::presence::PresenceBroadcaster;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMembership;
use crate::router::SignalingRouter;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers (nur fuer Logs)
    pub server_name: String,
    /// Maximale gleichzeitige TCP-Verbindungen
    pub max_clients: u32,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_bytes: usize,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Klingelzeit in Sekunden, `None` = unbegrenzt
    pub klingel_timeout_sek: Option<u64>,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "callrelay".to_string(),
            max_clients: 512,
            max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
            keepalive_sek: 25,
            verbindungs_timeout_sek: 60,
            klingel_timeout_sek: None,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Authentifizierte Verbindungen und ihr Anrufstatus
    pub registry: ConnectionRegistry,
    /// Raum-Mitgliedschaften (Lobby- und Call-Raeume)
    pub rooms: RoomMembership,
    /// Send-Queues aller offenen Verbindungen
    pub delivery: DeliveryHub,
    /// Mitgliederlisten-Broadcasts
    pub presence: PresenceBroadcaster,
    /// Anruf-Zustandsmaschine
    pub calls: CallStateMachine,
    /// SDP-/ICE-Weiterleitung
    pub router: SignalingRouter,
    /// Prometheus-Metriken
    pub metriken: RelayMetrics,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState und verdrahtet alle Komponenten
    pub fn neu(config: SignalingConfig, metriken: RelayMetrics) -> Arc<Self> {
        let registry = ConnectionRegistry::neu();
        let rooms = RoomMembership::neu();
        let delivery = DeliveryHub::neu(metriken.clone());
        let presence = PresenceBroadcaster::neu(registry.clone(), rooms.clone(), delivery.clone());
        let calls = CallStateMachine::neu(
            registry.clone(),
            rooms.clone(),
            delivery.clone(),
            presence.clone(),
            metriken.clone(),
            config.klingel_timeout_sek.map(Duration::from_secs),
        );
        let router = SignalingRouter::neu(registry.clone(), delivery.clone(), metriken.clone());

        Arc::new(Self {
            config: Arc::new(config),
            registry,
            rooms,
            delivery,
            presence,
            calls,
            router,
            metriken,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
