//! Signaling-Router – Punkt-zu-Punkt-Weiterleitung von SDP und ICE
//!
//! Offer, Answer und ICE-Kandidaten werden unveraendert an genau ein Ziel
//! weitergereicht. Der Absender wird aus der Registry bestimmt, nicht aus
//! dem Event. Unbekannte Ziele werden still verworfen.

use callrelay_core::ConnectionId;
use callrelay_observability::RelayMetrics;
use callrelay_protocol::events::{IceMessage, PeerRef, SdpMessage, ServerEvent};
use serde_json::Value;

use crate::delivery::DeliveryHub;
use crate::registry::ConnectionRegistry;

/// Ergebnis einer Weiterleitung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Zugestellt,
    /// Absender ist nicht authentifiziert
    AbsenderUnbekannt,
    /// Ziel ist nicht verbunden
    ZielUnbekannt,
    /// Ziel-Queue voll oder geschlossen
    NichtZugestellt,
}

/// Leitet Signaling-Payloads zwischen zwei Verbindungen weiter
#[derive(Clone)]
pub struct SignalingRouter {
    registry: ConnectionRegistry,
    delivery: DeliveryHub,
    metriken: RelayMetrics,
}

impl SignalingRouter {
    pub fn neu(registry: ConnectionRegistry, delivery: DeliveryHub, metriken: RelayMetrics) -> Self {
        Self {
            registry,
            delivery,
            metriken,
        }
    }

    /// Leitet eine SDP-Offer weiter
    pub fn offer_weiterleiten(
        &self,
        absender: ConnectionId,
        ziel: ConnectionId,
        local_description: Value,
    ) -> RelayOutcome {
        self.weiterleiten(absender, ziel, |user| {
            ServerEvent::Offer(SdpMessage {
                local_description,
                user,
            })
        })
    }

    /// Leitet eine SDP-Answer weiter
    pub fn answer_weiterleiten(
        &self,
        absender: ConnectionId,
        ziel: ConnectionId,
        local_description: Value,
    ) -> RelayOutcome {
        self.weiterleiten(absender, ziel, |user| {
            ServerEvent::Answer(SdpMessage {
                local_description,
                user,
            })
        })
    }

    /// Leitet einen ICE-Kandidaten weiter
    pub fn ice_weiterleiten(&self, absender: ConnectionId, ziel: ConnectionId, ice: Value) -> RelayOutcome {
        self.weiterleiten(absender, ziel, |user| {
            ServerEvent::IceCandidate(IceMessage { ice, user })
        })
    }

    fn weiterleiten<F>(&self, absender: ConnectionId, ziel: ConnectionId, bauen: F) -> RelayOutcome
    where
        F: FnOnce(PeerRef) -> ServerEvent,
    {
        let user = match self.registry.peer(&absender) {
            Some(peer) => peer,
            None => {
                self.metriken.verworfen("unauthenticated");
                return RelayOutcome::AbsenderUnbekannt;
            }
        };
        if !self.registry.ist_verbunden(&ziel) {
            tracing::warn!(absender = %absender, ziel = %ziel, "Weiterleitung an unbekanntes Ziel verworfen");
            self.metriken.verworfen("unknown-target");
            return RelayOutcome::ZielUnbekannt;
        }

        let event = bauen(user);
        let name = event.name();
        if self.delivery.an_client_senden(&ziel, event) {
            self.metriken.weitergeleitet(name);
            tracing::debug!(absender = %absender, ziel = %ziel, event = name, "Weitergeleitet");
            RelayOutcome::Zugestellt
        } else {
            RelayOutcome::NichtZugestellt
        }
    }
}
