//! Anruf-Zustandsmaschine – Verbinden, Anrufen, Annehmen, Auflegen
//!
//! Alle Uebergaenge des Anrufstatus laufen hier zusammen. Die Maschine
//! liest und schreibt den Status ueber die `ConnectionRegistry`, pflegt
//! Call-Raeume in der `RoomMembership` und benachrichtigt Peers ueber den
//! `DeliveryHub`.
//!
//! ## Uebergaenge
//! ```text
//!            anrufen / angerufen             annehmen
//!   Idle ---------------------------> Ringing ---------> InCall
//!    ^                                   |                  |
//!    +------ auflegen / Klingel-Timeout -+---- auflegen ----+
//! ```
//!
//! ## Atomaritaet
//! Ein Anruf reserviert zuerst das Ziel mit einer Pruef-und-Setz-Operation
//! auf dessen Datensatz. Zwei gleichzeitige Anrufe an dasselbe Ziel koennen
//! daher nicht beide erfolgreich sein.

use callrelay_core::{ConnectionId, RelayError, RoomKey};
use callrelay_observability::RelayMetrics;
use callrelay_protocol::events::{
    Attendee, AttendeesMessage, BusyMessage, CallStatusCode, HangupMessage,
    IncomingCallMessage, ServerEvent,
};
use std::time::Duration;

use crate::delivery::DeliveryHub;
use crate::presence::{MembershipEventKind, PresenceBroadcaster};
use crate::registry::{CallStatus, ConnectionRegistry};
use crate::rooms::RoomMembership;

// ---------------------------------------------------------------------------
// Ergebnisse
// ---------------------------------------------------------------------------

/// Ergebnis eines Anrufversuchs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteOutcome {
    /// Ziel reserviert, `phone-call` zugestellt
    Klingelt,
    /// Ziel ist belegt, Anrufer hat `phone-busy` erhalten
    Besetzt(CallStatusCode),
    /// Ziel ist nicht verbunden
    ZielUnbekannt,
    /// Anrufer ist nicht (mehr) registriert
    AnruferUnbekannt,
    /// Anrufer und Ziel sind identisch
    Selbstanruf,
    /// Leere Room-ID oder der Name einer Lobby
    UngueltigerRaum,
}

/// Ergebnis einer Annahme
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Beide Seiten sind im Gespraech im Raum
    Verbunden(RoomKey),
    /// Annehmende Verbindung ist nicht registriert
    NichtAuthentifiziert,
    /// Anrufer ist nicht verbunden
    AnruferUnbekannt,
    /// Anrufer hat keinen offenen Anruf
    KeinAnruf,
}

// ---------------------------------------------------------------------------
// CallStateMachine
// ---------------------------------------------------------------------------

/// Zustandsmaschine fuer den Anruf-Lebenszyklus
#[derive(Clone)]
pub struct CallStateMachine {
    registry: ConnectionRegistry,
    rooms: RoomMembership,
    delivery: DeliveryHub,
    presence: PresenceBroadcaster,
    metriken: RelayMetrics,
    klingel_timeout: Option<Duration>,
}

impl CallStateMachine {
    pub fn neu(
        registry: ConnectionRegistry,
        rooms: RoomMembership,
        delivery: DeliveryHub,
        presence: PresenceBroadcaster,
        metriken: RelayMetrics,
        klingel_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            rooms,
            delivery,
            presence,
            metriken,
            klingel_timeout,
        }
    }

    /// Konfigurierte Klingelzeit (`None` = unbegrenzt)
    pub fn klingel_timeout(&self) -> Option<Duration> {
        self.klingel_timeout
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus einer Verbindung
    // -----------------------------------------------------------------------

    /// Registriert eine Verbindung und tritt ihrer Lobby bei
    ///
    /// Alle Lobby-Mitglieder (inklusive der neuen Verbindung) erhalten die
    /// aktualisierte `user-list`. Gibt `false` zurueck wenn die Verbindung
    /// bereits registriert war.
    pub fn verbinden(&self, id: ConnectionId, identity: String, lobby: RoomKey) -> bool {
        if !self.registry.registrieren(id, identity.clone(), lobby.clone()) {
            return false;
        }
        self.rooms.beitreten(&lobby, id);
        self.metriken
            .connected_clients
            .set(self.registry.anzahl() as i64);

        tracing::info!(connection_id = %id, identity = %identity, lobby = %lobby, "Verbindung authentifiziert");
        self.presence
            .broadcast_membership(&lobby, MembershipEventKind::UserList, id);
        true
    }

    /// Entfernt eine Verbindung aus allen Raeumen und der Registry
    ///
    /// Nur die Lobby erhaelt eine neue `user-list`; Call-Raeume werden
    /// still verlassen. Idempotent.
    pub fn trennen(&self, id: ConnectionId) -> bool {
        let verlassen = self.rooms.alle_verlassen(id);
        let verbindung = match self.registry.entfernen(&id) {
            Some(v) => v,
            None => return false,
        };
        self.metriken
            .connected_clients
            .set(self.registry.anzahl() as i64);

        tracing::info!(
            connection_id = %id,
            identity = %verbindung.identity,
            raeume = verlassen.len(),
            status = %verbindung.call_status.code(),
            "Verbindung getrennt"
        );
        self.presence
            .broadcast_membership(&verbindung.lobby, MembershipEventKind::UserList, id);
        true
    }

    // -----------------------------------------------------------------------
    // Anrufen
    // -----------------------------------------------------------------------

    /// Ruft `ziel` im Raum `raum` an
    pub fn anrufen(&self, anrufer: ConnectionId, ziel: ConnectionId, raum: RoomKey) -> InviteOutcome {
        let anrufer_peer = match self.registry.peer(&anrufer) {
            Some(peer) => peer,
            None => return InviteOutcome::AnruferUnbekannt,
        };
        if anrufer == ziel {
            tracing::warn!(connection_id = %anrufer, "Anruf an sich selbst verworfen");
            self.metriken.verworfen("self-invite");
            return InviteOutcome::Selbstanruf;
        }
        if raum.ist_leer() {
            tracing::warn!(connection_id = %anrufer, "Anruf ohne Room-ID verworfen");
            self.metriken.verworfen("invalid-room");
            return InviteOutcome::UngueltigerRaum;
        }
        if self.registry.ist_lobby(&raum) {
            tracing::warn!(connection_id = %anrufer, raum = %raum, "Lobby als Call-Raum verworfen");
            self.metriken.verworfen("invalid-room");
            return InviteOutcome::UngueltigerRaum;
        }

        // Ziel atomar reservieren
        let reservierung = self.registry.aktualisieren(&ziel, |status| {
            if status.ist_besetzt() {
                Err(status.code())
            } else {
                *status = CallStatus::ringing(raum.clone());
                Ok(())
            }
        });

        match reservierung {
            None => {
                tracing::warn!(anrufer = %anrufer, ziel = %ziel, "Anrufziel nicht verbunden");
                self.metriken.verworfen("unknown-target");
                InviteOutcome::ZielUnbekannt
            }
            Some(Err(code)) => {
                // Ziel existiert, daher ist peer() hier gesetzt ausser bei
                // einem gleichzeitigen Disconnect
                if let Some(ziel_peer) = self.registry.peer(&ziel) {
                    self.delivery.an_client_senden(
                        &anrufer,
                        ServerEvent::PhoneBusy(BusyMessage {
                            target: ziel_peer,
                            status_code: code,
                        }),
                    );
                }
                self.metriken.busy_total.inc();
                tracing::info!(anrufer = %anrufer, ziel = %ziel, status = %code, "Ziel besetzt");
                InviteOutcome::Besetzt(code)
            }
            Some(Ok(())) => {
                if !self
                    .registry
                    .status_setzen(&anrufer, CallStatus::ringing(raum.clone()))
                {
                    // Anrufer waehrend der Reservierung getrennt
                    self.reservierung_freigeben(ziel, &raum);
                    return InviteOutcome::AnruferUnbekannt;
                }
                self.rooms.beitreten(&raum, anrufer);

                self.delivery.an_client_senden(
                    &ziel,
                    ServerEvent::PhoneCall(IncomingCallMessage {
                        caller: anrufer_peer,
                        room_id: raum.clone(),
                    }),
                );
                self.metriken.invites_total.inc();
                tracing::info!(anrufer = %anrufer, ziel = %ziel, raum = %raum, "Anruf klingelt");
                InviteOutcome::Klingelt
            }
        }
    }

    /// Setzt ein reserviertes Ziel zurueck, solange es noch in `raum` klingelt
    fn reservierung_freigeben(&self, id: ConnectionId, raum: &RoomKey) -> bool {
        self.registry
            .aktualisieren(&id, |status| {
                let klingelt_hier = status.code() == CallStatusCode::Ringing
                    && status.room_id() == Some(raum);
                if klingelt_hier {
                    *status = CallStatus::idle();
                }
                klingelt_hier
            })
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Annehmen
    // -----------------------------------------------------------------------

    /// `empfaenger` nimmt den Anruf von `anrufer` an
    ///
    /// Der Raum wird aus dem Status des Anrufers gelesen, nicht aus der
    /// Nachricht. Hat der Anrufer keinen Raum, passiert nichts.
    pub fn annehmen(&self, empfaenger: ConnectionId, anrufer: ConnectionId) -> AnswerOutcome {
        if !self.registry.ist_verbunden(&empfaenger) {
            return AnswerOutcome::NichtAuthentifiziert;
        }

        let raum = self.registry.aktualisieren(&anrufer, |status| {
            let raum = status.room_id().cloned()?;
            *status = CallStatus::in_call(raum.clone());
            Some(raum)
        });

        let raum = match raum {
            None => {
                tracing::debug!(empfaenger = %empfaenger, anrufer = %anrufer, "Anrufer nicht verbunden");
                self.metriken.verworfen("unknown-target");
                return AnswerOutcome::AnruferUnbekannt;
            }
            Some(None) => {
                tracing::debug!(empfaenger = %empfaenger, anrufer = %anrufer, "Anrufer hat keinen offenen Anruf");
                return AnswerOutcome::KeinAnruf;
            }
            Some(Some(raum)) => raum,
        };

        if !self
            .registry
            .status_setzen(&empfaenger, CallStatus::in_call(raum.clone()))
        {
            return AnswerOutcome::NichtAuthentifiziert;
        }
        self.rooms.beitreten(&raum, empfaenger);
        self.presence
            .broadcast_membership(&raum, MembershipEventKind::RoomJoined, empfaenger);

        self.metriken.answers_total.inc();
        tracing::info!(empfaenger = %empfaenger, anrufer = %anrufer, raum = %raum, "Anruf angenommen");
        AnswerOutcome::Verbunden(raum)
    }

    // -----------------------------------------------------------------------
    // Teilnehmer
    // -----------------------------------------------------------------------

    /// Reicht eine Teilnehmerliste an `ziel` weiter (ohne Statusaenderung)
    pub fn teilnehmer_weiterreichen(
        &self,
        absender: ConnectionId,
        ziel: ConnectionId,
        attendees: Vec<Attendee>,
    ) -> bool {
        let caller = match self.registry.peer(&absender) {
            Some(peer) => peer,
            None => return false,
        };
        if !self.registry.ist_verbunden(&ziel) {
            self.metriken.verworfen("unknown-target");
            return false;
        }

        let zugestellt = self.delivery.an_client_senden(
            &ziel,
            ServerEvent::PhoneAttendees(AttendeesMessage { caller, attendees }),
        );
        if zugestellt {
            self.metriken.weitergeleitet("phone-attendees");
        }
        zugestellt
    }

    // -----------------------------------------------------------------------
    // Auflegen
    // -----------------------------------------------------------------------

    /// `anrufer` legt auf
    ///
    /// Mit `raum` werden alle anderen Mitglieder des Raums benachrichtigt und
    /// der Anrufer verlaesst ihn. Ohne `raum` wird nur `ziel` benachrichtigt
    /// und der Anrufer verlaesst den Raum aus seinem eigenen Status. Ein
    /// Lobby-Name als `raum` zaehlt wie kein Raum; Lobbys werden nie
    /// verlassen. Danach ist der Anrufer `Idle`. Gibt die Anzahl
    /// Benachrichtigungen zurueck.
    pub fn auflegen(
        &self,
        anrufer: ConnectionId,
        raum: Option<RoomKey>,
        ziel: Option<ConnectionId>,
    ) -> usize {
        let user = match self.registry.peer(&anrufer) {
            Some(peer) => peer,
            None => return 0,
        };
        let event = ServerEvent::PhoneHangup(HangupMessage { user });

        let raum = raum.filter(|r| !r.ist_leer()).filter(|r| {
            let lobby = self.registry.ist_lobby(r);
            if lobby {
                tracing::warn!(anrufer = %anrufer, raum = %r, "Auflegen in Lobby ignoriert");
            }
            !lobby
        });

        let benachrichtigt = match (raum, ziel) {
            (Some(raum), _) => {
                let andere: Vec<ConnectionId> = self
                    .rooms
                    .mitglieder(&raum)
                    .into_iter()
                    .filter(|id| *id != anrufer)
                    .collect();
                let n = self.delivery.an_mehrere_senden(&andere, &event);
                self.rooms.verlassen(&raum, anrufer);
                n
            }
            (None, Some(ziel)) => {
                let n = if self.registry.ist_verbunden(&ziel) {
                    usize::from(self.delivery.an_client_senden(&ziel, event))
                } else {
                    0
                };
                if let Some(eigener_raum) = self
                    .registry
                    .status(&anrufer)
                    .and_then(|s| s.room_id().cloned())
                {
                    self.rooms.verlassen(&eigener_raum, anrufer);
                }
                n
            }
            (None, None) => 0,
        };

        self.registry.status_setzen(&anrufer, CallStatus::idle());
        self.metriken.hangups_total.inc();
        tracing::info!(anrufer = %anrufer, benachrichtigt, "Aufgelegt");
        benachrichtigt
    }

    // -----------------------------------------------------------------------
    // Status-Override
    // -----------------------------------------------------------------------

    /// Setzt den eigenen Statuscode direkt
    ///
    /// `roh` ist der Wire-Wert. Unbekannte Codes und `Ringing`/`InCall` ohne
    /// bestehenden Raum werden abgelehnt; der Status bleibt dann unveraendert.
    pub fn status_ueberschreiben(
        &self,
        id: ConnectionId,
        roh: i64,
    ) -> Result<CallStatusCode, RelayError> {
        let code = CallStatusCode::try_from(roh)?;
        let ergebnis = self
            .registry
            .aktualisieren(&id, |status| {
                let neu = status.mit_code(code)?;
                *status = neu;
                Ok(code)
            })
            .ok_or_else(|| RelayError::UngueltigerUebergang("Verbindung nicht registriert".into()))?;

        if ergebnis.is_ok() {
            tracing::debug!(connection_id = %id, status = %code, "Statuscode gesetzt");
        }
        ergebnis
    }

    // -----------------------------------------------------------------------
    // Klingel-Timeout
    // -----------------------------------------------------------------------

    /// Beendet einen unbeantworteten Anruf nach Ablauf der Klingelzeit
    ///
    /// Wirkt, wenn das Ziel noch in `raum` klingelt oder inzwischen getrennt
    /// ist und der Anrufer dort noch klingelt. Beide Seiten erhalten
    /// `phone-hangup` mit der jeweils anderen als `user`, soweit diese noch
    /// verbunden ist.
    pub fn klingeln_abgelaufen(
        &self,
        anrufer: ConnectionId,
        ziel: ConnectionId,
        raum: &RoomKey,
    ) -> bool {
        let ziel_freigegeben = self.reservierung_freigeben(ziel, raum);
        if !ziel_freigegeben && self.registry.ist_verbunden(&ziel) {
            return false;
        }
        let anrufer_freigegeben = self.reservierung_freigeben(anrufer, raum);
        if anrufer_freigegeben {
            self.rooms.verlassen(raum, anrufer);
        }
        if !ziel_freigegeben && !anrufer_freigegeben {
            return false;
        }

        if ziel_freigegeben {
            if let Some(anrufer_peer) = self.registry.peer(&anrufer) {
                self.delivery.an_client_senden(
                    &ziel,
                    ServerEvent::PhoneHangup(HangupMessage { user: anrufer_peer }),
                );
            }
        }
        if let Some(ziel_peer) = self.registry.peer(&ziel) {
            self.delivery.an_client_senden(
                &anrufer,
                ServerEvent::PhoneHangup(HangupMessage { user: ziel_peer }),
            );
        }

        self.metriken.ringing_timeouts_total.inc();
        tracing::info!(anrufer = %anrufer, ziel = %ziel, raum = %raum, "Klingelzeit abgelaufen");
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
