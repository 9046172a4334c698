//! Connection-Registry – Wer ist verbunden, mit welchem Anrufstatus
//!
//! Die Registry haelt pro authentifizierter Verbindung einen Datensatz mit
//! Identitaet, Lobby und `CallStatus`. Sie ist die einzige Quelle fuer
//! Anrufstatus; alle anderen Komponenten lesen und schreiben ueber sie.
//!
//! ## Nebenlaeufigkeit
//! Jeder Datensatz wird ueber den DashMap-Shard-Lock geschuetzt.
//! `aktualisieren` fuehrt eine Pruef-und-Setz-Operation atomar auf einem
//! Datensatz aus. Es wird nie mehr als ein Datensatz gleichzeitig gesperrt.

use callrelay_core::{ConnectionId, RelayError, RoomKey};
use callrelay_protocol::events::{Attendee, CallStatusCode, PeerRef};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

// ---------------------------------------------------------------------------
// CallStatus
// ---------------------------------------------------------------------------

/// Anrufstatus einer Verbindung
///
/// Die Felder sind privat: ein Raum ist genau dann gesetzt, wenn der Code
/// nicht `Idle` ist. Die Konstruktoren halten das ein.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStatus {
    code: CallStatusCode,
    room_id: Option<RoomKey>,
    attendees: Vec<Attendee>,
}

impl CallStatus {
    /// Kein Anruf
    pub fn idle() -> Self {
        Self {
            code: CallStatusCode::Idle,
            room_id: None,
            attendees: Vec::new(),
        }
    }

    /// Klingelt (ausgehend oder eingehend) im Raum `room_id`
    pub fn ringing(room_id: RoomKey) -> Self {
        Self {
            code: CallStatusCode::Ringing,
            room_id: Some(room_id),
            attendees: Vec::new(),
        }
    }

    /// Im Gespraech im Raum `room_id`
    pub fn in_call(room_id: RoomKey) -> Self {
        Self {
            code: CallStatusCode::InCall,
            room_id: Some(room_id),
            attendees: Vec::new(),
        }
    }

    pub fn code(&self) -> CallStatusCode {
        self.code
    }

    pub fn room_id(&self) -> Option<&RoomKey> {
        self.room_id.as_ref()
    }

    pub fn attendees(&self) -> &[Attendee] {
        &self.attendees
    }

    /// `true` wenn die Verbindung einen Anruf belegt (Ringing oder InCall)
    pub fn ist_besetzt(&self) -> bool {
        self.code.ist_besetzt()
    }

    /// Berechnet den Status nach einem expliziten Status-Override
    ///
    /// - `Idle` setzt den Status vollstaendig zurueck
    /// - `Ringing`/`InCall` ersetzen nur den Code, Raum und Teilnehmer bleiben
    /// - `Ringing`/`InCall` ohne bestehenden Raum sind ein ungueltiger Uebergang
    pub fn mit_code(&self, code: CallStatusCode) -> Result<Self, RelayError> {
        if !code.ist_besetzt() {
            return Ok(Self::idle());
        }
        match &self.room_id {
            Some(_) => Ok(Self {
                code,
                room_id: self.room_id.clone(),
                attendees: self.attendees.clone(),
            }),
            None => Err(RelayError::UngueltigerUebergang(format!(
                "{} ohne Raum",
                code
            ))),
        }
    }

    /// Prueft die Konsistenz zwischen Code und Raum
    pub fn ist_konsistent(&self) -> bool {
        self.room_id.is_some() == self.code.ist_besetzt()
    }
}

impl Default for CallStatus {
    fn default() -> Self {
        Self::idle()
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Datensatz einer authentifizierten Verbindung
#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: ConnectionId,
    /// Anzeige-Identitaet (`acc` auf dem Wire), nicht eindeutig
    pub identity: String,
    /// Lobby-Raum aus dem Handshake
    pub lobby: RoomKey,
    pub call_status: CallStatus,
    pub verbunden_seit: Instant,
}

impl Connection {
    /// Oeffentliche Referenz fuer ausgehende Events
    pub fn peer_ref(&self) -> PeerRef {
        PeerRef::neu(self.connection_id, self.identity.clone())
    }
}

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

/// Registry aller authentifizierten Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt einen Datensatz mit Status `Idle` an
    ///
    /// Gibt `false` zurueck wenn die Verbindung bereits registriert ist;
    /// der bestehende Datensatz bleibt dann unveraendert.
    pub fn registrieren(&self, id: ConnectionId, identity: String, lobby: RoomKey) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.inner.entry(id) {
            Entry::Occupied(_) => {
                tracing::debug!(connection_id = %id, "Verbindung bereits registriert");
                false
            }
            Entry::Vacant(eintrag) => {
                eintrag.insert(Connection {
                    connection_id: id,
                    identity,
                    lobby,
                    call_status: CallStatus::idle(),
                    verbunden_seit: Instant::now(),
                });
                true
            }
        }
    }

    /// Entfernt einen Datensatz (idempotent)
    pub fn entfernen(&self, id: &ConnectionId) -> Option<Connection> {
        self.inner.remove(id).map(|(_, verbindung)| verbindung)
    }

    /// Gibt eine Kopie des Datensatzes zurueck
    pub fn get(&self, id: &ConnectionId) -> Option<Connection> {
        self.inner.get(id).map(|eintrag| eintrag.value().clone())
    }

    /// Gibt die oeffentliche Referenz einer Verbindung zurueck
    pub fn peer(&self, id: &ConnectionId) -> Option<PeerRef> {
        self.inner.get(id).map(|eintrag| eintrag.peer_ref())
    }

    /// Gibt den aktuellen Anrufstatus zurueck
    pub fn status(&self, id: &ConnectionId) -> Option<CallStatus> {
        self.inner.get(id).map(|eintrag| eintrag.call_status.clone())
    }

    /// Ersetzt den Anrufstatus
    ///
    /// Gibt `false` zurueck wenn die Verbindung nicht registriert ist.
    pub fn status_setzen(&self, id: &ConnectionId, status: CallStatus) -> bool {
        match self.inner.get_mut(id) {
            Some(mut eintrag) => {
                eintrag.call_status = status;
                true
            }
            None => false,
        }
    }

    /// Fuehrt `f` atomar auf dem Anrufstatus einer Verbindung aus
    ///
    /// Gibt `None` zurueck wenn die Verbindung nicht registriert ist.
    /// `f` darf keine anderen Registry-Methoden aufrufen.
    pub fn aktualisieren<F, R>(&self, id: &ConnectionId, f: F) -> Option<R>
    where
        F: FnOnce(&mut CallStatus) -> R,
    {
        self.inner
            .get_mut(id)
            .map(|mut eintrag| f(&mut eintrag.call_status))
    }

    /// Prueft ob eine Verbindung registriert ist
    pub fn ist_verbunden(&self, id: &ConnectionId) -> bool {
        self.inner.contains_key(id)
    }

    /// Anzahl registrierter Verbindungen
    pub fn anzahl(&self) -> usize {
        self.inner.len()
    }

    /// Prueft ob `raum` die Lobby mindestens einer Verbindung ist
    pub fn ist_lobby(&self, raum: &RoomKey) -> bool {
        self.inner.iter().any(|eintrag| eintrag.lobby == *raum)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
