//! Signaling-Events (Client <-> Relay)
//!
//! Definiert alle Events die ueber die TCP-Verbindung ausgetauscht werden.
//!
//! ## Design
//! - Jedes Frame traegt genau ein Event: `{"event": "<name>", "data": {...}}`
//! - Event-Namen sind kebab-case (`phone-call`, `ice-candidate`, ...)
//! - Feldnamen sind camelCase (`socketId`, `roomId`, `localDescription`)
//! - Session-Descriptions und ICE-Kandidaten sind opake JSON-Werte und werden
//!   unveraendert weitergereicht

use callrelay_core::{ConnectionId, RelayError, RoomKey};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Anrufstatus
// ---------------------------------------------------------------------------

/// Anrufstatus einer Verbindung
///
/// Auf dem Wire als Zahl (0/1/2) kodiert. Jeder Wert ausser `Idle` gilt als
/// "besetzt"; eine weitere Ordnung gibt es nicht.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "i64")]
pub enum CallStatusCode {
    /// Frei, kann angerufen werden
    Idle,
    /// Anruf ausgehend oder eingehend, noch nicht angenommen
    Ringing,
    /// Im Gespraech
    InCall,
}

impl CallStatusCode {
    /// Prueft ob eine Verbindung mit diesem Status fuer neue Anrufe gesperrt ist
    pub fn ist_besetzt(self) -> bool {
        self != Self::Idle
    }

    /// Numerischer Wire-Wert
    pub fn als_zahl(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Ringing => 1,
            Self::InCall => 2,
        }
    }
}

impl From<CallStatusCode> for u8 {
    fn from(code: CallStatusCode) -> Self {
        code.als_zahl()
    }
}

impl TryFrom<i64> for CallStatusCode {
    type Error = RelayError;

    fn try_from(wert: i64) -> Result<Self, Self::Error> {
        match wert {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Ringing),
            2 => Ok(Self::InCall),
            andere => Err(RelayError::UngueltigerStatus(andere)),
        }
    }
}

impl std::fmt::Display for CallStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Ringing => "ringing",
            Self::InCall => "in-call",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Gemeinsame Strukturen
// ---------------------------------------------------------------------------

/// Verweis auf einen Peer: Verbindungs-ID + Identitaet (Account)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRef {
    #[serde(rename = "socketId")]
    pub socket_id: ConnectionId,
    /// Opaque Account-/User-Kennung aus dem Handshake
    #[serde(rename = "acc")]
    pub identity: String,
}

impl PeerRef {
    pub fn neu(socket_id: ConnectionId, identity: impl Into<String>) -> Self {
        Self {
            socket_id,
            identity: identity.into(),
        }
    }
}

/// Teilnehmer eines Mehrparteien-Anrufs
///
/// Zusaetzliche Felder (z.B. Anzeigename) werden unveraendert mitgefuehrt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    #[serde(rename = "socketId")]
    pub socket_id: ConnectionId,
    #[serde(rename = "acc")]
    pub identity: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Eingehende Events (Client -> Relay)
// ---------------------------------------------------------------------------

/// Handshake-Daten beim Verbindungsaufbau
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandshakeAuth {
    /// Autorisierungscode, bestimmt den Lobby-Raum
    #[serde(rename = "authCode", default)]
    pub auth_code: Option<String>,
    /// Identitaet (Account)
    #[serde(default)]
    pub acc: Option<String>,
}

impl HandshakeAuth {
    /// Liefert Lobby-Raum und Identitaet, falls beide vorhanden und nicht leer sind
    pub fn lobby_und_identitaet(&self) -> Option<(RoomKey, String)> {
        let auth_code = self.auth_code.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let acc = self.acc.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((RoomKey::neu(auth_code), acc.to_string()))
    }
}

/// Direktes Setzen des eigenen Statuscodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCodeRequest {
    /// Roher Zahlenwert; unbekannte Werte werden serverseitig abgelehnt
    pub code: i64,
}

/// Anruf starten
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Nur informativ; der Absender ergibt sich aus der Verbindung
    #[serde(rename = "self", default)]
    pub sender: Option<PeerRef>,
    pub target: PeerRef,
    pub room_id: RoomKey,
}

/// Aktualisierte Teilnehmerliste an einen Peer weiterreichen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendeesRequest {
    #[serde(rename = "self", default)]
    pub sender: Option<PeerRef>,
    pub target: PeerRef,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

/// Auflegen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HangupRequest {
    #[serde(rename = "self", default)]
    pub sender: Option<PeerRef>,
    #[serde(default)]
    pub target: Option<PeerRef>,
    #[serde(default)]
    pub room_id: Option<RoomKey>,
}

/// Anruf annehmen; `target` ist der urspruengliche Anrufer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    #[serde(rename = "self", default)]
    pub sender: Option<PeerRef>,
    pub target: PeerRef,
    #[serde(default)]
    pub room_id: Option<RoomKey>,
}

/// SDP-Offer oder -Answer an einen Peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpRelayRequest {
    #[serde(rename = "self", default)]
    pub sender: Option<PeerRef>,
    pub target: PeerRef,
    #[serde(default)]
    pub room_id: Option<RoomKey>,
    pub local_description: serde_json::Value,
}

/// ICE-Kandidat an einen Peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceRelayRequest {
    #[serde(rename = "self", default)]
    pub sender: Option<PeerRef>,
    pub target: PeerRef,
    #[serde(default)]
    pub room_id: Option<RoomKey>,
    pub ice: serde_json::Value,
}

/// Ping (in beide Richtungen)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden
    pub timestamp_ms: u64,
}

/// Pong-Antwort (spiegelt Timestamp zurueck)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub echo_timestamp_ms: u64,
    pub server_timestamp_ms: u64,
}

/// Alle Events die ein Client senden kann
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Connect(HandshakeAuth),
    StatusCode(StatusCodeRequest),
    PhoneCall(CallRequest),
    PhoneAttendees(AttendeesRequest),
    PhoneHangup(HangupRequest),
    PhoneAnswer(AnswerRequest),
    Offer(SdpRelayRequest),
    Answer(SdpRelayRequest),
    IceCandidate(IceRelayRequest),
    Ping(PingMessage),
    Pong(PongMessage),
}

impl ClientEvent {
    /// Event-Name wie auf dem Wire (fuer Logs und Metrik-Labels)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::StatusCode(_) => "status-code",
            Self::PhoneCall(_) => "phone-call",
            Self::PhoneAttendees(_) => "phone-attendees",
            Self::PhoneHangup(_) => "phone-hangup",
            Self::PhoneAnswer(_) => "phone-answer",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }
}

// ---------------------------------------------------------------------------
// Ausgehende Events (Relay -> Client)
// ---------------------------------------------------------------------------

/// Mitgliederliste eines Lobby-Raums
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListMessage {
    pub user_list: Vec<PeerRef>,
}

/// Mitgliederliste eines Call-Raums nach einer Annahme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinedMessage {
    /// Verbindung die gerade beigetreten ist
    pub socket_id: ConnectionId,
    pub user_list: Vec<PeerRef>,
}

/// Eingehender Anruf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallMessage {
    pub caller: PeerRef,
    pub room_id: RoomKey,
}

/// Ziel ist besetzt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyMessage {
    pub target: PeerRef,
    pub status_code: CallStatusCode,
}

/// Weitergereichte Teilnehmerliste
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendeesMessage {
    pub caller: PeerRef,
    pub attendees: Vec<Attendee>,
}

/// Ein Peer hat aufgelegt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HangupMessage {
    pub user: PeerRef,
}

/// Weitergereichte Session-Description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpMessage {
    pub local_description: serde_json::Value,
    pub user: PeerRef,
}

/// Weitergereichter ICE-Kandidat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceMessage {
    pub ice: serde_json::Value,
    pub user: PeerRef,
}

/// Alle Events die das Relay an Clients sendet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    UserList(UserListMessage),
    /// Call-Raum-Aktualisierung, auf dem Wire unter dem Namen `phone-answer`
    #[serde(rename = "phone-answer")]
    RoomJoined(RoomJoinedMessage),
    PhoneCall(IncomingCallMessage),
    PhoneBusy(BusyMessage),
    PhoneAttendees(AttendeesMessage),
    PhoneHangup(HangupMessage),
    Offer(SdpMessage),
    Answer(SdpMessage),
    IceCandidate(IceMessage),
    Ping(PingMessage),
    Pong(PongMessage),
}

impl ServerEvent {
    /// Erstellt eine Ping-Nachricht
    pub fn ping(timestamp_ms: u64) -> Self {
        Self::Ping(PingMessage { timestamp_ms })
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::Pong(PongMessage {
            echo_timestamp_ms,
            server_timestamp_ms,
        })
    }

    /// Event-Name wie auf dem Wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserList(_) => "user-list",
            Self::RoomJoined(_) => "phone-answer",
            Self::PhoneCall(_) => "phone-call",
            Self::PhoneBusy(_) => "phone-busy",
            Self::PhoneAttendees(_) => "phone-attendees",
            Self::PhoneHangup(_) => "phone-hangup",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
