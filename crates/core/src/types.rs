//! Gemeinsame Identifikationstypen fuer callrelay
//!
//! Verbindungen und Raeume verwenden das Newtype-Pattern, damit eine
//! Connection-ID nie versehentlich als Raumname verwendet wird.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Verbindungs-ID (vom Transport vergeben, stabil fuer die Lebensdauer)
///
/// Auf dem Wire erscheint sie als `socketId` (UUID-String).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Name eines Raums
///
/// Lobby-Raeume (Auth-Code) und Call-Raeume (Room-ID des Anrufs) teilen sich
/// denselben Namensraum; sie unterscheiden sich nur durch Konvention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(pub String);

impl RoomKey {
    /// Erstellt einen RoomKey aus einem beliebigen String
    pub fn neu(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Gibt den Raumnamen als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leere Namen sind auf dem Wire erlaubt, aber kein gueltiger Raum
    pub fn ist_leer(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for RoomKey {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for RoomKey {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
