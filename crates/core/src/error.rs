//! Fehlertypen fuer callrelay
//!
//! Zentraler Fehler-Enum fuer Zustaende, die ueber Crate-Grenzen hinweg
//! gemeldet werden. Untermodule definieren eigene Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer callrelay
pub type Result<T> = std::result::Result<T, RelayError>;

/// Fehler im callrelay-System
///
/// "Ziel nicht gefunden" und "besetzt" sind bewusst keine Fehler, sondern
/// regulaere Ergebnisse der jeweiligen Operation.
#[derive(Debug, Error)]
pub enum RelayError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Ungueltiger Statuscode: {0}")]
    UngueltigerStatus(i64),

    // --- Zustand ---
    #[error("Ungueltiger Zustandsuebergang: {0}")]
    UngueltigerUebergang(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl RelayError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler nur die eine Verbindung betrifft
    pub fn ist_verbindungslokal(&self) -> bool {
        matches!(
            self,
            Self::Getrennt(_) | Self::Zeitlimit(_) | Self::UngueltigeNachricht(_)
        )
    }
}
