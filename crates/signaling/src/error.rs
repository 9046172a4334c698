//! Fehlertypen fuer den Signaling-Service

use callrelay_core::RelayError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
///
/// Verworfene Events (unbekanntes Ziel, fehlende Authentifizierung) sind
/// keine Fehler; sie werden geloggt und gezaehlt.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Fehler aus dem Relay-Kern
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Server ist voll
    #[error("Server ist voll")]
    ServerVoll,
}

impl SignalingError {
    /// Gibt true zurueck wenn nur die eine Verbindung betroffen ist
    pub fn ist_verbindungslokal(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Relay(e) => e.ist_verbindungslokal(),
            Self::ServerVoll => false,
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_fehler_wird_durchgereicht() {
        let e: SignalingError = RelayError::Zeitlimit("keepalive".into()).into();
        assert_eq!(e.to_string(), "Zeitlimit ueberschritten: keepalive");
        assert!(e.ist_verbindungslokal());
    }

    #[test]
    fn io_fehler_konvertierung() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "weg");
        let e: SignalingError = io.into();
        assert!(matches!(e, SignalingError::Io(_)));
        assert!(!SignalingError::ServerVoll.ist_verbindungslokal());
    }
}
