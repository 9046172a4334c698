//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::Context;
use callrelay_observability::logging::{log_format_gueltig, log_level_gueltig};
use callrelay_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const ENV_CONFIG_PFAD: &str = "CALLRELAY_CONFIG";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Signaling-Einstellungen (Keepalive, Klingelzeit)
    pub signaling: SignalingEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "callrelay".into(),
            max_clients: 512,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer TCP und Observability
    pub bind_adresse: String,
    /// Port fuer Signaling-Verbindungen
    pub tcp_port: u16,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_bytes: usize,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 7000,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

/// Signaling-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer stille Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Klingelzeit in Sekunden (nicht gesetzt = unbegrenzt)
    pub klingel_timeout_sek: Option<u64>,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        Self {
            keepalive_sek: 25,
            verbindungs_timeout_sek: 60,
            klingel_timeout_sek: None,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Ausdruck
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Parst eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(inhalt)?;
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Werte, die serde nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.server.max_clients > 0, "server.max_clients muss > 0 sein");
        anyhow::ensure!(
            self.netzwerk.max_frame_bytes > 0,
            "netzwerk.max_frame_bytes muss > 0 sein"
        );
        anyhow::ensure!(
            self.signaling.keepalive_sek > 0,
            "signaling.keepalive_sek muss > 0 sein"
        );
        anyhow::ensure!(
            self.signaling.verbindungs_timeout_sek > self.signaling.keepalive_sek,
            "signaling.verbindungs_timeout_sek muss groesser als keepalive_sek sein"
        );
        if let Some(klingel) = self.signaling.klingel_timeout_sek {
            anyhow::ensure!(klingel > 0, "signaling.klingel_timeout_sek muss > 0 sein");
        }
        anyhow::ensure!(
            log_level_gueltig(&self.logging.level),
            "logging.level '{}' ist ungueltig",
            self.logging.level
        );
        anyhow::ensure!(
            log_format_gueltig(&self.logging.format),
            "logging.format '{}' ist ungueltig (text|json)",
            self.logging.format
        );
        Ok(())
    }

    /// Gibt die Bind-Adresse fuer Signaling-Verbindungen zurueck
    pub fn tcp_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let adresse = format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port);
        adresse
            .parse()
            .with_context(|| format!("Ungueltige TCP-Bind-Adresse '{adresse}'"))
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let adresse = format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port);
        adresse
            .parse()
            .with_context(|| format!("Ungueltige Observability-Bind-Adresse '{adresse}'"))
    }

    /// Leitet die Konfiguration des Signaling-Service ab
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            max_frame_bytes: self.netzwerk.max_frame_bytes,
            keepalive_sek: self.signaling.keepalive_sek,
            verbindungs_timeout_sek: self.signaling.verbindungs_timeout_sek,
            klingel_timeout_sek: self.signaling.klingel_timeout_sek,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_clients, 512);
        assert_eq!(cfg.netzwerk.tcp_port, 7000);
        assert_eq!(cfg.signaling.klingel_timeout_sek, None);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tcp_bind_adresse().unwrap().to_string(), "0.0.0.0:7000");
        assert_eq!(
            cfg.observability_bind_adresse().unwrap().to_string(),
            "0.0.0.0:9300"
        );
    }

    #[test]
    fn ungueltige_bind_adresse() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein-host".into();
        assert!(cfg.tcp_bind_adresse().is_err());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Praxis Nord"
            max_clients = 100

            [signaling]
            klingel_timeout_sek = 45
        "#;
        let cfg = ServerConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.server.name, "Praxis Nord");
        assert_eq!(cfg.server.max_clients, 100);
        assert_eq!(cfg.signaling.klingel_timeout_sek, Some(45));
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.tcp_port, 7000);
        assert_eq!(cfg.signaling.keepalive_sek, 25);
    }

    #[test]
    fn signaling_config_uebernimmt_werte() {
        let cfg = ServerConfig::aus_toml("[signaling]\nklingel_timeout_sek = 30\n").unwrap();
        let sig = cfg.signaling_config();
        assert_eq!(sig.klingel_timeout_sek, Some(30));
        assert_eq!(sig.max_clients, 512);
        assert_eq!(sig.max_frame_bytes, 1024 * 1024);
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        assert!(ServerConfig::aus_toml("[server]\nmax_clients = 0\n").is_err());
        assert!(ServerConfig::aus_toml("[signaling]\nkeepalive_sek = 90\n").is_err());
        assert!(ServerConfig::aus_toml("[signaling]\nklingel_timeout_sek = 0\n").is_err());
        assert!(ServerConfig::aus_toml("[netzwerk]\ntcp_port = \"abc\"\n").is_err());
        assert!(ServerConfig::aus_toml("[logging]\nformat = \"xml\"\n").is_err());
        assert!(ServerConfig::aus_toml("[logging]\nlevel = \"laut\"\n").is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/gibt/es/nicht/callrelay.toml").unwrap();
        assert_eq!(cfg.netzwerk.tcp_port, 7000);
    }
}
