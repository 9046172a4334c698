//! callrelay-server – Bibliotheks-Root
//!
//! Deklariert die Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use anyhow::Result;
use callrelay_observability::{observability_server_starten, RelayMetrics};
use callrelay_signaling::{SignalingServer, SignalingState};
use config::ServerConfig;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctrl_c = async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown-Signal empfangen, Server wird beendet"),
                Err(e) => tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht registriert werden"),
            }
            let _ = shutdown_tx.send(true);
        };
        tokio::spawn(ctrl_c);

        self.starten_mit_shutdown(shutdown_rx).await
    }

    /// Startet alle Server-Subsysteme und laeuft bis `shutdown_rx` auf
    /// `true` wechselt
    ///
    /// Reihenfolge:
    /// 1. Metriken und Signaling-Zustand anlegen
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. TCP-Listener starten (Signaling)
    pub async fn starten_mit_shutdown(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let tcp_adresse = self.config.tcp_bind_adresse()?;
        let metriken = RelayMetrics::neu()?;
        let state = SignalingState::neu(self.config.signaling_config(), metriken.clone());

        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %tcp_adresse,
            max_clients = self.config.server.max_clients,
            klingel_timeout_sek = ?self.config.signaling.klingel_timeout_sek,
            "Server startet"
        );

        let observability = if self.config.observability.aktiviert {
            let adresse = self.config.observability_bind_adresse()?;
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(adresse, metriken, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }))
        } else {
            tracing::info!("Observability-Server deaktiviert");
            None
        };

        SignalingServer::neu(state, tcp_adresse)
            .starten(shutdown_rx)
            .await?;

        if let Some(handle) = observability {
            let _ = handle.await;
        }

        tracing::info!("Server beendet");
        Ok(())
    }
}
