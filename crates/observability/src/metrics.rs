//! Prometheus-kompatible Metriken fuer callrelay
//!
//! Registrierte Metriken:
//! - `callrelay_connected_clients` – Gauge: Authentifizierte Verbindungen
//! - `callrelay_invites_total` – Counter: Zugestellte Anrufe
//! - `callrelay_busy_total` – Counter: Besetzt-Antworten
//! - `callrelay_answers_total` – Counter: Angenommene Anrufe
//! - `callrelay_hangups_total` – Counter: Auflegen
//! - `callrelay_ringing_timeouts_total` – Counter: Abgelaufene Klingelzeiten
//! - `callrelay_relayed_total` – Counter: Weitergeleitete Events (event)
//! - `callrelay_dropped_total` – Counter: Verworfene Events (reason)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle callrelay-Prometheus-Metriken
///
/// Jede Instanz besitzt eine eigene Registry, damit Tests und mehrere
/// Server im selben Prozess sich nicht gegenseitig beeinflussen.
#[derive(Clone)]
pub struct RelayMetrics {
    pub registry: Arc<Registry>,

    pub connected_clients: IntGauge,

    // Anruf-Lebenszyklus
    pub invites_total: IntCounter,
    pub busy_total: IntCounter,
    pub answers_total: IntCounter,
    pub hangups_total: IntCounter,
    pub ringing_timeouts_total: IntCounter,

    // Routing
    pub relayed_total: IntCounterVec,
    pub dropped_total: IntCounterVec,
}

fn zaehler(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl RelayMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = IntGauge::with_opts(Opts::new(
            "callrelay_connected_clients",
            "Anzahl authentifizierter Verbindungen",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        // --- Anruf-Lebenszyklus ---
        let invites_total = zaehler(
            &registry,
            "callrelay_invites_total",
            "Gesamtanzahl zugestellter Anrufe",
        )?;
        let busy_total = zaehler(
            &registry,
            "callrelay_busy_total",
            "Gesamtanzahl Besetzt-Antworten",
        )?;
        let answers_total = zaehler(
            &registry,
            "callrelay_answers_total",
            "Gesamtanzahl angenommener Anrufe",
        )?;
        let hangups_total = zaehler(
            &registry,
            "callrelay_hangups_total",
            "Gesamtanzahl aufgelegter Anrufe",
        )?;
        let ringing_timeouts_total = zaehler(
            &registry,
            "callrelay_ringing_timeouts_total",
            "Gesamtanzahl abgelaufener Klingelzeiten",
        )?;

        // --- Routing ---
        let relayed_total = IntCounterVec::new(
            Opts::new(
                "callrelay_relayed_total",
                "Gesamtanzahl weitergeleiteter Events",
            ),
            &["event"],
        )?;
        registry.register(Box::new(relayed_total.clone()))?;

        let dropped_total = IntCounterVec::new(
            Opts::new("callrelay_dropped_total", "Gesamtanzahl verworfener Events"),
            &["reason"],
        )?;
        registry.register(Box::new(dropped_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            invites_total,
            busy_total,
            answers_total,
            hangups_total,
            ringing_timeouts_total,
            relayed_total,
            dropped_total,
        })
    }

    /// Zaehlt ein weitergeleitetes Event
    pub fn weitergeleitet(&self, event: &str) {
        self.relayed_total.with_label_values(&[event]).inc();
    }

    /// Zaehlt ein verworfenes Event mit Grund
    pub fn verworfen(&self, grund: &str) {
        self.dropped_total.with_label_values(&[grund]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelayMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RelayMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
