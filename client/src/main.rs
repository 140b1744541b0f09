//! Relaycast Client – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Client.

use anyhow::Result;
use relaycast_client::config::{ClientConfig, ENV_CONFIG, STANDARD_PFAD};
use relaycast_client::Client;
use relaycast_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var(ENV_CONFIG).unwrap_or_else(|_| STANDARD_PFAD.into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ClientConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        relay = %config.relay.url,
        "Relaycast Client wird initialisiert"
    );

    Client::neu(config).starten().await
}
