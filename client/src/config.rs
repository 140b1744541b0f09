//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, sodass der Client gegen einen lokalen Relay ohne
//! Konfigurationsdatei laeuft.

use relaycast_observability::LoggingConfig;
use relaycast_rtc::{CaptureConfig, RtcConfig};
use relaycast_signaling::{ReconnectPolicy, TransportConfig};
use serde::Deserialize;
use std::time::Duration;

/// Umgebungsvariable mit dem Pfad der Konfigurationsdatei
pub const ENV_CONFIG: &str = "RELAYCAST_CONFIG";

/// Standard-Pfad der Konfigurationsdatei
pub const STANDARD_PFAD: &str = "relaycast.toml";

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub relay: RelayEinstellungen,
    pub reconnect: ReconnectEinstellungen,
    pub api: ApiEinstellungen,
    pub rtc: RtcConfig,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
    pub account: AccountEinstellungen,
}

/// Relay-Kanal
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Basis-URL, der Kanal liegt unter `<url>/ws/<token>`
    pub url: String,
    /// Maximale Groesse eines Frames in Bytes
    pub max_frame_bytes: usize,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        let standard = TransportConfig::default();
        Self {
            url: standard.relay_url,
            max_frame_bytes: standard.max_frame_size,
        }
    }
}

/// Reconnect nach unerwartetem Verbindungsabbruch
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectEinstellungen {
    pub delay_ms: u64,
    /// Faktor pro Fehlversuch (1.0 = fester Abstand)
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Zufaellige Abweichung als Anteil (0.0 bis 1.0)
    pub jitter: f64,
    /// Leer = unbegrenzt
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectEinstellungen {
    fn default() -> Self {
        let standard = ReconnectPolicy::default();
        Self {
            delay_ms: dauer_ms(standard.delay),
            multiplier: standard.multiplier,
            max_delay_ms: dauer_ms(standard.max_delay),
            jitter: standard.jitter,
            max_attempts: standard.max_attempts,
        }
    }
}

impl ReconnectEinstellungen {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_millis(self.delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
            max_attempts: self.max_attempts,
        }
    }
}

/// Auth- und History-Service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiEinstellungen {
    pub base_url: String,
    /// Eintraege pro Verlaufsseite
    pub history_page_size: u32,
}

impl Default for ApiEinstellungen {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            history_page_size: relaycast_api::STANDARD_SEITE,
        }
    }
}

/// Zugangsdaten. Ohne Passwort wird beim Start nachgefragt.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountEinstellungen {
    pub username: String,
    pub password: Option<String>,
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
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

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            relay_url: self.relay.url.clone(),
            max_frame_size: self.relay.max_frame_bytes,
            reconnect: self.reconnect.policy(),
        }
    }
}

fn dauer_ms(dauer: Duration) -> u64 {
    u64::try_from(dauer.as_millis()).unwrap_or(u64::MAX)
}
