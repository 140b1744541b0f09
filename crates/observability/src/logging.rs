//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Konfigurationsdatei (`[logging]`) oder
//! Umgebungsvariable, die Umgebung hat Vorrang:
//! - `RC_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder
//!   `relaycast_signaling=debug,info`), Standard: info
//! - `RC_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Die Ausgabe geht nach stderr, stdout bleibt der Konsole vorbehalten.

use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LEVEL: &str = "RC_LOG_LEVEL";
pub const ENV_FORMAT: &str = "RC_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Ungueltiges Log-Format: {0} (erlaubt: text, json)")]
    Format(String),

    #[error("Ungueltiger Log-Filter '{direktive}': {grund}")]
    Filter { direktive: String, grund: String },

    #[error("Logging bereits initialisiert")]
    BereitsInitialisiert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            andere => Err(LoggingError::Format(andere.to_string())),
        }
    }
}

/// `[logging]`-Abschnitt der Konfiguration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Wendet Umgebungswerte auf die Konfiguration an
    ///
    /// `lookup` liefert den Wert einer Umgebungsvariable, im Betrieb
    /// `std::env::var(..).ok()`.
    pub fn mit_umgebung<F>(mut self, lookup: F) -> Result<Self, LoggingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LEVEL).filter(|l| !l.trim().is_empty()) {
            self.level = level;
        }
        if let Some(format) = lookup(ENV_FORMAT).filter(|f| !f.trim().is_empty()) {
            self.format = format.parse()?;
        }
        Ok(self)
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        EnvFilter::try_new(&self.level).map_err(|e| LoggingError::Filter {
            direktive: self.level.clone(),
            grund: e.to_string(),
        })
    }
}

/// Initialisiert das Logging-System
///
/// Umgebungsvariablen ueberschreiben `config`. Darf nur einmal pro Prozess
/// aufgerufen werden.
pub fn logging_initialisieren(config: &LoggingConfig) -> Result<(), LoggingError> {
    let config = config
        .clone()
        .mit_umgebung(|name| std::env::var(name).ok())?;
    let filter = config.filter()?;

    let ergebnis = match config.format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    ergebnis.map_err(|_| LoggingError::BereitsInitialisiert)?;

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialisiert");
    Ok(())
}
