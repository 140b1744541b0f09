//! Wire-Format fuer den Relay-Kanal
//!
//! Jede Nachricht ist genau ein WebSocket-Text-Frame mit einem JSON-Objekt.
//!
//! ## Frame-Format
//!
//! ```text
//! { "type": "<kind>", ...felder der Nachricht... }
//! ```
//!
//! Vor der eigentlichen Deserialisierung wird der `type` gegen die bekannten
//! Nachrichtentypen geprueft. Unbekannte Typen werden explizit abgelehnt
//! statt still ignoriert. Maximale Frame-Groesse ist konfigurierbar
//! (Standard: 1 MB).

use relaycast_core::{RelaycastError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::control::MessageKind;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Name des Diskriminator-Felds
pub const TYPE_FIELD: &str = "type";

// ---------------------------------------------------------------------------
// TextCodec
// ---------------------------------------------------------------------------

/// Codec fuer JSON-Text-Frames
///
/// Funktioniert fuer beide Richtungen: der Client kodiert `ClientMessage`
/// und dekodiert `ServerMessage`, ein Relay (oder Test-Relay) umgekehrt.
#[derive(Debug, Clone)]
pub struct TextCodec {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
}

impl TextCodec {
    /// Erstellt einen neuen `TextCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `TextCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Serialisiert eine Nachricht in einen Text-Frame
    pub fn encode<M>(&self, message: &M) -> Result<String>
    where
        M: Serialize + MessageKind,
    {
        let json = serde_json::to_string(message).map_err(|e| {
            RelaycastError::nachricht(format!(
                "JSON-Serialisierung fehlgeschlagen ({}): {}",
                message.kind(),
                e
            ))
        })?;

        if json.len() > self.max_frame_size {
            return Err(RelaycastError::NachrichtZuGross {
                groesse: json.len(),
                maximum: self.max_frame_size,
            });
        }

        Ok(json)
    }

    /// Dekodiert einen Text-Frame
    ///
    /// # Fehler
    /// - `NachrichtZuGross` wenn der Frame das Limit ueberschreitet
    /// - `UnbekannterTyp` wenn `type` keinem bekannten Nachrichtentyp entspricht
    /// - `UngueltigeNachricht` bei kaputtem JSON oder fehlenden Feldern
    pub fn decode<M>(&self, frame: &str) -> Result<M>
    where
        M: DeserializeOwned + MessageKind,
    {
        if frame.len() > self.max_frame_size {
            return Err(RelaycastError::NachrichtZuGross {
                groesse: frame.len(),
                maximum: self.max_frame_size,
            });
        }

        let value: serde_json::Value = serde_json::from_str(frame).map_err(|e| {
            RelaycastError::nachricht(format!("JSON-Deserialisierung fehlgeschlagen: {}", e))
        })?;

        let kind = value
            .get(TYPE_FIELD)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| RelaycastError::nachricht("Feld 'type' fehlt"))?;

        if !M::KINDS.contains(&kind) {
            return Err(RelaycastError::UnbekannterTyp(kind.to_string()));
        }
        let kind = kind.to_string();

        serde_json::from_value(value).map_err(|e| {
            RelaycastError::nachricht(format!("Ungueltige '{}'-Nachricht: {}", kind, e))
        })
    }
}

impl Default for TextCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
