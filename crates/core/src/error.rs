//! Fehlertypen fuer Relaycast
//!
//! Gemeinsame Fehler fuer Identitaeten und das Wire-Format. Die Crates
//! darueber definieren eigene Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Relaycast
pub type Result<T> = std::result::Result<T, RelaycastError>;

/// Gemeinsame Fehler im Relaycast-System
#[derive(Debug, Error)]
pub enum RelaycastError {
    // --- Identitaeten ---
    #[error("Ungueltige Identitaet: {0}")]
    UngueltigeIdentitaet(String),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Unbekannter Nachrichtentyp: {0}")]
    UnbekannterTyp(String),

    #[error("Nachricht zu gross: {groesse} Bytes (Maximum: {maximum} Bytes)")]
    NachrichtZuGross { groesse: usize, maximum: usize },

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl RelaycastError {
    /// Erstellt einen Fehler fuer eine ungueltige Nachricht
    pub fn nachricht(msg: impl Into<String>) -> Self {
        Self::UngueltigeNachricht(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler auf ein fehlerhaftes Frame
    /// zurueckgeht (Verbindung bleibt nutzbar)
    pub fn ist_frame_fehler(&self) -> bool {
        matches!(
            self,
            Self::UngueltigeNachricht(_) | Self::UnbekannterTyp(_) | Self::NachrichtZuGross { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = RelaycastError::UnbekannterTyp("chat".into());
        assert_eq!(e.to_string(), "Unbekannter Nachrichtentyp: chat");
    }

    #[test]
    fn frame_fehler_erkennung() {
        assert!(RelaycastError::nachricht("kaputt").ist_frame_fehler());
        assert!(RelaycastError::NachrichtZuGross {
            groesse: 10,
            maximum: 5
        }
        .ist_frame_fehler());
        assert!(!RelaycastError::Konfiguration("x".into()).ist_frame_fehler());
    }

    #[test]
    fn groessen_fehler_enthaelt_werte() {
        let e = RelaycastError::NachrichtZuGross {
            groesse: 2048,
            maximum: 1024,
        };
        assert!(e.to_string().contains("2048"));
        assert!(e.to_string().contains("1024"));
    }
}
