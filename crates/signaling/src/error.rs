//! Fehlertypen fuer den Signaling-Service
//!
//! Nur `MediaAcquisition`, `AlreadyWatching` und die Rollen-Fehler erreichen
//! die UI. Transport- und Negotiation-Fehler werden lokal behandelt und
//! geloggt.

use relaycast_core::{Identity, RelaycastError};
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Kamera/Mikrofon verweigert oder nicht verfuegbar
    #[error("Medien-Capture fehlgeschlagen: {0}")]
    MediaAcquisition(String),

    /// Fuer diese Identitaet existiert bereits eine Peer-Session
    #[error("Uebertragung von {0} wird bereits angesehen")]
    AlreadyWatching(Identity),

    /// Eigene Uebertragung laeuft bereits
    #[error("Eigene Uebertragung laeuft bereits")]
    AlreadyBroadcasting,

    /// Eigene Uebertragung kann nicht angesehen werden
    #[error("Eigene Uebertragung kann nicht angesehen werden")]
    SelfWatch,

    /// Antwort oder Kandidat fuer eine nicht (mehr) existierende Session
    #[error("Veraltete Signaling-Nachricht '{kind}' von {from}")]
    StaleSignalingMessage { kind: &'static str, from: Identity },

    /// Relay-Kanal ist nicht offen
    #[error("Relay-Kanal nicht verfuegbar")]
    TransportUnavailable,

    /// Description oder Kandidat wurde vom Peer-Transport abgelehnt
    #[error("Negotiation fehlgeschlagen: {0}")]
    Negotiation(String),

    /// Abgelehntes Frame (unbekannter Typ, kaputtes JSON, zu gross)
    #[error("Protokollfehler: {0}")]
    Protocol(#[from] RelaycastError),

    /// WebSocket-Fehler (Verbindungsaufbau, Lesen, Schreiben)
    #[error("WebSocket-Fehler: {0}")]
    WebSocket(String),

    /// Keine Session vorhanden (nicht angemeldet)
    #[error("Nicht angemeldet")]
    NotLoggedIn,

    /// Die Signaling-Runtime laeuft nicht mehr
    #[error("Signaling-Runtime beendet")]
    RuntimeClosed,
}

impl SignalingError {
    /// Erstellt einen Negotiation-Fehler
    pub fn negotiation(msg: impl std::fmt::Display) -> Self {
        Self::Negotiation(msg.to_string())
    }

    /// Erstellt einen Capture-Fehler
    pub fn capture(msg: impl std::fmt::Display) -> Self {
        Self::MediaAcquisition(msg.to_string())
    }

    /// Gibt true zurueck wenn der Fehler an die UI gemeldet werden soll
    pub fn fuer_ui(&self) -> bool {
        matches!(
            self,
            Self::MediaAcquisition(_)
                | Self::AlreadyWatching(_)
                | Self::AlreadyBroadcasting
                | Self::SelfWatch
                | Self::NotLoggedIn
                | Self::RuntimeClosed
        )
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
