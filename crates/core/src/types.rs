//! Gemeinsame Identifikationstypen fuer Relaycast
//!
//! Benutzernamen und Peer-Session-IDs verwenden das Newtype-Pattern, damit
//! eine Identitaet nicht mit beliebigen Strings verwechselt werden kann.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use uuid::Uuid;

use crate::error::{RelaycastError, Result};

/// Maximale Laenge eines Benutzernamens (entspricht der Relay-Datenbank)
pub const MAX_IDENTITAET_LAENGE: usize = 100;

/// Relay-weit eindeutiger Benutzername eines Teilnehmers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Erstellt eine Identitaet ohne Pruefung (Werte vom Relay)
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Prueft eine vom Benutzer eingegebene Identitaet
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RelaycastError::UngueltigeIdentitaet(
                "Benutzername darf nicht leer sein".into(),
            ));
        }
        if name.len() > MAX_IDENTITAET_LAENGE {
            return Err(RelaycastError::UngueltigeIdentitaet(format!(
                "Benutzername laenger als {} Zeichen",
                MAX_IDENTITAET_LAENGE
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Gibt den Benutzernamen als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Stabile ID einer Peer-Session
///
/// Callbacks der Peer-Verbindung tragen diese ID statt der Identitaet,
/// damit ein Umbenennen laufende Callbacks nicht fehlleitet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerSessionId(pub Uuid);

impl PeerSessionId {
    /// Erstellt eine neue zufaellige PeerSessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for PeerSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

/// Angemeldete Session: Token vom Auth-Service plus eigene Identitaet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub auth_token: String,
    pub local_identity: Identity,
}

impl Session {
    pub fn new(auth_token: impl Into<String>, local_identity: Identity) -> Self {
        Self {
            auth_token: auth_token.into(),
            local_identity,
        }
    }
}

/// Verbindungszustand des Relay-Kanals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "getrennt",
            Self::Connecting => "verbinde",
            Self::Open => "verbunden",
        };
        f.write_str(s)
    }
}

/// Eintrag im Broadcaster-Verzeichnis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub identity: Identity,
    pub viewer_count: u32,
}

impl DirectoryEntry {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            viewer_count: 0,
        }
    }
}
