//! Client-Events fuer die UI-Schicht
//!
//! Die Signaling-Runtime meldet jede sichtbare Zustandsaenderung als
//! `ClientEvent`. Die UI abonniert diese Events und rendert daraus.

use crate::types::{ConnectionState, DirectoryEntry, Identity};
use serde::{Deserialize, Serialize};

/// Grund warum die eigene Uebertragung beendet wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastEndGrund {
    /// Benutzer hat gestoppt
    Benutzer,
    /// Capture wurde extern beendet (z.B. Freigabe im OS beendet)
    CaptureBeendet,
    /// Abmeldung
    Logout,
}

/// Alle Ereignisse die an die UI gemeldet werden
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    // --- Verbindung ---
    /// Zustand des Relay-Kanals hat sich geaendert
    VerbindungGeaendert { state: ConnectionState },

    // --- Verzeichnis ---
    /// Broadcaster-Verzeichnis hat sich geaendert (vollstaendige Liste)
    VerzeichnisGeaendert { entries: Vec<DirectoryEntry> },
    /// Zuschauerzahl eines Broadcasters hat sich geaendert
    ZuschauerGeaendert { identity: Identity, count: u32 },

    // --- Eigene Uebertragung ---
    /// Eigene Uebertragung gestartet
    BroadcastGestartet { title: Option<String> },
    /// Eigene Uebertragung beendet
    BroadcastBeendet { grund: BroadcastEndGrund },

    // --- Zuschauen ---
    /// Medien eines Broadcasters werden empfangen
    RemoteMedienGestartet { identity: Identity },
    /// Vorschau eines Broadcasters wurde entfernt
    VorschauEntfernt { identity: Identity },

    // --- Identitaet ---
    /// Ein Teilnehmer wurde umbenannt (`local` = eigene Identitaet)
    IdentitaetUmbenannt {
        old: Identity,
        new: Identity,
        local: bool,
    },
}

/// Hook zum Auffrischen des Uebertragungs-Verlaufs
///
/// Wird nach jedem `broadcast_stopped` aufgerufen. Die Implementierung
/// darf nicht blockieren und meldet Fehler selbst.
pub trait HistoryRefresh: Send + Sync {
    fn refresh(&self);
}
