//! Presence-Verzeichnis – Wer uebertraegt gerade, mit wie vielen Zuschauern
//!
//! Clientseitige Projektion des Relay-Zustands. Wird bei jedem Snapshot
//! komplett ersetzt und zwischendurch durch Start/Stop-Events gepatcht.
//! Reihenfolge der Eintraege entspricht der Reihenfolge des Auftretens.

use relaycast_core::{DirectoryEntry, Identity};
use relaycast_protocol::ClientMessage;

use crate::peer::SignalSink;
use crate::reconciler::IdentityKeyed;

/// Broadcaster-Verzeichnis
///
/// Gehoert exklusiv der Signaling-Runtime, daher ohne Locks.
#[derive(Debug, Default)]
pub struct PresenceDirectory {
    entries: Vec<DirectoryEntry>,
}

impl PresenceDirectory {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fordert einen vollstaendigen Snapshot beim Relay an
    pub fn request_snapshot(&self, sink: &dyn SignalSink) {
        tracing::debug!("Broadcaster-Snapshot angefordert");
        sink.send(ClientMessage::GetBroadcasters);
    }

    /// Ersetzt das Verzeichnis durch einen Snapshot
    ///
    /// Zuschauerzahlen starten bei 0. Doppelte Identitaeten werden entfernt.
    pub fn apply_snapshot(&mut self, broadcasters: Vec<Identity>) {
        let mut entries: Vec<DirectoryEntry> = Vec::with_capacity(broadcasters.len());
        for identity in broadcasters {
            if entries.iter().any(|e| e.identity == identity) {
                tracing::debug!(identity = %identity, "Doppelter Eintrag im Snapshot");
                continue;
            }
            entries.push(DirectoryEntry::new(identity));
        }
        tracing::debug!(anzahl = entries.len(), "Broadcaster-Snapshot uebernommen");
        self.entries = entries;
    }

    /// Fuegt einen Broadcaster hinzu. Gibt false zurueck wenn er schon bekannt war.
    pub fn broadcast_started(&mut self, identity: Identity) -> bool {
        if self.contains(&identity) {
            return false;
        }
        tracing::info!(identity = %identity, "Uebertragung gestartet");
        self.entries.push(DirectoryEntry::new(identity));
        true
    }

    /// Entfernt einen Broadcaster. Gibt false zurueck wenn er nicht bekannt war.
    pub fn broadcast_stopped(&mut self, identity: &Identity) -> bool {
        let vorher = self.entries.len();
        self.entries.retain(|e| &e.identity != identity);
        let entfernt = self.entries.len() != vorher;
        if entfernt {
            tracing::info!(identity = %identity, "Uebertragung beendet");
        }
        entfernt
    }

    /// Setzt die Zuschauerzahl. Unbekannte Identitaeten werden ignoriert.
    pub fn viewer_count_update(&mut self, identity: &Identity, count: u32) -> bool {
        match self.entries.iter_mut().find(|e| &e.identity == identity) {
            Some(entry) => {
                entry.viewer_count = count;
                true
            }
            None => {
                tracing::debug!(identity = %identity, count, "Zuschauerzahl fuer unbekannten Broadcaster");
                false
            }
        }
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.entries.iter().any(|e| &e.identity == identity)
    }

    pub fn viewer_count(&self, identity: &Identity) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| &e.identity == identity)
            .map(|e| e.viewer_count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IdentityKeyed for PresenceDirectory {
    /// Benennt einen Eintrag um, die Zuschauerzahl bleibt erhalten
    ///
    /// Existiert `new` bereits, gewinnt der Eintrag von `old`.
    fn rekey(&mut self, old: &Identity, new: &Identity) -> bool {
        if old == new || !self.contains(old) {
            return false;
        }
        self.entries.retain(|e| &e.identity != new);
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.identity == old) {
            entry.identity = new.clone();
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn ids(namen: &[&str]) -> Vec<Identity> {
        namen.iter().map(|n| Identity::new(*n)).collect()
    }

    fn namen(dir: &PresenceDirectory) -> Vec<&str> {
        dir.entries().iter().map(|e| e.identity.as_str()).collect()
    }

    #[derive(Default)]
    struct Aufzeichnung(Mutex<Vec<ClientMessage>>);

    impl SignalSink for Aufzeichnung {
        fn send(&self, message: ClientMessage) {
            self.0.lock().push(message);
        }
    }

    #[test]
    fn snapshot_ersetzt_statt_zu_mischen() {
        let mut dir = PresenceDirectory::neu();
        dir.apply_snapshot(ids(&["a", "b"]));
        dir.apply_snapshot(ids(&["c"]));
        assert_eq!(namen(&dir), vec!["c"]);
    }

    #[test]
    fn snapshot_setzt_zaehler_zurueck() {
        let mut dir = PresenceDirectory::neu();
        dir.apply_snapshot(ids(&["a"]));
        dir.viewer_count_update(&Identity::new("a"), 7);
        dir.apply_snapshot(ids(&["a"]));
        assert_eq!(dir.viewer_count(&Identity::new("a")), Some(0));
    }

    #[test]
    fn snapshot_entfernt_duplikate() {
        let mut dir = PresenceDirectory::neu();
        dir.apply_snapshot(ids(&["a", "b", "a"]));
        assert_eq!(namen(&dir), vec!["a", "b"]);
    }

    #[test]
    fn start_ist_idempotent() {
        let mut dir = PresenceDirectory::neu();
        assert!(dir.broadcast_started(Identity::new("a")));
        assert!(!dir.broadcast_started(Identity::new("a")));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn stop_entfernt_eintrag() {
        let mut dir = PresenceDirectory::neu();
        dir.apply_snapshot(ids(&["a", "b"]));
        assert!(dir.broadcast_stopped(&Identity::new("a")));
        assert!(!dir.broadcast_stopped(&Identity::new("a")));
        assert_eq!(namen(&dir), vec!["b"]);
    }

    #[test]
    fn zaehler_fuer_unbekannte_wird_ignoriert() {
        let mut dir = PresenceDirectory::neu();
        assert!(!dir.viewer_count_update(&Identity::new("x"), 3));
        assert!(dir.is_empty());
    }

    #[test]
    fn umbenennen_behaelt_zaehler() {
        let mut dir = PresenceDirectory::neu();
        dir.apply_snapshot(ids(&["alice", "bob"]));
        dir.viewer_count_update(&Identity::new("alice"), 3);

        assert!(dir.rekey(&Identity::new("alice"), &Identity::new("alice2")));
        assert_eq!(namen(&dir), vec!["alice2", "bob"]);
        assert_eq!(dir.viewer_count(&Identity::new("alice2")), Some(3));
        assert!(!dir.contains(&Identity::new("alice")));
    }

    #[test]
    fn umbenennen_auf_vorhandenen_namen() {
        let mut dir = PresenceDirectory::neu();
        dir.apply_snapshot(ids(&["alice", "alice2"]));
        dir.viewer_count_update(&Identity::new("alice"), 2);

        assert!(dir.rekey(&Identity::new("alice"), &Identity::new("alice2")));
        assert_eq!(namen(&dir), vec!["alice2"]);
        assert_eq!(dir.viewer_count(&Identity::new("alice2")), Some(2));
    }

    #[test]
    fn umbenennen_unbekannter_identitaet() {
        let mut dir = PresenceDirectory::neu();
        assert!(!dir.rekey(&Identity::new("x"), &Identity::new("y")));
    }

    #[test]
    fn snapshot_anfrage_sendet_get_broadcasters() {
        let dir = PresenceDirectory::neu();
        let sink = Aufzeichnung::default();
        dir.request_snapshot(&sink);
        assert_eq!(*sink.0.lock(), vec![ClientMessage::GetBroadcasters]);
    }
}
