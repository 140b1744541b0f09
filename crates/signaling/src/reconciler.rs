//! Identitaets-Abgleich bei Umbenennung
//!
//! Meldet das Relay `username_changed(old, new)`, werden Peer-Sessions,
//! Verzeichnis, Vorschau-Tabelle und die eigene Session in einem einzigen
//! synchronen Schritt umgeschluesselt. Die Funktion haelt alle Ziele als
//! `&mut` gleichzeitig, es gibt keinen Await-Punkt dazwischen. Kein anderer
//! Handler kann einen halb umbenannten Zustand sehen.

use relaycast_core::Identity;

use crate::transport::RelayTransport;

/// Zustand der nach Identitaet geschluesselt ist
pub trait IdentityKeyed {
    /// Schluesselt `old` auf `new` um. Gibt true zurueck wenn `old` existierte.
    fn rekey(&mut self, old: &Identity, new: &Identity) -> bool;
}

/// Alles was bei einer Umbenennung mitgezogen wird
pub struct RenameTargets<'a> {
    pub peers: &'a mut dyn IdentityKeyed,
    pub directory: &'a mut dyn IdentityKeyed,
    pub previews: &'a mut dyn IdentityKeyed,
    pub transport: &'a RelayTransport,
}

/// Was bei einer Umbenennung betroffen war
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenameReport {
    pub peer: bool,
    pub directory: bool,
    pub preview: bool,
    /// `old` war die eigene Identitaet
    pub local: bool,
}

impl RenameReport {
    pub fn betroffen(&self) -> bool {
        self.peer || self.directory || self.preview || self.local
    }
}

/// Fuehrt die Umbenennung in allen Zielen durch
pub fn reconcile(targets: RenameTargets<'_>, old: &Identity, new: &Identity) -> RenameReport {
    if old == new {
        return RenameReport::default();
    }
    let report = RenameReport {
        peer: targets.peers.rekey(old, new),
        directory: targets.directory.rekey(old, new),
        preview: targets.previews.rekey(old, new),
        local: targets.transport.rename_local(old, new),
    };
    tracing::info!(
        old = %old,
        new = %new,
        peer = report.peer,
        verzeichnis = report.directory,
        vorschau = report.preview,
        lokal = report.local,
        "Identitaet umbenannt"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::{PreviewKind, PreviewTable};
    use crate::presence::PresenceDirectory;
    use crate::transport::TransportConfig;
    use std::collections::HashSet;

    #[derive(Default)]
    struct Schluessel(HashSet<Identity>);

    impl IdentityKeyed for Schluessel {
        fn rekey(&mut self, old: &Identity, new: &Identity) -> bool {
            if self.0.remove(old) {
                self.0.insert(new.clone());
                true
            } else {
                false
            }
        }
    }

    #[test]
    fn alle_ziele_werden_umbenannt() {
        let alice = Identity::new("alice");
        let alice2 = Identity::new("alice2");

        let mut peers = Schluessel::default();
        peers.0.insert(alice.clone());
        let mut dir = PresenceDirectory::neu();
        dir.apply_snapshot(vec![alice.clone()]);
        dir.viewer_count_update(&alice, 3);
        let mut previews = PreviewTable::neu();
        previews.insert(alice.clone(), PreviewKind::Remote);
        let transport = RelayTransport::mit_websocket(TransportConfig::default());

        let report = reconcile(
            RenameTargets {
                peers: &mut peers,
                directory: &mut dir,
                previews: &mut previews,
                transport: &transport,
            },
            &alice,
            &alice2,
        );

        assert!(report.peer && report.directory && report.preview);
        assert!(!report.local);
        assert!(peers.0.contains(&alice2) && !peers.0.contains(&alice));
        assert_eq!(dir.viewer_count(&alice2), Some(3));
        assert_eq!(previews.get(&alice2), Some(PreviewKind::Remote));
    }

    #[test]
    fn gleicher_name_ist_kein_abgleich() {
        let alice = Identity::new("alice");
        let mut peers = Schluessel::default();
        peers.0.insert(alice.clone());
        let mut dir = PresenceDirectory::neu();
        let mut previews = PreviewTable::neu();
        let transport = RelayTransport::mit_websocket(TransportConfig::default());

        let report = reconcile(
            RenameTargets {
                peers: &mut peers,
                directory: &mut dir,
                previews: &mut previews,
                transport: &transport,
            },
            &alice,
            &alice,
        );
        assert!(!report.betroffen());
    }
}
