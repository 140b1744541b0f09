//! Vorschau-Tabelle – Welche Videos die UI gerade anzeigt
//!
//! Pro Identitaet hoechstens eine Vorschau: die eigene Capture oder der
//! empfangene Stream eines Broadcasters.

use relaycast_core::Identity;
use std::collections::HashMap;

use crate::reconciler::IdentityKeyed;

/// Herkunft einer Vorschau
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    /// Eigene Capture
    Lokal,
    /// Empfangener Stream
    Remote,
}

#[derive(Debug, Default)]
pub struct PreviewTable {
    previews: HashMap<Identity, PreviewKind>,
}

impl PreviewTable {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: Identity, kind: PreviewKind) {
        self.previews.insert(identity, kind);
    }

    pub fn remove(&mut self, identity: &Identity) -> Option<PreviewKind> {
        self.previews.remove(identity)
    }

    pub fn get(&self, identity: &Identity) -> Option<PreviewKind> {
        self.previews.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.previews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previews.is_empty()
    }

    pub fn clear(&mut self) {
        self.previews.clear();
    }
}

impl IdentityKeyed for PreviewTable {
    fn rekey(&mut self, old: &Identity, new: &Identity) -> bool {
        if old == new {
            return false;
        }
        match self.previews.remove(old) {
            Some(kind) => {
                self.previews.insert(new.clone(), kind);
                true
            }
            None => false,
        }
    }
}
