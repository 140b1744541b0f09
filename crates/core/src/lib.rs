//! relaycast-core – Gemeinsame Typen, Events und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Relaycast-Crates gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{RelaycastError, Result};
pub use event::{BroadcastEndGrund, ClientEvent, HistoryRefresh};
pub use types::{ConnectionState, DirectoryEntry, Identity, PeerSessionId, Session};
