//! relaycast-signaling – Steuerkanal und Peer-Orchestrierung
//!
//! Dieser Crate implementiert die Client-Seite des Relaycast-Signalings:
//! den Kanal zum Relay, das Aushandeln der Peer-Verbindungen zwischen
//! Broadcaster und Zuschauern und das Broadcaster-Verzeichnis.
//!
//! ## Architektur
//!
//! ```text
//! RelayTransport (WebSocket, Reconnect)
//!     |
//!     v
//! SignalingRuntime (ein Task, einziger Schreiber)
//!     |
//!     +-- PeerOrchestrator   (Peer-Sessions, Negotiation, eigene Uebertragung)
//!     +-- PresenceDirectory  (wer uebertraegt, Zuschauerzahlen)
//!     +-- PreviewTable       (angezeigte Videos)
//!     +-- reconcile          (username_changed in einem Schritt)
//!
//! RuntimeHandle – Befehle der UI, ClientEvents zurueck
//! ```

pub mod connector;
pub mod error;
pub mod orchestrator;
pub mod peer;
pub mod presence;
pub mod preview;
pub mod reconciler;
pub mod runtime;
pub mod transport;

// Bequeme Re-Exporte
pub use connector::{RelayChannel, RelayConnector, WebSocketConnector};
pub use error::{SignalingError, SignalingResult};
pub use orchestrator::{NegotiationState, PeerOrchestrator, PeerRole, PeerSessionInfo};
pub use peer::{
    CaptureEndedHook, CaptureHandle, LinkState, MediaCapture, OfferOptions, PeerBackend,
    PeerEvents, PeerLink, SignalSink,
};
pub use presence::PresenceDirectory;
pub use runtime::{HandleFor, RuntimeHandle, SignalingRuntime};
pub use transport::{ReconnectPolicy, RelayTransport, TransportConfig};
