//! Schnittstellen zum Peer-Transport und zur Medien-Capture
//!
//! Der Orchestrator kennt keine konkrete WebRTC-Implementierung. Er arbeitet
//! gegen `PeerBackend`/`PeerLink` und `MediaCapture`; `relaycast-rtc` liefert
//! die webrtc-rs-Variante, die Tests eine Fake-Variante.
//!
//! ## Callbacks
//! Alles was der native Transport asynchron meldet (ICE-Kandidaten, Remote-
//! Tracks, Zustandswechsel) laeuft ueber `PeerEvents` in die Event-Queue der
//! Runtime. Jedes Event traegt die `PeerSessionId`, nie die Identitaet.

use async_trait::async_trait;
use relaycast_core::PeerSessionId;
use relaycast_protocol::{IceCandidate, SessionDescription};
use tokio::sync::mpsc;

use crate::error::SignalingResult;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Zustand der nativen Verbindung (ICE + DTLS)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Asynchrone Meldung einer Peer-Verbindung
#[derive(Debug)]
pub enum PeerEventKind<R> {
    /// Lokal gesammelter ICE-Kandidat
    LocalCandidate(IceCandidate),
    /// Remote-Track ist eingetroffen
    RemoteTrack(R),
    /// Remote-Stream ist beendet
    RemoteEnded,
    /// Verbindungszustand hat sich geaendert
    Link(LinkState),
}

/// Peer-Event mit Session-Zuordnung
#[derive(Debug)]
pub struct PeerEvent<R> {
    pub session: PeerSessionId,
    pub kind: PeerEventKind<R>,
}

/// Alles was in die Event-Queue des Orchestrators laeuft
#[derive(Debug)]
pub enum OrchestratorEvent<R> {
    Peer(PeerEvent<R>),
    /// Capture wurde extern beendet (`capture` = Generation der Capture)
    CaptureEnded { capture: u64 },
}

/// Sender fuer die Events genau einer Peer-Session
///
/// Wird dem Backend beim Oeffnen uebergeben. Nach dem Abbau der Session
/// werden Events noch angenommen, aber vom Orchestrator verworfen.
pub struct PeerEvents<R> {
    session: PeerSessionId,
    tx: mpsc::UnboundedSender<OrchestratorEvent<R>>,
}

impl<R> Clone for PeerEvents<R> {
    fn clone(&self) -> Self {
        Self {
            session: self.session,
            tx: self.tx.clone(),
        }
    }
}

impl<R> PeerEvents<R> {
    pub fn neu(session: PeerSessionId, tx: mpsc::UnboundedSender<OrchestratorEvent<R>>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> PeerSessionId {
        self.session
    }

    pub fn local_candidate(&self, candidate: IceCandidate) {
        self.melden(PeerEventKind::LocalCandidate(candidate));
    }

    pub fn remote_track(&self, remote: R) {
        self.melden(PeerEventKind::RemoteTrack(remote));
    }

    pub fn remote_ended(&self) {
        self.melden(PeerEventKind::RemoteEnded);
    }

    pub fn link_state(&self, state: LinkState) {
        self.melden(PeerEventKind::Link(state));
    }

    fn melden(&self, kind: PeerEventKind<R>) {
        // Runtime beendet: Event hat keinen Empfaenger mehr
        let _ = self.tx.send(OrchestratorEvent::Peer(PeerEvent {
            session: self.session,
            kind,
        }));
    }
}

// ---------------------------------------------------------------------------
// Peer-Transport
// ---------------------------------------------------------------------------

/// Was ein Offer empfangen moechte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferOptions {
    pub receive_audio: bool,
    pub receive_video: bool,
}

impl OfferOptions {
    /// Zuschauer-Offer: Audio und Video empfangen
    pub const AUDIO_VIDEO: Self = Self {
        receive_audio: true,
        receive_video: true,
    };
}

/// Eine native Peer-Verbindung (z.B. `RTCPeerConnection`)
#[async_trait]
pub trait PeerLink: Send + Sync + 'static {
    type Track: Send + Sync;

    async fn create_offer(&self, options: OfferOptions) -> SignalingResult<SessionDescription>;
    async fn create_answer(&self) -> SignalingResult<SessionDescription>;
    async fn set_local_description(&self, description: SessionDescription) -> SignalingResult<()>;
    async fn set_remote_description(&self, description: SessionDescription)
        -> SignalingResult<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> SignalingResult<()>;

    /// Haengt einen lokalen Capture-Track an (nur Broadcaster-Rolle)
    async fn attach_track(&self, track: &Self::Track) -> SignalingResult<()>;

    /// Schliesst die Verbindung. Fehler werden intern geloggt.
    async fn close(&self);
}

/// Fabrik fuer Peer-Verbindungen
#[async_trait]
pub trait PeerBackend: Send + Sync + 'static {
    /// Lokaler Medien-Track
    type Track: Clone + Send + Sync + 'static;
    /// Empfangener Remote-Track
    type Remote: Send + 'static;
    type Link: PeerLink<Track = Self::Track>;

    async fn open_link(&self, events: PeerEvents<Self::Remote>) -> SignalingResult<Self::Link>;
}

// ---------------------------------------------------------------------------
// Medien-Capture
// ---------------------------------------------------------------------------

/// Wird aufgerufen wenn die Capture ausserhalb der Anwendung beendet wird
pub type CaptureEndedHook = Box<dyn FnOnce() + Send + 'static>;

/// Laufende Capture (Kamera + Mikrofon)
pub trait CaptureHandle: Send + Sync + 'static {
    type Track;

    fn tracks(&self) -> Vec<Self::Track>;

    /// Stoppt alle Tracks. Loest den `CaptureEndedHook` nicht aus.
    fn release(&mut self);
}

/// Zugriff auf Kamera und Mikrofon
#[async_trait]
pub trait MediaCapture: Send + Sync + 'static {
    type Track: Clone + Send + Sync + 'static;
    type Handle: CaptureHandle<Track = Self::Track>;

    /// Fordert Capture an. Verweigerung ergibt `MediaAcquisition`.
    async fn acquire(&self, on_ended: CaptureEndedHook) -> SignalingResult<Self::Handle>;
}

// ---------------------------------------------------------------------------
// Ausgehende Signaling-Nachrichten
// ---------------------------------------------------------------------------

/// Senke fuer ausgehende Relay-Nachrichten
///
/// `RelayTransport` implementiert das mit Zustellung nur im Zustand `Open`.
pub trait SignalSink: Send + Sync + 'static {
    fn send(&self, message: relaycast_protocol::ClientMessage);
}
