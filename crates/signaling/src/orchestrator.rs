//! Peer-Orchestrator – Verwaltet alle Peer-Sessions und die eigene Uebertragung
//!
//! Pro Remote-Identitaet existiert hoechstens eine `PeerSession`. Als
//! Broadcaster haelt der Client eine Session pro Zuschauer, als Zuschauer
//! hoechstens eine Session insgesamt.
//!
//! ## Negotiation
//! ```text
//! Zuschauer                          Broadcaster
//!   watch_broadcast
//!   create_offer / set_local  --offer-->  handle_offer
//!                                         attach_track, set_remote
//!                                         create_answer / set_local
//!   handle_answer             <--answer--
//!   set_remote -> Connected
//!           <----- ice-candidate (beide Richtungen) ----->
//! ```
//!
//! ## Speicher
//! Sessions liegen in einer Map nach `PeerSessionId`, daneben ein Index
//! Identitaet -> ID. Ein Umbenennen aendert nur den Index und das
//! `remote`-Feld; Callbacks des Peer-Transports treffen weiterhin die
//! richtige Session.
//!
//! Der Orchestrator gehoert exklusiv der Signaling-Runtime. Alle Methoden
//! laufen nacheinander auf deren Event-Loop.

use relaycast_core::{Identity, PeerSessionId};
use relaycast_protocol::{ClientMessage, IceCandidate, SessionDescription};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{SignalingError, SignalingResult};
use crate::peer::{
    CaptureEndedHook, CaptureHandle, LinkState, MediaCapture, OfferOptions, OrchestratorEvent,
    PeerBackend, PeerEvent, PeerEventKind, PeerEvents, PeerLink, SignalSink,
};
use crate::reconciler::IdentityKeyed;

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Lokale Rolle in einer Peer-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Wir senden, der Remote-Teilnehmer schaut zu
    Broadcaster,
    /// Wir schauen zu
    Viewer,
}

/// Fortschritt der Negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    OfferSent,
    AnswerSent,
    Connected,
    Failed,
}

/// Callback fuer empfangene Remote-Medien
pub type RemoteMediaCallback<R> = Box<dyn FnMut(R) + Send + Sync + 'static>;

/// Callback fuer die lokale Vorschau
pub type LocalMediaCallback<T> = Box<dyn FnOnce(&[T]) + Send + Sync + 'static>;

/// Oeffentliche Sicht auf eine Peer-Session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSessionInfo {
    pub id: PeerSessionId,
    pub remote: Identity,
    pub role: PeerRole,
    pub state: NegotiationState,
}

/// Meldungen an die Runtime (fuer Vorschau und UI-Events)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerNotice {
    /// Erster Remote-Track einer Zuschauer-Session
    RemoteMediaStarted { remote: Identity },
    /// Session wurde abgebaut
    SessionClosed { remote: Identity, role: PeerRole },
    /// Eigene Capture wurde extern beendet, Uebertragung ist gestoppt
    CaptureEnded,
}

struct PeerSession<L, R> {
    id: PeerSessionId,
    remote: Identity,
    role: PeerRole,
    state: NegotiationState,
    link: L,
    on_remote_media: Option<RemoteMediaCallback<R>>,
    /// `viewer_joined` wurde gesendet
    viewer_joined: bool,
}

impl<L, R> PeerSession<L, R> {
    fn info(&self) -> PeerSessionInfo {
        PeerSessionInfo {
            id: self.id,
            remote: self.remote.clone(),
            role: self.role,
            state: self.state,
        }
    }
}

struct LocalBroadcast<H> {
    handle: H,
    /// Generation der Capture, fuer das Ende-Event
    capture: u64,
    title: Option<String>,
}

// ---------------------------------------------------------------------------
// PeerOrchestrator
// ---------------------------------------------------------------------------

pub struct PeerOrchestrator<B, C>
where
    B: PeerBackend,
    C: MediaCapture<Track = B::Track>,
{
    backend: B,
    capture: C,
    sink: Arc<dyn SignalSink>,
    events_tx: mpsc::UnboundedSender<OrchestratorEvent<B::Remote>>,
    sessions: HashMap<PeerSessionId, PeerSession<B::Link, B::Remote>>,
    index: HashMap<Identity, PeerSessionId>,
    local: Option<LocalBroadcast<C::Handle>>,
    capture_generation: u64,
    /// Bei einer Umbenennung verdraengte Verbindungen
    zu_schliessen: Vec<B::Link>,
    notices: Vec<PeerNotice>,
}

impl<B, C> PeerOrchestrator<B, C>
where
    B: PeerBackend,
    C: MediaCapture<Track = B::Track>,
{
    /// Erstellt den Orchestrator und die Event-Queue seiner Peer-Verbindungen
    ///
    /// Der Empfaenger muss von der Runtime gelesen und jedes Event an
    /// `handle_event` weitergegeben werden.
    pub fn neu(
        backend: B,
        capture: C,
        sink: Arc<dyn SignalSink>,
    ) -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent<B::Remote>>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            backend,
            capture,
            sink,
            events_tx,
            sessions: HashMap::new(),
            index: HashMap::new(),
            local: None,
            capture_generation: 0,
            zu_schliessen: Vec::new(),
            notices: Vec::new(),
        };
        (orchestrator, events_rx)
    }

    // -----------------------------------------------------------------------
    // Eigene Uebertragung
    // -----------------------------------------------------------------------

    /// Startet die eigene Uebertragung
    ///
    /// # Fehler
    /// - `AlreadyBroadcasting` wenn bereits uebertragen wird
    /// - `MediaAcquisition` wenn die Capture verweigert wird
    pub async fn start_broadcast(
        &mut self,
        title: Option<String>,
        on_local_media: LocalMediaCallback<B::Track>,
    ) -> SignalingResult<()> {
        if self.local.is_some() {
            return Err(SignalingError::AlreadyBroadcasting);
        }

        self.capture_generation += 1;
        let capture = self.capture_generation;
        let tx = self.events_tx.clone();
        let hook: CaptureEndedHook = Box::new(move || {
            let _ = tx.send(OrchestratorEvent::CaptureEnded { capture });
        });

        let handle = self.capture.acquire(hook).await.map_err(|e| {
            tracing::warn!(fehler = %e, "Capture verweigert");
            match e {
                SignalingError::MediaAcquisition(_) => e,
                andere => SignalingError::capture(andere),
            }
        })?;

        let tracks = handle.tracks();
        self.local = Some(LocalBroadcast {
            handle,
            capture,
            title: title.clone(),
        });
        self.sink.send(ClientMessage::StartBroadcast { title });
        on_local_media(&tracks);

        tracing::info!(tracks = tracks.len(), "Eigene Uebertragung gestartet");
        Ok(())
    }

    /// Beendet die eigene Uebertragung
    ///
    /// Schliesst zuerst alle Zuschauer-Verbindungen und gibt danach die
    /// Capture frei. Gibt false zurueck wenn keine Uebertragung lief.
    pub async fn stop_broadcast(&mut self) -> bool {
        let Some(mut local) = self.local.take() else {
            tracing::debug!("Keine eigene Uebertragung aktiv");
            return false;
        };

        let zuschauer: Vec<PeerSessionId> = self
            .sessions
            .values()
            .filter(|s| s.role == PeerRole::Broadcaster)
            .map(|s| s.id)
            .collect();
        for id in &zuschauer {
            self.abbauen(*id).await;
        }

        local.handle.release();
        self.sink.send(ClientMessage::StopBroadcast);

        tracing::info!(zuschauer = zuschauer.len(), "Eigene Uebertragung beendet");
        true
    }

    /// Kuendigt die laufende Uebertragung erneut an (nach Reconnect)
    pub fn reannounce(&self) {
        if let Some(local) = &self.local {
            tracing::info!("Uebertragung nach Reconnect erneut angekuendigt");
            self.sink.send(ClientMessage::StartBroadcast {
                title: local.title.clone(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // Zuschauen
    // -----------------------------------------------------------------------

    /// Beginnt eine Uebertragung anzusehen
    ///
    /// Eine bereits angesehene andere Uebertragung wird vorher verlassen.
    /// Negotiation-Fehler werden geloggt und bauen die Session ab, sie
    /// erreichen den Aufrufer nicht.
    ///
    /// # Fehler
    /// - `AlreadyWatching` wenn fuer `remote` bereits eine Session existiert
    pub async fn watch_broadcast(
        &mut self,
        remote: Identity,
        on_remote_media: RemoteMediaCallback<B::Remote>,
    ) -> SignalingResult<()> {
        if self.index.contains_key(&remote) {
            tracing::warn!(identity = %remote, "Uebertragung wird bereits angesehen");
            return Err(SignalingError::AlreadyWatching(remote));
        }

        let vorherige: Vec<PeerSessionId> = self
            .sessions
            .values()
            .filter(|s| s.role == PeerRole::Viewer)
            .map(|s| s.id)
            .collect();
        for id in vorherige {
            tracing::info!(session = %id, "Vorherige Uebertragung wird verlassen");
            self.abbauen(id).await;
        }

        let id = PeerSessionId::new();
        let link = match self
            .backend
            .open_link(PeerEvents::neu(id, self.events_tx.clone()))
            .await
        {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(identity = %remote, fehler = %e, "Peer-Verbindung nicht erstellbar");
                return Ok(());
            }
        };
        self.einfuegen(PeerSession {
            id,
            remote,
            role: PeerRole::Viewer,
            state: NegotiationState::New,
            link,
            on_remote_media: Some(on_remote_media),
            viewer_joined: false,
        });

        let ergebnis = self.offer_erstellen(id).await;
        let offer = match ergebnis {
            Ok(offer) => offer,
            Err(e) => {
                self.fehlgeschlagen(id, e).await;
                return Ok(());
            }
        };

        if let Some(session) = self.sessions.get_mut(&id) {
            session.state = NegotiationState::OfferSent;
            let target = session.remote.clone();
            tracing::info!(identity = %target, session = %id, "Offer an Broadcaster gesendet");
            self.sink.send(ClientMessage::Offer { target, offer });
        }
        Ok(())
    }

    /// Verlaesst eine angesehene Uebertragung
    pub async fn stop_watching(&mut self, remote: &Identity) -> bool {
        match self.session_id(remote, PeerRole::Viewer) {
            Some(id) => {
                self.abbauen(id).await;
                true
            }
            None => false,
        }
    }

    /// Das Relay meldet das Ende einer fremden Uebertragung
    pub async fn handle_remote_stopped(&mut self, broadcaster: &Identity) -> bool {
        let abgebaut = self.stop_watching(broadcaster).await;
        if abgebaut {
            tracing::info!(identity = %broadcaster, "Angesehene Uebertragung beendet");
        }
        abgebaut
    }

    // -----------------------------------------------------------------------
    // Eingehende Negotiation
    // -----------------------------------------------------------------------

    /// Offer eines Zuschauers. Ohne laufende Uebertragung wird es ignoriert.
    pub async fn handle_offer(&mut self, from: Identity, offer: SessionDescription) {
        let Some(local) = self.local.as_ref() else {
            tracing::debug!(identity = %from, "Offer ohne eigene Uebertragung ignoriert");
            return;
        };
        let tracks = local.handle.tracks();

        if let Some(bestehend) = self.index.get(&from).copied() {
            let rolle = self.sessions.get(&bestehend).map(|s| s.role);
            if rolle == Some(PeerRole::Viewer) {
                tracing::warn!(identity = %from, "Offer von angesehenem Broadcaster ignoriert");
                return;
            }
            tracing::debug!(identity = %from, "Erneutes Offer, alte Session wird ersetzt");
            self.abbauen(bestehend).await;
        }

        let id = PeerSessionId::new();
        let link = match self
            .backend
            .open_link(PeerEvents::neu(id, self.events_tx.clone()))
            .await
        {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(identity = %from, fehler = %e, "Peer-Verbindung nicht erstellbar");
                return;
            }
        };
        self.einfuegen(PeerSession {
            id,
            remote: from,
            role: PeerRole::Broadcaster,
            state: NegotiationState::New,
            link,
            on_remote_media: None,
            viewer_joined: false,
        });

        let ergebnis = self.answer_erstellen(id, &tracks, offer).await;
        match ergebnis {
            Ok(answer) => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.state = NegotiationState::AnswerSent;
                    let target = session.remote.clone();
                    tracing::info!(identity = %target, session = %id, "Answer an Zuschauer gesendet");
                    self.sink.send(ClientMessage::Answer { target, answer });
                }
            }
            Err(e) => self.fehlgeschlagen(id, e).await,
        }
    }

    /// Answer des angesehenen Broadcasters
    pub async fn handle_answer(&mut self, from: Identity, answer: SessionDescription) {
        let Some(id) = self.index.get(&from).copied() else {
            Self::veraltet("answer", from);
            return;
        };
        let Some(session) = self.sessions.get(&id) else {
            return;
        };
        if session.role != PeerRole::Viewer || session.state != NegotiationState::OfferSent {
            Self::veraltet("answer", from);
            return;
        }

        let ergebnis = session.link.set_remote_description(answer).await;
        match ergebnis {
            Ok(()) => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.state = NegotiationState::Connected;
                }
                tracing::info!(identity = %from, session = %id, "Answer uebernommen");
            }
            Err(e) => self.fehlgeschlagen(id, e).await,
        }
    }

    /// ICE-Kandidat der Gegenseite. Ablehnung wird nur geloggt.
    pub async fn handle_ice_candidate(&mut self, from: Identity, candidate: IceCandidate) {
        let Some(session) = self.index.get(&from).and_then(|id| self.sessions.get(id)) else {
            Self::veraltet("ice-candidate", from);
            return;
        };
        let ergebnis = session.link.add_ice_candidate(candidate).await;
        if let Err(e) = ergebnis {
            tracing::warn!(identity = %from, fehler = %e, "ICE-Kandidat abgelehnt");
        }
    }

    // -----------------------------------------------------------------------
    // Events der Peer-Verbindungen
    // -----------------------------------------------------------------------

    /// Verarbeitet ein Event aus der Event-Queue
    pub async fn handle_event(&mut self, event: OrchestratorEvent<B::Remote>) {
        match event {
            OrchestratorEvent::CaptureEnded { capture } => {
                if self.local.as_ref().map(|l| l.capture) == Some(capture) {
                    tracing::info!("Capture extern beendet");
                    self.stop_broadcast().await;
                    self.notices.push(PeerNotice::CaptureEnded);
                } else {
                    tracing::debug!(capture, "Ende einer alten Capture ignoriert");
                }
            }
            OrchestratorEvent::Peer(PeerEvent { session, kind }) => {
                self.peer_event(session, kind).await;
            }
        }
    }

    async fn peer_event(&mut self, id: PeerSessionId, kind: PeerEventKind<B::Remote>) {
        let Some(session) = self.sessions.get_mut(&id) else {
            tracing::debug!(session = %id, "Event fuer abgebaute Session verworfen");
            return;
        };

        match kind {
            PeerEventKind::LocalCandidate(candidate) => {
                self.sink.send(ClientMessage::IceCandidate {
                    target: session.remote.clone(),
                    candidate,
                });
            }
            PeerEventKind::RemoteTrack(remote) => {
                if session.role != PeerRole::Viewer {
                    tracing::debug!(session = %id, "Remote-Track in Broadcaster-Session ignoriert");
                    return;
                }
                if let Some(callback) = session.on_remote_media.as_mut() {
                    callback(remote);
                }
                if !session.viewer_joined {
                    session.viewer_joined = true;
                    let target = session.remote.clone();
                    self.sink.send(ClientMessage::ViewerJoined {
                        target: target.clone(),
                    });
                    self.notices
                        .push(PeerNotice::RemoteMediaStarted { remote: target });
                }
            }
            PeerEventKind::RemoteEnded => {
                if session.role == PeerRole::Viewer {
                    tracing::info!(identity = %session.remote, "Remote-Stream beendet");
                    self.abbauen(id).await;
                }
            }
            PeerEventKind::Link(LinkState::Connected) => {
                session.state = NegotiationState::Connected;
                tracing::debug!(identity = %session.remote, session = %id, "Peer-Verbindung steht");
            }
            PeerEventKind::Link(LinkState::Failed) => {
                self.fehlgeschlagen(id, SignalingError::negotiation("Verbindung fehlgeschlagen"))
                    .await;
            }
            PeerEventKind::Link(LinkState::Closed) => {
                tracing::debug!(session = %id, "Peer-Verbindung von aussen geschlossen");
                self.abbauen(id).await;
            }
            PeerEventKind::Link(state) => {
                tracing::trace!(session = %id, state = ?state, "Verbindungszustand");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Abbau
    // -----------------------------------------------------------------------

    /// Schliesst alle Sessions und beendet die eigene Uebertragung (Logout)
    pub async fn close_all(&mut self) {
        self.stop_broadcast().await;
        let ids: Vec<PeerSessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.abbauen(id).await;
        }
        self.verdraengte_schliessen().await;
    }

    /// Schliesst Verbindungen die bei einer Umbenennung verdraengt wurden
    pub async fn verdraengte_schliessen(&mut self) {
        for link in std::mem::take(&mut self.zu_schliessen) {
            link.close().await;
        }
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn is_broadcasting(&self) -> bool {
        self.local.is_some()
    }

    pub fn broadcast_title(&self) -> Option<&str> {
        self.local.as_ref().and_then(|l| l.title.as_deref())
    }

    /// Identitaet der aktuell angesehenen Uebertragung
    pub fn watching(&self) -> Option<Identity> {
        self.sessions
            .values()
            .find(|s| s.role == PeerRole::Viewer)
            .map(|s| s.remote.clone())
    }

    pub fn session(&self, remote: &Identity) -> Option<PeerSessionInfo> {
        self.index
            .get(remote)
            .and_then(|id| self.sessions.get(id))
            .map(PeerSession::info)
    }

    pub fn sessions(&self) -> Vec<PeerSessionInfo> {
        let mut alle: Vec<PeerSessionInfo> = self.sessions.values().map(PeerSession::info).collect();
        alle.sort_by(|a, b| a.remote.cmp(&b.remote));
        alle
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Holt alle seit dem letzten Aufruf gesammelten Meldungen
    pub fn take_notices(&mut self) -> Vec<PeerNotice> {
        std::mem::take(&mut self.notices)
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn einfuegen(&mut self, session: PeerSession<B::Link, B::Remote>) {
        tracing::debug!(
            identity = %session.remote,
            session = %session.id,
            rolle = ?session.role,
            "Peer-Session erstellt"
        );
        self.index.insert(session.remote.clone(), session.id);
        self.sessions.insert(session.id, session);
    }

    fn session_id(&self, remote: &Identity, role: PeerRole) -> Option<PeerSessionId> {
        let id = self.index.get(remote)?;
        self.sessions
            .get(id)
            .filter(|s| s.role == role)
            .map(|s| s.id)
    }

    async fn offer_erstellen(&self, id: PeerSessionId) -> SignalingResult<SessionDescription> {
        let session = self
            .sessions
            .get(&id)
            .ok_or_else(|| SignalingError::negotiation("Session verschwunden"))?;
        let offer = session.link.create_offer(OfferOptions::AUDIO_VIDEO).await?;
        session.link.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    async fn answer_erstellen(
        &self,
        id: PeerSessionId,
        tracks: &[B::Track],
        offer: SessionDescription,
    ) -> SignalingResult<SessionDescription> {
        let session = self
            .sessions
            .get(&id)
            .ok_or_else(|| SignalingError::negotiation("Session verschwunden"))?;
        for track in tracks {
            session.link.attach_track(track).await?;
        }
        session.link.set_remote_description(offer).await?;
        let answer = session.link.create_answer().await?;
        session.link.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    async fn fehlgeschlagen(&mut self, id: PeerSessionId, fehler: SignalingError) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.state = NegotiationState::Failed;
            tracing::warn!(
                identity = %session.remote,
                session = %id,
                fehler = %fehler,
                "Negotiation fehlgeschlagen, Session wird abgebaut"
            );
        }
        self.abbauen(id).await;
    }

    async fn abbauen(&mut self, id: PeerSessionId) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        if self.index.get(&session.remote) == Some(&id) {
            self.index.remove(&session.remote);
        }
        if session.role == PeerRole::Viewer && session.viewer_joined {
            self.sink.send(ClientMessage::ViewerLeft {
                target: session.remote.clone(),
            });
        }
        session.link.close().await;

        tracing::debug!(identity = %session.remote, session = %id, "Peer-Session abgebaut");
        self.notices.push(PeerNotice::SessionClosed {
            remote: session.remote,
            role: session.role,
        });
    }

    fn veraltet(kind: &'static str, from: Identity) {
        let fehler = SignalingError::StaleSignalingMessage { kind, from };
        tracing::debug!(fehler = %fehler, "Nachricht verworfen");
    }
}

impl<B, C> IdentityKeyed for PeerOrchestrator<B, C>
where
    B: PeerBackend,
    C: MediaCapture<Track = B::Track>,
{
    /// Schluesselt die Session von `old` auf `new` um
    ///
    /// Eine bestehende Session unter `new` wird verdraengt. Ihre Verbindung
    /// wird in `verdraengte_schliessen` geschlossen.
    fn rekey(&mut self, old: &Identity, new: &Identity) -> bool {
        if old == new {
            return false;
        }
        let Some(id) = self.index.remove(old) else {
            return false;
        };

        if let Some(verdraengt) = self.index.remove(new) {
            if let Some(session) = self.sessions.remove(&verdraengt) {
                tracing::warn!(identity = %new, session = %verdraengt, "Session durch Umbenennung verdraengt");
                if session.role == PeerRole::Viewer && session.viewer_joined {
                    self.sink.send(ClientMessage::ViewerLeft {
                        target: new.clone(),
                    });
                }
                self.zu_schliessen.push(session.link);
            }
        }

        self.index.insert(new.clone(), id);
        if let Some(session) = self.sessions.get_mut(&id) {
            session.remote = new.clone();
        }
        true
    }
}
