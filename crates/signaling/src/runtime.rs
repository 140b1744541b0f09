//! Signaling-Runtime – Zentrale Event-Loop des Clients
//!
//! Ein einzelner Task besitzt Orchestrator, Verzeichnis und Vorschau-Tabelle.
//! Er verarbeitet nacheinander:
//! - Nachrichten vom Relay (in Ankunftsreihenfolge)
//! - Befehle der UI ueber `RuntimeHandle`
//! - Events der Peer-Verbindungen und der Capture
//! - Zustandswechsel des Relay-Kanals
//!
//! Da nur dieser Task schreibt, braucht der Zustand keine Locks und eine
//! Umbenennung ist fuer alle anderen Handler atomar.
//!
//! ```text
//! RelayTransport --on_message--> eingang --+
//! RuntimeHandle  --------------> befehle --+--> SignalingRuntime --> ClientEvent (broadcast)
//! PeerLink/Capture ------------> events  --+          |
//! RelayTransport --watch-------> state   --+          +--> RelayTransport::send
//! ```

use relaycast_core::event::BroadcastEndGrund;
use relaycast_core::{ClientEvent, ConnectionState, DirectoryEntry, HistoryRefresh, Identity};
use relaycast_protocol::ServerMessage;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::error::{SignalingError, SignalingResult};
use crate::orchestrator::{
    LocalMediaCallback, PeerNotice, PeerOrchestrator, PeerRole, PeerSessionInfo,
    RemoteMediaCallback,
};
use crate::peer::{MediaCapture, OrchestratorEvent, PeerBackend, SignalSink};
use crate::presence::PresenceDirectory;
use crate::preview::{PreviewKind, PreviewTable};
use crate::reconciler::{reconcile, RenameTargets};
use crate::transport::{HandlerId, RelayTransport};

/// Groesse des Broadcast-Kanals fuer UI-Events
const EVENT_KANAL_GROESSE: usize = 256;

/// Groesse der Befehls-Queue
const BEFEHL_KANAL_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// Befehle
// ---------------------------------------------------------------------------

enum Befehl<T, R> {
    StartBroadcast {
        title: Option<String>,
        on_local_media: LocalMediaCallback<T>,
        reply: oneshot::Sender<SignalingResult<()>>,
    },
    StopBroadcast {
        reply: oneshot::Sender<bool>,
    },
    Watch {
        remote: Identity,
        on_remote_media: RemoteMediaCallback<R>,
        reply: oneshot::Sender<SignalingResult<()>>,
    },
    StopWatching {
        remote: Identity,
        reply: oneshot::Sender<bool>,
    },
    RequestSnapshot,
    Directory {
        reply: oneshot::Sender<Vec<DirectoryEntry>>,
    },
    Sessions {
        reply: oneshot::Sender<Vec<PeerSessionInfo>>,
    },
    Logout {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// RuntimeHandle
// ---------------------------------------------------------------------------

/// Zugriff der UI auf die Runtime
///
/// `T` ist der lokale Track-Typ, `R` der Remote-Track-Typ des Backends.
pub struct RuntimeHandle<T, R> {
    befehle: mpsc::Sender<Befehl<T, R>>,
    events: broadcast::Sender<ClientEvent>,
}

impl<T, R> Clone for RuntimeHandle<T, R> {
    fn clone(&self) -> Self {
        Self {
            befehle: self.befehle.clone(),
            events: self.events.clone(),
        }
    }
}

impl<T, R> RuntimeHandle<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Startet die eigene Uebertragung. `on_local_media` bekommt die Tracks
    /// fuer die lokale Vorschau.
    pub async fn start_broadcast<F>(&self, title: Option<String>, on_local_media: F) -> SignalingResult<()>
    where
        F: FnOnce(&[T]) + Send + Sync + 'static,
    {
        self.anfragen(|reply| Befehl::StartBroadcast {
            title,
            on_local_media: Box::new(on_local_media),
            reply,
        })
        .await?
    }

    /// Beendet die eigene Uebertragung. Gibt false zurueck wenn keine lief.
    pub async fn stop_broadcast(&self) -> SignalingResult<bool> {
        self.anfragen(|reply| Befehl::StopBroadcast { reply }).await
    }

    /// Beginnt eine Uebertragung anzusehen
    pub async fn watch<F>(&self, remote: Identity, on_remote_media: F) -> SignalingResult<()>
    where
        F: FnMut(R) + Send + Sync + 'static,
    {
        self.anfragen(|reply| Befehl::Watch {
            remote,
            on_remote_media: Box::new(on_remote_media),
            reply,
        })
        .await?
    }

    pub async fn stop_watching(&self, remote: Identity) -> SignalingResult<bool> {
        self.anfragen(|reply| Befehl::StopWatching { remote, reply })
            .await
    }

    /// Fordert einen neuen Broadcaster-Snapshot an
    pub async fn request_snapshot(&self) -> SignalingResult<()> {
        self.befehle
            .send(Befehl::RequestSnapshot)
            .await
            .map_err(|_| SignalingError::RuntimeClosed)
    }

    /// Aktueller Stand des Verzeichnisses
    pub async fn directory(&self) -> SignalingResult<Vec<DirectoryEntry>> {
        self.anfragen(|reply| Befehl::Directory { reply }).await
    }

    /// Alle Peer-Sessions (sortiert nach Identitaet)
    pub async fn sessions(&self) -> SignalingResult<Vec<PeerSessionInfo>> {
        self.anfragen(|reply| Befehl::Sessions { reply }).await
    }

    /// Schliesst alle Sessions, beendet die Uebertragung und meldet ab
    pub async fn logout(&self) -> SignalingResult<()> {
        self.anfragen(|reply| Befehl::Logout { reply }).await
    }

    /// Beendet die Runtime
    pub async fn shutdown(&self) {
        let _ = self.befehle.send(Befehl::Shutdown).await;
    }

    /// Abonniert UI-Events
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    async fn anfragen<A>(
        &self,
        befehl: impl FnOnce(oneshot::Sender<A>) -> Befehl<T, R>,
    ) -> SignalingResult<A> {
        let (reply, antwort) = oneshot::channel();
        self.befehle
            .send(befehl(reply))
            .await
            .map_err(|_| SignalingError::RuntimeClosed)?;
        antwort.await.map_err(|_| SignalingError::RuntimeClosed)
    }
}

/// Handle-Typ passend zu einem Backend
pub type HandleFor<B> = RuntimeHandle<<B as PeerBackend>::Track, <B as PeerBackend>::Remote>;

// ---------------------------------------------------------------------------
// SignalingRuntime
// ---------------------------------------------------------------------------

pub struct SignalingRuntime<B, C>
where
    B: PeerBackend,
    C: MediaCapture<Track = B::Track>,
{
    transport: RelayTransport,
    orchestrator: PeerOrchestrator<B, C>,
    presence: PresenceDirectory,
    previews: PreviewTable,
    history: Option<Arc<dyn HistoryRefresh>>,
    events: broadcast::Sender<ClientEvent>,
    befehle: mpsc::Receiver<Befehl<B::Track, B::Remote>>,
    eingang: mpsc::UnboundedReceiver<ServerMessage>,
    peer_events: mpsc::UnboundedReceiver<OrchestratorEvent<B::Remote>>,
    state_rx: watch::Receiver<ConnectionState>,
    handler: HandlerId,
}

impl<B, C> SignalingRuntime<B, C>
where
    B: PeerBackend,
    C: MediaCapture<Track = B::Track>,
{
    /// Verdrahtet Transport, Orchestrator und Verzeichnis
    ///
    /// Die Runtime laeuft erst mit `run()`. Der Transport wird nicht
    /// verbunden; das passiert mit `RelayTransport::login`.
    pub fn neu(transport: RelayTransport, backend: B, capture: C) -> (Self, HandleFor<B>) {
        let sink: Arc<dyn SignalSink> = Arc::new(transport.clone());
        let (orchestrator, peer_events) = PeerOrchestrator::neu(backend, capture, sink);

        let (eingang_tx, eingang) = mpsc::unbounded_channel();
        let handler = transport.on_message(move |msg| {
            let _ = eingang_tx.send(msg.clone());
        });

        let (befehle_tx, befehle) = mpsc::channel(BEFEHL_KANAL_GROESSE);
        let (events, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        let state_rx = transport.subscribe_state();

        let runtime = Self {
            transport,
            orchestrator,
            presence: PresenceDirectory::neu(),
            previews: PreviewTable::neu(),
            history: None,
            events: events.clone(),
            befehle,
            eingang,
            peer_events,
            state_rx,
            handler,
        };
        let handle = RuntimeHandle {
            befehle: befehle_tx,
            events,
        };
        (runtime, handle)
    }

    /// Setzt den Hook zum Auffrischen des Verlaufs
    pub fn mit_history(mut self, history: Arc<dyn HistoryRefresh>) -> Self {
        self.history = Some(history);
        self
    }

    /// Event-Loop. Laeuft bis `shutdown()` oder bis alle Handles gedroppt sind.
    pub async fn run(mut self) {
        tracing::info!("Signaling-Runtime gestartet");

        let state = *self.state_rx.borrow_and_update();
        if state == ConnectionState::Open {
            self.zustand_geaendert(state);
        }

        loop {
            tokio::select! {
                befehl = self.befehle.recv() => match befehl {
                    Some(Befehl::Shutdown) | None => break,
                    Some(befehl) => self.befehl_ausfuehren(befehl).await,
                },
                Some(msg) = self.eingang.recv() => {
                    self.nachricht_verarbeiten(msg).await;
                }
                Some(event) = self.peer_events.recv() => {
                    self.orchestrator.handle_event(event).await;
                }
                geaendert = self.state_rx.changed() => {
                    if geaendert.is_err() {
                        break;
                    }
                    let state = *self.state_rx.borrow_and_update();
                    self.zustand_geaendert(state);
                }
            }
            self.meldungen_verarbeiten();
        }

        self.orchestrator.close_all().await;
        self.transport.off_message(self.handler);
        tracing::info!("Signaling-Runtime beendet");
    }

    // -----------------------------------------------------------------------
    // Relay-Nachrichten
    // -----------------------------------------------------------------------

    async fn nachricht_verarbeiten(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::BroadcastersList { broadcasters } => {
                self.presence.apply_snapshot(broadcasters);
                self.verzeichnis_melden();
                self.verschwundene_abbauen().await;
            }
            ServerMessage::BroadcastStarted { broadcaster } => {
                if self.presence.broadcast_started(broadcaster) {
                    self.verzeichnis_melden();
                }
            }
            ServerMessage::BroadcastStopped { broadcaster } => {
                let entfernt = self.presence.broadcast_stopped(&broadcaster);
                if self.transport.local_identity().as_ref() != Some(&broadcaster) {
                    self.orchestrator.handle_remote_stopped(&broadcaster).await;
                }
                if let Some(history) = &self.history {
                    history.refresh();
                }
                if entfernt {
                    self.verzeichnis_melden();
                }
            }
            ServerMessage::ViewerCountUpdate { count, broadcaster } => {
                // Ohne Broadcaster-Feld gilt die Zahl der eigenen Uebertragung
                let Some(identity) = broadcaster.or_else(|| self.transport.local_identity()) else {
                    return;
                };
                if self.presence.viewer_count_update(&identity, count) {
                    self.melden(ClientEvent::ZuschauerGeaendert { identity, count });
                }
            }
            ServerMessage::Offer { from, offer } => {
                self.orchestrator.handle_offer(from, offer).await;
            }
            ServerMessage::Answer { from, answer } => {
                self.orchestrator.handle_answer(from, answer).await;
            }
            ServerMessage::IceCandidate { from, candidate } => {
                self.orchestrator.handle_ice_candidate(from, candidate).await;
            }
            ServerMessage::UsernameChanged {
                old_username,
                new_username,
            } => {
                self.umbenennen(old_username, new_username).await;
            }
        }
    }

    /// Baut die Zuschauer-Session ab wenn der Snapshot ihren Broadcaster
    /// nicht mehr enthaelt (z.B. `broadcast_stopped` waehrend eines Reconnects)
    async fn verschwundene_abbauen(&mut self) {
        let Some(remote) = self.orchestrator.watching() else {
            return;
        };
        if self.presence.contains(&remote)
            || self.transport.local_identity().as_ref() == Some(&remote)
        {
            return;
        }
        tracing::info!(identity = %remote, "Angesehene Uebertragung fehlt im Snapshot");
        self.orchestrator.handle_remote_stopped(&remote).await;
    }

    async fn umbenennen(&mut self, old: Identity, new: Identity) {
        let report = reconcile(
            RenameTargets {
                peers: &mut self.orchestrator,
                directory: &mut self.presence,
                previews: &mut self.previews,
                transport: &self.transport,
            },
            &old,
            &new,
        );

        if report.betroffen() {
            self.melden(ClientEvent::IdentitaetUmbenannt {
                old,
                new,
                local: report.local,
            });
            if report.directory {
                self.verzeichnis_melden();
            }
        }
        self.orchestrator.verdraengte_schliessen().await;
    }

    // -----------------------------------------------------------------------
    // Befehle
    // -----------------------------------------------------------------------

    async fn befehl_ausfuehren(&mut self, befehl: Befehl<B::Track, B::Remote>) {
        match befehl {
            Befehl::StartBroadcast {
                title,
                on_local_media,
                reply,
            } => {
                let ergebnis = if self.transport.local_identity().is_none() {
                    Err(SignalingError::NotLoggedIn)
                } else {
                    self.orchestrator
                        .start_broadcast(title.clone(), on_local_media)
                        .await
                };
                if ergebnis.is_ok() {
                    if let Some(ich) = self.transport.local_identity() {
                        self.previews.insert(ich, PreviewKind::Lokal);
                    }
                    self.melden(ClientEvent::BroadcastGestartet { title });
                }
                let _ = reply.send(ergebnis);
            }
            Befehl::StopBroadcast { reply } => {
                let gestoppt = self.orchestrator.stop_broadcast().await;
                if gestoppt {
                    self.lokal_beendet(BroadcastEndGrund::Benutzer);
                }
                let _ = reply.send(gestoppt);
            }
            Befehl::Watch {
                remote,
                on_remote_media,
                reply,
            } => {
                let ergebnis = match self.transport.local_identity() {
                    None => Err(SignalingError::NotLoggedIn),
                    Some(ich) if ich == remote => Err(SignalingError::SelfWatch),
                    Some(_) => {
                        self.orchestrator
                            .watch_broadcast(remote, on_remote_media)
                            .await
                    }
                };
                let _ = reply.send(ergebnis);
            }
            Befehl::StopWatching { remote, reply } => {
                let verlassen = self.orchestrator.stop_watching(&remote).await;
                let _ = reply.send(verlassen);
            }
            Befehl::RequestSnapshot => {
                self.presence.request_snapshot(&self.transport);
            }
            Befehl::Directory { reply } => {
                let _ = reply.send(self.presence.entries().to_vec());
            }
            Befehl::Sessions { reply } => {
                let _ = reply.send(self.orchestrator.sessions());
            }
            Befehl::Logout { reply } => {
                let sendete = self.orchestrator.is_broadcasting();
                self.orchestrator.close_all().await;
                // Meldungen der geschlossenen Sessions sind nach dem Abmelden gegenstandslos
                self.orchestrator.take_notices();
                if sendete {
                    self.melden(ClientEvent::BroadcastBeendet {
                        grund: BroadcastEndGrund::Logout,
                    });
                }
                self.previews.clear();
                self.presence.apply_snapshot(Vec::new());
                self.verzeichnis_melden();
                self.transport.logout();
                let _ = reply.send(());
            }
            Befehl::Shutdown => {}
        }
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn zustand_geaendert(&mut self, state: ConnectionState) {
        tracing::debug!(state = %state, "Relay-Kanal Zustand");
        self.melden(ClientEvent::VerbindungGeaendert { state });
        if state == ConnectionState::Open {
            self.presence.request_snapshot(&self.transport);
            self.orchestrator.reannounce();
        }
    }

    /// Setzt Meldungen des Orchestrators in Vorschau-Aenderungen und UI-Events um
    fn meldungen_verarbeiten(&mut self) {
        for notice in self.orchestrator.take_notices() {
            match notice {
                PeerNotice::RemoteMediaStarted { remote } => {
                    self.previews.insert(remote.clone(), PreviewKind::Remote);
                    self.melden(ClientEvent::RemoteMedienGestartet { identity: remote });
                }
                PeerNotice::SessionClosed {
                    remote,
                    role: PeerRole::Viewer,
                } => {
                    if self.previews.get(&remote) == Some(PreviewKind::Remote) {
                        self.previews.remove(&remote);
                        self.melden(ClientEvent::VorschauEntfernt { identity: remote });
                    }
                }
                PeerNotice::SessionClosed {
                    role: PeerRole::Broadcaster,
                    ..
                } => {}
                PeerNotice::CaptureEnded => {
                    self.lokal_beendet(BroadcastEndGrund::CaptureBeendet);
                }
            }
        }
    }

    fn lokal_beendet(&mut self, grund: BroadcastEndGrund) {
        if let Some(ich) = self.transport.local_identity() {
            if self.previews.get(&ich) == Some(PreviewKind::Lokal) {
                self.previews.remove(&ich);
            }
        }
        self.melden(ClientEvent::BroadcastBeendet { grund });
    }

    fn verzeichnis_melden(&self) {
        self.melden(ClientEvent::VerzeichnisGeaendert {
            entries: self.presence.entries().to_vec(),
        });
    }

    fn melden(&self, event: ClientEvent) {
        // Keine Abonnenten ist kein Fehler
        let _ = self.events.send(event);
    }
}
