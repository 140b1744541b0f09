//! Gemeinsame Test-Bausteine: Fake-Peer-Backend, Fake-Capture,
//! In-Memory-Connector und ein kleines Test-Relay

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use relaycast_core::{ClientEvent, Identity, Session};
use relaycast_protocol::{
    ClientMessage, IceCandidate, ServerMessage, SessionDescription, TextCodec,
};
use relaycast_signaling::peer::CaptureEndedHook;
use relaycast_signaling::{
    CaptureHandle, HandleFor, MediaCapture, OfferOptions, PeerBackend, PeerEvents, PeerLink,
    ReconnectPolicy, RelayChannel, RelayConnector, RelayTransport, SignalSink, SignalingError,
    SignalingResult, SignalingRuntime, TransportConfig,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Fake-Peer-Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeTrack(pub &'static str);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeRemote(pub String);

/// Was eine Fake-Verbindung erlebt hat
#[derive(Debug, Default)]
pub struct LinkProtokoll {
    pub local: Vec<SessionDescription>,
    pub remote: Vec<SessionDescription>,
    pub candidates: Vec<IceCandidate>,
    pub tracks: Vec<FakeTrack>,
    pub closed: usize,
}

#[derive(Default)]
struct BackendInner {
    links: Mutex<Vec<(PeerEvents<FakeRemote>, Arc<Mutex<LinkProtokoll>>)>>,
    remote_ablehnen: AtomicBool,
    kandidaten_ablehnen: AtomicBool,
    offers: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<BackendInner>,
}

impl FakeBackend {
    pub fn anzahl_links(&self) -> usize {
        self.inner.links.lock().len()
    }

    /// Event-Sender der n-ten geoeffneten Verbindung
    pub fn events(&self, n: usize) -> PeerEvents<FakeRemote> {
        self.inner.links.lock()[n].0.clone()
    }

    pub fn protokoll(&self, n: usize) -> Arc<Mutex<LinkProtokoll>> {
        Arc::clone(&self.inner.links.lock()[n].1)
    }

    pub fn remote_ablehnen(&self, ablehnen: bool) {
        self.inner.remote_ablehnen.store(ablehnen, Ordering::SeqCst);
    }

    pub fn kandidaten_ablehnen(&self, ablehnen: bool) {
        self.inner.kandidaten_ablehnen.store(ablehnen, Ordering::SeqCst);
    }
}

pub struct FakeLink {
    backend: Arc<BackendInner>,
    protokoll: Arc<Mutex<LinkProtokoll>>,
}

#[async_trait]
impl PeerLink for FakeLink {
    type Track = FakeTrack;

    async fn create_offer(&self, options: OfferOptions) -> SignalingResult<SessionDescription> {
        assert!(options.receive_audio && options.receive_video);
        let n = self.backend.offers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::offer(format!("fake-offer-{}", n)))
    }

    async fn create_answer(&self) -> SignalingResult<SessionDescription> {
        Ok(SessionDescription::answer("fake-answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> SignalingResult<()> {
        self.protokoll.lock().local.push(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> SignalingResult<()> {
        if self.backend.remote_ablehnen.load(Ordering::SeqCst) {
            return Err(SignalingError::negotiation("Remote-Description abgelehnt"));
        }
        self.protokoll.lock().remote.push(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> SignalingResult<()> {
        if self.backend.kandidaten_ablehnen.load(Ordering::SeqCst) {
            return Err(SignalingError::negotiation("Kandidat abgelehnt"));
        }
        self.protokoll.lock().candidates.push(candidate);
        Ok(())
    }

    async fn attach_track(&self, track: &FakeTrack) -> SignalingResult<()> {
        self.protokoll.lock().tracks.push(track.clone());
        Ok(())
    }

    async fn close(&self) {
        self.protokoll.lock().closed += 1;
    }
}

#[async_trait]
impl PeerBackend for FakeBackend {
    type Track = FakeTrack;
    type Remote = FakeRemote;
    type Link = FakeLink;

    async fn open_link(&self, events: PeerEvents<FakeRemote>) -> SignalingResult<FakeLink> {
        let protokoll = Arc::new(Mutex::new(LinkProtokoll::default()));
        self.inner
            .links
            .lock()
            .push((events, Arc::clone(&protokoll)));
        Ok(FakeLink {
            backend: Arc::clone(&self.inner),
            protokoll,
        })
    }
}

// ---------------------------------------------------------------------------
// Fake-Capture
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CaptureInner {
    verweigern: AtomicBool,
    anforderungen: AtomicUsize,
    freigaben: Arc<AtomicUsize>,
    hook: Mutex<Option<CaptureEndedHook>>,
}

#[derive(Clone, Default)]
pub struct FakeCapture {
    inner: Arc<CaptureInner>,
}

impl FakeCapture {
    pub fn verweigern(&self) {
        self.inner.verweigern.store(true, Ordering::SeqCst);
    }

    pub fn anforderungen(&self) -> usize {
        self.inner.anforderungen.load(Ordering::SeqCst)
    }

    pub fn freigaben(&self) -> usize {
        self.inner.freigaben.load(Ordering::SeqCst)
    }

    /// Simuliert das Beenden der Capture durch das Betriebssystem
    pub fn extern_beenden(&self) -> bool {
        match self.inner.hook.lock().take() {
            Some(hook) => {
                hook();
                true
            }
            None => false,
        }
    }
}

pub struct FakeCaptureHandle {
    freigaben: Arc<AtomicUsize>,
}

impl CaptureHandle for FakeCaptureHandle {
    type Track = FakeTrack;

    fn tracks(&self) -> Vec<FakeTrack> {
        vec![FakeTrack("audio"), FakeTrack("video")]
    }

    fn release(&mut self) {
        self.freigaben.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaCapture for FakeCapture {
    type Track = FakeTrack;
    type Handle = FakeCaptureHandle;

    async fn acquire(&self, on_ended: CaptureEndedHook) -> SignalingResult<FakeCaptureHandle> {
        self.inner.anforderungen.fetch_add(1, Ordering::SeqCst);
        if self.inner.verweigern.load(Ordering::SeqCst) {
            return Err(SignalingError::capture("Zugriff verweigert"));
        }
        *self.inner.hook.lock() = Some(on_ended);
        Ok(FakeCaptureHandle {
            freigaben: Arc::clone(&self.inner.freigaben),
        })
    }
}

// ---------------------------------------------------------------------------
// Aufzeichnende Senke
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Aufzeichnung {
    nachrichten: Mutex<Vec<ClientMessage>>,
}

impl Aufzeichnung {
    pub fn nachrichten(&self) -> Vec<ClientMessage> {
        self.nachrichten.lock().clone()
    }

    pub fn leeren(&self) {
        self.nachrichten.lock().clear();
    }

    pub fn anzahl(&self, typ: &str) -> usize {
        use relaycast_protocol::MessageKind;
        self.nachrichten
            .lock()
            .iter()
            .filter(|m| m.kind() == typ)
            .count()
    }
}

impl SignalSink for Aufzeichnung {
    fn send(&self, message: ClientMessage) {
        self.nachrichten.lock().push(message);
    }
}

// ---------------------------------------------------------------------------
// In-Memory-Connector (Transport-Tests)
// ---------------------------------------------------------------------------

/// Relay-Seite einer geoeffneten In-Memory-Verbindung
pub struct RelayEnde {
    pub url: String,
    pub an_client: mpsc::UnboundedSender<String>,
    pub vom_client: mpsc::UnboundedReceiver<String>,
    pub geoeffnet: tokio::time::Instant,
}

#[derive(Clone)]
pub struct MemoryConnector {
    enden: mpsc::UnboundedSender<RelayEnde>,
    fehlschlagen: Arc<AtomicBool>,
    versuche: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn neu() -> (Self, mpsc::UnboundedReceiver<RelayEnde>) {
        let (enden, rx) = mpsc::unbounded_channel();
        let connector = Self {
            enden,
            fehlschlagen: Arc::new(AtomicBool::new(false)),
            versuche: Arc::new(AtomicUsize::new(0)),
        };
        (connector, rx)
    }

    pub fn fehlschlagen(&self, ja: bool) {
        self.fehlschlagen.store(ja, Ordering::SeqCst);
    }

    pub fn versuche(&self) -> usize {
        self.versuche.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayConnector for MemoryConnector {
    async fn open(&self, url: &str) -> SignalingResult<RelayChannel> {
        self.versuche.fetch_add(1, Ordering::SeqCst);
        if self.fehlschlagen.load(Ordering::SeqCst) {
            return Err(SignalingError::WebSocket("Verbindung verweigert".into()));
        }
        let (an_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, vom_client) = mpsc::unbounded_channel();
        let _ = self.enden.send(RelayEnde {
            url: url.to_string(),
            an_client,
            vom_client,
            geoeffnet: tokio::time::Instant::now(),
        });
        Ok(RelayChannel { outgoing, incoming })
    }
}

// ---------------------------------------------------------------------------
// Test-Relay (leitet Nachrichten zwischen Clients weiter)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RelayInner {
    clients: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
    broadcasters: Mutex<Vec<String>>,
    zuschauer: Mutex<HashMap<String, u32>>,
    empfangen: Mutex<Vec<(String, ClientMessage)>>,
    codec: TextCodec,
}

/// Relay mit dem Verhalten des echten Servers, Token = Benutzername
#[derive(Clone, Default)]
pub struct TestRelay {
    inner: Arc<RelayInner>,
}

impl TestRelay {
    /// Schickt eine Nachricht an einen verbundenen Client
    pub fn an(&self, user: &str, msg: &ServerMessage) {
        let frame = self.inner.codec.encode(msg).expect("Frame kodierbar");
        if let Some(tx) = self.inner.clients.lock().get(user) {
            let _ = tx.send(frame);
        }
    }

    fn an_alle(&self, msg: &ServerMessage) {
        let frame = self.inner.codec.encode(msg).expect("Frame kodierbar");
        for tx in self.inner.clients.lock().values() {
            let _ = tx.send(frame.clone());
        }
    }

    /// Trennt einen Client hart (wie ein Netzwerkabbruch)
    pub fn trennen(&self, user: &str) {
        self.inner.clients.lock().remove(user);
    }

    pub fn broadcasters(&self) -> Vec<String> {
        self.inner.broadcasters.lock().clone()
    }

    /// Alle Nachrichten die `user` an das Relay geschickt hat
    pub fn empfangen_von(&self, user: &str) -> Vec<ClientMessage> {
        self.inner
            .empfangen
            .lock()
            .iter()
            .filter(|(u, _)| u == user)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn verarbeiten(&self, user: &str, frame: &str) {
        let msg: ClientMessage = self.inner.codec.decode(frame).expect("gueltiges Frame");
        self.inner
            .empfangen
            .lock()
            .push((user.to_string(), msg.clone()));
        let von = Identity::new(user);

        match msg {
            ClientMessage::GetBroadcasters => {
                let broadcasters = self
                    .broadcasters()
                    .into_iter()
                    .map(Identity::new)
                    .collect();
                self.an(user, &ServerMessage::BroadcastersList { broadcasters });
            }
            ClientMessage::StartBroadcast { .. } => {
                {
                    let mut liste = self.inner.broadcasters.lock();
                    if !liste.iter().any(|b| b == user) {
                        liste.push(user.to_string());
                    }
                }
                self.an_alle(&ServerMessage::BroadcastStarted { broadcaster: von });
            }
            ClientMessage::StopBroadcast => {
                self.inner.broadcasters.lock().retain(|b| b != user);
                self.an_alle(&ServerMessage::BroadcastStopped { broadcaster: von });
            }
            ClientMessage::ViewerJoined { target } => {
                let count = {
                    let mut zuschauer = self.inner.zuschauer.lock();
                    let count = zuschauer.entry(target.to_string()).or_insert(0);
                    *count += 1;
                    *count
                };
                self.an(
                    target.as_str(),
                    &ServerMessage::ViewerCountUpdate {
                        count,
                        broadcaster: None,
                    },
                );
            }
            ClientMessage::ViewerLeft { target } => {
                let count = {
                    let mut zuschauer = self.inner.zuschauer.lock();
                    let count = zuschauer.entry(target.to_string()).or_insert(0);
                    *count = count.saturating_sub(1);
                    *count
                };
                self.an(
                    target.as_str(),
                    &ServerMessage::ViewerCountUpdate {
                        count,
                        broadcaster: None,
                    },
                );
            }
            ClientMessage::Offer { target, offer } => {
                self.an(target.as_str(), &ServerMessage::Offer { from: von, offer });
            }
            ClientMessage::Answer { target, answer } => {
                self.an(target.as_str(), &ServerMessage::Answer { from: von, answer });
            }
            ClientMessage::IceCandidate { target, candidate } => {
                self.an(
                    target.as_str(),
                    &ServerMessage::IceCandidate {
                        from: von,
                        candidate,
                    },
                );
            }
        }
    }

    fn abgemeldet(&self, user: &str) {
        let weg = {
            let mut clients = self.inner.clients.lock();
            match clients.get(user) {
                Some(tx) if !tx.is_closed() => false,
                _ => {
                    clients.remove(user);
                    true
                }
            }
        };
        if weg {
            let war_broadcaster = {
                let mut liste = self.inner.broadcasters.lock();
                let vorher = liste.len();
                liste.retain(|b| b != user);
                liste.len() != vorher
            };
            if war_broadcaster {
                self.an_alle(&ServerMessage::BroadcastStopped {
                    broadcaster: Identity::new(user),
                });
            }
        }
    }
}

#[async_trait]
impl RelayConnector for TestRelay {
    async fn open(&self, url: &str) -> SignalingResult<RelayChannel> {
        let user = url.rsplit('/').next().unwrap_or_default().to_string();
        let (an_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, mut vom_client) = mpsc::unbounded_channel::<String>();
        self.inner.clients.lock().insert(user.clone(), an_client);

        let relay = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = vom_client.recv().await {
                relay.verarbeiten(&user, &frame);
            }
            relay.abgemeldet(&user);
        });

        Ok(RelayChannel { outgoing, incoming })
    }
}

// ---------------------------------------------------------------------------
// Test-Client (Runtime + Fakes)
// ---------------------------------------------------------------------------

pub struct TestClient {
    pub transport: RelayTransport,
    pub handle: HandleFor<FakeBackend>,
    pub backend: FakeBackend,
    pub capture: FakeCapture,
    pub events: broadcast::Receiver<ClientEvent>,
    pub task: JoinHandle<()>,
}

/// Startet eine Runtime gegen das Test-Relay und meldet `name` an
pub fn client_starten(relay: &TestRelay, name: &str) -> TestClient {
    let config = TransportConfig {
        relay_url: "mem://relay".into(),
        reconnect: ReconnectPolicy::fest(Duration::from_millis(50)),
        ..TransportConfig::default()
    };
    let transport = RelayTransport::neu(config, Arc::new(relay.clone()));
    let backend = FakeBackend::default();
    let capture = FakeCapture::default();

    let (runtime, handle) =
        SignalingRuntime::neu(transport.clone(), backend.clone(), capture.clone());
    let events = handle.subscribe();
    let task = tokio::spawn(runtime.run());
    transport.login(Session::new(name, Identity::new(name)));

    TestClient {
        transport,
        handle,
        backend,
        capture,
        events,
        task,
    }
}

// ---------------------------------------------------------------------------
// Warten
// ---------------------------------------------------------------------------

/// Wartet (max. 5 s) bis `pruefen` true liefert
pub async fn warten_bis<F, Fut>(mut pruefen: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if pruefen().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Bedingung nicht rechtzeitig erfuellt");
}

/// Wartet auf das erste Event das `passt` erfuellt
pub async fn event_abwarten<P>(rx: &mut broadcast::Receiver<ClientEvent>, mut passt: P) -> ClientEvent
where
    P: FnMut(&ClientEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if passt(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("Event-Kanal geschlossen"),
            }
        }
    })
    .await
    .expect("Event nicht rechtzeitig eingetroffen")
}
