//! Relay-Transport – Einziger Steuerkanal zum Relay
//!
//! Verwaltet Session, Verbindungsaufbau, automatischen Reconnect und die
//! Verteilung eingehender Nachrichten an registrierte Handler.
//!
//! ## State Machine
//! ```text
//! Disconnected --connect (Token)--> Connecting --offen--> Open
//!      ^                                ^                   |
//!      |                                +--Retry (Delay)----+ unerwartet geschlossen
//!      +---------------- disconnect ------------------------+
//! ```
//!
//! ## Generationen
//! Jeder Verbindungsaufbau bekommt eine Generation. Tasks einer alten
//! Generation (abgebrochene Verbindung, geplanter Retry) pruefen vor jeder
//! Zustandsaenderung ob sie noch aktuell sind. Dadurch plant ein bewusstes
//! `disconnect()` nie einen Retry und es laeuft hoechstens eine Verbindung.

use parking_lot::Mutex;
use rand::Rng;
use relaycast_core::{ConnectionState, Identity, Session};
use relaycast_protocol::{ClientMessage, MessageKind, ServerMessage, TextCodec};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connector::{RelayChannel, RelayConnector, WebSocketConnector};
use crate::error::{SignalingError, SignalingResult};
use crate::peer::SignalSink;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Standard-Verzoegerung vor einem Reconnect
pub const STANDARD_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Reconnect-Strategie
///
/// Standard: fester Abstand von 1 s, unbegrenzt viele Versuche.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Verzoegerung vor dem ersten Versuch
    pub delay: Duration,
    /// Faktor pro weiterem Fehlversuch (1.0 = fester Abstand)
    pub multiplier: f64,
    /// Obergrenze der Verzoegerung
    pub max_delay: Duration,
    /// Zufaellige Abweichung als Anteil (0.1 = +-10 %)
    pub jitter: f64,
    /// Maximale Anzahl aufeinanderfolgender Versuche (None = unbegrenzt)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: STANDARD_RECONNECT_DELAY,
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Fester Abstand ohne Limit
    pub fn fest(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Prueft ob Versuch Nummer `versuch` (ab 1) noch erlaubt ist
    pub fn erlaubt(&self, versuch: u32) -> bool {
        self.max_attempts.map_or(true, |max| versuch <= max)
    }

    /// Verzoegerung vor Versuch Nummer `versuch` (ab 1)
    pub fn verzoegerung(&self, versuch: u32) -> Duration {
        let exponent = i32::try_from(versuch.saturating_sub(1)).unwrap_or(i32::MAX);
        let obergrenze = self.max_delay.max(self.delay).as_secs_f64();
        let basis = (self.delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent))
            .min(obergrenze);

        let jitter = self.jitter.clamp(0.0, 1.0);
        let faktor = if jitter > 0.0 {
            rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };
        Duration::from_secs_f64((basis * faktor).max(0.0))
    }
}

/// Konfiguration fuer den Relay-Transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Basis-URL des Relays (z.B. `wss://relay.example.org`)
    pub relay_url: String,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_size: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:8000".to_string(),
            max_frame_size: relaycast_protocol::wire::DEFAULT_MAX_FRAME_SIZE,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Kanal-URL fuer einen Token: `<relay_url>/ws/<token>`
pub fn kanal_url(relay_url: &str, token: &str) -> String {
    format!("{}/ws/{}", relay_url.trim_end_matches('/'), token)
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Handler fuer eingehende Nachrichten
pub type MessageHandler = Arc<dyn Fn(&ServerMessage) + Send + Sync + 'static>;

/// Registrierungs-ID eines Handlers (fuer `off_message`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

// ---------------------------------------------------------------------------
// RelayTransport
// ---------------------------------------------------------------------------

/// Steuerkanal zum Relay
///
/// Clone teilt den inneren Zustand. Pro Prozess wird genau eine Instanz beim
/// Start erzeugt und an alle Services weitergegeben.
#[derive(Clone)]
pub struct RelayTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    config: TransportConfig,
    codec: TextCodec,
    connector: Arc<dyn RelayConnector>,
    session: Mutex<Option<Session>>,
    kanal: Mutex<KanalSlot>,
    handlers: Mutex<Vec<(HandlerId, MessageHandler)>>,
    naechster_handler: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
}

/// Alles was zur aktuellen Verbindung gehoert
#[derive(Default)]
struct KanalSlot {
    generation: u64,
    /// Nur gesetzt solange der Kanal offen ist
    outgoing: Option<mpsc::UnboundedSender<String>>,
    task: Option<JoinHandle<()>>,
    retry: Option<CancellationToken>,
    /// Aufeinanderfolgende unerwartete Abbrueche
    fehlversuche: u32,
}

impl KanalSlot {
    fn schliessen(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(retry) = self.retry.take() {
            retry.cancel();
        }
        self.outgoing = None;
    }
}

impl RelayTransport {
    /// Erstellt einen Transport mit eigenem Connector
    pub fn neu(config: TransportConfig, connector: Arc<dyn RelayConnector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let codec = TextCodec::with_max_size(config.max_frame_size);
        Self {
            inner: Arc::new(TransportInner {
                config,
                codec,
                connector,
                session: Mutex::new(None),
                kanal: Mutex::new(KanalSlot::default()),
                handlers: Mutex::new(Vec::new()),
                naechster_handler: AtomicU64::new(1),
                state_tx,
            }),
        }
    }

    /// Erstellt einen Transport ueber WebSocket
    pub fn mit_websocket(config: TransportConfig) -> Self {
        Self::neu(config, Arc::new(WebSocketConnector::neu()))
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Speichert die Session und verbindet
    pub fn login(&self, session: Session) {
        tracing::info!(identity = %session.local_identity, "Session gesetzt");
        *self.inner.session.lock() = Some(session);
        self.inner.kanal.lock().fehlversuche = 0;
        self.connect();
    }

    /// Verwirft die Session und trennt
    pub fn logout(&self) {
        *self.inner.session.lock() = None;
        self.disconnect();
        tracing::info!("Session verworfen");
    }

    /// Eigene Identitaet der aktuellen Session
    pub fn local_identity(&self) -> Option<Identity> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.local_identity.clone())
    }

    /// Zieht die eigene Identitaet nach einer Umbenennung nach
    ///
    /// Gibt true zurueck wenn `old` die eigene Identitaet war.
    pub fn rename_local(&self, old: &Identity, new: &Identity) -> bool {
        let mut session = self.inner.session.lock();
        match session.as_mut() {
            Some(s) if &s.local_identity == old => {
                s.local_identity = new.clone();
                true
            }
            _ => false,
        }
    }

    /// Ersetzt den Token (z.B. neuer Token nach Umbenennung).
    /// Wirkt erst beim naechsten Verbindungsaufbau.
    pub fn replace_token(&self, token: impl Into<String>) {
        if let Some(s) = self.inner.session.lock().as_mut() {
            s.auth_token = token.into();
        }
    }

    // -----------------------------------------------------------------------
    // Verbindung
    // -----------------------------------------------------------------------

    /// Baut den Kanal auf. Ein offener Kanal wird vorher geschlossen.
    /// Ohne Session passiert nichts.
    pub fn connect(&self) {
        self.inner.verbinden();
    }

    /// Schliesst den Kanal ohne Reconnect und verwirft geplante Retries
    pub fn disconnect(&self) {
        let mut slot = self.inner.kanal.lock();
        slot.schliessen();
        slot.generation += 1;
        slot.fehlversuche = 0;
        self.inner.zustand_setzen(ConnectionState::Disconnected);
        drop(slot);
        tracing::debug!("Relay-Kanal bewusst getrennt");
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Abonniert Zustandswechsel des Kanals
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    /// Sendet eine Nachricht wenn der Kanal offen ist
    pub fn try_send(&self, message: &ClientMessage) -> SignalingResult<()> {
        let frame = self.inner.codec.encode(message)?;
        let slot = self.inner.kanal.lock();
        let tx = slot
            .outgoing
            .as_ref()
            .ok_or(SignalingError::TransportUnavailable)?;
        tx.send(frame)
            .map_err(|_| SignalingError::TransportUnavailable)
    }

    /// Sendet eine Nachricht, verwirft sie still wenn der Kanal nicht offen ist
    pub fn send(&self, message: ClientMessage) {
        match self.try_send(&message) {
            Ok(()) => tracing::trace!(typ = message.kind(), "Nachricht an Relay"),
            Err(SignalingError::TransportUnavailable) => {
                tracing::debug!(typ = message.kind(), "Relay-Kanal nicht offen, Nachricht verworfen")
            }
            Err(e) => tracing::warn!(typ = message.kind(), fehler = %e, "Nachricht nicht sendbar"),
        }
    }

    // -----------------------------------------------------------------------
    // Handler
    // -----------------------------------------------------------------------

    /// Registriert einen Handler fuer alle eingehenden Nachrichten
    ///
    /// Handler laufen nacheinander auf dem Lese-Task und duerfen nicht
    /// blockieren.
    pub fn on_message<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.naechster_handler.fetch_add(1, Ordering::Relaxed));
        self.inner.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Entfernt einen Handler. Gibt false zurueck wenn er nicht registriert war.
    pub fn off_message(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.lock();
        let vorher = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != vorher
    }
}

impl SignalSink for RelayTransport {
    fn send(&self, message: ClientMessage) {
        RelayTransport::send(self, message);
    }
}

// ---------------------------------------------------------------------------
// Interne Verbindungslogik
// ---------------------------------------------------------------------------

impl TransportInner {
    fn verbinden(self: &Arc<Self>) {
        self.verbinden_fuer(None);
    }

    /// Mit `erwartet` (geplanter Retry) wird nur verbunden solange die
    /// Generation unveraendert ist. Pruefung und neue Generation liegen
    /// unter demselben Lock.
    fn verbinden_fuer(self: &Arc<Self>, erwartet: Option<u64>) {
        let token = match self.session.lock().as_ref() {
            Some(s) => s.auth_token.clone(),
            None => {
                tracing::debug!("Kein Token, Verbindungsaufbau uebersprungen");
                return;
            }
        };
        let url = kanal_url(&self.config.relay_url, &token);

        let mut slot = self.kanal.lock();
        if let Some(erwartet) = erwartet {
            if slot.generation != erwartet {
                tracing::debug!(erwartet, aktuell = slot.generation, "Veralteter Retry verworfen");
                return;
            }
            slot.retry = None;
        }
        slot.schliessen();
        slot.generation += 1;
        let generation = slot.generation;
        self.zustand_setzen(ConnectionState::Connecting);

        tracing::info!(relay = %self.config.relay_url, generation, "Verbinde mit Relay");
        let inner = Arc::clone(self);
        slot.task = Some(tokio::spawn(async move {
            inner.verbindung_betreiben(generation, url).await;
        }));
    }

    async fn verbindung_betreiben(self: Arc<Self>, generation: u64, url: String) {
        let kanal = match self.connector.open(&url).await {
            Ok(k) => k,
            Err(e) => {
                tracing::error!(fehler = %e, "Verbindung zum Relay fehlgeschlagen");
                self.unerwartet_geschlossen(generation);
                return;
            }
        };
        let RelayChannel {
            outgoing,
            mut incoming,
        } = kanal;

        {
            let mut slot = self.kanal.lock();
            if slot.generation != generation {
                return;
            }
            slot.outgoing = Some(outgoing);
            slot.fehlversuche = 0;
            self.zustand_setzen(ConnectionState::Open);
        }
        tracing::info!(generation, "Relay-Kanal offen");

        while let Some(frame) = incoming.recv().await {
            match self.codec.decode::<ServerMessage>(&frame) {
                Ok(msg) => {
                    tracing::trace!(typ = msg.kind(), "Nachricht vom Relay");
                    self.verteilen(&msg);
                }
                Err(e) => tracing::warn!(fehler = %e, "Frame vom Relay abgelehnt"),
            }
        }

        self.unerwartet_geschlossen(generation);
    }

    /// Meldet nur echte Zustandswechsel
    fn zustand_setzen(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|aktuell| {
            let geaendert = *aktuell != state;
            *aktuell = state;
            geaendert
        });
    }

    /// Ruft alle Handler in Registrierungsreihenfolge auf
    fn verteilen(&self, msg: &ServerMessage) {
        let handlers: Vec<MessageHandler> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(msg);
        }
    }

    fn unerwartet_geschlossen(self: &Arc<Self>, generation: u64) {
        let mut slot = self.kanal.lock();
        if slot.generation != generation {
            return;
        }
        slot.outgoing = None;
        slot.task = None;
        slot.fehlversuche += 1;
        let versuch = slot.fehlversuche;

        let policy = &self.config.reconnect;
        if !policy.erlaubt(versuch) {
            self.zustand_setzen(ConnectionState::Disconnected);
            tracing::error!(versuche = versuch - 1, "Reconnect aufgegeben");
            return;
        }
        // Open -> Connecting solange ein Retry geplant ist
        self.zustand_setzen(ConnectionState::Connecting);
        let verzoegerung = policy.verzoegerung(versuch);
        tracing::warn!(
            versuch,
            verzoegerung_ms = verzoegerung.as_millis() as u64,
            "Relay-Kanal unerwartet geschlossen, Reconnect geplant"
        );

        let token = CancellationToken::new();
        let abbruch = token.clone();
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = abbruch.cancelled() => {}
                _ = tokio::time::sleep(verzoegerung) => {
                    inner.verbinden_fuer(Some(generation));
                }
            }
        });
        slot.retry = Some(token);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
