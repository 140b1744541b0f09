//! relaycast-client – Bibliotheks-Root
//!
//! Verdrahtet Auth-Service, Relay-Transport, Signaling-Runtime und
//! WebRTC-Backend und bedient sie ueber die Konsole.

pub mod config;
pub mod console;

use anyhow::{anyhow, Context, Result};
use config::ClientConfig;
use console::Befehl;
use parking_lot::Mutex;
use relaycast_api::{ApiError, AuthClient, HistoryClient, HistoryView};
use relaycast_core::{ClientEvent, Identity};
use relaycast_rtc::{stille_fuer_audio, CaptureControl, RemoteMedia, RtcBackend, SampleCapture};
use relaycast_signaling::{HandleFor, RelayTransport, SignalingError, SignalingRuntime};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

type Eingabe = Lines<BufReader<Stdin>>;

/// Laufende Stille-Quellen der eigenen Uebertragung
type Quellen = Arc<Mutex<Vec<JoinHandle<()>>>>;

pub struct Client {
    pub config: ClientConfig,
}

impl Client {
    pub fn neu(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Meldet an und verarbeitet Konsolenbefehle bis `quit` oder Eingabeende
    pub async fn starten(self) -> Result<()> {
        let mut eingabe = BufReader::new(tokio::io::stdin()).lines();

        let username = match self.config.account.username.trim() {
            "" => abfragen(&mut eingabe, "Benutzername").await?,
            name => name.to_string(),
        };
        let password = match &self.config.account.password {
            Some(p) => p.clone(),
            None => abfragen(&mut eingabe, "Passwort").await?,
        };

        let auth = AuthClient::neu(&self.config.api.base_url)?;
        let history = HistoryView::neu(
            HistoryClient::neu(&self.config.api.base_url)?,
            self.config.api.history_page_size,
        );
        let session = auth
            .login(&username, &password)
            .await
            .map_err(|e| anyhow!("Anmeldung fehlgeschlagen: {}", e.fuer_ui()))?;
        let token = session.auth_token.clone();

        let transport = RelayTransport::mit_websocket(self.config.transport());
        let backend = RtcBackend::neu(self.config.rtc.clone()).context("WebRTC-Backend")?;
        let capture = SampleCapture::neu(self.config.capture.clone());
        let capture_control = capture.control();
        let (runtime, handle) = SignalingRuntime::neu(transport.clone(), backend, capture);
        let runtime = runtime.mit_history(Arc::new(history.clone()));

        let quellen: Quellen = Arc::default();
        let ausgabe = tokio::spawn(events_ausgeben(handle.subscribe(), Arc::clone(&quellen)));
        let runtime_task = tokio::spawn(runtime.run());

        transport.login(session);
        println!("Angemeldet als {username}. help zeigt alle Befehle.");

        let mut sitzung = Sitzung {
            handle: handle.clone(),
            transport,
            auth,
            history,
            token,
            quellen,
            capture: capture_control,
        };

        while let Some(zeile) = eingabe.next_line().await? {
            match console::parsen(&zeile) {
                Ok(None) => {}
                Ok(Some(Befehl::Quit)) => break,
                Ok(Some(befehl)) => {
                    if let Err(e) = sitzung.ausfuehren(befehl).await {
                        println!("! {e}");
                    }
                }
                Err(e) => println!("! {e}"),
            }
        }

        tracing::info!("Client wird beendet");
        sitzung.stille_beenden();
        if let Err(e) = handle.logout().await {
            tracing::warn!(fehler = %e, "Abmelden fehlgeschlagen");
        }
        handle.shutdown().await;
        runtime_task.await?;
        ausgabe.abort();
        Ok(())
    }
}

struct Sitzung {
    handle: HandleFor<RtcBackend>,
    transport: RelayTransport,
    auth: AuthClient,
    history: HistoryView,
    token: String,
    quellen: Quellen,
    capture: CaptureControl,
}

impl Sitzung {
    async fn ausfuehren(&mut self, befehl: Befehl) -> Result<()> {
        match befehl {
            Befehl::List => {
                let entries = self.handle.directory().await?;
                println!("{}", console::verzeichnis_text(&entries));
            }
            Befehl::Watch(remote) => {
                let name = remote.clone();
                self.handle
                    .watch(remote, move |media: RemoteMedia| {
                        tokio::spawn(empfangen(name.clone(), media));
                    })
                    .await
                    .map_err(signaling)?;
                println!("Verbinde mit der Uebertragung...");
            }
            Befehl::Unwatch(remote) => {
                if !self.handle.stop_watching(remote.clone()).await? {
                    println!("Du schaust {remote} nicht zu.");
                }
            }
            Befehl::Broadcast { title } => {
                let quellen = Arc::clone(&self.quellen);
                self.handle
                    .start_broadcast(title, move |tracks| {
                        quellen.lock().extend(stille_fuer_audio(tracks));
                    })
                    .await
                    .map_err(signaling)?;
            }
            Befehl::Stop => {
                if !self.handle.stop_broadcast().await? {
                    println!("Es laeuft keine eigene Uebertragung.");
                }
                self.stille_beenden();
            }
            Befehl::Revoke => {
                // Der Ende-Hook stoppt die Uebertragung in der Runtime
                if !self.capture.beenden() {
                    println!("Es laeuft keine Aufnahme.");
                }
            }
            Befehl::History => {
                self.history.reset().await.map_err(api)?;
                self.verlauf_ausgeben(0);
            }
            Befehl::More => {
                if !self.history.hat_mehr() {
                    println!("Keine weiteren Eintraege.");
                    return Ok(());
                }
                let vorher = self.history.eintraege().len();
                self.history.load_more().await.map_err(api)?;
                self.verlauf_ausgeben(vorher);
            }
            Befehl::Rename { new, password } => self.umbenennen(new, &password).await?,
            Befehl::Password { old, new } => {
                self.auth
                    .change_password(&self.token, &old, &new)
                    .await
                    .map_err(api)?;
                println!("Passwort geaendert.");
            }
            Befehl::Help => println!("{}", console::HILFE),
            Befehl::Quit => {}
        }
        Ok(())
    }

    /// Der Relay meldet die Umbenennung allen Teilnehmern, die Runtime
    /// zieht Sessions und Verzeichnis dann selbst nach
    async fn umbenennen(&mut self, new: Identity, password: &str) -> Result<()> {
        let ergebnis = self
            .auth
            .change_username(&self.token, new.as_str(), password)
            .await
            .map_err(api)?;
        if let Some(token) = ergebnis.access_token {
            self.transport.replace_token(token.clone());
            self.token = token;
        }
        println!("Benutzername wird zu {} geaendert.", ergebnis.username);
        Ok(())
    }

    fn verlauf_ausgeben(&self, ab: usize) {
        let eintraege = self.history.eintraege();
        if eintraege.is_empty() {
            println!("Noch keine beendeten Uebertragungen.");
            return;
        }
        for stream in eintraege.iter().skip(ab) {
            println!("{}", console::verlauf_zeile(stream));
        }
        println!(
            "  ({} von {}{})",
            eintraege.len(),
            self.history.total(),
            if self.history.hat_mehr() { ", more laedt weitere" } else { "" }
        );
    }

    fn stille_beenden(&self) {
        stille_beenden(&self.quellen);
    }
}

fn stille_beenden(quellen: &Quellen) {
    for quelle in quellen.lock().drain(..) {
        quelle.abort();
    }
}

fn signaling(e: SignalingError) -> anyhow::Error {
    if !e.fuer_ui() {
        tracing::warn!(fehler = %e, "Befehl fehlgeschlagen");
    }
    e.into()
}

fn api(e: ApiError) -> anyhow::Error {
    anyhow!(e.fuer_ui())
}

async fn abfragen(eingabe: &mut Eingabe, frage: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{frage}: ").as_bytes()).await?;
    stdout.flush().await?;
    let antwort = eingabe
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("Eingabe beendet"))?;
    Ok(antwort.trim().to_string())
}

/// Gibt UI-Events aus bis die Runtime endet
async fn events_ausgeben(mut events: tokio::sync::broadcast::Receiver<ClientEvent>, quellen: Quellen) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if matches!(event, ClientEvent::BroadcastBeendet { .. }) {
                    stille_beenden(&quellen);
                }
                println!("{}", console::event_text(&event));
            }
            Err(RecvError::Lagged(n)) => {
                tracing::warn!(verpasst = n, "UI-Events uebersprungen");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Liest die RTP-Pakete eines Remote-Tracks bis der Track endet
async fn empfangen(von: Identity, mut media: RemoteMedia) {
    let mut pakete: u64 = 0;
    let mut bytes: u64 = 0;
    while let Some(paket) = media.packets.recv().await {
        pakete += 1;
        bytes += paket.payload.len() as u64;
        if pakete % 500 == 0 {
            tracing::debug!(identity = %von, kind = ?media.kind, pakete, bytes, "Empfang laeuft");
        }
    }
    tracing::info!(identity = %von, kind = ?media.kind, track = %media.track_id, pakete, bytes, "Remote-Track beendet");
}
