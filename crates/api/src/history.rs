//! Verlauf beendeter Uebertragungen
//!
//! `HistoryClient` liest einzelne Seiten, `HistoryView` haelt die bisher
//! geladenen Seiten ohne Duplikate und frischt sich nach jedem
//! `broadcast_stopped` im Hintergrund auf.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relaycast_core::HistoryRefresh;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::http::{pruefen, Basis};

/// Standard-Seitengroesse
pub const STANDARD_SEITE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcasterRef {
    pub username: String,
}

/// Eine beendete Uebertragung
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamRecord {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub broadcaster_id: i64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub viewer_count: u32,
    pub broadcaster: BroadcasterRef,
}

impl StreamRecord {
    /// Dauer der Uebertragung, falls beendet
    pub fn dauer(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|ende| ende - self.started_at)
    }
}

/// Eine Seite des Verlaufs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamPage {
    pub streams: Vec<StreamRecord>,
    pub total: u64,
}

// ---------------------------------------------------------------------------
// HistoryClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HistoryClient {
    basis: Basis,
}

impl HistoryClient {
    pub fn neu(base_url: &str) -> ApiResult<Self> {
        Ok(Self {
            basis: Basis::neu(base_url)?,
        })
    }

    pub async fn ended(&self, skip: u64, limit: u32) -> ApiResult<StreamPage> {
        let antwort = self
            .basis
            .get("/streams/ended")
            .query(&[("skip", skip), ("limit", u64::from(limit))])
            .send()
            .await?;
        let seite: StreamPage = pruefen(antwort).await?.json().await?;
        tracing::debug!(skip, anzahl = seite.streams.len(), total = seite.total, "Verlaufsseite geladen");
        Ok(seite)
    }
}

// ---------------------------------------------------------------------------
// HistoryView
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Geladen {
    eintraege: Vec<StreamRecord>,
    ids: HashSet<i64>,
    /// Anzahl der vom Service abgerufenen Eintraege (Offset der naechsten Seite)
    abgerufen: u64,
    total: u64,
}

impl Geladen {
    /// Haengt eine Seite an und gibt die Anzahl neuer Eintraege zurueck
    fn anhaengen(&mut self, seite: StreamPage) -> usize {
        self.abgerufen += seite.streams.len() as u64;
        self.total = seite.total;
        let vorher = self.eintraege.len();
        for stream in seite.streams {
            if self.ids.insert(stream.id) {
                self.eintraege.push(stream);
            }
        }
        self.eintraege.len() - vorher
    }

    fn leeren(&mut self) {
        *self = Self::default();
    }
}

/// Geladene Verlaufsseiten
#[derive(Clone)]
pub struct HistoryView {
    client: HistoryClient,
    seite: u32,
    geladen: Arc<Mutex<Geladen>>,
}

impl HistoryView {
    pub fn neu(client: HistoryClient, seite: u32) -> Self {
        Self {
            client,
            seite: seite.max(1),
            geladen: Arc::new(Mutex::new(Geladen::default())),
        }
    }

    /// Verwirft alles und laedt die erste Seite neu
    pub async fn reset(&self) -> ApiResult<usize> {
        let seite = self.client.ended(0, self.seite).await?;
        let mut geladen = self.geladen.lock();
        geladen.leeren();
        Ok(geladen.anhaengen(seite))
    }

    /// Laedt die naechste Seite. Gibt die Anzahl neuer Eintraege zurueck.
    pub async fn load_more(&self) -> ApiResult<usize> {
        let skip = self.geladen.lock().abgerufen;
        let seite = self.client.ended(skip, self.seite).await?;
        Ok(self.geladen.lock().anhaengen(seite))
    }

    pub fn eintraege(&self) -> Vec<StreamRecord> {
        self.geladen.lock().eintraege.clone()
    }

    /// Weitere Seiten verfuegbar
    pub fn hat_mehr(&self) -> bool {
        let geladen = self.geladen.lock();
        geladen.abgerufen < geladen.total
    }

    pub fn total(&self) -> u64 {
        self.geladen.lock().total
    }
}

impl HistoryRefresh for HistoryView {
    fn refresh(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Verlauf nicht aufgefrischt: keine Tokio-Runtime");
            return;
        };
        let view = self.clone();
        runtime.spawn(async move {
            if let Err(e) = view.reset().await {
                tracing::warn!(fehler = %e, "Verlauf konnte nicht aufgefrischt werden");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: i64) -> StreamRecord {
        StreamRecord {
            id,
            title: None,
            broadcaster_id: 1,
            started_at: "2026-10-01T18:00:00Z".parse().unwrap(),
            ended_at: Some("2026-10-01T19:30:00Z".parse().unwrap()),
            viewer_count: 0,
            broadcaster: BroadcasterRef {
                username: "alice".into(),
            },
        }
    }

    #[test]
    fn seite_aus_service_json() {
        let json = r#"{
            "streams": [{
                "id": 7,
                "title": "Abendrunde",
                "broadcaster_id": 3,
                "started_at": "2026-10-01T18:00:00+00:00",
                "ended_at": "2026-10-01T19:00:00+00:00",
                "viewer_count": 4,
                "broadcaster": {"username": "alice"}
            }],
            "total": 1
        }"#;
        let seite: StreamPage = serde_json::from_str(json).unwrap();
        assert_eq!(seite.total, 1);
        let s = &seite.streams[0];
        assert_eq!(s.title.as_deref(), Some("Abendrunde"));
        assert_eq!(s.broadcaster.username, "alice");
        assert_eq!(s.dauer(), Some(chrono::Duration::hours(1)));
    }

    #[test]
    fn ueberlappende_seiten_ohne_duplikate() {
        let mut geladen = Geladen::default();
        let neu = geladen.anhaengen(StreamPage {
            streams: vec![stream(1), stream(2)],
            total: 5,
        });
        assert_eq!(neu, 2);

        // Zwischenzeitlich neu beendete Uebertragung verschiebt die Seiten
        let neu = geladen.anhaengen(StreamPage {
            streams: vec![stream(2), stream(3)],
            total: 6,
        });
        assert_eq!(neu, 1);
        assert_eq!(
            geladen.eintraege.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(geladen.abgerufen, 4);
        assert_eq!(geladen.total, 6);
    }

    #[test]
    fn leeren_setzt_alles_zurueck() {
        let mut geladen = Geladen::default();
        geladen.anhaengen(StreamPage {
            streams: vec![stream(1)],
            total: 1,
        });
        geladen.leeren();
        assert!(geladen.eintraege.is_empty());
        assert_eq!(geladen.abgerufen, 0);
        assert_eq!(geladen.anhaengen(StreamPage { streams: vec![stream(1)], total: 1 }), 1);
    }
}
