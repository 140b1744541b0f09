//! Sample-Capture – lokale Tracks die von aussen mit Samples gefuettert werden
//!
//! Die eigentliche Kamera- oder Bildschirmaufnahme liegt ausserhalb dieses
//! Crates. Sie schreibt kodierte Frames ueber `CaptureHandle::tracks()` in
//! die Tracks und meldet mit `CaptureControl::beenden` wenn das
//! Betriebssystem die Freigabe entzieht.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use relaycast_signaling::peer::CaptureEndedHook;
use relaycast_signaling::{CaptureHandle, MediaCapture, SignalingError, SignalingResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::backend::LocalTrack;

/// Opus-Frame fuer 20 ms Stille
const OPUS_STILLE: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Dauer eines Audio-Frames
const AUDIO_FRAME: Duration = Duration::from_millis(20);

/// Welche Tracks eine Capture liefert
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub audio: bool,
    pub video: bool,
    /// Stream-ID der lokalen Tracks
    pub stream_id: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            stream_id: "relaycast".to_string(),
        }
    }
}

#[derive(Default)]
struct Zustand {
    hook: Option<CaptureEndedHook>,
    /// Generation der laufenden Capture
    aktiv: Option<u64>,
    generation: u64,
}

// ---------------------------------------------------------------------------
// SampleCapture
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SampleCapture {
    config: CaptureConfig,
    zustand: Arc<Mutex<Zustand>>,
}

impl SampleCapture {
    pub fn neu(config: CaptureConfig) -> Self {
        Self {
            config,
            zustand: Arc::new(Mutex::new(Zustand::default())),
        }
    }

    /// Steuerung fuer die externe Quelle
    pub fn control(&self) -> CaptureControl {
        CaptureControl {
            zustand: Arc::clone(&self.zustand),
        }
    }

    fn tracks_erstellen(&self) -> Vec<LocalTrack> {
        let mut tracks = Vec::new();
        if self.config.audio {
            tracks.push(Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    ..Default::default()
                },
                "audio".to_owned(),
                self.config.stream_id.clone(),
            )));
        }
        if self.config.video {
            tracks.push(Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    clock_rate: 90000,
                    ..Default::default()
                },
                "video".to_owned(),
                self.config.stream_id.clone(),
            )));
        }
        tracks
    }
}

#[async_trait]
impl MediaCapture for SampleCapture {
    type Track = LocalTrack;
    type Handle = SampleCaptureHandle;

    async fn acquire(&self, on_ended: CaptureEndedHook) -> SignalingResult<SampleCaptureHandle> {
        if !self.config.audio && !self.config.video {
            return Err(SignalingError::capture("Weder Audio noch Video konfiguriert"));
        }

        let generation = {
            let mut zustand = self.zustand.lock();
            if zustand.aktiv.is_some() {
                return Err(SignalingError::capture("Capture ist bereits in Benutzung"));
            }
            zustand.generation += 1;
            zustand.aktiv = Some(zustand.generation);
            zustand.hook = Some(on_ended);
            zustand.generation
        };

        let tracks = self.tracks_erstellen();
        tracing::info!(tracks = tracks.len(), "Capture erworben");
        Ok(SampleCaptureHandle {
            tracks,
            generation,
            zustand: Arc::clone(&self.zustand),
            freigegeben: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

pub struct SampleCaptureHandle {
    tracks: Vec<LocalTrack>,
    generation: u64,
    zustand: Arc<Mutex<Zustand>>,
    freigegeben: bool,
}

impl CaptureHandle for SampleCaptureHandle {
    type Track = LocalTrack;

    fn tracks(&self) -> Vec<LocalTrack> {
        self.tracks.clone()
    }

    fn release(&mut self) {
        if self.freigegeben {
            return;
        }
        self.freigegeben = true;
        let mut zustand = self.zustand.lock();
        if zustand.aktiv == Some(self.generation) {
            zustand.aktiv = None;
            zustand.hook = None;
        }
        tracing::debug!("Capture freigegeben");
    }
}

impl Drop for SampleCaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// CaptureControl
// ---------------------------------------------------------------------------

/// Zugriff der externen Quelle auf die laufende Capture
#[derive(Clone)]
pub struct CaptureControl {
    zustand: Arc<Mutex<Zustand>>,
}

impl CaptureControl {
    /// Die Quelle ist weggefallen (Freigabe im OS beendet)
    ///
    /// Ruft den Ende-Hook genau einmal auf. Gibt false zurueck wenn keine
    /// Capture lief.
    pub fn beenden(&self) -> bool {
        let hook = {
            let mut zustand = self.zustand.lock();
            zustand.aktiv = None;
            zustand.hook.take()
        };
        match hook {
            Some(hook) => {
                tracing::info!("Capture von der Quelle beendet");
                hook();
                true
            }
            None => false,
        }
    }

    pub fn laeuft(&self) -> bool {
        self.zustand.lock().aktiv.is_some()
    }
}

/// Schreibt Opus-Stille in einen Audio-Track, bis die Task abgebrochen
/// wird oder das Schreiben fehlschlaegt
pub async fn stille_senden(track: LocalTrack) {
    let mut takt = tokio::time::interval(AUDIO_FRAME);
    let sample = Sample {
        data: Bytes::from_static(&OPUS_STILLE),
        duration: AUDIO_FRAME,
        ..Default::default()
    };
    loop {
        takt.tick().await;
        if let Err(e) = track.write_sample(&sample).await {
            tracing::debug!(fehler = %e, "Stille-Quelle beendet");
            break;
        }
    }
}

/// Startet `stille_senden` fuer jeden Audio-Track
pub fn stille_fuer_audio(tracks: &[LocalTrack]) -> Vec<tokio::task::JoinHandle<()>> {
    tracks
        .iter()
        .filter(|t| t.kind() == RTPCodecType::Audio)
        .map(|t| tokio::spawn(stille_senden(Arc::clone(t))))
        .collect()
}
