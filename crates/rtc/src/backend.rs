//! webrtc-rs Peer-Backend
//!
//! Eine `RtcLink` kapselt eine `RTCPeerConnection`. Alle Callbacks der
//! Verbindung werden in `PeerEvents` umgesetzt und landen damit in der
//! Event-Queue der Runtime.

use async_trait::async_trait;
use relaycast_protocol::{IceCandidate, SessionDescription};
use relaycast_signaling::{OfferOptions, PeerBackend, PeerEvents, PeerLink, SignalingResult};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::convert::{
    description_nach_rtc, description_von_rtc, kandidat_nach_rtc, kandidat_von_rtc, link_state,
    verhandlung,
};

/// Standard-STUN-Server
pub const STANDARD_STUN: &str = "stun:stun.l.google.com:19302";

/// Puffer fuer empfangene RTP-Pakete pro Remote-Track
const RTP_PUFFER: usize = 256;

/// Lokaler Track-Typ (Capture -> Peer)
pub type LocalTrack = Arc<TrackLocalStaticSample>;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// ICE-Konfiguration der Peer-Verbindungen
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    /// STUN/TURN-URLs, z.B. `stun:stun.l.google.com:19302`
    pub stun_urls: Vec<String>,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            stun_urls: vec![STANDARD_STUN.to_string()],
        }
    }
}

impl RtcConfig {
    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.stun_urls.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.stun_urls.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Remote-Medien
// ---------------------------------------------------------------------------

/// Art eines Remote-Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Unbekannt,
}

impl From<RTPCodecType> for MediaKind {
    fn from(typ: RTPCodecType) -> Self {
        match typ {
            RTPCodecType::Audio => Self::Audio,
            RTPCodecType::Video => Self::Video,
            RTPCodecType::Unspecified => Self::Unbekannt,
        }
    }
}

/// Empfangener Remote-Track. Die RTP-Pakete kommen ueber `packets`.
#[derive(Debug)]
pub struct RemoteMedia {
    pub kind: MediaKind,
    pub track_id: String,
    pub stream_id: String,
    pub packets: mpsc::Receiver<Packet>,
}

// ---------------------------------------------------------------------------
// RtcBackend
// ---------------------------------------------------------------------------

/// Erstellt Peer-Verbindungen mit gemeinsamer Media-Engine
#[derive(Clone)]
pub struct RtcBackend {
    api: Arc<API>,
    config: RtcConfig,
}

impl RtcBackend {
    pub fn neu(config: RtcConfig) -> SignalingResult<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| verhandlung("Codecs nicht registrierbar", e))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| verhandlung("Interceptors nicht registrierbar", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        tracing::debug!(stun_urls = ?config.stun_urls, "WebRTC-Backend erstellt");
        Ok(Self {
            api: Arc::new(api),
            config,
        })
    }
}

#[async_trait]
impl PeerBackend for RtcBackend {
    type Track = LocalTrack;
    type Remote = RemoteMedia;
    type Link = RtcLink;

    async fn open_link(&self, events: PeerEvents<RemoteMedia>) -> SignalingResult<RtcLink> {
        let pc = self
            .api
            .new_peer_connection(self.config.rtc_configuration())
            .await
            .map_err(|e| verhandlung("Peer-Verbindung nicht erstellbar", e))?;
        let pc = Arc::new(pc);
        handler_setzen(&pc, &events);

        Ok(RtcLink {
            pc,
            events,
            transceiver: AtomicBool::new(false),
        })
    }
}

fn handler_setzen(pc: &Arc<RTCPeerConnection>, events: &PeerEvents<RemoteMedia>) {
    let ice = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate| {
        let events = ice.clone();
        Box::pin(async move {
            // None = Sammeln abgeschlossen
            let Some(candidate) = candidate else { return };
            match candidate.to_json() {
                Ok(init) => events.local_candidate(kandidat_von_rtc(init)),
                Err(e) => {
                    tracing::warn!(session = %events.session(), fehler = %e, "ICE-Kandidat nicht serialisierbar")
                }
            }
        })
    }));

    let zustand = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let events = zustand.clone();
        Box::pin(async move {
            tracing::debug!(session = %events.session(), state = %state, "Peer-Verbindungszustand");
            events.link_state(link_state(state));
        })
    }));

    let tracks = events.clone();
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let events = tracks.clone();
        Box::pin(async move {
            remote_track_weiterleiten(track, events);
        })
    }));
}

/// Meldet den Track und leitet seine RTP-Pakete weiter bis er endet
fn remote_track_weiterleiten(track: Arc<TrackRemote>, events: PeerEvents<RemoteMedia>) {
    let (tx, packets) = mpsc::channel(RTP_PUFFER);
    let kind = MediaKind::from(track.kind());
    events.remote_track(RemoteMedia {
        kind,
        track_id: track.id(),
        stream_id: track.stream_id(),
        packets,
    });
    tracing::info!(session = %events.session(), kind = ?kind, "Remote-Track empfangen");

    tokio::spawn(async move {
        loop {
            match track.read_rtp().await {
                Ok((packet, _)) => {
                    // Voller Puffer: Paket verwerfen, der Empfaenger ist zu langsam
                    if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(packet) {
                        tracing::trace!("Empfaenger des Remote-Tracks verworfen");
                    }
                }
                Err(e) => {
                    tracing::debug!(session = %events.session(), fehler = %e, "Remote-Track beendet");
                    events.remote_ended();
                    break;
                }
            }
        }
    });
}

// ---------------------------------------------------------------------------
// RtcLink
// ---------------------------------------------------------------------------

pub struct RtcLink {
    pc: Arc<RTCPeerConnection>,
    events: PeerEvents<RemoteMedia>,
    /// Empfangs-Transceiver wurden angelegt
    transceiver: AtomicBool,
}

impl RtcLink {
    async fn empfang_vorbereiten(&self, options: OfferOptions) -> SignalingResult<()> {
        if self.transceiver.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let arten = [
            (options.receive_audio, RTPCodecType::Audio),
            (options.receive_video, RTPCodecType::Video),
        ];
        for (aktiv, art) in arten {
            if !aktiv {
                continue;
            }
            self.pc
                .add_transceiver_from_kind(
                    art,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: Vec::new(),
                    }),
                )
                .await
                .map_err(|e| verhandlung("Transceiver nicht erstellbar", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl PeerLink for RtcLink {
    type Track = LocalTrack;

    async fn create_offer(&self, options: OfferOptions) -> SignalingResult<SessionDescription> {
        self.empfang_vorbereiten(options).await?;
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| verhandlung("Offer nicht erstellbar", e))?;
        description_von_rtc(offer)
    }

    async fn create_answer(&self) -> SignalingResult<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| verhandlung("Answer nicht erstellbar", e))?;
        description_von_rtc(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> SignalingResult<()> {
        let description = description_nach_rtc(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| verhandlung("Lokale Description abgelehnt", e))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> SignalingResult<()> {
        let description = description_nach_rtc(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| verhandlung("Remote-Description abgelehnt", e))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> SignalingResult<()> {
        self.pc
            .add_ice_candidate(kandidat_nach_rtc(candidate))
            .await
            .map_err(|e| verhandlung("ICE-Kandidat abgelehnt", e))
    }

    async fn attach_track(&self, track: &LocalTrack) -> SignalingResult<()> {
        let sender = self
            .pc
            .add_track(Arc::clone(track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| verhandlung("Track nicht anhaengbar", e))?;

        // RTCP muss gelesen werden, sonst laufen die Interceptors nicht
        tokio::spawn(async move {
            let mut puffer = vec![0u8; 1500];
            while sender.read(&mut puffer).await.is_ok() {}
        });
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::warn!(session = %self.events.session(), fehler = %e, "Peer-Verbindung nicht sauber geschlossen");
        }
    }
}
