//! Control-Protokoll (WebSocket, JSON)
//!
//! Definiert alle Steuerungsnachrichten die ueber den Relay-Kanal
//! ausgetauscht werden.
//!
//! ## Design
//! - Eine Nachricht ist ein JSON-Objekt mit Diskriminator `type`
//! - Getrennte Enums pro Richtung: `ClientMessage` (Client -> Relay) und
//!   `ServerMessage` (Relay -> Client)
//! - SDP- und ICE-Payloads werden unveraendert weitergereicht

use relaycast_core::Identity;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Negotiation-Payloads
// ---------------------------------------------------------------------------

/// Art einer Session-Description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session-Description (Offer oder Answer), Feldnamen wie im Browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Einzelner ICE-Kandidat (Trickle ICE)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

// ---------------------------------------------------------------------------
// Nachrichtentypen
// ---------------------------------------------------------------------------

/// Gemeinsame Sicht auf beide Nachrichtenrichtungen
pub trait MessageKind {
    /// Alle bekannten Werte des `type`-Felds
    const KINDS: &'static [&'static str];

    /// `type`-Wert dieser Nachricht
    fn kind(&self) -> &'static str;
}

/// Nachrichten vom Client an das Relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Vollstaendige Broadcaster-Liste anfordern
    GetBroadcasters,
    /// Eigene Uebertragung ankuendigen
    StartBroadcast {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Eigene Uebertragung beenden
    StopBroadcast,
    /// Zuschauer hat Medien vom Broadcaster `target` erhalten
    ViewerJoined { target: Identity },
    /// Zuschauer hat den Broadcaster `target` verlassen
    ViewerLeft { target: Identity },
    Offer {
        target: Identity,
        offer: SessionDescription,
    },
    Answer {
        target: Identity,
        answer: SessionDescription,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        target: Identity,
        candidate: IceCandidate,
    },
}

impl MessageKind for ClientMessage {
    const KINDS: &'static [&'static str] = &[
        "get_broadcasters",
        "start_broadcast",
        "stop_broadcast",
        "viewer_joined",
        "viewer_left",
        "offer",
        "answer",
        "ice-candidate",
    ];

    fn kind(&self) -> &'static str {
        match self {
            Self::GetBroadcasters => "get_broadcasters",
            Self::StartBroadcast { .. } => "start_broadcast",
            Self::StopBroadcast => "stop_broadcast",
            Self::ViewerJoined { .. } => "viewer_joined",
            Self::ViewerLeft { .. } => "viewer_left",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
        }
    }
}

impl ClientMessage {
    /// Ziel-Identitaet bei gerichteten Nachrichten
    pub fn target(&self) -> Option<&Identity> {
        match self {
            Self::ViewerJoined { target }
            | Self::ViewerLeft { target }
            | Self::Offer { target, .. }
            | Self::Answer { target, .. }
            | Self::IceCandidate { target, .. } => Some(target),
            Self::GetBroadcasters | Self::StartBroadcast { .. } | Self::StopBroadcast => None,
        }
    }
}

/// Nachrichten vom Relay an den Client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Vollstaendiger Snapshot aller aktiven Broadcaster
    BroadcastersList {
        #[serde(default)]
        broadcasters: Vec<Identity>,
    },
    BroadcastStarted { broadcaster: Identity },
    BroadcastStopped { broadcaster: Identity },
    /// Neue Zuschauerzahl. Ohne `broadcaster` gilt sie der eigenen Uebertragung.
    ViewerCountUpdate {
        count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        broadcaster: Option<Identity>,
    },
    Offer {
        from: Identity,
        offer: SessionDescription,
    },
    Answer {
        from: Identity,
        answer: SessionDescription,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        from: Identity,
        candidate: IceCandidate,
    },
    UsernameChanged {
        old_username: Identity,
        new_username: Identity,
    },
}

impl MessageKind for ServerMessage {
    const KINDS: &'static [&'static str] = &[
        "broadcasters_list",
        "broadcast_started",
        "broadcast_stopped",
        "viewer_count_update",
        "offer",
        "answer",
        "ice-candidate",
        "username_changed",
    ];

    fn kind(&self) -> &'static str {
        match self {
            Self::BroadcastersList { .. } => "broadcasters_list",
            Self::BroadcastStarted { .. } => "broadcast_started",
            Self::BroadcastStopped { .. } => "broadcast_stopped",
            Self::ViewerCountUpdate { .. } => "viewer_count_update",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::UsernameChanged { .. } => "username_changed",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
