//! Umwandlung zwischen Wire-Typen und webrtc-rs-Typen

use relaycast_protocol::{IceCandidate, SdpKind, SessionDescription};
use relaycast_signaling::{LinkState, SignalingError, SignalingResult};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Fehler der WebRTC-Schicht als Negotiation-Fehler
pub(crate) fn verhandlung(kontext: &str, fehler: webrtc::Error) -> SignalingError {
    SignalingError::negotiation(format!("{}: {}", kontext, fehler))
}

pub(crate) fn description_nach_rtc(
    description: SessionDescription,
) -> SignalingResult<RTCSessionDescription> {
    let ergebnis = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        SdpKind::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpKind::Rollback => {
            return Err(SignalingError::negotiation(
                "Rollback wird nicht unterstuetzt",
            ))
        }
    };
    ergebnis.map_err(|e| verhandlung("SDP ungueltig", e))
}

pub(crate) fn description_von_rtc(
    description: RTCSessionDescription,
) -> SignalingResult<SessionDescription> {
    let kind = sdp_kind(description.sdp_type)?;
    Ok(SessionDescription {
        kind,
        sdp: description.sdp,
    })
}

fn sdp_kind(typ: RTCSdpType) -> SignalingResult<SdpKind> {
    match typ {
        RTCSdpType::Offer => Ok(SdpKind::Offer),
        RTCSdpType::Answer => Ok(SdpKind::Answer),
        RTCSdpType::Pranswer => Ok(SdpKind::Pranswer),
        RTCSdpType::Rollback => Ok(SdpKind::Rollback),
        RTCSdpType::Unspecified => Err(SignalingError::negotiation("SDP-Typ fehlt")),
    }
}

pub(crate) fn kandidat_nach_rtc(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

pub(crate) fn kandidat_von_rtc(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

pub(crate) fn link_state(state: RTCPeerConnectionState) -> LinkState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => LinkState::New,
        RTCPeerConnectionState::Connecting => LinkState::Connecting,
        RTCPeerConnectionState::Connected => LinkState::Connected,
        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
        RTCPeerConnectionState::Failed => LinkState::Failed,
        RTCPeerConnectionState::Closed => LinkState::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kandidat_behaelt_alle_felder() {
        let kandidat = IceCandidate {
            candidate: "candidate:1 1 udp 2130706431 10.0.0.2 5000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: Some("abcd".into()),
        };
        assert_eq!(kandidat_von_rtc(kandidat_nach_rtc(kandidat.clone())), kandidat);
    }

    #[test]
    fn rollback_wird_abgelehnt() {
        let err = description_nach_rtc(SessionDescription {
            kind: SdpKind::Rollback,
            sdp: String::new(),
        })
        .unwrap_err();
        assert!(matches!(err, SignalingError::Negotiation(_)));
    }

    #[test]
    fn unbekannter_sdp_typ_ist_fehler() {
        assert!(sdp_kind(RTCSdpType::Unspecified).is_err());
        assert_eq!(sdp_kind(RTCSdpType::Answer).unwrap(), SdpKind::Answer);
    }

    #[test]
    fn verbindungszustaende() {
        assert_eq!(link_state(RTCPeerConnectionState::Unspecified), LinkState::New);
        assert_eq!(link_state(RTCPeerConnectionState::Failed), LinkState::Failed);
        assert_eq!(link_state(RTCPeerConnectionState::Closed), LinkState::Closed);
    }
}
