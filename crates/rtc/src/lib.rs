//! relaycast-rtc – WebRTC-Anbindung fuer den Relaycast-Client
//!
//! Liefert die webrtc-rs-Implementierung von `PeerBackend`/`PeerLink` und
//! eine `MediaCapture` deren Tracks von einer externen Quelle mit Samples
//! gefuettert werden.

pub mod backend;
pub mod capture;
mod convert;

pub use backend::{LocalTrack, MediaKind, RemoteMedia, RtcBackend, RtcConfig, RtcLink};
pub use capture::{stille_fuer_audio, stille_senden, CaptureConfig, CaptureControl, SampleCapture, SampleCaptureHandle};
