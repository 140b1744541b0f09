//! relaycast-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen die ueber den
//! Signaling-Kanal zwischen Client und Relay ausgetauscht werden, sowie das
//! Text-Frame-Format (JSON) des Kanals.

pub mod control;
pub mod wire;

pub use control::{
    ClientMessage, IceCandidate, MessageKind, SdpKind, ServerMessage, SessionDescription,
};
pub use wire::TextCodec;
