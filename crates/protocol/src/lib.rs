//! callrelay-protocol – Event-Definitionen und Wire-Format
//!
//! Dieses Crate definiert alle Events die zwischen Client und Relay
//! ausgetauscht werden, sowie das frame-basierte TCP-Wire-Format.

pub mod events;
pub mod wire;

pub use events::{CallStatusCode, ClientEvent, PeerRef, ServerEvent};
pub use wire::FrameCodec;
