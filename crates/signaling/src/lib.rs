//! callrelay-signaling – Verbindungs- und Anruf-Signaling
//!
//! Dieser Crate implementiert das Relay: er verwaltet Verbindungen,
//! Lobby- und Call-Raeume, den Anrufstatus jeder Verbindung und leitet
//! SDP-/ICE-Payloads zwischen Peers weiter. Medien laufen nie ueber das
//! Relay.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- CallStateMachine  (connect, phone-call, phone-answer, phone-hangup,
//!     |                      phone-attendees, status-code, disconnect)
//!     +-- SignalingRouter   (offer, answer, ice-candidate)
//!
//! ConnectionRegistry   – Verbindung -> Identitaet, Lobby, CallStatus
//! RoomMembership       – Raum -> Mitglieder (Beitrittsreihenfolge)
//! PresenceBroadcaster  – user-list / phone-answer an alle Raummitglieder
//! DeliveryHub          – begrenzte Send-Queue pro Verbindung
//! ```

pub mod call;
pub mod connection;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use call::{AnswerOutcome, CallStateMachine, InviteOutcome};
pub use connection::ClientConnection;
pub use delivery::DeliveryHub;
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use presence::{MembershipEventKind, PresenceBroadcaster};
pub use registry::{CallStatus, Connection, ConnectionRegistry};
pub use rooms::RoomMembership;
pub use router::{RelayOutcome, SignalingRouter};
pub use server_state::{SignalingConfig, SignalingState};
pub use tcp::SignalingServer;
