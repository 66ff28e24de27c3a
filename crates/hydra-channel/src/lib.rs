//! # Hydra Channel
//!
//! Talks to a party's Hydra node:
//! - [`CommandChannel`] - handshake-gated WebSocket delivery of head commands, with a
//!   one-shot HTTP fallback
//! - [`HeadNodeClient`] - plain HTTP queries (head state, snapshot) and the fallback POST

pub mod http;
pub mod protocol;
pub mod session;

pub use http::HeadNodeClient;
pub use protocol::{ClientCommand, PartyVkey, ServerMessage};
pub use session::{ChannelConfig, ChannelState, CommandChannel, CommandOutcome, CommandReport};
