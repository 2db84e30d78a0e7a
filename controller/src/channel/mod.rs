//! Control-plane command channel
//!
//! Encodes the fixed ASCII command vocabulary and sends it to an agent as a
//! single unacknowledged datagram. Retry policy belongs to callers.

pub mod command;
pub mod sender;

pub use command::{is_handshake_reply, Command, HANDSHAKE_REPLY_PREFIX};
pub use sender::{CommandChannel, SendOutcome};
