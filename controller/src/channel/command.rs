//! Command vocabulary
//!
//! The control plane is a closed set of ASCII tokens. Agents answer the
//! handshake probe with a payload starting with `HANDSHAKE_REPLY_PREFIX`.

use crate::error::ControllerError;
use std::fmt;
use std::str::FromStr;

/// Prefix of an agent's reply to the handshake / heartbeat probe
pub const HANDSHAKE_REPLY_PREFIX: &[u8] = b"hello from ";

/// Commands understood by a fuzzing agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Handshake and heartbeat probe
    Hello,
    /// Ask the agent process to shut down
    Exit,
    /// Farewell sent when the controller goes away
    Bye,
    /// Start fuzzing
    Fuzz,
    /// Stop fuzzing
    StopFuzz,
    /// Start load generation
    LoadGen,
}

impl Command {
    /// Every command, in wire-table order
    pub const ALL: [Command; 6] = [
        Command::Hello,
        Command::Exit,
        Command::Bye,
        Command::Fuzz,
        Command::StopFuzz,
        Command::LoadGen,
    ];

    /// ASCII token sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Hello => "hello",
            Command::Exit => "exit",
            Command::Bye => "bye",
            Command::Fuzz => "fuzz",
            Command::StopFuzz => "stopfuzz",
            Command::LoadGen => "loadgen",
        }
    }

    /// Datagram payload for this command
    pub fn payload(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == s)
            .ok_or_else(|| ControllerError::UnknownCommand(s.to_string()))
    }
}

/// Whether a datagram is a reply to the handshake / heartbeat probe
pub fn is_handshake_reply(payload: &[u8]) -> bool {
    payload.starts_with(HANDSHAKE_REPLY_PREFIX)
}
