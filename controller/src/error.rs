//! Error types for the controller
//!
//! Every fallible registry, monitor and channel operation returns
//! `ControllerError`. Benign outcomes (duplicate registration, commands to a
//! terminated agent) are reported as values, see `Registration` and
//! `SendOutcome`.

use std::net::SocketAddr;
use thiserror::Error;

/// Controller-level error types
#[derive(Error, Debug)]
pub enum ControllerError {
    /// No agent is registered under the given address
    #[error("Agent not found: {0}")]
    NotFound(SocketAddr),

    /// A command was dispatched while no agent is selected
    #[error("No current agent selected")]
    NoCurrentAgent,

    /// The registry has performed its coordinated shutdown
    #[error("Fleet registry is shutting down")]
    ShuttingDown,

    /// Failed to bind the local socket used to talk to an agent or collector
    #[error("Failed to bind socket: {0}")]
    Bind(#[source] std::io::Error),

    /// A datagram could not be sent to its destination
    #[error("Failed to send to {addr}: {source}")]
    Send {
        /// Destination of the failed datagram
        addr: SocketAddr,
        /// Underlying transport error
        #[source]
        source: std::io::Error,
    },

    /// An address string could not be resolved to `host:port`
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A command token outside the control-plane vocabulary
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Configuration values violate a timing constraint
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, ControllerError>;
