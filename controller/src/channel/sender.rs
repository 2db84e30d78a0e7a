//! Datagram sender for control-plane commands

use super::command::Command;
use crate::error::{ControllerError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::debug;

/// Result of a command dispatch that did not fail at the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// One datagram left the socket
    Sent,
    /// The target agent is terminated; nothing was sent
    AgentTerminated,
}

/// Fire-and-forget command sender bound to one peer
///
/// The socket is shared with the agent's monitor so that replies to commands
/// arrive where the monitor is listening.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl CommandChannel {
    /// Create a channel that sends through `socket` to `peer`
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }

    /// Bind a fresh local socket suitable for talking to `peer`
    pub async fn bind(peer: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(ControllerError::Bind)?;
        Ok(Self::new(Arc::new(socket), peer))
    }

    /// Send one command datagram; no acknowledgment, no retry
    pub async fn send(&self, command: Command) -> Result<()> {
        self.socket
            .send_to(command.payload(), self.peer)
            .await
            .map_err(|source| ControllerError::Send {
                addr: self.peer,
                source,
            })?;

        debug!(agent = %self.peer, command = %command, "Command sent");
        Ok(())
    }

    /// Address commands are sent to
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Socket shared with the monitor
    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }
}
