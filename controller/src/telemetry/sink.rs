//! Event sinks
//!
//! The collector is reached over an unreliable datagram transport. A failed
//! send is logged locally and otherwise ignored by `EventSink::emit`.

use super::event::TelemetryEvent;
use crate::error::{ControllerError, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Destination for structured telemetry
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event, reporting transport failures
    async fn try_emit(&self, event: &TelemetryEvent) -> Result<()>;

    /// Deliver one event; failures are logged and swallowed
    async fn emit(&self, event: TelemetryEvent) {
        if let Err(e) = self.try_emit(&event).await {
            warn!(kind = event.kind(), error = %e, "Failed to deliver telemetry event");
        }
    }

    /// Point the sink at a different collector. Sinks without a target ignore this.
    async fn set_target(&self, _target: SocketAddr) {}
}

/// JSON-over-UDP sink, one object per datagram
#[derive(Debug)]
pub struct UdpEventSink {
    socket: UdpSocket,
    target: RwLock<SocketAddr>,
}

impl UdpEventSink {
    /// Bind a local socket and send events to `target`
    pub async fn bind(target: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(ControllerError::Bind)?;
        debug!(collector = %target, "Telemetry sink bound");
        Ok(Self {
            socket,
            target: RwLock::new(target),
        })
    }

    /// Current collector address
    pub async fn target(&self) -> SocketAddr {
        *self.target.read().await
    }
}

#[async_trait]
impl EventSink for UdpEventSink {
    async fn try_emit(&self, event: &TelemetryEvent) -> Result<()> {
        let target = *self.target.read().await;
        self.socket
            .send_to(&event.to_payload(), target)
            .await
            .map_err(|source| ControllerError::Send {
                addr: target,
                source,
            })?;
        Ok(())
    }

    async fn set_target(&self, target: SocketAddr) {
        let mut current = self.target.write().await;
        let previous = *current;
        *current = target;
        info!(from = %previous, to = %target, "Telemetry collector changed");
    }
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn try_emit(&self, _event: &TelemetryEvent) -> Result<()> {
        Ok(())
    }
}
