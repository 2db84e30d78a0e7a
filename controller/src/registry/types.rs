//! Registry result and snapshot types

use crate::monitor::{AgentMonitor, AgentState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

/// Outcome of registering an agent
#[derive(Debug, Clone)]
pub enum Registration {
    /// A new monitor was started
    Added(Arc<AgentMonitor>),
    /// The address was already registered; the existing monitor is returned
    AlreadyExists(Arc<AgentMonitor>),
}

impl Registration {
    /// Whether a new monitor was started
    pub fn is_new(&self) -> bool {
        matches!(self, Registration::Added(_))
    }

    /// Monitor watching the agent
    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        match self {
            Registration::Added(monitor) | Registration::AlreadyExists(monitor) => monitor,
        }
    }

    /// Take the monitor out of the registration
    pub fn into_monitor(self) -> Arc<AgentMonitor> {
        match self {
            Registration::Added(monitor) | Registration::AlreadyExists(monitor) => monitor,
        }
    }
}

/// Point-in-time view of one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSummary {
    /// Agent address
    pub addr: SocketAddr,
    /// Liveness state
    pub state: AgentState,
    /// Poll ticks since the last datagram
    pub ticks_since_contact: u64,
    /// Whether this is the current agent
    pub current: bool,
    /// When the agent was registered
    pub registered_at: DateTime<Utc>,
}

/// What `safe_exit` managed to do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Farewell datagrams sent
    pub farewells_sent: usize,
    /// Agents the farewell could not be sent to
    pub farewell_failures: Vec<SocketAddr>,
    /// Monitor loops that exited within the grace period
    pub loops_stopped: usize,
    /// Monitor loops aborted after the grace period
    pub loops_aborted: usize,
}
