//! Fleet Registry
//!
//! Owns one `AgentMonitor` per agent address, tracks the current selection and
//! dispatches commands. Every mutation (add, remove, select, shutdown) takes the
//! same write lock; command dispatch holds the read lock for the duration of the
//! send so a removed agent is never used.

use super::types::{AgentSummary, Registration, ShutdownReport};
use crate::channel::{Command, SendOutcome};
use crate::config::{Config, MonitorConfig};
use crate::error::{ControllerError, Result};
use crate::monitor::{AgentCallbacks, AgentMonitor, AgentState};
use crate::telemetry::{EventSink, TelemetryEvent, Urgency};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Label of data records carrying raw agent output
pub const AGENT_DATA_LABEL: &str = "agent_data";

struct FleetEntry {
    monitor: Arc<AgentMonitor>,
    registered_at: DateTime<Utc>,
}

#[derive(Default)]
struct Fleet {
    agents: HashMap<SocketAddr, FleetEntry>,
    current: Option<SocketAddr>,
    shutting_down: bool,
}

impl Fleet {
    fn live(&self, addr: SocketAddr) -> Option<&Arc<AgentMonitor>> {
        self.agents
            .get(&addr)
            .map(|entry| &entry.monitor)
            .filter(|monitor| !monitor.state().is_terminated())
    }

    /// Install a restarted monitor for `addr`, returning `(previous, new)`
    ///
    /// On a failed start the existing entry stays in place, still running.
    fn swap_monitor(
        &mut self,
        addr: SocketAddr,
        started: Result<Arc<AgentMonitor>>,
    ) -> Result<(Arc<AgentMonitor>, Arc<AgentMonitor>)> {
        let monitor = started.map_err(|e| {
            warn!(agent = %addr, error = %e, "Monitor restart failed, keeping previous monitor");
            e
        })?;

        let previous = self
            .agents
            .insert(
                addr,
                FleetEntry {
                    monitor: Arc::clone(&monitor),
                    registered_at: Utc::now(),
                },
            )
            .ok_or(ControllerError::NotFound(addr))?;
        previous.monitor.stop();
        info!(agent = %addr, "Agent monitor restarted");
        Ok((previous.monitor, monitor))
    }
}

/// Registry of monitored agents
///
/// Cheap to clone; clones share the same fleet.
#[derive(Clone)]
pub struct FleetRegistry {
    fleet: Arc<RwLock<Fleet>>,
    monitor_config: MonitorConfig,
    shutdown_grace: Duration,
    callbacks: AgentCallbacks,
    sink: Arc<dyn EventSink>,
}

impl FleetRegistry {
    /// Create an empty registry
    pub fn new(config: &Config, sink: Arc<dyn EventSink>) -> Self {
        Self {
            fleet: Arc::new(RwLock::new(Fleet::default())),
            monitor_config: config.monitor,
            shutdown_grace: config.fleet.shutdown_grace,
            callbacks: AgentCallbacks::new(),
            sink,
        }
    }

    /// Create a registry and register `agents`
    pub async fn with_agents(
        config: &Config,
        sink: Arc<dyn EventSink>,
        agents: &[SocketAddr],
    ) -> Result<Self> {
        let registry = Self::new(config, sink);
        for addr in agents {
            registry.add_agent(*addr).await?;
        }
        Ok(registry)
    }

    /// Callbacks handed to every monitor created after this call
    pub fn with_callbacks(mut self, callbacks: AgentCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Register an agent and start monitoring it
    ///
    /// Returns `Registration::AlreadyExists` if a live monitor already watches
    /// `addr`. A terminated leftover is replaced.
    pub async fn add_agent(&self, addr: SocketAddr) -> Result<Registration> {
        let mut fleet = self.fleet.write().await;
        if fleet.shutting_down {
            return Err(ControllerError::ShuttingDown);
        }

        if let Some(entry) = fleet.agents.get(&addr) {
            if !entry.monitor.state().is_terminated() {
                debug!(agent = %addr, "Agent already registered");
                return Ok(Registration::AlreadyExists(Arc::clone(&entry.monitor)));
            }
            warn!(agent = %addr, "Replacing terminated monitor");
            fleet.agents.remove(&addr);
        }

        let monitor =
            AgentMonitor::start(addr, self.monitor_config, self.agent_callbacks()).await?;
        fleet.agents.insert(
            addr,
            FleetEntry {
                monitor: Arc::clone(&monitor),
                registered_at: Utc::now(),
            },
        );

        info!(agent = %addr, fleet_size = fleet.agents.len(), "Agent registered");
        Ok(Registration::Added(monitor))
    }

    /// Register `addr` if needed, then make it the current agent
    pub async fn connect(&self, addr: SocketAddr) -> Result<Registration> {
        let registration = self.add_agent(addr).await?;
        self.select_current(addr).await?;
        Ok(registration)
    }

    /// Stop and forget an agent; returns `false` if it was not registered
    pub async fn remove_agent(&self, addr: SocketAddr) -> bool {
        let removed = {
            let mut fleet = self.fleet.write().await;
            let removed = fleet.agents.remove(&addr);
            if let Some(entry) = &removed {
                entry.monitor.stop();
                if fleet.current == Some(addr) {
                    fleet.current = None;
                }
            }
            removed
        };

        match removed {
            Some(entry) => {
                entry.monitor.wait_stopped(self.shutdown_grace).await;
                info!(agent = %addr, "Agent removed");
                true
            }
            None => {
                debug!(agent = %addr, "Remove requested for unknown agent");
                false
            }
        }
    }

    /// Replace an agent's monitor with a fresh one, restarting the handshake
    ///
    /// The old monitor keeps running until its replacement has started, so a
    /// failed restart leaves the fleet unchanged.
    pub async fn retry_agent(&self, addr: SocketAddr) -> Result<Arc<AgentMonitor>> {
        let (previous, monitor) = {
            let mut fleet = self.fleet.write().await;
            if fleet.shutting_down {
                return Err(ControllerError::ShuttingDown);
            }
            if !fleet.agents.contains_key(&addr) {
                return Err(ControllerError::NotFound(addr));
            }

            let started =
                AgentMonitor::start(addr, self.monitor_config, self.agent_callbacks()).await;
            fleet.swap_monitor(addr, started)?
        };

        previous.wait_stopped(self.shutdown_grace).await;
        Ok(monitor)
    }

    /// Make `addr` the target of subsequent commands
    pub async fn select_current(&self, addr: SocketAddr) -> Result<()> {
        let mut fleet = self.fleet.write().await;
        if fleet.shutting_down {
            return Err(ControllerError::ShuttingDown);
        }
        if fleet.live(addr).is_none() {
            return Err(ControllerError::NotFound(addr));
        }
        fleet.current = Some(addr);
        info!(agent = %addr, "Current agent selected");
        Ok(())
    }

    /// Address of the current agent, if it is still live
    pub async fn current(&self) -> Option<SocketAddr> {
        let fleet = self.fleet.read().await;
        fleet.current.filter(|addr| fleet.live(*addr).is_some())
    }

    /// Send `command` to the current agent
    pub async fn dispatch(&self, command: Command) -> Result<SendOutcome> {
        let (addr, outcome) = {
            let fleet = self.fleet.read().await;
            let addr = fleet.current.ok_or(ControllerError::NoCurrentAgent)?;
            let entry = fleet
                .agents
                .get(&addr)
                .ok_or(ControllerError::NotFound(addr))?;
            (addr, entry.monitor.send_command(command).await?)
        };

        if outcome == SendOutcome::Sent {
            self.sink.emit(TelemetryEvent::command(command, addr)).await;
        }
        Ok(outcome)
    }

    /// Ask the current agent to exit
    pub async fn shutdown(&self) -> Result<SendOutcome> {
        self.dispatch(Command::Exit).await
    }

    /// Say farewell to the current agent
    pub async fn bye(&self) -> Result<SendOutcome> {
        self.dispatch(Command::Bye).await
    }

    /// Start fuzzing on the current agent
    pub async fn fuzz(&self) -> Result<SendOutcome> {
        self.dispatch(Command::Fuzz).await
    }

    /// Stop fuzzing on the current agent
    pub async fn stopfuzz(&self) -> Result<SendOutcome> {
        self.dispatch(Command::StopFuzz).await
    }

    /// Start load generation on the current agent
    pub async fn loadgen(&self) -> Result<SendOutcome> {
        self.dispatch(Command::LoadGen).await
    }

    /// Send `command` to every registered agent
    ///
    /// Per-agent failures are collected, not propagated.
    pub async fn broadcast(&self, command: Command) -> Vec<(SocketAddr, Result<SendOutcome>)> {
        let fleet = self.fleet.read().await;
        let mut results = Vec::with_capacity(fleet.agents.len());
        for (addr, entry) in &fleet.agents {
            results.push((*addr, self.send_bounded(&entry.monitor, command).await));
        }
        results
    }

    /// Coordinated shutdown: farewell every agent, terminate every monitor
    ///
    /// Waits for the monitor loops to exit (bounded by the shutdown grace) and
    /// rejects further registrations. The caller terminates the process.
    pub async fn safe_exit(&self, reason: &str) -> ShutdownReport {
        info!(reason = %reason, "Safe exit requested");

        let mut report = ShutdownReport::default();
        let monitors: Vec<Arc<AgentMonitor>> = {
            let mut fleet = self.fleet.write().await;
            fleet.shutting_down = true;
            fleet.current = None;

            let mut monitors = Vec::with_capacity(fleet.agents.len());
            for (addr, entry) in &fleet.agents {
                match self.send_bounded(&entry.monitor, Command::Bye).await {
                    Ok(SendOutcome::Sent) => report.farewells_sent += 1,
                    Ok(SendOutcome::AgentTerminated) => {}
                    Err(e) => {
                        warn!(agent = %addr, error = %e, "Farewell not delivered");
                        report.farewell_failures.push(*addr);
                    }
                }
                entry.monitor.stop();
                monitors.push(Arc::clone(&entry.monitor));
            }
            monitors
        };

        self.sink
            .emit(TelemetryEvent::event(reason, Urgency::Normal))
            .await;

        let stopped = join_all(
            monitors
                .iter()
                .map(|monitor| monitor.wait_stopped(self.shutdown_grace)),
        )
        .await;
        report.loops_stopped = stopped.iter().filter(|clean| **clean).count();
        report.loops_aborted = stopped.len() - report.loops_stopped;

        info!(
            farewells_sent = report.farewells_sent,
            farewell_failures = report.farewell_failures.len(),
            loops_aborted = report.loops_aborted,
            "Fleet shut down"
        );
        report
    }

    /// Whether `safe_exit` has run
    pub async fn is_shutting_down(&self) -> bool {
        self.fleet.read().await.shutting_down
    }

    /// Point telemetry at a different collector
    pub async fn set_sink_addr(&self, addr: SocketAddr) {
        self.sink.set_target(addr).await;
    }

    /// Monitor for `addr`, if registered
    pub async fn agent(&self, addr: SocketAddr) -> Option<Arc<AgentMonitor>> {
        let fleet = self.fleet.read().await;
        fleet.agents.get(&addr).map(|entry| Arc::clone(&entry.monitor))
    }

    /// Snapshot of every registered agent, sorted by address
    pub async fn agents(&self) -> Vec<AgentSummary> {
        let fleet = self.fleet.read().await;
        let mut agents: Vec<AgentSummary> = fleet
            .agents
            .iter()
            .map(|(addr, entry)| AgentSummary {
                addr: *addr,
                state: entry.monitor.state(),
                ticks_since_contact: entry.monitor.ticks_since_contact(),
                current: fleet.current == Some(*addr),
                registered_at: entry.registered_at,
            })
            .collect();
        agents.sort_by_key(|agent| agent.addr);
        agents
    }

    /// Number of registered agents
    pub async fn len(&self) -> usize {
        self.fleet.read().await.agents.len()
    }

    /// Whether no agent is registered
    pub async fn is_empty(&self) -> bool {
        self.fleet.read().await.agents.is_empty()
    }

    async fn send_bounded(
        &self,
        monitor: &AgentMonitor,
        command: Command,
    ) -> Result<SendOutcome> {
        match tokio::time::timeout(self.monitor_config.poll_interval, monitor.send_command(command))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ControllerError::Send {
                addr: monitor.addr(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "send timed out"),
            }),
        }
    }

    /// Registry callbacks wrapped around the user's: every event is also
    /// forwarded to the telemetry sink.
    fn agent_callbacks(&self) -> AgentCallbacks {
        let user = self.callbacks.clone();
        let sink = Arc::clone(&self.sink);

        AgentCallbacks::new()
            .on_unreachable({
                let user = user.clone();
                let sink = Arc::clone(&sink);
                move |addr| {
                    user.unreachable(addr);
                    forward(
                        &sink,
                        TelemetryEvent::event(format!("agent {} unreachable", addr), Urgency::High),
                    );
                }
            })
            .on_crash_detected({
                let user = user.clone();
                let sink = Arc::clone(&sink);
                move |addr| {
                    user.crash_detected(addr);
                    forward(
                        &sink,
                        TelemetryEvent::event(
                            format!("agent {} crash detected", addr),
                            Urgency::Critical,
                        ),
                    );
                }
            })
            .on_data_received(move |addr, data| {
                user.data_received(addr, data);
                forward(
                    &sink,
                    TelemetryEvent::data(AGENT_DATA_LABEL, addr)
                        .with_extra("payload", String::from_utf8_lossy(data).into_owned()),
                );
            })
    }
}

/// Emit without blocking the monitor loop that fired the callback
fn forward(sink: &Arc<dyn EventSink>, event: TelemetryEvent) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        sink.emit(event).await;
    });
}

impl std::fmt::Debug for FleetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetRegistry")
            .field("monitor_config", &self.monitor_config)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish_non_exhaustive()
    }
}
