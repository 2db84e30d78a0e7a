//! Agent Monitor
//!
//! One monitor per remote agent. The monitor owns the agent's UDP socket, sends
//! the handshake probe, and runs a receive/timeout loop on its own tokio task.
//! The loop waits on the socket for at most one poll interval at a time, so a
//! `stop()` is observed promptly.

use super::callbacks::AgentCallbacks;
use super::state::{AgentState, TimeoutPolicy};
use crate::channel::{is_handshake_reply, Command, CommandChannel, SendOutcome};
use crate::config::MonitorConfig;
use crate::error::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Largest datagram read from an agent
const RECV_BUFFER_SIZE: usize = 4096;

/// Heartbeat monitor for a single agent
pub struct AgentMonitor {
    addr: SocketAddr,
    channel: CommandChannel,
    state: Arc<watch::Sender<AgentState>>,
    ticks_since_contact: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AgentMonitor {
    /// Bind a socket for `addr`, start the monitor loop and send the handshake probe
    ///
    /// A failed handshake send is not an error: the loop keeps running and the
    /// agent ends up `Unreachable` once the initial-connect timeout passes.
    pub async fn start(
        addr: SocketAddr,
        config: MonitorConfig,
        callbacks: AgentCallbacks,
    ) -> Result<Arc<Self>> {
        let channel = CommandChannel::bind(addr).await?;
        let (state, _) = watch::channel(AgentState::Uninitialised);
        let state = Arc::new(state);
        let ticks_since_contact = Arc::new(AtomicU64::new(0));

        let monitor_loop = MonitorLoop {
            addr,
            channel: channel.clone(),
            state: Arc::clone(&state),
            ticks_since_contact: Arc::clone(&ticks_since_contact),
            policy: TimeoutPolicy::new(&config),
            config,
            callbacks,
        };
        let task = tokio::spawn(monitor_loop.run());

        if let Err(e) = channel.send(Command::Hello).await {
            warn!(agent = %addr, error = %e, "Failed to send handshake probe");
        }

        info!(
            agent = %addr,
            local = ?channel.socket().local_addr().ok(),
            "Agent monitor started"
        );

        Ok(Arc::new(Self {
            addr,
            channel,
            state,
            ticks_since_contact,
            task: Mutex::new(Some(task)),
        }))
    }

    /// Address of the monitored agent
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether this monitor watches `addr`
    pub fn is_addr(&self, addr: SocketAddr) -> bool {
        self.addr == addr
    }

    /// Current liveness state
    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    /// Poll ticks since the last datagram from the agent
    pub fn ticks_since_contact(&self) -> u64 {
        self.ticks_since_contact.load(Ordering::Relaxed)
    }

    /// Mark the monitor `Terminated`; idempotent
    ///
    /// The loop exits without further I/O within one poll interval.
    pub fn stop(&self) {
        let stopped = self.state.send_if_modified(|state| {
            if state.is_terminated() {
                false
            } else {
                *state = AgentState::Terminated;
                true
            }
        });
        if stopped {
            info!(agent = %self.addr, "Agent monitor stopped");
        }
    }

    /// Wait for the monitor loop to exit, aborting it after `grace`
    ///
    /// Returns `true` if the loop exited on its own.
    pub async fn wait_stopped(&self, grace: Duration) -> bool {
        let Some(mut task) = self.task.lock().await.take() else {
            return true;
        };
        match tokio::time::timeout(grace, &mut task).await {
            Ok(_) => true,
            Err(_) => {
                warn!(agent = %self.addr, "Monitor loop did not stop in time, aborting");
                task.abort();
                false
            }
        }
    }

    /// Send a command to the agent
    ///
    /// After `stop()` this sends nothing and reports `SendOutcome::AgentTerminated`.
    pub async fn send_command(&self, command: Command) -> Result<SendOutcome> {
        if self.state().is_terminated() {
            debug!(agent = %self.addr, command = %command, "Agent terminated, command not sent");
            return Ok(SendOutcome::AgentTerminated);
        }
        self.channel.send(command).await?;
        Ok(SendOutcome::Sent)
    }
}

impl Drop for AgentMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AgentMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentMonitor")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("ticks_since_contact", &self.ticks_since_contact())
            .finish()
    }
}

/// State owned by the spawned receive/timeout loop
struct MonitorLoop {
    addr: SocketAddr,
    channel: CommandChannel,
    state: Arc<watch::Sender<AgentState>>,
    ticks_since_contact: Arc<AtomicU64>,
    policy: TimeoutPolicy,
    config: MonitorConfig,
    callbacks: AgentCallbacks,
}

impl MonitorLoop {
    async fn run(self) {
        let mut stop = self.state.subscribe();
        let socket = Arc::clone(self.channel.socket());
        let started = Instant::now();
        let mut last_contact: Option<Instant> = None;
        let mut last_probe = started;
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        while !self.current().is_terminated() {
            self.ticks_since_contact.fetch_add(1, Ordering::Relaxed);

            tokio::select! {
                biased;
                _ = stop.changed() => {}
                received = tokio::time::timeout(self.config.poll_interval, socket.recv_from(&mut buf)) => {
                    match received {
                        Ok(Ok((len, from))) => {
                            if self.handle_datagram(&buf[..len], from) {
                                last_contact = Some(Instant::now());
                            }
                        }
                        Ok(Err(e)) => {
                            debug!(agent = %self.addr, error = %e, "Receive failed");
                            self.back_off(&mut stop).await;
                        }
                        Err(_) => {}
                    }
                }
            }

            self.check_timeouts(started.elapsed(), last_contact.map(|at| at.elapsed()));

            if self.should_probe(last_contact.is_some())
                && last_probe.elapsed() >= self.config.heartbeat_interval
            {
                last_probe = Instant::now();
                if let Err(e) = self.channel.send(Command::Hello).await {
                    warn!(agent = %self.addr, error = %e, "Failed to send heartbeat probe");
                }
            }
        }

        debug!(agent = %self.addr, "Monitor loop exited");
    }

    /// Wait one poll interval after a failed receive, or until the state changes
    async fn back_off(&self, stop: &mut watch::Receiver<AgentState>) {
        tokio::select! {
            _ = stop.changed() => {}
            _ = tokio::time::sleep(self.config.poll_interval) => {}
        }
    }

    /// Heartbeats go to connected agents and to late repliers, so that only
    /// real silence after contact counts as a crash
    fn should_probe(&self, heard_from: bool) -> bool {
        match self.current() {
            AgentState::Connected => true,
            AgentState::Unreachable => heard_from,
            _ => false,
        }
    }

    /// Returns `true` if the datagram came from the agent
    fn handle_datagram(&self, payload: &[u8], from: SocketAddr) -> bool {
        if from != self.addr {
            warn!(
                agent = %self.addr,
                from = %from,
                "Ignoring datagram from a source other than the agent"
            );
            return false;
        }
        self.ticks_since_contact.store(0, Ordering::Relaxed);

        if is_handshake_reply(payload) {
            if self.transition(AgentState::Connected) {
                info!(agent = %self.addr, "Agent connected");
            } else {
                debug!(agent = %self.addr, "Heartbeat reply");
            }
            return true;
        }

        debug!(agent = %self.addr, len = payload.len(), "Data received");
        self.callbacks.data_received(self.addr, payload);
        true
    }

    fn current(&self) -> AgentState {
        *self.state.borrow()
    }

    fn check_timeouts(&self, since_start: Duration, since_contact: Option<Duration>) {
        let Some(next) = self.policy.check(self.current(), since_start, since_contact) else {
            return;
        };
        if !self.transition(next) {
            return;
        }

        match next {
            AgentState::Unreachable => {
                warn!(
                    agent = %self.addr,
                    waited_ms = since_start.as_millis(),
                    "Agent did not answer handshake, marking unreachable"
                );
                self.callbacks.unreachable(self.addr);
            }
            AgentState::Crashed => {
                warn!(
                    agent = %self.addr,
                    silent_ms = since_contact.unwrap_or_default().as_millis(),
                    "Agent went silent, crash detected"
                );
                self.callbacks.crash_detected(self.addr);
            }
            _ => {}
        }
    }

    /// Apply a transition if the state graph allows it
    fn transition(&self, next: AgentState) -> bool {
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}
