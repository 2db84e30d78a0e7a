//! Grapevine Controller Library
//!
//! Coordinates a fleet of remote fuzzing agents: heartbeat monitoring and
//! crash detection per agent, a registry that dispatches fuzz-control
//! commands, and telemetry forwarding to a log collector.
//! The headless daemon is in `src/main.rs`.

pub mod channel;
pub mod config;
pub mod error;
/// Per-agent heartbeat state machine
pub mod monitor;
pub mod registry;
pub mod telemetry;

pub use channel::{Command, CommandChannel, SendOutcome};
pub use config::Config;
pub use error::ControllerError;
pub use monitor::{AgentCallbacks, AgentMonitor, AgentState};
pub use registry::{FleetRegistry, Registration, ShutdownReport};
pub use telemetry::{EventSink, TelemetryEvent, UdpEventSink};
