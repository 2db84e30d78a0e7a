//! Telemetry forwarding
//!
//! Structured events (syscalls, signals, agent data, lifecycle events) are
//! serialized to JSON and shipped to an off-box collector. Local diagnostics go
//! through `tracing`; this module is only the collector channel.

pub mod event;
pub mod sink;

pub use event::{SyscallArg, TelemetryEvent, Urgency};
pub use sink::{EventSink, NullSink, UdpEventSink};
