//! Fleet registry
//!
//! Owns the set of agent monitors, the current selection and the command API.

pub mod fleet;
pub mod types;

pub use fleet::{FleetRegistry, AGENT_DATA_LABEL};
pub use types::{AgentSummary, Registration, ShutdownReport};
