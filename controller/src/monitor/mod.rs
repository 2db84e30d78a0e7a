//! Agent liveness monitoring
//!
//! Each registered agent gets an `AgentMonitor` running its own heartbeat
//! state machine. Transitions are reported through `AgentCallbacks`.

pub mod agent;
pub mod callbacks;
pub mod state;

pub use agent::AgentMonitor;
pub use callbacks::{AgentCallbacks, AgentHandler, DataHandler};
pub use state::{AgentState, TimeoutPolicy};
