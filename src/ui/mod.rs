// Console UI module
// Command parsing and text rendering for the operator console

pub mod commands;
pub mod components;

pub use commands::{parse_line, ConsoleCommand, HELP};
pub use components::{outcome_line, render_agent_table};
