// Reusable console components
// Text rendering for agent state, the fleet table and command results

use grapevine_controller::channel::SendOutcome;
use grapevine_controller::monitor::AgentState;
use grapevine_controller::registry::AgentSummary;

const RESET: &str = "\x1b[0m";

/// Render a state badge with ANSI color
/// Colors: Uninitialised (gray), Connected (green), Unreachable (yellow), Crashed (red), Terminated (dim)
pub fn status_badge(state: AgentState) -> String {
    let color = match state {
        AgentState::Uninitialised => "\x1b[90m",
        AgentState::Connected => "\x1b[32m",
        AgentState::Unreachable => "\x1b[33m",
        AgentState::Crashed => "\x1b[31m",
        AgentState::Terminated => "\x1b[2m",
    };
    format!("{}{:<13}{}", color, state.as_str(), RESET)
}

/// Render the fleet as aligned text rows, current agent marked with `*`
pub fn render_agent_table(agents: &[AgentSummary]) -> Vec<String> {
    if agents.is_empty() {
        return vec!["no agents registered".to_string()];
    }

    let mut lines = Vec::with_capacity(agents.len() + 1);
    lines.push(format!(
        "  {:<24} {:<13} {:>8}  {}",
        "AGENT", "STATE", "TICKS", "REGISTERED"
    ));
    for agent in agents {
        lines.push(format!(
            "{} {:<24} {} {:>8}  {}",
            if agent.current { "*" } else { " " },
            agent.addr,
            status_badge(agent.state),
            agent.ticks_since_contact,
            agent.registered_at.format("%H:%M:%S"),
        ));
    }
    lines
}

/// One-line description of a dispatch result
pub fn outcome_line(command: &str, outcome: SendOutcome) -> String {
    match outcome {
        SendOutcome::Sent => format!("sent '{}'", command),
        SendOutcome::AgentTerminated => {
            format!("'{}' not sent: agent terminated", command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_badge_contains_state() {
        let badge = status_badge(AgentState::Crashed);
        assert!(badge.contains("Crashed"));
        assert!(badge.starts_with("\x1b[31m"));
        assert!(badge.ends_with(RESET));
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(render_agent_table(&[]), vec!["no agents registered"]);
    }

    #[test]
    fn test_outcome_line() {
        assert_eq!(outcome_line("fuzz", SendOutcome::Sent), "sent 'fuzz'");
        assert!(outcome_line("fuzz", SendOutcome::AgentTerminated).contains("terminated"));
    }
}
