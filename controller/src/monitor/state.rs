//! Agent liveness states and the timeout rules that move between them

use crate::config::MonitorConfig;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Liveness state of a monitored agent
///
/// `Uninitialised -> Connected | Unreachable`, `Connected | Unreachable ->
/// Crashed`, `any -> Terminated`. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AgentState {
    /// Handshake probe sent, no reply yet
    Uninitialised,
    /// Handshake acknowledged
    Connected,
    /// No handshake reply within the initial-connect timeout
    Unreachable,
    /// Silent for longer than the crash timeout after contact
    Crashed,
    /// Monitoring stopped
    Terminated,
}

impl AgentState {
    /// Whether the state graph allows moving from `self` to `next`
    pub fn can_transition_to(self, next: AgentState) -> bool {
        use AgentState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Uninitialised, Connected) | (Uninitialised, Unreachable) => true,
            (Connected, Crashed) | (Unreachable, Crashed) => true,
            _ => false,
        }
    }

    /// Whether the monitor loop has been told to exit
    pub fn is_terminated(self) -> bool {
        self == AgentState::Terminated
    }

    /// Display name
    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Uninitialised => "Uninitialised",
            AgentState::Connected => "Connected",
            AgentState::Unreachable => "Unreachable",
            AgentState::Crashed => "Crashed",
            AgentState::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-driven transition rules
///
/// Elapsed times are measured by the caller on a monotonic clock, so the rules
/// do not depend on how often they are evaluated.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    initial_connect_timeout: Duration,
    crash_timeout: Duration,
}

impl TimeoutPolicy {
    /// Build the policy from monitor configuration
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            initial_connect_timeout: config.initial_connect_timeout,
            crash_timeout: config.crash_timeout,
        }
    }

    /// Transition due at this moment, if any
    ///
    /// * `since_start` - time since the monitor sent its handshake probe
    /// * `since_contact` - time since the last datagram from the agent, if any arrived
    pub fn check(
        &self,
        state: AgentState,
        since_start: Duration,
        since_contact: Option<Duration>,
    ) -> Option<AgentState> {
        match state {
            AgentState::Uninitialised if since_start > self.initial_connect_timeout => {
                Some(AgentState::Unreachable)
            }
            AgentState::Connected | AgentState::Unreachable => match since_contact {
                Some(silence) if silence > self.crash_timeout => Some(AgentState::Crashed),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AgentState::*;

    fn policy() -> TimeoutPolicy {
        TimeoutPolicy::new(&MonitorConfig::default())
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(Uninitialised.can_transition_to(Connected));
        assert!(Uninitialised.can_transition_to(Unreachable));
        assert!(Connected.can_transition_to(Crashed));
        assert!(Unreachable.can_transition_to(Crashed));
        for state in [Uninitialised, Connected, Unreachable, Crashed] {
            assert!(state.can_transition_to(Terminated));
        }
    }

    #[test]
    fn test_transitions_never_reverse() {
        assert!(!Connected.can_transition_to(Uninitialised));
        assert!(!Unreachable.can_transition_to(Connected));
        assert!(!Crashed.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connected));
        assert!(!Uninitialised.can_transition_to(Crashed));
    }

    #[test]
    fn test_terminated_is_absorbing() {
        for state in [Uninitialised, Connected, Unreachable, Crashed, Terminated] {
            assert!(!Terminated.can_transition_to(state));
        }
    }

    #[test]
    fn test_initial_connect_timeout() {
        let policy = policy();
        assert_eq!(policy.check(Uninitialised, Duration::from_secs(4), None), None);
        assert_eq!(
            policy.check(Uninitialised, Duration::from_millis(5001), None),
            Some(Unreachable)
        );
    }

    #[test]
    fn test_crash_timeout_after_contact() {
        let policy = policy();
        let uptime = Duration::from_secs(600);
        assert_eq!(policy.check(Connected, uptime, Some(Duration::from_secs(59))), None);
        assert_eq!(
            policy.check(Connected, uptime, Some(Duration::from_secs(61))),
            Some(Crashed)
        );
        // Unreachable agents only crash once they have been heard from
        assert_eq!(policy.check(Unreachable, uptime, None), None);
        assert_eq!(
            policy.check(Unreachable, uptime, Some(Duration::from_secs(61))),
            Some(Crashed)
        );
    }

    #[test]
    fn test_no_timeouts_after_crash_or_stop() {
        let policy = policy();
        let long = Duration::from_secs(3600);
        assert_eq!(policy.check(Crashed, long, Some(long)), None);
        assert_eq!(policy.check(Terminated, long, None), None);
    }
}
