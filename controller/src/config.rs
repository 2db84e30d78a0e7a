//! Controller configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults. Agent addresses, timing and the log sink target are
//! all supplied from here; nothing in the monitor or registry hard-codes them.

use crate::error::{ControllerError, Result};
use std::env;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tracing::warn;

/// Port agents listen on when an address omits one
pub const DEFAULT_AGENT_PORT: u16 = 10001;

/// Controller configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Agent heartbeat and timeout settings
    pub monitor: MonitorConfig,
    /// Log collector settings
    pub sink: SinkConfig,
    /// Fleet-level settings
    pub fleet: FleetConfig,
}

/// Timing of the per-agent heartbeat state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Upper bound on a single socket wait
    pub poll_interval: Duration,
    /// How long an agent may stay silent before the handshake is abandoned
    pub initial_connect_timeout: Duration,
    /// Interval between heartbeat probes once connected
    pub heartbeat_interval: Duration,
    /// Silence after last contact that is treated as a crash
    pub crash_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            initial_connect_timeout: Duration::from_millis(5000),
            heartbeat_interval: Duration::from_millis(2000),
            crash_timeout: Duration::from_millis(60000),
        }
    }
}

impl MonitorConfig {
    /// Check the timing constraints the state machine relies on
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "poll interval must be > 0".to_string(),
            ));
        }
        if self.poll_interval > self.initial_connect_timeout {
            return Err(ControllerError::InvalidConfig(format!(
                "poll interval ({:?}) exceeds initial connect timeout ({:?})",
                self.poll_interval, self.initial_connect_timeout
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "heartbeat interval must be > 0".to_string(),
            ));
        }
        if self.crash_timeout <= self.heartbeat_interval {
            return Err(ControllerError::InvalidConfig(format!(
                "crash timeout ({:?}) must be longer than heartbeat interval ({:?})",
                self.crash_timeout, self.heartbeat_interval
            )));
        }
        Ok(())
    }
}

/// Log collector configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Collector host
    pub host: String,
    /// Collector UDP port
    pub port: u16,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl SinkConfig {
    /// Resolve the collector to a socket address
    pub fn addr(&self) -> Result<SocketAddr> {
        resolve_addr(&self.host, self.port)
    }
}

/// Fleet-level configuration
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Agents registered at startup
    pub agents: Vec<SocketAddr>,
    /// Port used for agent entries without one
    pub default_agent_port: u16,
    /// Bound on waiting for monitor loops to exit during shutdown
    pub shutdown_grace: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            default_agent_port: DEFAULT_AGENT_PORT,
            shutdown_grace: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let monitor_defaults = MonitorConfig::default();
        let sink_defaults = SinkConfig::default();

        let default_agent_port = env::var("GRAPEVINE_AGENT_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_AGENT_PORT);

        let agents = env::var("GRAPEVINE_AGENTS")
            .map(|list| parse_agent_list(&list, default_agent_port))
            .unwrap_or_default();

        Self {
            monitor: MonitorConfig {
                poll_interval: env_millis("GRAPEVINE_POLL_INTERVAL_MS")
                    .unwrap_or(monitor_defaults.poll_interval),
                initial_connect_timeout: env_millis("GRAPEVINE_CONNECT_TIMEOUT_MS")
                    .unwrap_or(monitor_defaults.initial_connect_timeout),
                heartbeat_interval: env_millis("GRAPEVINE_HEARTBEAT_INTERVAL_MS")
                    .unwrap_or(monitor_defaults.heartbeat_interval),
                crash_timeout: env_millis("GRAPEVINE_CRASH_TIMEOUT_MS")
                    .unwrap_or(monitor_defaults.crash_timeout),
            },
            sink: SinkConfig {
                host: env::var("GRAPEVINE_LOG_HOST").unwrap_or(sink_defaults.host),
                port: env::var("GRAPEVINE_LOG_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(sink_defaults.port),
            },
            fleet: FleetConfig {
                agents,
                default_agent_port,
                shutdown_grace: env_millis("GRAPEVINE_SHUTDOWN_GRACE_MS")
                    .unwrap_or_else(|| FleetConfig::default().shutdown_grace),
            },
        }
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.monitor.validate()?;
        if self.sink.port == 0 {
            return Err(ControllerError::InvalidConfig(
                "log sink port must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Parse a comma-separated agent list, skipping entries that do not resolve
pub fn parse_agent_list(list: &str, default_port: u16) -> Vec<SocketAddr> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match parse_agent_addr(entry, default_port) {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!(entry = %entry, error = %e, "Skipping invalid agent address");
                None
            }
        })
        .collect()
}

/// Parse `host[:port]` into a socket address, filling in `default_port`
///
/// Accepts literal socket addresses (`10.0.0.2:10001`, `[::1]:10001`), bare
/// IPs and host names. Host names are resolved once, here.
pub fn parse_agent_addr(entry: &str, default_port: u16) -> Result<SocketAddr> {
    let entry = entry.trim();
    if let Ok(addr) = entry.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = entry.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }
    match entry.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| ControllerError::InvalidAddress(entry.to_string()))?;
            resolve_addr(host, port)
        }
        None => resolve_addr(entry, default_port),
    }
}

fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr> {
    if host.is_empty() {
        return Err(ControllerError::InvalidAddress(format!(":{}", port)));
    }
    (host, port)
        .to_socket_addrs()
        .map_err(|_| ControllerError::InvalidAddress(format!("{}:{}", host, port)))?
        .next()
        .ok_or_else(|| ControllerError::InvalidAddress(format!("{}:{}", host, port)))
}
