//! Per-agent event callbacks
//!
//! A fixed capability set supplied at construction. Each instance starts with
//! its own no-op handlers that only leave a trace in the local log.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Handler for agent lifecycle events
pub type AgentHandler = Arc<dyn Fn(SocketAddr) + Send + Sync>;

/// Handler for raw datagrams received from an agent
pub type DataHandler = Arc<dyn Fn(SocketAddr, &[u8]) + Send + Sync>;

/// Callbacks fired by an `AgentMonitor`
#[derive(Clone)]
pub struct AgentCallbacks {
    on_unreachable: AgentHandler,
    on_crash_detected: AgentHandler,
    on_data_received: DataHandler,
}

impl AgentCallbacks {
    /// Callbacks with no-op handlers
    pub fn new() -> Self {
        Self {
            on_unreachable: Arc::new(|addr: SocketAddr| {
                debug!(agent = %addr, "Unreachable event is not handled");
            }),
            on_crash_detected: Arc::new(|addr: SocketAddr| {
                debug!(agent = %addr, "Crash detected event is not handled");
            }),
            on_data_received: Arc::new(|addr: SocketAddr, data: &[u8]| {
                debug!(agent = %addr, len = data.len(), "Data received event is not handled");
            }),
        }
    }

    /// Replace the unreachable handler
    pub fn on_unreachable<F>(mut self, handler: F) -> Self
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        self.on_unreachable = Arc::new(handler);
        self
    }

    /// Replace the crash handler
    pub fn on_crash_detected<F>(mut self, handler: F) -> Self
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        self.on_crash_detected = Arc::new(handler);
        self
    }

    /// Replace the data handler
    pub fn on_data_received<F>(mut self, handler: F) -> Self
    where
        F: Fn(SocketAddr, &[u8]) + Send + Sync + 'static,
    {
        self.on_data_received = Arc::new(handler);
        self
    }

    pub(crate) fn unreachable(&self, addr: SocketAddr) {
        (self.on_unreachable)(addr)
    }

    pub(crate) fn crash_detected(&self, addr: SocketAddr) {
        (self.on_crash_detected)(addr)
    }

    pub(crate) fn data_received(&self, addr: SocketAddr, data: &[u8]) {
        (self.on_data_received)(addr, data)
    }
}

impl Default for AgentCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AgentCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCallbacks").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handlers_are_per_instance() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let custom = AgentCallbacks::new().on_crash_detected(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let plain = AgentCallbacks::new();

        let addr: SocketAddr = "127.0.0.1:10001".parse().unwrap();
        plain.crash_detected(addr);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        custom.crash_detected(addr);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_data_handler_receives_payload() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callbacks = AgentCallbacks::new().on_data_received(move |_, data| {
            sink.lock().unwrap().extend_from_slice(data);
        });

        callbacks.data_received("127.0.0.1:1".parse().unwrap(), b"crash at 0x41");
        assert_eq!(seen.lock().unwrap().as_slice(), b"crash at 0x41");
    }
}
