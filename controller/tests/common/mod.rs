//! Shared fixtures for controller integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use grapevine_controller::config::Config;
use grapevine_controller::error::Result;
use grapevine_controller::telemetry::{EventSink, TelemetryEvent};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Config with timeouts short enough for tests
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.monitor.poll_interval = Duration::from_millis(10);
    config.monitor.initial_connect_timeout = Duration::from_millis(200);
    config.monitor.heartbeat_interval = Duration::from_millis(50);
    config.monitor.crash_timeout = Duration::from_millis(300);
    config.fleet.shutdown_grace = Duration::from_millis(200);
    config
}

/// A loopback agent that answers probes while `responsive` is set and
/// reports every datagram it receives
pub struct FakeAgent {
    pub addr: SocketAddr,
    pub responsive: Arc<AtomicBool>,
    pub received: mpsc::UnboundedReceiver<(String, SocketAddr)>,
    pub socket: Arc<UdpSocket>,
    task: JoinHandle<()>,
}

impl FakeAgent {
    pub async fn spawn(responsive: bool) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let responsive = Arc::new(AtomicBool::new(responsive));
        let (tx, received) = mpsc::unbounded_channel();

        let task = {
            let socket = Arc::clone(&socket);
            let responsive = Arc::clone(&responsive);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                    let payload = String::from_utf8_lossy(&buf[..len]).into_owned();
                    if payload == "hello" && responsive.load(Ordering::SeqCst) {
                        let _ = socket.send_to(b"hello from fake-agent", from).await;
                    }
                    if tx.send((payload, from)).is_err() {
                        break;
                    }
                }
            })
        };

        Self {
            addr,
            responsive,
            received,
            socket,
            task,
        }
    }

    /// Next datagram other than a probe
    pub async fn next_command(&mut self) -> String {
        loop {
            let (payload, _) = tokio::time::timeout(Duration::from_secs(2), self.received.recv())
                .await
                .expect("no datagram received")
                .expect("agent task ended");
            if payload != "hello" {
                return payload;
            }
        }
    }

    /// Controller address, learned from the first probe
    pub async fn controller_addr(&mut self) -> SocketAddr {
        let (_, from) = tokio::time::timeout(Duration::from_secs(2), self.received.recv())
            .await
            .expect("no probe received")
            .expect("agent task ended");
        from
    }

    pub fn go_silent(&self) {
        self.responsive.store(false, Ordering::SeqCst);
    }

    pub fn go_responsive(&self) {
        self.responsive.store(true, Ordering::SeqCst);
    }
}

impl Drop for FakeAgent {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Sink that keeps every event in memory
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn try_emit(&self, event: &TelemetryEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
