//! Integration tests for the fleet registry

mod common;

use common::{fast_config, FakeAgent, RecordingSink};
use grapevine_controller::channel::{Command, SendOutcome};
use grapevine_controller::error::ControllerError;
use grapevine_controller::monitor::AgentState;
use grapevine_controller::registry::FleetRegistry;
use grapevine_controller::telemetry::{NullSink, TelemetryEvent, Urgency};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn registry() -> FleetRegistry {
    FleetRegistry::new(&fast_config(), Arc::new(NullSink))
}

#[tokio::test]
async fn test_duplicate_registration_is_benign() {
    let registry = registry();
    let agent = FakeAgent::spawn(true).await;

    let first = registry.add_agent(agent.addr).await.unwrap();
    let second = registry.add_agent(agent.addr).await.unwrap();

    assert!(first.is_new());
    assert!(!second.is_new());
    assert!(Arc::ptr_eq(first.monitor(), second.monitor()));
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_remove_unregistered_keeps_size() {
    let registry = registry();
    let agent = FakeAgent::spawn(true).await;
    registry.add_agent(agent.addr).await.unwrap();

    let stranger: SocketAddr = "127.0.0.1:9".parse().unwrap();
    assert!(!registry.remove_agent(stranger).await);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_commands_go_to_current_agent() {
    let registry = registry();
    let mut first = FakeAgent::spawn(true).await;
    let mut second = FakeAgent::spawn(true).await;

    registry.add_agent(first.addr).await.unwrap();
    registry.connect(second.addr).await.unwrap();
    assert_eq!(registry.current().await, Some(second.addr));

    assert_eq!(registry.fuzz().await.unwrap(), SendOutcome::Sent);
    assert_eq!(second.next_command().await, "fuzz");

    registry.select_current(first.addr).await.unwrap();
    registry.stopfuzz().await.unwrap();
    registry.shutdown().await.unwrap();
    assert_eq!(first.next_command().await, "stopfuzz");
    assert_eq!(first.next_command().await, "exit");
}

#[tokio::test]
async fn test_commands_without_selection_fail() {
    let registry = registry();
    let agent = FakeAgent::spawn(true).await;
    registry.add_agent(agent.addr).await.unwrap();

    assert!(matches!(
        registry.loadgen().await,
        Err(ControllerError::NoCurrentAgent)
    ));
    assert!(matches!(
        registry.select_current("127.0.0.1:9".parse().unwrap()).await,
        Err(ControllerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_agents_snapshot() {
    let registry = registry();
    let silent = FakeAgent::spawn(false).await;
    let live = FakeAgent::spawn(true).await;
    registry.add_agent(silent.addr).await.unwrap();
    registry.connect(live.addr).await.unwrap();

    let monitor = registry.agent(live.addr).await.unwrap();
    let mut rx = monitor.subscribe();
    tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|s| *s == AgentState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    let agents = registry.agents().await;
    assert_eq!(agents.len(), 2);
    assert!(agents.windows(2).all(|pair| pair[0].addr < pair[1].addr));
    let live_summary = agents.iter().find(|a| a.addr == live.addr).unwrap();
    assert!(live_summary.current);
    assert_eq!(live_summary.state, AgentState::Connected);
    assert!(!agents.iter().find(|a| a.addr == silent.addr).unwrap().current);
}

#[tokio::test]
async fn test_safe_exit_says_bye_to_everyone() {
    let sink = Arc::new(RecordingSink::default());
    let registry = FleetRegistry::new(&fast_config(), sink.clone());
    let mut agents = vec![
        FakeAgent::spawn(true).await,
        FakeAgent::spawn(false).await,
        FakeAgent::spawn(true).await,
    ];
    for agent in &agents {
        registry.add_agent(agent.addr).await.unwrap();
    }
    registry.select_current(agents[0].addr).await.unwrap();

    let report = registry.safe_exit("test").await;
    assert_eq!(report.farewells_sent, 3);
    assert!(report.farewell_failures.is_empty());
    assert_eq!(report.loops_stopped, 3);

    for agent in agents.iter_mut() {
        assert_eq!(agent.next_command().await, "bye");
        let monitor = registry.agent(agent.addr).await.unwrap();
        assert_eq!(monitor.state(), AgentState::Terminated);
    }
    assert_eq!(registry.current().await, None);
    assert!(sink
        .events()
        .contains(&TelemetryEvent::event("test", Urgency::Normal)));

    // Commands after shutdown are rejected, never sent
    assert!(matches!(
        registry.fuzz().await,
        Err(ControllerError::NoCurrentAgent)
    ));
}

#[tokio::test]
async fn test_safe_exit_continues_past_failed_farewell() {
    let registry = registry();
    let agent = FakeAgent::spawn(true).await;
    registry.add_agent(agent.addr).await.unwrap();
    // Port 0 cannot be sent to, so this farewell fails
    let unreachable: SocketAddr = "127.0.0.1:0".parse().unwrap();
    registry.add_agent(unreachable).await.unwrap();

    let report = registry.safe_exit("partial").await;
    assert_eq!(report.farewells_sent, 1);
    assert_eq!(report.farewell_failures, vec![unreachable]);
    assert_eq!(
        registry.agent(unreachable).await.unwrap().state(),
        AgentState::Terminated
    );
}

#[tokio::test]
async fn test_with_agents_registers_initial_fleet() {
    let first = FakeAgent::spawn(true).await;
    let second = FakeAgent::spawn(true).await;
    let registry = FleetRegistry::with_agents(
        &fast_config(),
        Arc::new(NullSink),
        &[first.addr, second.addr, first.addr],
    )
    .await
    .unwrap();

    assert_eq!(registry.len().await, 2);
    assert_eq!(registry.current().await, None);
}

#[tokio::test]
async fn test_broadcast_reaches_every_agent() {
    let registry = registry();
    let mut first = FakeAgent::spawn(true).await;
    let mut second = FakeAgent::spawn(true).await;
    registry.add_agent(first.addr).await.unwrap();
    registry.add_agent(second.addr).await.unwrap();

    let results = registry.broadcast(Command::StopFuzz).await;
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|(_, result)| matches!(result, Ok(SendOutcome::Sent))));
    assert_eq!(first.next_command().await, "stopfuzz");
    assert_eq!(second.next_command().await, "stopfuzz");

    let monitor = registry.agent(first.addr).await.unwrap();
    assert!(monitor.is_addr(first.addr));
    assert!(!monitor.is_addr(second.addr));
}
