// Grapevine Console - Main Entry Point
// Interactive operator console for a fleet of fuzzing agents

mod ui;

use grapevine_controller::config::Config;
use grapevine_controller::monitor::AgentCallbacks;
use grapevine_controller::registry::{FleetRegistry, Registration};
use grapevine_controller::telemetry::{EventSink, TelemetryEvent, UdpEventSink};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use ui::{outcome_line, parse_line, render_agent_table, ConsoleCommand, HELP};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with command output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    config.validate()?;

    let sink: Arc<dyn EventSink> = Arc::new(UdpEventSink::bind(config.sink.addr()?).await?);
    let registry = FleetRegistry::new(&config, Arc::clone(&sink)).with_callbacks(
        AgentCallbacks::new()
            .on_unreachable(|addr| println!("\n! {} is unreachable", addr))
            .on_crash_detected(|addr| println!("\n! crash detected on {}", addr))
            .on_data_received(|addr, data| {
                println!("\n< {}: {}", addr, String::from_utf8_lossy(data))
            }),
    );
    for addr in &config.fleet.agents {
        registry.add_agent(*addr).await?;
    }

    println!("grapevine console {}, type 'help'", env!("CARGO_PKG_VERSION"));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let reason = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break "End of input, terminating program.";
                };
                match parse_line(&line, config.fleet.default_agent_port) {
                    Ok(Some(ConsoleCommand::Quit)) => break "Operator quit.",
                    Ok(Some(command)) => execute(&registry, command).await,
                    Ok(None) => {}
                    Err(e) => println!("error: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                sink.emit(TelemetryEvent::signal("SIGINT")).await;
                break "Interrupt signal detected, terminating program.";
            }
        }
    };

    println!("{}", reason);
    let report = registry.safe_exit(reason).await;
    info!(?report, "Console shutdown complete");
    Ok(())
}

/// Run one console command against the registry, printing the result
async fn execute(registry: &FleetRegistry, command: ConsoleCommand) {
    let result = match command {
        ConsoleCommand::Add(addr) => registry
            .add_agent(addr)
            .await
            .map(|r| registration_line(addr, &r)),
        ConsoleCommand::Connect(addr) => registry
            .connect(addr)
            .await
            .map(|r| format!("{} (current)", registration_line(addr, &r))),
        ConsoleCommand::Remove(addr) => Ok(if registry.remove_agent(addr).await {
            format!("removed {}", addr)
        } else {
            format!("{} is not registered", addr)
        }),
        ConsoleCommand::Retry(addr) => registry
            .retry_agent(addr)
            .await
            .map(|_| format!("retrying {}", addr)),
        ConsoleCommand::Select(addr) => registry
            .select_current(addr)
            .await
            .map(|_| format!("current agent is {}", addr)),
        ConsoleCommand::List => Ok(render_agent_table(&registry.agents().await).join("\n")),
        ConsoleCommand::Send(cmd) => registry
            .dispatch(cmd)
            .await
            .map(|outcome| outcome_line(cmd.as_str(), outcome)),
        ConsoleCommand::Log(addr) => {
            registry.set_sink_addr(addr).await;
            Ok(format!("telemetry now goes to {}", addr))
        }
        ConsoleCommand::Help => Ok(HELP.to_string()),
        ConsoleCommand::Quit => Ok(String::new()),
    };

    match result {
        Ok(text) => println!("{}", text),
        Err(e) => println!("error: {}", e),
    }
}

fn registration_line(addr: std::net::SocketAddr, registration: &Registration) -> String {
    if registration.is_new() {
        format!("monitoring {}", addr)
    } else {
        format!("{} already exists", addr)
    }
}
