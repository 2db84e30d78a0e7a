// Console command parsing
// Turns one line of operator input into a ConsoleCommand

use grapevine_controller::channel::Command;
use grapevine_controller::config::parse_agent_addr;
use std::net::SocketAddr;
use thiserror::Error;

/// Help text printed by `help`
pub const HELP: &str = "\
commands:
  add <host[:port]>       register an agent and start monitoring it
  connect <host[:port]>   register if needed and select as current
  remove <host[:port]>    stop monitoring an agent
  retry <host[:port]>     restart the handshake with an agent
  select <host[:port]>    make an agent current
  list                    show every agent
  fuzz | stopfuzz | loadgen | bye | shutdown
                          send a command to the current agent
  log <host[:port]>       send telemetry to another collector
  help                    show this text
  quit                    say bye to every agent and exit";

/// Errors produced while parsing console input
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConsoleError {
    /// First word is not a console command
    #[error("unknown command '{0}', try 'help'")]
    UnknownCommand(String),

    /// Command needs an address argument
    #[error("'{0}' needs an address")]
    MissingAddress(&'static str),

    /// Address argument did not parse
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    /// More than one argument was given
    #[error("'{0}' takes at most one argument")]
    TooManyArguments(String),

    /// Command takes no arguments
    #[error("'{0}' takes no arguments")]
    UnexpectedArgument(&'static str),
}

/// One parsed line of operator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Register an agent
    Add(SocketAddr),
    /// Register and select an agent
    Connect(SocketAddr),
    /// Remove an agent
    Remove(SocketAddr),
    /// Restart an agent's handshake
    Retry(SocketAddr),
    /// Select the current agent
    Select(SocketAddr),
    /// Print the fleet table
    List,
    /// Send a control command to the current agent
    Send(Command),
    /// Retarget telemetry
    Log(SocketAddr),
    /// Print help
    Help,
    /// Coordinated shutdown
    Quit,
}

/// Parse a line; blank lines yield `None`
pub fn parse_line(line: &str, default_port: u16) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let argument = words.next();
    if words.next().is_some() {
        return Err(ConsoleError::TooManyArguments(verb.to_string()));
    }

    let address = |name: &'static str| -> Result<SocketAddr, ConsoleError> {
        let raw = argument.ok_or(ConsoleError::MissingAddress(name))?;
        parse_agent_addr(raw, default_port)
            .map_err(|_| ConsoleError::InvalidAddress(raw.to_string()))
    };
    let bare = |name: &'static str, command: ConsoleCommand| {
        if argument.is_some() {
            Err(ConsoleError::UnexpectedArgument(name))
        } else {
            Ok(command)
        }
    };

    let command = match verb {
        "add" => ConsoleCommand::Add(address("add")?),
        "connect" => ConsoleCommand::Connect(address("connect")?),
        "remove" => ConsoleCommand::Remove(address("remove")?),
        "retry" => ConsoleCommand::Retry(address("retry")?),
        "select" => ConsoleCommand::Select(address("select")?),
        "log" => ConsoleCommand::Log(address("log")?),
        "list" => bare("list", ConsoleCommand::List)?,
        "help" => bare("help", ConsoleCommand::Help)?,
        // `exit` quits the console; agents are told to exit with `shutdown`
        "quit" | "exit" => bare("quit", ConsoleCommand::Quit)?,
        "shutdown" => bare("shutdown", ConsoleCommand::Send(Command::Exit))?,
        "bye" => bare("bye", ConsoleCommand::Send(Command::Bye))?,
        "fuzz" => bare("fuzz", ConsoleCommand::Send(Command::Fuzz))?,
        "stopfuzz" => bare("stopfuzz", ConsoleCommand::Send(Command::StopFuzz))?,
        "loadgen" => bare("loadgen", ConsoleCommand::Send(Command::LoadGen))?,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORT: u16 = 10001;

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_line("   ", PORT), Ok(None));
    }

    #[test]
    fn test_address_commands() {
        assert_eq!(
            parse_line("connect 10.0.0.5", PORT),
            Ok(Some(ConsoleCommand::Connect("10.0.0.5:10001".parse().unwrap())))
        );
        assert_eq!(
            parse_line("remove 10.0.0.5:4000", PORT),
            Ok(Some(ConsoleCommand::Remove("10.0.0.5:4000".parse().unwrap())))
        );
        assert_eq!(
            parse_line("add", PORT),
            Err(ConsoleError::MissingAddress("add"))
        );
        assert_eq!(
            parse_line("select 10.0.0.5:xyz", PORT),
            Err(ConsoleError::InvalidAddress("10.0.0.5:xyz".to_string()))
        );
    }

    #[test]
    fn test_agent_commands() {
        assert_eq!(
            parse_line("fuzz", PORT),
            Ok(Some(ConsoleCommand::Send(Command::Fuzz)))
        );
        assert_eq!(
            parse_line("shutdown", PORT),
            Ok(Some(ConsoleCommand::Send(Command::Exit)))
        );
        assert_eq!(
            parse_line("fuzz now", PORT),
            Err(ConsoleError::UnexpectedArgument("fuzz"))
        );
    }

    #[test]
    fn test_too_many_arguments() {
        assert_eq!(
            parse_line("add 10.0.0.1 10.0.0.2", PORT),
            Err(ConsoleError::TooManyArguments("add".to_string()))
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_line("reboot", PORT),
            Err(ConsoleError::UnknownCommand("reboot".to_string()))
        );
    }

    #[test]
    fn test_quit_aliases() {
        assert_eq!(parse_line("quit", PORT), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(parse_line("exit", PORT), Ok(Some(ConsoleCommand::Quit)));
    }
}
