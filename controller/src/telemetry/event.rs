//! Structured telemetry events
//!
//! Each event becomes one JSON object per datagram. Field names are the
//! collector's wire format and must not change.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::net::SocketAddr;
use tracing::debug;

/// Urgency attached to generic events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Informational
    Low,
    /// Routine lifecycle events
    Normal,
    /// Needs operator attention
    High,
    /// Agent crash or equivalent
    Critical,
}

impl Urgency {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One argument of a logged syscall invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyscallArg {
    /// Integer argument (flags, modes, descriptors)
    Int(i64),
    /// String argument (paths)
    Str(String),
    /// Raw buffer, encoded as lowercase hex
    Bytes(Vec<u8>),
}

impl SyscallArg {
    fn to_value(&self) -> Value {
        match self {
            SyscallArg::Int(n) => Value::from(*n),
            SyscallArg::Str(s) => Value::from(s.as_str()),
            SyscallArg::Bytes(bytes) => {
                Value::from(bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>())
            }
        }
    }
}

impl From<i64> for SyscallArg {
    fn from(n: i64) -> Self {
        SyscallArg::Int(n)
    }
}

impl From<&str> for SyscallArg {
    fn from(s: &str) -> Self {
        SyscallArg::Str(s.to_string())
    }
}

impl From<String> for SyscallArg {
    fn from(s: String) -> Self {
        SyscallArg::Str(s)
    }
}

impl From<Vec<u8>> for SyscallArg {
    fn from(bytes: Vec<u8>) -> Self {
        SyscallArg::Bytes(bytes)
    }
}

/// Telemetry record forwarded to the log collector
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// A syscall was invoked
    SyscallCall {
        /// Syscall number
        number: i64,
        /// Arguments in call order
        args: Vec<SyscallArg>,
    },
    /// A syscall returned
    SyscallReturn {
        /// Return value, rendered as a string
        value: String,
    },
    /// A raw signal was received
    Signal {
        /// Signal name or number
        signal: String,
    },
    /// Generic event with an urgency level
    Event {
        /// Event description
        event: String,
        /// How urgent the event is
        urgency: Urgency,
    },
    /// A command was received (or dispatched) for an address
    Command {
        /// Command token
        command: String,
        /// Address the command concerns
        addr: String,
    },
    /// Named data record with free-form extra fields
    Data {
        /// Data set label
        label: String,
        /// Source address
        addr: String,
        /// Extra named fields
        extras: Map<String, Value>,
    },
}

impl TelemetryEvent {
    /// Syscall invocation record
    pub fn syscall<I, A>(number: i64, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<SyscallArg>,
    {
        TelemetryEvent::SyscallCall {
            number,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Syscall return record
    pub fn syscall_return(value: impl fmt::Display) -> Self {
        TelemetryEvent::SyscallReturn {
            value: value.to_string(),
        }
    }

    /// Generic event
    pub fn event(event: impl Into<String>, urgency: Urgency) -> Self {
        TelemetryEvent::Event {
            event: event.into(),
            urgency,
        }
    }

    /// Command notice
    pub fn command(command: impl fmt::Display, addr: SocketAddr) -> Self {
        TelemetryEvent::Command {
            command: command.to_string(),
            addr: addr.to_string(),
        }
    }

    /// Signal notice
    pub fn signal(signal: impl fmt::Display) -> Self {
        TelemetryEvent::Signal {
            signal: signal.to_string(),
        }
    }

    /// Data record without extras
    pub fn data(label: impl Into<String>, addr: SocketAddr) -> Self {
        TelemetryEvent::Data {
            label: label.into(),
            addr: addr.to_string(),
            extras: Map::new(),
        }
    }

    /// Attach an extra named field to a data record; ignored for other kinds
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let TelemetryEvent::Data { extras, .. } = &mut self {
            extras.insert(key.into(), value.into());
        }
        self
    }

    /// JSON object sent to the collector
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        match self {
            TelemetryEvent::SyscallCall { number, args } => {
                object.insert("syscall_number".to_string(), Value::from(*number));
                for (i, arg) in args.iter().enumerate() {
                    object.insert(format!("arg{}", i), arg.to_value());
                }
            }
            TelemetryEvent::SyscallReturn { value } => {
                object.insert("return_value".to_string(), Value::from(value.as_str()));
            }
            TelemetryEvent::Signal { signal } => {
                object.insert("signal".to_string(), Value::from(signal.as_str()));
            }
            TelemetryEvent::Event { event, urgency } => {
                object.insert("event".to_string(), Value::from(event.as_str()));
                object.insert("urgency".to_string(), Value::from(urgency.as_str()));
            }
            TelemetryEvent::Command { command, addr } => {
                object.insert("command".to_string(), Value::from(command.as_str()));
                object.insert("addr".to_string(), Value::from(addr.as_str()));
            }
            TelemetryEvent::Data {
                label,
                addr,
                extras,
            } => {
                for (key, value) in extras {
                    if key == "data" || key == "addr" {
                        debug!(field = %key, "Dropping extra field that shadows a data record key");
                        continue;
                    }
                    object.insert(key.clone(), value.clone());
                }
                object.insert("data".to_string(), Value::from(label.as_str()));
                object.insert("addr".to_string(), Value::from(addr.as_str()));
            }
        }
        Value::Object(object)
    }

    /// Datagram payload
    pub fn to_payload(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }

    /// Short name of the event kind, for local logs
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::SyscallCall { .. } => "syscall",
            TelemetryEvent::SyscallReturn { .. } => "return",
            TelemetryEvent::Signal { .. } => "signal",
            TelemetryEvent::Event { .. } => "event",
            TelemetryEvent::Command { .. } => "command",
            TelemetryEvent::Data { .. } => "data",
        }
    }
}
