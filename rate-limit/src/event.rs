//! Protocol reader — parses the active-response event line
//!
//! ```text
//! {"command":"add","parameters":{"alert":{"data":{"srcip":"203.0.113.7"}}}}
//! {"command":"delete","parameters":{"srcip":"203.0.113.7"}}
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Error, Result};
use crate::input::LineSource;

/// Requested action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `"add"`: install the rate limit
    Install,
    /// `"delete"`: remove the rate limit
    Uninstall,
    /// Anything else, kept as its JSON text; handled as a no-op
    Other(String),
}

impl Command {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) if s == "add" => Command::Install,
            Some(Value::String(s)) if s == "delete" => Command::Uninstall,
            Some(Value::String(s)) => Command::Other(s.clone()),
            Some(other) => Command::Other(other.to_string()),
            None => Command::Other("null".to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Install => f.write_str("add"),
            Command::Uninstall => f.write_str("delete"),
            Command::Other(raw) => f.write_str(raw),
        }
    }
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    command: Option<Value>,
    #[serde(default)]
    parameters: Map<String, Value>,
}

/// One parsed event; immutable once read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub command: Command,
    /// Source address to act on, if the event carries one
    pub address: Option<String>,
}

impl Event {
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| Error::MalformedEvent(e.to_string()))?;
        if !value.is_object() {
            return Err(Error::MalformedEvent("event is not a JSON object".into()));
        }
        let raw: RawEvent =
            serde_json::from_value(value).map_err(|e| Error::MalformedEvent(e.to_string()))?;

        Ok(Self {
            command: Command::from_value(raw.command.as_ref()),
            address: extract_address(&raw.parameters),
        })
    }
}

/// `parameters.srcip` wins when the key is present (timeout/delete events);
/// otherwise fall back to the alert payload carried by add events.
fn extract_address(parameters: &Map<String, Value>) -> Option<String> {
    let value = match parameters.get("srcip") {
        Some(direct) => Some(direct),
        None => parameters
            .get("alert")
            .and_then(|alert| alert.get("data"))
            .and_then(|data| data.get("srcip")),
    }?;

    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read and parse exactly one event line
pub fn read_event(source: &mut impl LineSource) -> Result<Event> {
    match source.next_line(None)? {
        Some(line) => {
            let line = std::str::from_utf8(&line)
                .map_err(|e| Error::MalformedEvent(format!("event is not UTF-8: {e}")))?;
            Event::parse(line.trim())
        }
        None => Err(Error::MalformedEvent("input closed before an event arrived".into())),
    }
}
