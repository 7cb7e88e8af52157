//! Handshake negotiator — asks the orchestrator before installing a limit
//!
//! One round trip: write a `check_keys` request naming the address, flush,
//! then read one response line. Only `{"command":"continue"}` grants.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use crate::input::LineSource;

pub const PROTOCOL_VERSION: u32 = 1;
pub const ORIGIN_NAME: &str = "rate-limit";
pub const ORIGIN_MODULE: &str = "active-response";
pub const CHECK_KEYS: &str = "check_keys";
pub const CONTINUE: &str = "continue";

#[derive(Debug, Serialize)]
pub struct HandshakeRequest<'a> {
    pub version: u32,
    pub origin: Origin<'a>,
    pub command: &'a str,
    pub parameters: Keys<'a>,
}

#[derive(Debug, Serialize)]
pub struct Origin<'a> {
    pub name: &'a str,
    pub module: &'a str,
}

#[derive(Debug, Serialize)]
pub struct Keys<'a> {
    pub keys: Vec<&'a str>,
}

impl<'a> HandshakeRequest<'a> {
    pub fn check_keys(address: &'a str) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            origin: Origin {
                name: ORIGIN_NAME,
                module: ORIGIN_MODULE,
            },
            command: CHECK_KEYS,
            parameters: Keys {
                keys: vec![address],
            },
        }
    }
}

/// Why the orchestrator did not let us proceed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Valid response whose command was not `continue`
    Aborted(String),
    /// Response line was not a UTF-8 JSON object
    Unparsable(String),
    /// Input closed before any response
    Closed,
    /// No response within the configured timeout
    TimedOut(Duration),
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::Aborted(command) => write!(f, "orchestrator answered {command:?}"),
            Denial::Unparsable(line) => write!(f, "invalid handshake response {line:?}"),
            Denial::Closed => f.write_str("orchestrator closed the channel"),
            Denial::TimedOut(limit) => {
                write!(f, "no response within {}s", limit.as_secs_f64())
            }
        }
    }
}

/// Result of one round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Granted,
    Denied(Denial),
}

/// Classify one response line
pub fn evaluate(response: &str) -> Verdict {
    let value: Value = match serde_json::from_str(response) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Verdict::Denied(Denial::Unparsable(response.to_string())),
    };

    match value.get("command") {
        Some(Value::String(command)) if command == CONTINUE => Verdict::Granted,
        Some(Value::String(command)) => Verdict::Denied(Denial::Aborted(command.clone())),
        Some(other) => Verdict::Denied(Denial::Aborted(other.to_string())),
        None => Verdict::Denied(Denial::Aborted("null".to_string())),
    }
}

pub struct Negotiator<'a, L, W> {
    input: &'a mut L,
    output: &'a mut W,
    timeout: Option<Duration>,
}

impl<'a, L: LineSource, W: Write> Negotiator<'a, L, W> {
    pub fn new(input: &'a mut L, output: &'a mut W) -> Self {
        Self {
            input,
            output,
            timeout: None,
        }
    }

    /// Bound the wait for the response; `None` blocks indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send the request for `address` and wait for the verdict.
    ///
    /// Returns the raw response line alongside the verdict for logging.
    /// I/O failures on the channel are errors; everything the orchestrator
    /// can say, or fail to say, is a [`Verdict`].
    pub fn negotiate(&mut self, address: &str) -> io::Result<(Verdict, Option<String>)> {
        let request = HandshakeRequest::check_keys(address);
        let line = serde_json::to_string(&request)?;
        writeln!(self.output, "{line}")?;
        self.output.flush()?;

        match self.input.next_line(self.timeout) {
            Ok(Some(response)) => match String::from_utf8(response) {
                Ok(response) => {
                    let response = response.trim().to_string();
                    Ok((evaluate(&response), Some(response)))
                }
                Err(e) => {
                    let response = String::from_utf8_lossy(e.as_bytes()).trim().to_string();
                    let denial = Denial::Unparsable(response.clone());
                    Ok((Verdict::Denied(denial), Some(response)))
                }
            },
            Ok(None) => Ok((Verdict::Denied(Denial::Closed), None)),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                let limit = self.timeout.unwrap_or_default();
                Ok((Verdict::Denied(Denial::TimedOut(limit)), None))
            }
            Err(e) => Err(e),
        }
    }
}
