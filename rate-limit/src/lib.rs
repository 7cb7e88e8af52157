//! Rate-limit active response
//!
//! Invoked once per alert by the security orchestrator. Reads one event
//! line, asks the orchestrator for permission before installing anything,
//! then rate limits (or stops rate limiting) the event's source address:
//!
//! read event → (add only) handshake → apply/remove rules → log
//!
//! Only a malformed event fails the process. Every other problem ends up
//! in the log sink and the handler exits 0.

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod firewall;
pub mod handshake;
pub mod input;
pub mod sink;

use std::io::Write;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::controller::{FirewallController, Transition};
use crate::error::{Error, Result};
use crate::event::{read_event, Command};
use crate::firewall::FirewallBackend;
use crate::handshake::{Denial, Negotiator, Verdict};
use crate::input::LineSource;
use crate::sink::LogSink;

/// Per-invocation knobs
#[derive(Debug, Clone)]
pub struct Options {
    pub chain: String,
    pub handshake_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            chain: "INPUT".to_string(),
            handshake_timeout: None,
        }
    }
}

impl From<&Config> for Options {
    fn from(config: &Config) -> Self {
        Self {
            chain: config.firewall.chain.clone(),
            handshake_timeout: config.handshake.timeout(),
        }
    }
}

/// How a well-formed event was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(Transition),
    Removed(Transition),
    /// Command was neither add nor delete
    Ignored(String),
}

/// Handle one event end to end.
///
/// `input` carries the event line and, for add, the handshake response;
/// `output` is where the handshake request goes.
pub fn handle<L, W, B, S>(
    input: &mut L,
    output: &mut W,
    backend: &B,
    sink: &S,
    options: &Options,
) -> Result<Outcome>
where
    L: LineSource,
    W: Write,
    B: FirewallBackend + ?Sized,
    S: LogSink + ?Sized,
{
    let event = read_event(input)?;
    sink.append(&format!(
        "[+] Received AR command: {}, IP={}",
        event.command,
        event.address.as_deref().unwrap_or("None")
    ));

    let address = event.address.as_deref().ok_or(Error::AbsentTarget)?;

    if event.command == Command::Install {
        let (verdict, response) = Negotiator::new(input, output)
            .with_timeout(options.handshake_timeout)
            .negotiate(address)?;
        if let Some(response) = response {
            sink.append(&format!("[+] Orchestrator responded: {response}"));
        }
        if let Verdict::Denied(denial) = verdict {
            return Err(Error::HandshakeDenied(denial));
        }
    }

    let controller = FirewallController::new(backend, sink, &options.chain);
    let outcome = match &event.command {
        Command::Install => Outcome::Applied(controller.apply(address)),
        Command::Uninstall => Outcome::Removed(controller.remove(address)),
        Command::Other(raw) => {
            info!("Ignoring unsupported command {raw:?}");
            Outcome::Ignored(raw.clone())
        }
    };

    let summary = match &outcome {
        Outcome::Applied(t) | Outcome::Removed(t) => {
            format!(" ({} changes, {} failures)", t.mutations, t.failures)
        }
        Outcome::Ignored(_) => String::new(),
    };
    sink.append(&format!(
        "[DONE] Completed command {} for {address}{summary}",
        event.command
    ));
    Ok(outcome)
}

/// Handle one event and turn the result into a process exit status
pub fn run<L, W, B, S>(
    input: &mut L,
    output: &mut W,
    backend: &B,
    sink: &S,
    options: &Options,
) -> u8
where
    L: LineSource,
    W: Write,
    B: FirewallBackend + ?Sized,
    S: LogSink + ?Sized,
{
    match handle(input, output, backend, sink, options) {
        Ok(outcome) => {
            info!("Event handled: {outcome:?}");
            0
        }
        Err(e) => {
            sink.append(&log_line(&e));
            if e.is_fatal() {
                error!("Active response failed: {e}");
            } else {
                info!("Active response ended early: {e}");
            }
            e.exit_status()
        }
    }
}

fn log_line(error: &Error) -> String {
    match error {
        Error::MalformedEvent(reason) => format!("[ERROR] JSON parse failure: {reason}"),
        Error::AbsentTarget => "[!] No IP found. Abort.".to_string(),
        Error::HandshakeDenied(Denial::Unparsable(_) | Denial::Closed) => {
            "[!] Invalid handshake.".to_string()
        }
        Error::HandshakeDenied(denial) => format!("[!] Orchestrator aborted action: {denial}"),
        Error::Io(e) => format!("[ERROR] Orchestrator channel failure: {e}"),
    }
}
