//! Firewall backend abstraction — rule specs and the capability trait
//!
//! The controller only ever talks to a [`FirewallBackend`]. Production uses
//! [`iptables::IptablesBackend`]; tests use [`memory::MemoryChain`].

pub mod iptables;
pub mod memory;

use std::fmt;
use thiserror::Error;

/// Packets per second admitted by the accept rule
pub const RATE_PER_SECOND: u32 = 5;

/// Burst allowance of the accept rule
pub const BURST: u32 = 10;

/// What a rule does with matching traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Accept up to `per_second` packets/s with `burst` allowance
    RateLimitedAccept { per_second: u32, burst: u32 },
    Drop,
}

/// A single filter rule scoped to one source address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub chain: String,
    pub source: String,
    pub action: RuleAction,
}

impl RuleSpec {
    /// The rate-limited accept rule for `source`
    pub fn rate_limited_accept(chain: &str, source: &str) -> Self {
        Self {
            chain: chain.to_string(),
            source: source.to_string(),
            action: RuleAction::RateLimitedAccept {
                per_second: RATE_PER_SECOND,
                burst: BURST,
            },
        }
    }

    /// The unconditional drop rule for `source`
    pub fn drop(chain: &str, source: &str) -> Self {
        Self {
            chain: chain.to_string(),
            source: source.to_string(),
            action: RuleAction::Drop,
        }
    }

    /// Match and target arguments in iptables syntax, without the
    /// operation flag and chain.
    pub fn to_iptables_args(&self) -> Vec<String> {
        let mut args = vec!["-s".to_string(), self.source.clone()];
        match self.action {
            RuleAction::RateLimitedAccept { per_second, burst } => {
                args.extend([
                    "-m".to_string(),
                    "limit".to_string(),
                    "--limit".to_string(),
                    format!("{per_second}/second"),
                    "--limit-burst".to_string(),
                    burst.to_string(),
                    "-j".to_string(),
                    "ACCEPT".to_string(),
                ]);
            }
            RuleAction::Drop => {
                args.extend(["-j".to_string(), "DROP".to_string()]);
            }
        }
        args
    }
}

impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            RuleAction::RateLimitedAccept { per_second, burst } => write!(
                f,
                "{} accept {} limit {per_second}/second burst {burst}",
                self.chain, self.source
            ),
            RuleAction::Drop => write!(f, "{} drop {}", self.chain, self.source),
        }
    }
}

/// Outcome of one call into the rule engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Full command line as it was run
    pub command: String,
    /// Exit status; `None` if the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Invocation {
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a non-zero exit into [`BackendError::Rejected`]
    pub fn into_result(self) -> Result<Invocation, BackendError> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(BackendError::Rejected(self))
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{}` exited with status {}: {}", .0.command, status_label(.0.status), .0.stderr.trim())]
    Rejected(Invocation),
}

fn status_label(status: Option<i32>) -> String {
    status.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

/// Primitives the rule engine must offer.
///
/// Every method returns `Ok` once the engine ran, whatever its verdict;
/// `Err` is reserved for failing to reach the engine at all. For
/// [`check`](FirewallBackend::check) a successful invocation means the rule
/// is present.
pub trait FirewallBackend {
    fn check(&self, rule: &RuleSpec) -> Result<Invocation, BackendError>;
    fn insert_head(&self, rule: &RuleSpec) -> Result<Invocation, BackendError>;
    fn append_tail(&self, rule: &RuleSpec) -> Result<Invocation, BackendError>;
    fn delete(&self, rule: &RuleSpec) -> Result<Invocation, BackendError>;
}
