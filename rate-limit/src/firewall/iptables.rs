//! iptables backend — runs the `iptables` binary for each primitive

use std::process::Command;
use tracing::debug;

use super::{BackendError, FirewallBackend, Invocation, RuleSpec};

pub struct IptablesBackend {
    binary: String,
}

impl IptablesBackend {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    /// Full argument vector for `op` (`-C`, `-I`, `-A`, `-D`) on `rule`
    pub fn arguments(op: &str, rule: &RuleSpec) -> Vec<String> {
        let mut args = vec![op.to_string(), rule.chain.clone()];
        args.extend(rule.to_iptables_args());
        args
    }

    fn run(&self, op: &str, rule: &RuleSpec) -> Result<Invocation, BackendError> {
        let args = Self::arguments(op, rule);
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("Running {command}");

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|source| BackendError::Launch {
                command: command.clone(),
                source,
            })?;

        Ok(Invocation {
            command,
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl FirewallBackend for IptablesBackend {
    fn check(&self, rule: &RuleSpec) -> Result<Invocation, BackendError> {
        self.run("-C", rule)
    }

    // `-I` without a rule number inserts at position 1
    fn insert_head(&self, rule: &RuleSpec) -> Result<Invocation, BackendError> {
        self.run("-I", rule)
    }

    fn append_tail(&self, rule: &RuleSpec) -> Result<Invocation, BackendError> {
        self.run("-A", rule)
    }

    fn delete(&self, rule: &RuleSpec) -> Result<Invocation, BackendError> {
        self.run("-D", rule)
    }
}
