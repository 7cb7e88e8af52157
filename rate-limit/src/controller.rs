//! Firewall state controller — idempotent Apply/Remove for one address
//!
//! Apply:  remove → insert accept (head) → append drop (tail)
//! Remove: delete accept if present, delete drop if present
//!
//! No step aborts the sequence. Every backend call is written to the log
//! sink with its output; failures are counted, never propagated.

use tracing::{info, warn};

use crate::firewall::{BackendError, FirewallBackend, Invocation, RuleSpec};
use crate::sink::LogSink;

/// What a state transition did to the backend
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Mutating calls issued (insert, append, delete)
    pub mutations: usize,
    /// Backend calls, checks included, that failed
    pub failures: usize,
}

impl Transition {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }

    fn absorb(&mut self, other: Transition) {
        self.mutations += other.mutations;
        self.failures += other.failures;
    }
}

pub struct FirewallController<'a, B: ?Sized, S: ?Sized> {
    backend: &'a B,
    sink: &'a S,
    chain: String,
}

impl<'a, B, S> FirewallController<'a, B, S>
where
    B: FirewallBackend + ?Sized,
    S: LogSink + ?Sized,
{
    pub fn new(backend: &'a B, sink: &'a S, chain: &str) -> Self {
        Self {
            backend,
            sink,
            chain: chain.to_string(),
        }
    }

    /// Install the rate limit for `address`, starting from a clean slate
    pub fn apply(&self, address: &str) -> Transition {
        self.sink.append(&format!("[+] Applying rate-limit to {address}"));
        info!("Applying rate-limit to {address} on chain {}", self.chain);

        let mut transition = self.remove(address);

        let accept = RuleSpec::rate_limited_accept(&self.chain, address);
        transition.absorb(self.mutate(self.backend.insert_head(&accept)));

        let drop = RuleSpec::drop(&self.chain, address);
        transition.absorb(self.mutate(self.backend.append_tail(&drop)));

        self.sink.append(&format!("[OK] Rate-limit applied to {address}"));
        transition
    }

    /// Drop both rules for `address`; absent rules are skipped silently
    pub fn remove(&self, address: &str) -> Transition {
        self.sink.append(&format!("[+] Removing rate-limit for {address}"));
        info!("Removing rate-limit for {address} on chain {}", self.chain);

        let mut transition = Transition::default();
        for rule in [
            RuleSpec::rate_limited_accept(&self.chain, address),
            RuleSpec::drop(&self.chain, address),
        ] {
            let (present, check) = self.exists(&rule);
            transition.absorb(check);
            if present {
                transition.absorb(self.mutate(self.backend.delete(&rule)));
            }
        }

        self.sink.append(&format!("[OK] Rate-limit removed for {address}"));
        transition
    }

    /// A failing check counts as absent
    fn exists(&self, rule: &RuleSpec) -> (bool, Transition) {
        match self.backend.check(rule) {
            Ok(invocation) => {
                self.record(&invocation);
                (invocation.succeeded(), Transition::default())
            }
            Err(e) => {
                self.report(&e);
                (
                    false,
                    Transition {
                        mutations: 0,
                        failures: 1,
                    },
                )
            }
        }
    }

    fn mutate(&self, outcome: Result<Invocation, BackendError>) -> Transition {
        match outcome.and_then(|invocation| {
            self.record(&invocation);
            invocation.into_result()
        }) {
            Ok(_) => Transition {
                mutations: 1,
                failures: 0,
            },
            Err(e) => {
                self.report(&e);
                Transition {
                    mutations: 1,
                    failures: 1,
                }
            }
        }
    }

    fn record(&self, invocation: &Invocation) {
        self.sink.append(&format!("CMD: {}", invocation.command));
        self.sink.append(&format!("OUT: {}", invocation.stdout));
        self.sink.append(&format!("ERR: {}", invocation.stderr));
    }

    fn report(&self, error: &BackendError) {
        if let BackendError::Launch { command, .. } = error {
            self.sink.append(&format!("CMD: {command}"));
        }
        self.sink.append(&format!("[ERROR] {error}"));
        warn!("Firewall backend call failed: {error}");
    }
}
