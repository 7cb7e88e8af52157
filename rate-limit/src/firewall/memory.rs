//! In-memory rule chain with iptables first-match semantics
//!
//! Stands in for the host firewall in tests: `check` is membership,
//! `insert_head` puts the rule at position 1, `append_tail` pushes it last
//! and `delete` removes the first matching rule. Every call is journaled.

use std::cell::RefCell;
use std::collections::HashSet;

use super::{BackendError, FirewallBackend, Invocation, RuleSpec};

/// Primitive names, for the journal and for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Check,
    InsertHead,
    AppendTail,
    Delete,
}

#[derive(Default)]
pub struct MemoryChain {
    rules: RefCell<Vec<RuleSpec>>,
    journal: RefCell<Vec<(Op, RuleSpec)>>,
    rejected: HashSet<Op>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing chain
    pub fn with_rules(rules: Vec<RuleSpec>) -> Self {
        Self {
            rules: RefCell::new(rules),
            ..Self::default()
        }
    }

    /// Make every call to `op` exit non-zero without touching the chain
    pub fn rejecting(mut self, op: Op) -> Self {
        self.rejected.insert(op);
        self
    }

    /// Current chain, head first
    pub fn rules(&self) -> Vec<RuleSpec> {
        self.rules.borrow().clone()
    }

    /// Rules in the chain whose source is `address`
    pub fn rules_for(&self, address: &str) -> Vec<RuleSpec> {
        self.rules
            .borrow()
            .iter()
            .filter(|r| r.source == address)
            .cloned()
            .collect()
    }

    /// Mutating calls that were issued, in order (checks excluded)
    pub fn mutations(&self) -> Vec<(Op, RuleSpec)> {
        self.journal
            .borrow()
            .iter()
            .filter(|(op, _)| *op != Op::Check)
            .cloned()
            .collect()
    }

    /// Every call that was issued, checks included
    pub fn calls(&self) -> Vec<(Op, RuleSpec)> {
        self.journal.borrow().clone()
    }

    fn invoke(
        &self,
        op: Op,
        rule: &RuleSpec,
        apply: impl FnOnce(&mut Vec<RuleSpec>) -> bool,
    ) -> Result<Invocation, BackendError> {
        self.journal.borrow_mut().push((op, rule.clone()));

        let command = format!("memory {op:?} {rule}");
        if self.rejected.contains(&op) {
            return Ok(Invocation {
                command,
                status: Some(2),
                stdout: String::new(),
                stderr: format!("{op:?} rejected"),
            });
        }

        let ok = apply(&mut *self.rules.borrow_mut());
        Ok(Invocation {
            command,
            status: Some(if ok { 0 } else { 1 }),
            stdout: String::new(),
            stderr: if ok {
                String::new()
            } else {
                "Bad rule (does a matching rule exist in that chain?)".to_string()
            },
        })
    }
}

impl FirewallBackend for MemoryChain {
    fn check(&self, rule: &RuleSpec) -> Result<Invocation, BackendError> {
        self.invoke(Op::Check, rule, |rules| rules.contains(rule))
    }

    fn insert_head(&self, rule: &RuleSpec) -> Result<Invocation, BackendError> {
        self.invoke(Op::InsertHead, rule, |rules| {
            rules.insert(0, rule.clone());
            true
        })
    }

    fn append_tail(&self, rule: &RuleSpec) -> Result<Invocation, BackendError> {
        self.invoke(Op::AppendTail, rule, |rules| {
            rules.push(rule.clone());
            true
        })
    }

    fn delete(&self, rule: &RuleSpec) -> Result<Invocation, BackendError> {
        self.invoke(Op::Delete, rule, |rules| {
            match rules.iter().position(|r| r == rule) {
                Some(idx) => {
                    rules.remove(idx);
                    true
                }
                None => false,
            }
        })
    }
}
