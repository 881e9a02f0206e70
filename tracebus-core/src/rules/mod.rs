//! Enable-rule engine
//!
//! Decides, for a `(subsystem, detail level)` pair, whether tracing is on.
//! The active rules are an immutable snapshot behind an [`ArcSwap`]: readers
//! on the producer hot path take a lock-free, allocation-free load, and
//! writers publish a fresh copy, so a reconfiguration is never observed
//! half-applied.
//!
//! Rules combine additively: an event is enabled when **any** rule matches.
//! With no rules at all, everything is disabled.

mod pattern;
mod rule;

use std::sync::Arc;

use arc_swap::ArcSwap;

pub use pattern::SubsystemPattern;
pub use rule::{parse_rules, EnableRule};

use crate::error::Result;

/// Thread-safe, copy-on-write set of enable rules
#[derive(Debug)]
pub struct RuleSet {
    rules: ArcSwap<Vec<EnableRule>>,
}

impl RuleSet {
    /// Create an empty rule set (everything disabled)
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Create a rule set from existing rules
    pub fn with_rules(rules: Vec<EnableRule>) -> Self {
        Self {
            rules: ArcSwap::from_pointee(rules),
        }
    }

    /// Create a rule set from textual rules
    pub fn parse<I, S>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::with_rules(parse_rules(rules)?))
    }

    /// Replace the whole set atomically
    pub fn configure(&self, rules: Vec<EnableRule>) {
        self.rules.store(Arc::new(rules));
    }

    /// Add one rule; an identical rule already present is not duplicated
    pub fn enable(&self, rule: EnableRule) {
        self.rules.rcu(|current| {
            let mut next = Vec::clone(current);
            if !next.contains(&rule) {
                next.push(rule.clone());
            }
            next
        });
    }

    /// Add several rules in order
    pub fn extend(&self, rules: &[EnableRule]) {
        if rules.is_empty() {
            return;
        }
        self.rules.rcu(|current| {
            let mut next = Vec::clone(current);
            for rule in rules {
                if !next.contains(rule) {
                    next.push(rule.clone());
                }
            }
            next
        });
    }

    /// Remove every rule whose pattern text is `pattern`
    ///
    /// Returns how many rules were removed. A subsystem can stay enabled
    /// through other rules, e.g. a `*` rule.
    pub fn disable(&self, pattern: &str) -> usize {
        let pattern = pattern.trim();
        let mut removed = 0;
        self.rules.rcu(|current| {
            let next: Vec<EnableRule> = current
                .iter()
                .filter(|rule| rule.pattern.as_str() != pattern)
                .cloned()
                .collect();
            removed = current.len() - next.len();
            next
        });
        removed
    }

    /// Remove every rule
    pub fn clear(&self) {
        self.rules.store(Arc::new(Vec::new()));
    }

    /// True if any rule matches
    #[inline]
    pub fn is_enabled(&self, subsystem: &str, detail_level: u8) -> bool {
        self.rules
            .load()
            .iter()
            .any(|rule| rule.matches(subsystem, detail_level))
    }

    /// Copy of the current rules, in order
    pub fn snapshot(&self) -> Vec<EnableRule> {
        Vec::clone(&self.rules.load())
    }

    /// Number of active rules
    pub fn len(&self) -> usize {
        self.rules.load().len()
    }

    /// True when no rule is active
    pub fn is_empty(&self) -> bool {
        self.rules.load().is_empty()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}
