//! Subsystem patterns

use std::fmt;

use crate::error::{Result, TraceBusError};

/// Pattern a rule matches subsystem names against
///
/// Matching is case-sensitive. `*` alone matches every subsystem; any other
/// text containing `*`, `?` or `[` is a glob (`disk*`, `net.?x`); anything
/// else must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubsystemPattern {
    /// Every subsystem
    Any,
    /// One subsystem by name
    Exact(String),
    /// Glob over subsystem names
    Glob(glob::Pattern),
}

impl SubsystemPattern {
    /// Parse a pattern from its textual form
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TraceBusError::InvalidPattern {
                pattern: text.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        if text == "*" {
            return Ok(SubsystemPattern::Any);
        }

        if text.contains(['*', '?', '[']) {
            let glob = glob::Pattern::new(text).map_err(|e| TraceBusError::InvalidPattern {
                pattern: text.to_string(),
                reason: e.msg.to_string(),
            })?;
            return Ok(SubsystemPattern::Glob(glob));
        }

        Ok(SubsystemPattern::Exact(text.to_string()))
    }

    /// Check a subsystem name against this pattern
    #[inline]
    pub fn matches(&self, subsystem: &str) -> bool {
        match self {
            SubsystemPattern::Any => true,
            SubsystemPattern::Exact(name) => name == subsystem,
            SubsystemPattern::Glob(glob) => glob.matches(subsystem),
        }
    }

    /// Textual form, as it was configured
    pub fn as_str(&self) -> &str {
        match self {
            SubsystemPattern::Any => "*",
            SubsystemPattern::Exact(name) => name,
            SubsystemPattern::Glob(glob) => glob.as_str(),
        }
    }
}

impl fmt::Display for SubsystemPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
