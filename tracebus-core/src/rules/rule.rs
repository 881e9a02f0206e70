//! Enable rules

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::pattern::SubsystemPattern;
use crate::error::{Result, TraceBusError};

/// Makes events visible for matching subsystems up to a detail level
///
/// Textual form is `<maxDetailLevel>:<subsystemPattern>`, e.g. `10:disk`,
/// `3:*` or `5:net.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnableRule {
    /// Highest detail level this rule lets through
    pub max_detail_level: u8,

    /// Subsystems this rule applies to
    pub pattern: SubsystemPattern,
}

impl EnableRule {
    /// Create a rule from an already parsed pattern
    pub fn new(max_detail_level: u8, pattern: SubsystemPattern) -> Self {
        Self {
            max_detail_level,
            pattern,
        }
    }

    /// Create a rule for a subsystem name or pattern
    pub fn for_subsystem(subsystem: &str, max_detail_level: u8) -> Result<Self> {
        Ok(Self::new(max_detail_level, SubsystemPattern::parse(subsystem)?))
    }

    /// Parse `<maxDetailLevel>:<subsystemPattern>`
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: String| TraceBusError::InvalidRule {
            rule: text.to_string(),
            reason,
        };

        let (level, pattern) = text
            .split_once(':')
            .ok_or_else(|| invalid("missing ':' separator".to_string()))?;

        let max_detail_level = level
            .trim()
            .parse::<u8>()
            .map_err(|e| invalid(format!("detail level '{}' is not 0-255 ({})", level.trim(), e)))?;

        let pattern = SubsystemPattern::parse(pattern).map_err(|e| match e {
            TraceBusError::InvalidPattern { reason, .. } => invalid(reason),
            other => other,
        })?;

        Ok(Self::new(max_detail_level, pattern))
    }

    /// True when the pattern matches and `detail_level <= max_detail_level`
    #[inline]
    pub fn matches(&self, subsystem: &str, detail_level: u8) -> bool {
        detail_level <= self.max_detail_level && self.pattern.matches(subsystem)
    }
}

impl FromStr for EnableRule {
    type Err = TraceBusError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EnableRule {
    type Error = TraceBusError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<EnableRule> for String {
    fn from(rule: EnableRule) -> Self {
        rule.to_string()
    }
}

impl fmt::Display for EnableRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.max_detail_level, self.pattern)
    }
}

/// Parse a list of textual rules, stopping at the first malformed one
pub fn parse_rules<I, S>(rules: I) -> Result<Vec<EnableRule>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    rules
        .into_iter()
        .map(|rule| EnableRule::parse(rule.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule() {
        let rule = EnableRule::parse("10:disk").unwrap();
        assert_eq!(rule.max_detail_level, 10);
        assert_eq!(rule.pattern, SubsystemPattern::Exact("disk".to_string()));

        let rule: EnableRule = " 3 : * ".parse().unwrap();
        assert_eq!(rule.max_detail_level, 3);
        assert_eq!(rule.pattern, SubsystemPattern::Any);
    }

    #[test]
    fn test_rule_matches_threshold() {
        let rule = EnableRule::parse("5:disk").unwrap();
        assert!(rule.matches("disk", 0));
        assert!(rule.matches("disk", 5));
        assert!(!rule.matches("disk", 6));
        assert!(!rule.matches("net", 0));
    }

    #[test]
    fn test_malformed_rules() {
        for text in ["disk", "x:disk", "256:disk", "-1:disk", "5:", ":disk", "5:disk[", ""] {
            let err = EnableRule::parse(text).unwrap_err();
            assert!(
                matches!(err, TraceBusError::InvalidRule { .. }),
                "'{}' gave {:?}",
                text,
                err
            );
        }
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["10:disk", "0:*", "255:net.*"] {
            assert_eq!(EnableRule::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_serde_uses_textual_form() {
        let rules: Vec<EnableRule> = serde_json::from_str(r#"["10:disk", "2:*"]"#).unwrap();
        assert_eq!(rules.len(), 2);

        let json = serde_json::to_string(&rules).unwrap();
        assert_eq!(json, r#"["10:disk","2:*"]"#);

        assert!(serde_json::from_str::<Vec<EnableRule>>(r#"["disk"]"#).is_err());
    }

    #[test]
    fn test_parse_rules_stops_on_error() {
        assert_eq!(parse_rules(["1:a", "2:b"]).unwrap().len(), 2);
        assert!(parse_rules(vec!["1:a".to_string(), "bad".to_string()]).is_err());
    }
}
