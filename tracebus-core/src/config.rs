//! Configuration for producers and sinks
//!
//! The core never reads configuration files itself. It consumes either a
//! deserialized [`TraceSettings`] (any serde format) or an already parsed
//! key/value view through [`TraceSettings::from_pairs`], which understands
//! the conventional keys:
//!
//! | key | meaning |
//! |---|---|
//! | `TraceTarget` | endpoint producers send to and sinks bind, `address:port` |
//! | `TraceAdapter` | optional local interface address for multi-homed hosts |
//! | `TraceEnable<N>` | enable rule `<maxDetailLevel>:<subsystemPattern>`, ordered by `N` |
//!
//! Key matching ignores case and `.`, `_`, `-` separators, so
//! `trace.enable.2` and `TRACE_ENABLE_2` are the same key.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceBusError};
use crate::rules::{parse_rules, EnableRule};
use crate::transport::TraceEndpoint;
use tracebus_protocol::{HEADER_LEN, MAX_DATAGRAM_SIZE};

/// Default trace endpoint: an administratively scoped multicast group
pub const DEFAULT_TARGET: &str = "239.255.77.77:7777";

/// Producer-side settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSettings {
    /// Endpoint packets are sent to
    #[serde(default = "default_target")]
    pub target: String,

    /// Local interface address to send from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,

    /// Enable rules, in evaluation order
    #[serde(default)]
    pub enable: Vec<String>,

    /// Coalesce bursts into multi-packet datagrams
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchConfig>,

    /// Largest datagram the producer will send
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

fn default_target() -> String { DEFAULT_TARGET.to_string() }
fn default_max_datagram_size() -> usize { MAX_DATAGRAM_SIZE }

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            target: default_target(),
            adapter: None,
            enable: Vec::new(),
            batch: None,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

impl TraceSettings {
    /// Settings sending to `target`
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Set the local interface address
    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    /// Append an enable rule
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.enable.push(rule.into());
        self
    }

    /// Enable burst coalescing
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Set the datagram size limit
    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    /// Parse settings from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build settings from an already parsed key/value view
    ///
    /// Unrelated keys are ignored; the view usually carries the whole
    /// process configuration.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        let mut rules = BTreeMap::new();

        for (key, value) in pairs {
            let key = normalize_key(key.as_ref());
            let value = value.as_ref().trim();

            if key == "tracetarget" {
                settings.target = value.to_string();
            } else if key == "traceadapter" {
                settings.adapter = (!value.is_empty()).then(|| value.to_string());
            } else if let Some(suffix) = key.strip_prefix("traceenable") {
                // Keys such as `TraceEnabled` belong to someone else
                if !suffix.bytes().all(|b| b.is_ascii_digit()) {
                    continue;
                }
                let index: u32 = suffix.parse().map_err(|_| TraceBusError::InvalidSetting {
                    key: format!("TraceEnable{}", suffix),
                    reason: "rule keys must end in a number, e.g. TraceEnable1".to_string(),
                })?;
                rules.insert(index, value.to_string());
            }
        }

        settings.enable = rules.into_values().collect();
        Ok(settings)
    }

    /// Parsed target endpoint
    pub fn endpoint(&self) -> Result<TraceEndpoint> {
        TraceEndpoint::parse(&self.target)
    }

    /// Parsed adapter address, if any
    pub fn adapter_addr(&self) -> Result<Option<IpAddr>> {
        parse_adapter(self.adapter.as_deref())
    }

    /// Parsed enable rules
    pub fn rules(&self) -> Result<Vec<EnableRule>> {
        parse_rules(&self.enable)
    }

    /// Check every setting, reporting the first problem
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint()?;
        if endpoint.addr().port() == 0 {
            return Err(TraceBusError::InvalidEndpoint {
                endpoint: self.target.clone(),
                reason: "producers need a non-zero destination port".to_string(),
            });
        }
        self.adapter_addr()?;
        self.rules()?;

        if !(HEADER_LEN..=MAX_DATAGRAM_SIZE).contains(&self.max_datagram_size) {
            return Err(TraceBusError::InvalidSetting {
                key: "max_datagram_size".to_string(),
                reason: format!(
                    "{} is outside {}..={}",
                    self.max_datagram_size, HEADER_LEN, MAX_DATAGRAM_SIZE
                ),
            });
        }

        if let Some(batch) = &self.batch {
            batch.validate()?;
        }

        Ok(())
    }
}

/// Burst coalescing configuration
///
/// Encoded packets are queued and a background thread packs them into
/// datagrams, flushing when a datagram is full or the interval elapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Packets that may wait for the flush thread; writes beyond this are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Longest time a packet waits before being sent
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,
}

fn default_queue_capacity() -> usize { 1024 }
fn default_flush_interval() -> u64 { 5 }

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            flush_interval_ms: 5,
        }
    }
}

impl BatchConfig {
    /// Set queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set flush interval, rounded up to whole milliseconds
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = ceil_millis(interval);
        self
    }

    pub fn flush_interval_duration(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(TraceBusError::InvalidSetting {
                key: "batch.queue_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.flush_interval_ms == 0 {
            return Err(TraceBusError::InvalidSetting {
                key: "batch.flush_interval_ms".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Sink-side settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkSettings {
    /// Endpoint to listen on; port 0 picks an ephemeral port
    #[serde(default = "default_target")]
    pub target: String,

    /// Local interface used to join multicast groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,

    /// Interest filter in enable-rule syntax; empty delivers everything
    #[serde(default)]
    pub filter: Vec<String>,

    /// Upper bound on how long stop waits for the receive loop
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,
}

fn default_receive_timeout() -> u64 { 100 }

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            target: default_target(),
            adapter: None,
            filter: Vec::new(),
            receive_timeout_ms: 100,
        }
    }
}

impl SinkSettings {
    /// Settings listening on `target`
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Set the multicast interface
    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    /// Append an interest rule
    pub fn with_filter(mut self, rule: impl Into<String>) -> Self {
        self.filter.push(rule.into());
        self
    }

    /// Set the receive timeout
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = ceil_millis(timeout);
        self
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms.max(1))
    }

    /// Parsed listen endpoint
    pub fn endpoint(&self) -> Result<TraceEndpoint> {
        TraceEndpoint::parse(&self.target)
    }

    /// Parsed adapter address, if any
    pub fn adapter_addr(&self) -> Result<Option<IpAddr>> {
        parse_adapter(self.adapter.as_deref())
    }

    /// Parsed interest filter
    pub fn filter_rules(&self) -> Result<Vec<EnableRule>> {
        parse_rules(&self.filter)
    }
}

impl From<&TraceSettings> for SinkSettings {
    fn from(settings: &TraceSettings) -> Self {
        Self {
            target: settings.target.clone(),
            adapter: settings.adapter.clone(),
            ..Default::default()
        }
    }
}

fn ceil_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros().div_ceil(1000)).unwrap_or(u64::MAX)
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '.' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_adapter(adapter: Option<&str>) -> Result<Option<IpAddr>> {
    match adapter.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<IpAddr>()
            .map(Some)
            .map_err(|e| TraceBusError::InvalidAdapter {
                adapter: text.to_string(),
                reason: e.to_string(),
            }),
    }
}
