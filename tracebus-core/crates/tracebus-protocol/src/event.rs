use serde::{Deserialize, Serialize};

/// A single trace event as it travels on the wire.
///
/// The producer fills every field; the receiving side never adds anything to
/// this struct (origin metadata lives next to it, not inside it).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Producer-chosen subsystem label, case-sensitive
    pub subsystem: String,

    /// Verbosity ordinal; lower values are coarser
    pub detail_level: u8,

    /// Short identifier of the kind of event
    pub event_name: String,

    /// Short human-readable text
    pub summary: String,

    /// Free-form text, may be empty
    #[serde(default)]
    pub details: String,
}

impl TraceEvent {
    /// Create a new event
    pub fn new(
        subsystem: impl Into<String>,
        detail_level: u8,
        event_name: impl Into<String>,
        summary: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            subsystem: subsystem.into(),
            detail_level,
            event_name: event_name.into(),
            summary: summary.into(),
            details: details.into(),
        }
    }
}

/// Borrowed view of an event, used by producers to encode without building
/// owned strings first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRef<'a> {
    pub subsystem: &'a str,
    pub detail_level: u8,
    pub event_name: &'a str,
    pub summary: &'a str,
    pub details: &'a str,
}

impl<'a> EventRef<'a> {
    pub fn new(
        subsystem: &'a str,
        detail_level: u8,
        event_name: &'a str,
        summary: &'a str,
        details: &'a str,
    ) -> Self {
        Self {
            subsystem,
            detail_level,
            event_name,
            summary,
            details,
        }
    }

    /// Copy into an owned event
    pub fn to_owned_event(&self) -> TraceEvent {
        TraceEvent::new(
            self.subsystem,
            self.detail_level,
            self.event_name,
            self.summary,
            self.details,
        )
    }
}

impl<'a> From<&'a TraceEvent> for EventRef<'a> {
    fn from(event: &'a TraceEvent) -> Self {
        Self {
            subsystem: &event.subsystem,
            detail_level: event.detail_level,
            event_name: &event.event_name,
            summary: &event.summary,
            details: &event.details,
        }
    }
}
