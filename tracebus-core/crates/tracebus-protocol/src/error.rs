//! Codec error types

use thiserror::Error;

/// Text fields of a packet, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Subsystem,
    EventName,
    Summary,
    Details,
}

impl Field {
    /// Wire order of the variable-length fields
    pub const ALL: [Field; 4] = [
        Field::Subsystem,
        Field::EventName,
        Field::Summary,
        Field::Details,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Subsystem => "subsystem",
            Field::EventName => "event_name",
            Field::Summary => "summary",
            Field::Details => "details",
        }
    }

    /// Maximum encoded length in bytes
    pub fn max_len(&self) -> usize {
        match self {
            Field::Subsystem => crate::MAX_SUBSYSTEM_LEN,
            Field::EventName => crate::MAX_EVENT_NAME_LEN,
            Field::Summary => crate::MAX_SUMMARY_LEN,
            Field::Details => crate::MAX_DETAILS_LEN,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while encoding an event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A text field exceeds its wire limit
    #[error("Field '{field}' is {len} bytes, the wire limit is {max} bytes")]
    FieldTooLong { field: Field, len: usize, max: usize },

    /// The encoded packet does not fit the datagram limit
    #[error("Encoded packet is {size} bytes, the datagram limit is {max} bytes")]
    PacketTooLarge { size: usize, max: usize },
}

/// Errors raised while decoding a buffer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Nothing to decode
    #[error("Empty buffer")]
    Empty,

    /// Buffer ends before the header or a declared field does
    #[error("Truncated packet: needed {needed} bytes, only {available} available")]
    Truncated { needed: usize, available: usize },

    /// Buffer does not start with the packet magic
    #[error("Bad packet magic 0x{0:04x}")]
    BadMagic(u16),

    /// Packet was produced by an incompatible format version
    #[error("Unsupported packet format version {0}")]
    UnsupportedVersion(u8),

    /// A text field is not valid UTF-8
    #[error("Field '{0}' is not valid UTF-8")]
    InvalidUtf8(Field),
}

impl DecodeError {
    /// Stable code for logs and counters
    pub fn error_code(&self) -> &'static str {
        match self {
            DecodeError::Empty => "EMPTY",
            DecodeError::Truncated { .. } => "TRUNCATED",
            DecodeError::BadMagic(_) => "BAD_MAGIC",
            DecodeError::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            DecodeError::InvalidUtf8(_) => "INVALID_UTF8",
        }
    }
}
