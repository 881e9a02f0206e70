//! Error types for tracebus operations
//!
//! Errors follow one propagation rule: anything that goes wrong before the
//! bus is running (bad rules, bad endpoints, bind failures) is returned to
//! the caller, and anything that goes wrong while it is running (send or
//! receive failures, undecodable datagrams, panicking callbacks) is logged
//! and counted instead.
//!
//! # Error Codes
//!
//! Each variant has a stable error code (e.g. `INVALID_RULE`) suitable for
//! log aggregation and for matching in callers.
//!
//! # Example
//!
//! ```rust
//! use tracebus_core::error::{ErrorCategory, TraceBusError};
//! use tracebus_core::EnableRule;
//!
//! let err = "ten:disk".parse::<EnableRule>().unwrap_err();
//! assert_eq!(err.category(), ErrorCategory::Configuration);
//! assert_eq!(err.error_code(), "INVALID_RULE");
//! ```

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracebus_protocol::{DecodeError, EncodeError};

/// Result type alias for tracebus operations
pub type Result<T> = std::result::Result<T, TraceBusError>;

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed rules, endpoints or settings
    Configuration,
    /// Event does not fit the wire format
    Encode,
    /// Received bytes are not a valid packet
    Decode,
    /// Socket level failure
    Transport,
}

/// Errors that can occur in tracebus operations
#[derive(Error, Debug)]
pub enum TraceBusError {
    // ═══════════════════════════════════════════════════════════════════════
    // Configuration errors (surfaced at start/configure time)
    // ═══════════════════════════════════════════════════════════════════════

    /// Enable rule is not of the form `<maxDetailLevel>:<subsystemPattern>`
    #[error("Invalid enable rule '{rule}': {reason}. Expected '<maxDetailLevel>:<subsystemPattern>', e.g. '10:disk'.")]
    InvalidRule { rule: String, reason: String },

    /// Subsystem pattern is not a valid glob
    #[error("Invalid subsystem pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Trace endpoint cannot be parsed as `address:port`
    #[error("Invalid trace endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Network adapter is not a local interface address
    #[error("Invalid trace network adapter '{adapter}': {reason}")]
    InvalidAdapter { adapter: String, reason: String },

    /// Any other setting is out of range
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Codec errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Event cannot be encoded
    #[error("Encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// Bytes cannot be decoded
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    // ═══════════════════════════════════════════════════════════════════════
    // Transport errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Socket could not be created, configured or bound
    #[error("Failed to bind trace transport on {endpoint}: {source}")]
    Bind {
        endpoint: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Transport has been closed and cannot be reused
    #[error("Trace transport is closed. Create a new transport to continue.")]
    TransportClosed,

    /// Any other I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON settings could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TraceBusError {
    /// Returns the error category for grouping
    pub fn category(&self) -> ErrorCategory {
        match self {
            TraceBusError::InvalidRule { .. }
            | TraceBusError::InvalidPattern { .. }
            | TraceBusError::InvalidEndpoint { .. }
            | TraceBusError::InvalidAdapter { .. }
            | TraceBusError::InvalidSetting { .. }
            | TraceBusError::Json(_) => ErrorCategory::Configuration,

            TraceBusError::Encode(_) => ErrorCategory::Encode,

            TraceBusError::Decode(_) => ErrorCategory::Decode,

            TraceBusError::Bind { .. }
            | TraceBusError::TransportClosed
            | TraceBusError::Io(_) => ErrorCategory::Transport,
        }
    }

    /// Returns the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            TraceBusError::InvalidRule { .. } => "INVALID_RULE",
            TraceBusError::InvalidPattern { .. } => "INVALID_PATTERN",
            TraceBusError::InvalidEndpoint { .. } => "INVALID_ENDPOINT",
            TraceBusError::InvalidAdapter { .. } => "INVALID_ADAPTER",
            TraceBusError::InvalidSetting { .. } => "INVALID_SETTING",
            TraceBusError::Encode(EncodeError::FieldTooLong { .. }) => "FIELD_TOO_LONG",
            TraceBusError::Encode(EncodeError::PacketTooLarge { .. }) => "PACKET_TOO_LARGE",
            TraceBusError::Decode(_) => "DECODE_ERROR",
            TraceBusError::Bind { .. } => "BIND_FAILED",
            TraceBusError::TransportClosed => "TRANSPORT_CLOSED",
            TraceBusError::Io(_) => "IO_ERROR",
            TraceBusError::Json(_) => "JSON_ERROR",
        }
    }

    /// Returns true for errors caused by the caller's configuration
    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}
