//! tracebus wire format
//!
//! One trace event is encoded as a fixed 10-byte header followed by four
//! UTF-8 text fields. Several packets may be laid back to back in one
//! datagram; each is independently decodable.
//!
//! ```text
//! ┌────────┬─────────┬────────┬────────┬────────┬─────────┬─────────┬──────────────────────────┐
//! │ Magic  │ Version │ Detail │ SubLen │ EvtLen │ SumLen  │ DetLen  │ subsystem|event|sum|det  │
//! │ 2 bytes│ 1 byte  │ 1 byte │ 1 byte │ 1 byte │ 2 bytes │ 2 bytes │ variable                 │
//! └────────┴─────────┴────────┴────────┴────────┴─────────┴─────────┴──────────────────────────┘
//! ```
//!
//! Integers are big-endian. This layout is the only interop artifact
//! between producers and sinks, so changes must bump [`FORMAT_VERSION`].
//!
//! ## Example
//!
//! ```rust
//! use tracebus_protocol::{decode_batch, encode_batch, TraceEvent};
//!
//! let events = vec![
//!     TraceEvent::new("disk", 10, "flush", "flushed 4 pages", ""),
//!     TraceEvent::new("net", 2, "link", "link up", "eth0"),
//! ];
//! let datagram = encode_batch(&events).unwrap();
//! assert_eq!(decode_batch(&datagram).unwrap(), events);
//! ```

mod codec;
mod error;
mod event;

pub use codec::{
    decode, decode_batch, decode_one, encode, encode_batch, encode_bounded, encode_into,
    encoded_len, BatchDecoder,
};
pub use error::{DecodeError, EncodeError, Field};
pub use event::{EventRef, TraceEvent};

/// Packet magic, "TB"
pub const PACKET_MAGIC: u16 = 0x5442;

/// Wire format version
pub const FORMAT_VERSION: u8 = 1;

/// Size of the fixed packet header
pub const HEADER_LEN: usize = 10;

/// Maximum subsystem length in bytes
pub const MAX_SUBSYSTEM_LEN: usize = 64;

/// Maximum event name length in bytes
pub const MAX_EVENT_NAME_LEN: usize = 64;

/// Maximum summary length in bytes
pub const MAX_SUMMARY_LEN: usize = 1024;

/// Maximum details length in bytes
pub const MAX_DETAILS_LEN: usize = 60_000;

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Largest possible single packet; always fits one datagram
pub const MAX_PACKET_LEN: usize =
    HEADER_LEN + MAX_SUBSYSTEM_LEN + MAX_EVENT_NAME_LEN + MAX_SUMMARY_LEN + MAX_DETAILS_LEN;
