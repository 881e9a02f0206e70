//! Packet encoding and decoding
//!
//! All multi-byte integers are big-endian. A packet is the fixed header
//! followed by the four text fields in wire order, with no padding, so
//! packets can be laid back to back in one datagram and split again by
//! reading each header.

use crate::error::{DecodeError, EncodeError, Field};
use crate::event::{EventRef, TraceEvent};
use crate::{FORMAT_VERSION, HEADER_LEN, PACKET_MAGIC};

/// Length prefixes of the four text fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldLengths {
    subsystem: usize,
    event_name: usize,
    summary: usize,
    details: usize,
}

impl FieldLengths {
    fn of(event: &EventRef<'_>) -> Result<Self, EncodeError> {
        let lengths = Self {
            subsystem: event.subsystem.len(),
            event_name: event.event_name.len(),
            summary: event.summary.len(),
            details: event.details.len(),
        };

        for (field, len) in Field::ALL.iter().zip(lengths.as_array()) {
            if len > field.max_len() {
                return Err(EncodeError::FieldTooLong {
                    field: *field,
                    len,
                    max: field.max_len(),
                });
            }
        }

        Ok(lengths)
    }

    fn as_array(&self) -> [usize; 4] {
        [self.subsystem, self.event_name, self.summary, self.details]
    }

    fn body_len(&self) -> usize {
        self.as_array().iter().sum()
    }
}

/// Exact encoded size of an event, validating field limits
pub fn encoded_len<'a>(event: impl Into<EventRef<'a>>) -> Result<usize, EncodeError> {
    let event = event.into();
    Ok(HEADER_LEN + FieldLengths::of(&event)?.body_len())
}

/// Append one encoded packet to `out`
///
/// Fields are validated before anything is written, so on error `out` is
/// left untouched. Returns the number of bytes appended.
pub fn encode_into<'a>(
    event: impl Into<EventRef<'a>>,
    out: &mut Vec<u8>,
) -> Result<usize, EncodeError> {
    let event = event.into();
    let lengths = FieldLengths::of(&event)?;
    let total = HEADER_LEN + lengths.body_len();

    out.reserve(total);
    out.extend_from_slice(&PACKET_MAGIC.to_be_bytes());
    out.push(FORMAT_VERSION);
    out.push(event.detail_level);
    // Limits above guarantee these narrowings are lossless
    out.push(lengths.subsystem as u8);
    out.push(lengths.event_name as u8);
    out.extend_from_slice(&(lengths.summary as u16).to_be_bytes());
    out.extend_from_slice(&(lengths.details as u16).to_be_bytes());
    out.extend_from_slice(event.subsystem.as_bytes());
    out.extend_from_slice(event.event_name.as_bytes());
    out.extend_from_slice(event.summary.as_bytes());
    out.extend_from_slice(event.details.as_bytes());

    Ok(total)
}

/// Encode one event into a fresh buffer
pub fn encode<'a>(event: impl Into<EventRef<'a>>) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    encode_into(event, &mut out)?;
    Ok(out)
}

/// Encode one event, failing if the packet would exceed `max_size` bytes
pub fn encode_bounded<'a>(
    event: impl Into<EventRef<'a>>,
    max_size: usize,
) -> Result<Vec<u8>, EncodeError> {
    let event = event.into();
    let size = encoded_len(event)?;
    if size > max_size {
        return Err(EncodeError::PacketTooLarge {
            size,
            max: max_size,
        });
    }

    let mut out = Vec::with_capacity(size);
    encode_into(event, &mut out)?;
    Ok(out)
}

/// Encode several events back to back into one buffer
pub fn encode_batch(events: &[TraceEvent]) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    for event in events {
        encode_into(event, &mut out)?;
    }
    Ok(out)
}

/// Decode the first packet of `buf`, returning it with the bytes consumed
pub fn decode_one(buf: &[u8]) -> Result<(TraceEvent, usize), DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::Empty);
    }
    if buf.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            needed: HEADER_LEN,
            available: buf.len(),
        });
    }

    let magic = u16::from_be_bytes([buf[0], buf[1]]);
    if magic != PACKET_MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    if buf[2] != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(buf[2]));
    }

    let detail_level = buf[3];
    let lengths = FieldLengths {
        subsystem: buf[4] as usize,
        event_name: buf[5] as usize,
        summary: u16::from_be_bytes([buf[6], buf[7]]) as usize,
        details: u16::from_be_bytes([buf[8], buf[9]]) as usize,
    };

    let total = HEADER_LEN + lengths.body_len();
    if buf.len() < total {
        return Err(DecodeError::Truncated {
            needed: total,
            available: buf.len(),
        });
    }

    let mut cursor = HEADER_LEN;
    let mut fields: [String; 4] = Default::default();
    for ((field, len), slot) in Field::ALL
        .iter()
        .zip(lengths.as_array())
        .zip(fields.iter_mut())
    {
        let bytes = &buf[cursor..cursor + len];
        *slot = std::str::from_utf8(bytes)
            .map_err(|_| DecodeError::InvalidUtf8(*field))?
            .to_owned();
        cursor += len;
    }

    let [subsystem, event_name, summary, details] = fields;
    Ok((
        TraceEvent {
            subsystem,
            detail_level,
            event_name,
            summary,
            details,
        },
        total,
    ))
}

/// Decode a single packet
///
/// Bytes after the first packet are ignored; use [`decode_batch`] for
/// buffers that may carry several packets.
pub fn decode(buf: &[u8]) -> Result<TraceEvent, DecodeError> {
    decode_one(buf).map(|(event, _)| event)
}

/// Decode every packet in `buf`, in order
///
/// The buffer is all-or-nothing: if any packet is malformed the whole
/// buffer is rejected, since lengths after a bad header cannot be trusted.
pub fn decode_batch(buf: &[u8]) -> Result<Vec<TraceEvent>, DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::Empty);
    }
    BatchDecoder::new(buf).collect()
}

/// Iterator over the packets of a buffer
///
/// Yields each decoded packet in order and stops after the first error.
#[derive(Debug, Clone)]
pub struct BatchDecoder<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> BatchDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }
}

impl<'a> Iterator for BatchDecoder<'a> {
    type Item = Result<TraceEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }

        match decode_one(&self.buf[self.offset..]) {
            Ok((event, consumed)) => {
                self.offset += consumed;
                Some(Ok(event))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
