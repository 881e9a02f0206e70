//! Property tests for the wire codec

use proptest::prelude::*;
use tracebus_protocol::{
    decode, decode_batch, encode, encode_batch, encoded_len, DecodeError, EncodeError,
    TraceEvent, MAX_EVENT_NAME_LEN, MAX_SUBSYSTEM_LEN, MAX_SUMMARY_LEN,
};

/// Any string whose UTF-8 encoding fits `max` bytes
fn text(max: usize) -> impl Strategy<Value = String> {
    ".{0,64}".prop_map(move |s: String| {
        let mut out = String::new();
        for ch in s.chars() {
            if out.len() + ch.len_utf8() > max {
                break;
            }
            out.push(ch);
        }
        out
    })
}

fn event() -> impl Strategy<Value = TraceEvent> {
    (
        text(MAX_SUBSYSTEM_LEN),
        any::<u8>(),
        text(MAX_EVENT_NAME_LEN),
        text(MAX_SUMMARY_LEN),
        text(512),
    )
        .prop_map(|(subsystem, detail_level, event_name, summary, details)| TraceEvent {
            subsystem,
            detail_level,
            event_name,
            summary,
            details,
        })
}

proptest! {
    #[test]
    fn decode_inverts_encode(event in event()) {
        let bytes = encode(&event).unwrap();
        prop_assert_eq!(bytes.len(), encoded_len(&event).unwrap());
        prop_assert_eq!(decode(&bytes).unwrap(), event);
    }

    #[test]
    fn batch_of_k_decodes_to_k_in_order(events in prop::collection::vec(event(), 1..12)) {
        let bytes = encode_batch(&events).unwrap();
        let decoded = decode_batch(&bytes).unwrap();
        prop_assert_eq!(decoded.len(), events.len());
        prop_assert_eq!(decoded, events);
    }

    #[test]
    fn decoding_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_batch(&bytes);
    }

    #[test]
    fn truncated_packets_are_rejected(event in event(), cut in 0usize..1000) {
        let bytes = encode(&event).unwrap();
        let cut = cut % bytes.len();
        let err = decode(&bytes[..cut]).unwrap_err();
        prop_assert!(matches!(err, DecodeError::Truncated { .. } | DecodeError::Empty), "unexpected error: {:?}", err);
    }

    #[test]
    fn oversized_subsystem_fails_to_encode(extra in 1usize..32) {
        let event = TraceEvent::new("x".repeat(MAX_SUBSYSTEM_LEN + extra), 1, "e", "s", "");
        let is_too_long = matches!(encode(&event), Err(EncodeError::FieldTooLong { .. }));
        prop_assert!(is_too_long);
    }
}
