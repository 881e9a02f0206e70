//! Transport lifecycle
//!
//! ```text
//! Unbound ──bind──► Bound ──first receive──► Receiving
//!                     │                          │
//!                     └─────────close────────────┴──► Closed
//! ```
//!
//! `Closed` is terminal; a new transport is needed to bind again.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TransportState {
    Unbound = 0,
    Bound = 1,
    Receiving = 2,
    Closed = 3,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransportState::Unbound,
            1 => TransportState::Bound,
            2 => TransportState::Receiving,
            _ => TransportState::Closed,
        }
    }
}

/// Atomic holder for a [`TransportState`]
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: TransportState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> TransportState {
        TransportState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `Bound → Receiving`; no effect in any other state
    pub(crate) fn mark_receiving(&self) {
        let _ = self.0.compare_exchange(
            TransportState::Bound as u8,
            TransportState::Receiving as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Move to `Closed`, returning true if this call closed it
    pub(crate) fn close(&self) -> bool {
        self.0.swap(TransportState::Closed as u8, Ordering::AcqRel) != TransportState::Closed as u8
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.get() == TransportState::Closed
    }
}
