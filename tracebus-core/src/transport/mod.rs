//! Datagram transport
//!
//! Producers send through a [`PacketTransport`]; the UDP implementation is
//! [`UdpSender`], and [`MemoryTransport`] records datagrams for tests.
//! Sinks read from a [`UdpReceiver`] on a [`ReceiveLoop`] thread.

mod endpoint;
mod memory;
mod receive_loop;
mod state;
mod udp;

use std::io;
use std::net::SocketAddr;

pub use endpoint::{EndpointKind, TraceEndpoint};
pub use memory::MemoryTransport;
pub use receive_loop::{DatagramHandler, ReceiveLoop};
pub use state::TransportState;
pub use udp::{UdpReceiver, UdpSender, RECV_BUFFER_SIZE};

/// Outbound side of the bus
///
/// Implementations must be safe to call from many producer threads at once
/// and must not block the caller.
pub trait PacketTransport: Send + Sync {
    /// Send one datagram, returning the number of bytes sent
    fn send(&self, datagram: &[u8]) -> io::Result<usize>;

    /// Refuse further sends
    fn close(&self);

    /// Largest datagram this transport accepts
    fn max_datagram_size(&self) -> usize;

    /// Bound local address, if the transport has one
    fn local_addr(&self) -> Option<SocketAddr>;

    fn state(&self) -> TransportState;
}
