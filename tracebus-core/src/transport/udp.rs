//! UDP sockets for both roles of the trace bus

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use super::endpoint::{EndpointKind, TraceEndpoint};
use super::state::{StateCell, TransportState};
use super::PacketTransport;
use crate::error::{Result, TraceBusError};

/// Receive buffer size; large enough for any UDP payload
pub const RECV_BUFFER_SIZE: usize = 65_536;

/// Producer-side socket
///
/// Sends never block: the socket is non-blocking and a full send buffer
/// is reported as an error, which the emitter counts and drops.
#[derive(Debug)]
pub struct UdpSender {
    socket: UdpSocket,
    target: SocketAddr,
    local_addr: SocketAddr,
    max_datagram_size: usize,
    state: StateCell,
}

impl UdpSender {
    /// Bind an ephemeral local port, on `adapter` if given
    pub fn bind(
        endpoint: &TraceEndpoint,
        adapter: Option<IpAddr>,
        max_datagram_size: usize,
    ) -> Result<Self> {
        let target = endpoint.addr();
        let local = local_bind_addr(target, adapter)?;
        if let (IpAddr::V6(group), Some(ip), true) = (target.ip(), adapter, endpoint.is_multicast()) {
            return Err(ipv6_adapter_error(ip, group));
        }
        let bind_err = |source: io::Error| TraceBusError::Bind {
            endpoint: local,
            source,
        };

        let socket = new_socket(target).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;

        match endpoint.kind() {
            EndpointKind::Broadcast => socket.set_broadcast(true).map_err(bind_err)?,
            EndpointKind::Multicast => match (target.ip(), adapter) {
                (IpAddr::V4(_), Some(IpAddr::V4(interface))) => {
                    socket.set_multicast_if_v4(&interface).map_err(bind_err)?;
                    socket.set_multicast_loop_v4(true).map_err(bind_err)?;
                    socket.set_multicast_ttl_v4(1).map_err(bind_err)?;
                }
                (IpAddr::V4(_), _) => {
                    socket.set_multicast_loop_v4(true).map_err(bind_err)?;
                    socket.set_multicast_ttl_v4(1).map_err(bind_err)?;
                }
                (IpAddr::V6(_), _) => {
                    socket.set_multicast_loop_v6(true).map_err(bind_err)?;
                    socket.set_multicast_hops_v6(1).map_err(bind_err)?;
                }
            },
            EndpointKind::Unicast => {}
        }

        socket.bind(&local.into()).map_err(bind_err)?;
        let socket: UdpSocket = socket.into();
        let local_addr = socket.local_addr().map_err(bind_err)?;

        debug!(destination = %target, local = %local_addr, "trace sender bound");

        Ok(Self {
            socket,
            target,
            local_addr,
            max_datagram_size,
            state: StateCell::new(TransportState::Bound),
        })
    }

    /// Destination of every datagram
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl PacketTransport for UdpSender {
    fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        if self.state.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "trace transport is closed",
            ));
        }
        self.socket.send_to(datagram, self.target)
    }

    fn close(&self) {
        if self.state.close() {
            debug!(local = %self.local_addr, "trace sender closed");
        }
    }

    fn max_datagram_size(&self) -> usize {
        self.max_datagram_size
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }
}

/// Sink-side socket
///
/// Receives block for at most the read timeout, so a receive loop can
/// notice shutdown without any datagram arriving.
#[derive(Debug)]
pub struct UdpReceiver {
    socket: UdpSocket,
    endpoint: TraceEndpoint,
    local_addr: SocketAddr,
    state: StateCell,
}

impl UdpReceiver {
    /// Bind the endpoint, joining its group when it is multicast
    pub fn bind(
        endpoint: &TraceEndpoint,
        adapter: Option<IpAddr>,
        read_timeout: Duration,
    ) -> Result<Self> {
        let addr = endpoint.addr();
        let bind_addr = match endpoint.kind() {
            EndpointKind::Unicast => addr,
            EndpointKind::Broadcast | EndpointKind::Multicast => {
                SocketAddr::new(unspecified_like(addr.ip()), addr.port())
            }
        };
        let bind_err = |source: io::Error| TraceBusError::Bind {
            endpoint: addr,
            source,
        };

        let interface = match (addr.ip(), adapter) {
            (IpAddr::V4(_), None) | (IpAddr::V6(_), None) => None,
            (IpAddr::V4(_), Some(IpAddr::V4(ip))) => Some(ip),
            (IpAddr::V6(group), Some(ip)) if endpoint.is_multicast() => {
                return Err(ipv6_adapter_error(ip, group))
            }
            (IpAddr::V6(_), Some(IpAddr::V6(_))) => None,
            (_, Some(ip)) => {
                return Err(TraceBusError::InvalidAdapter {
                    adapter: ip.to_string(),
                    reason: format!("address family does not match endpoint {}", addr),
                })
            }
        };

        let socket = new_socket(addr).map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        if endpoint.is_broadcast() {
            socket.set_broadcast(true).map_err(bind_err)?;
        }
        socket.bind(&bind_addr.into()).map_err(bind_err)?;

        if endpoint.is_multicast() {
            match addr.ip() {
                IpAddr::V4(group) => socket
                    .join_multicast_v4(&group, &interface.unwrap_or(Ipv4Addr::UNSPECIFIED))
                    .map_err(bind_err)?,
                // Interface 0 lets the kernel pick by route
                IpAddr::V6(group) => socket.join_multicast_v6(&group, 0).map_err(bind_err)?,
            }
        }

        socket
            .set_read_timeout(Some(read_timeout))
            .map_err(bind_err)?;
        let socket: UdpSocket = socket.into();
        let local_addr = socket.local_addr().map_err(bind_err)?;

        debug!(endpoint = %endpoint, local = %local_addr, "trace receiver bound");

        Ok(Self {
            socket,
            endpoint: *endpoint,
            local_addr,
            state: StateCell::new(TransportState::Bound),
        })
    }

    /// Wait for one datagram
    ///
    /// Returns `Ok(None)` when the read timeout elapses with nothing
    /// received, and `TransportClosed` once [`close`](Self::close) was called.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        if self.state.is_closed() {
            return Err(TraceBusError::TransportClosed);
        }
        self.state.mark_receiving();

        match self.socket.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) if self.state.is_closed() => {
                debug!(error = %e, "receive interrupted by close");
                Err(TraceBusError::TransportClosed)
            }
            Err(e) => Err(TraceBusError::Io(e)),
        }
    }

    /// Stop receiving; the socket is released when the receiver is dropped
    pub fn close(&self) {
        if self.state.close() {
            debug!(local = %self.local_addr, "trace receiver closed");
        }
    }

    pub fn endpoint(&self) -> &TraceEndpoint {
        &self.endpoint
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> TransportState {
        self.state.get()
    }
}

fn new_socket(addr: SocketAddr) -> io::Result<Socket> {
    Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
}

fn unspecified_like(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// IPv6 groups are selected by interface index, which an address cannot name
fn ipv6_adapter_error(adapter: IpAddr, group: Ipv6Addr) -> TraceBusError {
    TraceBusError::InvalidAdapter {
        adapter: adapter.to_string(),
        reason: format!("IPv6 multicast group {} uses the default interface; omit the adapter", group),
    }
}

/// Local address a sender binds: the adapter, or the wildcard of the target's family
fn local_bind_addr(target: SocketAddr, adapter: Option<IpAddr>) -> Result<SocketAddr> {
    match adapter {
        None => Ok(SocketAddr::new(unspecified_like(target.ip()), 0)),
        Some(ip) if ip.is_ipv4() == target.is_ipv4() => Ok(SocketAddr::new(ip, 0)),
        Some(ip) => Err(TraceBusError::InvalidAdapter {
            adapter: ip.to_string(),
            reason: format!("address family does not match target {}", target),
        }),
    }
}
