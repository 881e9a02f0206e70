//! Trace endpoints

use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use serde::Serialize;

use crate::error::{Result, TraceBusError};

/// How an endpoint address is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// One host
    Unicast,
    /// IPv4 limited or directed broadcast
    Broadcast,
    /// IPv4 or IPv6 multicast group
    Multicast,
}

/// Address and port of the trace bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceEndpoint {
    addr: SocketAddr,
    kind: EndpointKind,
}

impl TraceEndpoint {
    /// Parse `address:port`, resolving host names if needed
    ///
    /// Addresses ending in `.255` are treated as directed broadcasts.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Ok(addr) = text.parse::<SocketAddr>() {
            return Ok(Self::from_addr(addr));
        }

        let invalid = |reason: String| TraceBusError::InvalidEndpoint {
            endpoint: text.to_string(),
            reason,
        };

        if !text.contains(':') {
            return Err(invalid("expected 'address:port'".to_string()));
        }

        let mut resolved = text
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?;
        resolved
            .next()
            .map(Self::from_addr)
            .ok_or_else(|| invalid("host name did not resolve".to_string()))
    }

    /// Classify an already parsed address
    pub fn from_addr(addr: SocketAddr) -> Self {
        let kind = match addr.ip() {
            ip if ip.is_multicast() => EndpointKind::Multicast,
            IpAddr::V4(v4) if v4.is_broadcast() || v4.octets()[3] == 255 => {
                EndpointKind::Broadcast
            }
            _ => EndpointKind::Unicast,
        };
        Self { addr, kind }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn is_multicast(&self) -> bool {
        self.kind == EndpointKind::Multicast
    }

    pub fn is_broadcast(&self) -> bool {
        self.kind == EndpointKind::Broadcast
    }
}

impl fmt::Display for TraceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            TraceEndpoint::parse("239.255.77.77:7777").unwrap().kind(),
            EndpointKind::Multicast
        );
        assert_eq!(
            TraceEndpoint::parse("255.255.255.255:7777").unwrap().kind(),
            EndpointKind::Broadcast
        );
        assert_eq!(
            TraceEndpoint::parse("192.168.1.255:7777").unwrap().kind(),
            EndpointKind::Broadcast
        );
        assert_eq!(
            TraceEndpoint::parse("127.0.0.1:7777").unwrap().kind(),
            EndpointKind::Unicast
        );
        assert_eq!(
            TraceEndpoint::parse("[ff02::1]:7777").unwrap().kind(),
            EndpointKind::Multicast
        );
        assert_eq!(
            TraceEndpoint::parse("[::1]:7777").unwrap().kind(),
            EndpointKind::Unicast
        );
    }

    #[test]
    fn test_resolves_host_names() {
        let endpoint = TraceEndpoint::parse("localhost:7777").unwrap();
        assert!(endpoint.addr().ip().is_loopback());
        assert_eq!(endpoint.addr().port(), 7777);
    }

    #[test]
    fn test_rejects_garbage() {
        for text in ["", "127.0.0.1", "127.0.0.1:notaport"] {
            assert!(
                matches!(
                    TraceEndpoint::parse(text),
                    Err(TraceBusError::InvalidEndpoint { .. })
                ),
                "'{}' should be rejected",
                text
            );
        }
    }

    #[test]
    fn test_display() {
        let endpoint = TraceEndpoint::parse(" 127.0.0.1:9000 ").unwrap();
        assert_eq!(endpoint.to_string(), "127.0.0.1:9000");
    }
}
