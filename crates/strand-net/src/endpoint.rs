use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};

use crate::error::Error;

/// Family-tagged endpoint: an IPv4 or IPv6 address plus port, or the
/// sentinel `Invalid`. Equality is byte-exact over the tagged storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    V4(SocketAddrV4),
    V6(SocketAddrV6),
    Invalid,
}

impl Endpoint {
    /// An endpoint carrying no valid address.
    pub const INVALID: Endpoint = Endpoint::Invalid;

    /// Build from an already-resolved `SocketAddr`.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Endpoint::V4(v4),
            SocketAddr::V6(v6) => Endpoint::V6(v6),
        }
    }

    /// Parse `"host:port"` or a bare IP literal plus an explicit port.
    pub fn from_str_port(host: &str, port: u16) -> Result<Self, Error> {
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => Ok(Endpoint::V4(SocketAddrV4::new(v4, port))),
            Ok(IpAddr::V6(v6)) => Ok(Endpoint::V6(SocketAddrV6::new(v6, port, 0, 0))),
            Err(_) => Self::resolve(host, port),
        }
    }

    /// Resolve a DNS name plus port to an endpoint, taking the first result.
    pub fn resolve(host: &str, port: u16) -> Result<Self, Error> {
        let mut addrs = (host, port)
            .to_socket_addrs()
            .map_err(Error::from_connect_io)?;
        addrs
            .next()
            .map(Self::from_socket_addr)
            .ok_or(Error::InvalidEndpoint)
    }

    /// The port, meaningful only for stream/datagram endpoints.
    pub fn port(&self) -> Option<u16> {
        match self {
            Endpoint::V4(a) => Some(a.port()),
            Endpoint::V6(a) => Some(a.port()),
            Endpoint::Invalid => None,
        }
    }

    /// View as a standard library `SocketAddr`, if valid.
    pub fn to_socket_addr(self) -> Option<SocketAddr> {
        match self {
            Endpoint::V4(a) => Some(SocketAddr::V4(a)),
            Endpoint::V6(a) => Some(SocketAddr::V6(a)),
            Endpoint::Invalid => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Endpoint::Invalid)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::from_socket_addr(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v4_literal() {
        let ep = Endpoint::from_str_port("127.0.0.1", 8080).unwrap();
        assert_eq!(ep.port(), Some(8080));
        assert!(!ep.is_invalid());
    }

    #[test]
    fn parses_v6_literal() {
        let ep = Endpoint::from_str_port("::1", 8080).unwrap();
        assert!(matches!(ep, Endpoint::V6(_)));
    }

    #[test]
    fn invalid_sentinel_has_no_port() {
        assert_eq!(Endpoint::INVALID.port(), None);
    }
}
