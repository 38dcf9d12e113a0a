//! The local/peer address pair carried through the handshake (spec section
//! 4.2).
//!
//! ktalk.c resolves its own hostname a second time (via `gethostname` +
//! `gethostbyname`) to build the local half of the krb5 address pair used in
//! the AP-REQ. On a multi-homed host that second resolution can return a
//! different address than the one the TCP connection actually travelled
//! over, which silently breaks mutual authentication against a KDC that
//! checks addresses strictly. Recorded as Open Question 1 in spec section 9:
//! resolved here by always deriving both endpoints from the live, already
//! connected socket instead.

use std::net::{Ipv4Addr, SocketAddr};

use crate::error::KtalkError;

/// Narrow a socket address to the IPv4 address krb5's address-binding field
/// actually carries (`ADDRTYPE_INET`, a 4-byte value) — ktalk.c never speaks
/// IPv6 at all. Any other family is a configuration error, not something to
/// silently drop or map.
pub fn to_inet_addr(addr: SocketAddr) -> Result<Ipv4Addr, KtalkError> {
    match addr {
        SocketAddr::V4(v4) => Ok(*v4.ip()),
        SocketAddr::V6(_) => Err(KtalkError::Transport(format!(
            "{addr} is not an IPv4 address; ktalk only supports ADDRTYPE_INET"
        ))),
    }
}

/// The two ends of the TCP connection the authentication exchange runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub local: SocketAddr,
    pub peer: SocketAddr,
}

impl Endpoint {
    /// Read both halves of a connected socket's address pair.
    ///
    /// Takes anything exposing `local_addr`/`peer_addr` the way
    /// `tokio::net::TcpStream` does, so tests can supply a lightweight stub
    /// without opening a real socket.
    pub fn from_socket<S: SocketAddrPair>(socket: &S) -> Result<Self, KtalkError> {
        Ok(Endpoint {
            local: socket
                .local_addr()
                .map_err(|e| KtalkError::Transport(format!("local_addr: {e}")))?,
            peer: socket
                .peer_addr()
                .map_err(|e| KtalkError::Transport(format!("peer_addr: {e}")))?,
        })
    }
}

/// Narrow trait over the two address accessors `Endpoint::from_socket` needs,
/// implemented for `tokio::net::TcpStream` and by a test stub.
pub trait SocketAddrPair {
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
    fn peer_addr(&self) -> std::io::Result<SocketAddr>;
}

impl SocketAddrPair for tokio::net::TcpStream {
    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        tokio::net::TcpStream::local_addr(self)
    }
    fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        tokio::net::TcpStream::peer_addr(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        local: SocketAddr,
        peer: SocketAddr,
    }

    impl SocketAddrPair for Stub {
        fn local_addr(&self) -> std::io::Result<SocketAddr> {
            Ok(self.local)
        }
        fn peer_addr(&self) -> std::io::Result<SocketAddr> {
            Ok(self.peer)
        }
    }

    #[test]
    fn reads_both_halves_of_the_connected_pair() {
        let stub = Stub {
            local: "10.0.0.1:4115".parse().unwrap(),
            peer: "10.0.0.2:51342".parse().unwrap(),
        };
        let endpoint = Endpoint::from_socket(&stub).unwrap();
        assert_eq!(endpoint.local, stub.local);
        assert_eq!(endpoint.peer, stub.peer);
    }

    #[test]
    fn to_inet_addr_accepts_v4() {
        let addr: SocketAddr = "10.0.0.1:4115".parse().unwrap();
        assert_eq!(to_inet_addr(addr).unwrap(), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn to_inet_addr_rejects_v6() {
        let addr: SocketAddr = "[::1]:4115".parse().unwrap();
        assert!(to_inet_addr(addr).is_err());
    }
}
