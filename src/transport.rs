//! TCP transport setup for both chat roles (spec section 4.3).
//!
//! The listener side needs a fixed listen backlog — `listen(sockfd, 5)` in
//! ktalk.c — which `tokio::net::TcpListener::bind` has no way to request, so
//! the socket is built with `socket2` and converted afterwards. The
//! connector side is a plain `TcpStream::connect`.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Socket, Type};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::KtalkError;

/// Matches ktalk.c's `listen(sockfd, 5)`.
const LISTEN_BACKLOG: i32 = 5;

/// First port ktalk.c tries before hunting upward on `EADDRINUSE`.
pub const FIRST_PORT: u16 = 2050;

/// Bind a listening socket on `addr` with the fixed backlog, surfacing the
/// raw `io::Error` so [`listen_with_port_probe`] can distinguish
/// `AddrInUse` (try the next port) from every other bind failure (fatal
/// immediately, matching ktalk.c's `else { perror(...); exit(2); }`).
fn bind_raw(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

/// Bind starting at `start_port` on `0.0.0.0`, incrementing the port on
/// `EADDRINUSE` until one succeeds. Returns the listener and the port it
/// ended up on, which the caller reports to stdout and to the invitation
/// emitter (spec section 4.3/4.4).
pub fn listen_with_port_probe(start_port: u16) -> Result<(TcpListener, u16), KtalkError> {
    let mut port = start_port;
    loop {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        match bind_raw(addr) {
            Ok(listener) => {
                info!(%addr, "listening");
                return Ok((listener, port));
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!(port, "port in use, probing next");
                port = port.checked_add(1).ok_or_else(|| {
                    KtalkError::Transport("exhausted the TCP port range probing for a free port".into())
                })?;
            }
            Err(e) => {
                return Err(KtalkError::Transport(format!("binding socket on port {port}: {e}")))
            }
        }
    }
}

/// Resolve `host`'s first address only, per spec section 4.3's connector
/// step — matches ktalk.c's `gethostbyname` which likewise takes only
/// `h_addr`, the first entry in the resolver's address list.
pub async fn resolve_first(host: &str, port: u16) -> Result<SocketAddr, KtalkError> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|e| KtalkError::Transport(format!("resolving {host}: {e}")))?;
    let addr = addrs
        .next()
        .ok_or_else(|| KtalkError::Transport(format!("host {host} resolved to no addresses")))?;
    if addrs.next().is_some() {
        warn!(host, "host resolved to multiple addresses; using the first");
    }
    Ok(addr)
}

/// Accept exactly one connection — ktalk is a two-party chat, so the
/// listener never serves more than one peer per invocation.
pub async fn accept(listener: &TcpListener) -> Result<TcpStream, KtalkError> {
    let (stream, peer) = listener
        .accept()
        .await
        .map_err(|e| KtalkError::Transport(format!("accept: {e}")))?;
    debug!(%peer, "accepted connection");
    Ok(stream)
}

/// Connect to a listening peer at `addr`.
pub async fn connect(addr: SocketAddr) -> Result<TcpStream, KtalkError> {
    debug!(%addr, "connecting");
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| KtalkError::Transport(format!("connect {addr}: {e}")))?;
    info!(%addr, "connected");
    Ok(stream)
}
