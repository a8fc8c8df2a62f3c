//! The Upstream Client (component C).
//!
//! Resolves the origin host, opens a single-use TCP connection (no pooling —
//! the proxy always sets `Connection: close` and never reuses a socket),
//! writes the rewritten request, and relays the response back to the client
//! while accumulating it for the cache.

use bytes::{Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

use crate::request::ParsedRequest;

/// Read/write unit for both the upstream read loop and the client forward.
pub const RELAY_CHUNK: usize = 4096;
/// Upper bound on the assembled outgoing request (request line + headers).
const OUT_BUFFER_CAPACITY: usize = 4096;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum UpstreamError {
    Resolve,
    Connect(std::io::Error),
    Send(std::io::Error),
    Timeout,
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Resolve => write!(f, "could not resolve upstream host"),
            UpstreamError::Connect(e) => write!(f, "could not connect to upstream: {e}"),
            UpstreamError::Send(e) => write!(f, "could not send request to upstream: {e}"),
            UpstreamError::Timeout => write!(f, "upstream operation timed out"),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Builds the outgoing `GET <path> <version>\r\n<headers>\r\n` request,
/// normalizing `Connection: close` and filling in `Host` if absent.
fn build_outgoing_request(request: &mut ParsedRequest) -> BytesMut {
    request.header_set("Connection", "close").ok();
    if request.header_get("Host").is_none() {
        if let Some(host) = request.host.clone() {
            request.header_set("Host", &host).ok();
        }
    }

    let mut buf = BytesMut::with_capacity(OUT_BUFFER_CAPACITY);
    buf.extend_from_slice(b"GET ");
    buf.extend_from_slice(request.path.as_bytes());
    buf.extend_from_slice(b" ");
    buf.extend_from_slice(request.version.as_bytes());
    buf.extend_from_slice(b"\r\n");

    // Best effort: whatever headers fit within the capacity are sent; an
    // overflow is not a fatal error (matches the original's unparse behavior).
    let _ = request.unparse_headers(&mut buf, OUT_BUFFER_CAPACITY);
    buf.extend_from_slice(b"\r\n");
    buf
}

async fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddr, UpstreamError> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|_| UpstreamError::Resolve)?;
    addrs
        .find(|addr| addr.is_ipv4())
        .ok_or(UpstreamError::Resolve)
}

/// Relays one request/response cycle: connects to `request.host:request.port`
/// (defaulting to port 80), writes the rewritten request, and streams the
/// response back through `client` in `RELAY_CHUNK`-sized pieces while
/// accumulating the full byte stream for the cache.
pub async fn relay(
    client: &mut TcpStream,
    request: &mut ParsedRequest,
) -> Result<Bytes, UpstreamError> {
    let host = request.host.clone().ok_or(UpstreamError::Resolve)?;
    let port: u16 = request
        .port
        .as_deref()
        .and_then(|p| p.parse().ok())
        .unwrap_or(80);

    let addr = timeout(CONNECT_TIMEOUT, resolve_ipv4(&host, port))
        .await
        .map_err(|_| UpstreamError::Timeout)??;

    let mut upstream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| UpstreamError::Timeout)?
        .map_err(UpstreamError::Connect)?;

    let outgoing = build_outgoing_request(request);
    upstream
        .write_all(&outgoing)
        .await
        .map_err(UpstreamError::Send)?;

    let mut accumulator = BytesMut::new();
    let mut chunk = [0u8; RELAY_CHUNK];

    loop {
        let read = match timeout(IO_TIMEOUT, upstream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!("upstream read error after {} bytes: {e}", accumulator.len());
                break;
            }
            Err(_) => {
                debug!("upstream read timed out after {} bytes", accumulator.len());
                break;
            }
        };

        if client.write_all(&chunk[..read]).await.is_err() {
            debug!("client write failed mid-relay; keeping {} bytes captured", accumulator.len());
            break;
        }
        accumulator.extend_from_slice(&chunk[..read]);
    }

    let _ = upstream.shutdown().await;
    Ok(accumulator.freeze())
}
