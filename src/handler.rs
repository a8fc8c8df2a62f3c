//! The Request Handler (component D): the per-connection state machine.
//!
//! `Reading -> { CacheServe | Parse -> { Relay | ErrorOut } } -> Closing`.
//! Every exit path releases the admission permit and closes the client
//! socket exactly once — the RAII permit guard and `handle_connection`'s
//! single return point at the end of every branch are what guarantee that.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{InsertOutcome, ProxyCache};
use crate::error_page;
use crate::request::ParsedRequest;
use crate::upstream;

/// Buffer size for reading the client's request and for writing cached
/// responses back to the client.
pub const REQ_BUFFER: usize = 4096;
/// Hard ceiling on a single request's size; exceeding it closes the
/// connection without sending a response, the same as any other
/// before-end-of-headers disconnect.
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

const CLIENT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Handles one accepted connection end to end. `permit` is held for the
/// duration of the call and dropped (releasing the admission slot) when this
/// function returns, on every path.
pub async fn handle_connection(
    mut client: TcpStream,
    cache: ProxyCache,
    _permit: tokio::sync::OwnedSemaphorePermit,
) {
    let Some(raw_request) = read_request(&mut client).await else {
        debug!("client disconnected or request too large before headers completed");
        return;
    };

    if let Some(cached_body) = cache.find(&raw_request).await {
        info!(bytes = cached_body.len(), "cache hit");
        if let Err(e) = write_exact(&mut client, &cached_body).await {
            debug!("failed writing cached response to client: {e}");
        }
        let _ = client.shutdown().await;
        return;
    }

    info!("cache miss");

    let mut parsed = ParsedRequest::create();
    if parsed.parse(&raw_request).is_err() {
        // Parse failure: log and close, no error response (matches source).
        debug!("request failed to parse; closing without a response");
        let _ = client.shutdown().await;
        return;
    }

    if parsed.method != "GET" {
        debug!(method = %parsed.method, "unsupported method; closing without a response");
        let _ = client.shutdown().await;
        return;
    }

    let version_ok = matches!(parsed.version.as_str(), "HTTP/1.0" | "HTTP/1.1");
    let target_ok = parsed.host.is_some() && !parsed.path.is_empty();

    if !version_ok || !target_ok {
        warn!("unsupported version or missing host/path; responding 500");
        let _ = error_page::write_error(&mut client, 500).await;
        let _ = client.shutdown().await;
        return;
    }

    match upstream::relay(&mut client, &mut parsed).await {
        Ok(accumulated) => {
            match cache.insert(raw_request, accumulated).await {
                InsertOutcome::Stored => debug!("response cached"),
                InsertOutcome::TooLarge => debug!("response too large to cache; skipped"),
            }
        }
        Err(e) => {
            warn!("upstream relay failed: {e}; responding 500");
            let _ = error_page::write_error(&mut client, 500).await;
        }
    }

    let _ = client.shutdown().await;
}

/// Reads from `client` until `\r\n\r\n` appears, the peer closes, or the
/// accumulated bytes exceed `MAX_REQUEST_SIZE`. Returns the raw bytes up to
/// (and including) the terminator on success.
async fn read_request(client: &mut TcpStream) -> Option<Bytes> {
    let mut buffer = BytesMut::with_capacity(REQ_BUFFER);
    let mut chunk = [0u8; REQ_BUFFER];

    loop {
        if let Some(end) = find_header_terminator(&buffer) {
            buffer.truncate(end);
            return Some(buffer.freeze());
        }

        if buffer.len() >= MAX_REQUEST_SIZE {
            return None;
        }

        let read = match timeout(CLIENT_IO_TIMEOUT, client.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return None,
            Ok(Ok(n)) => n,
        };
        buffer.extend_from_slice(&chunk[..read]);
    }
}

fn find_header_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|idx| idx + 4)
}

/// Writes exactly `body.len()` bytes, never a `REQ_BUFFER`-padded chunk.
async fn write_exact(client: &mut TcpStream, body: &Bytes) -> std::io::Result<()> {
    client.write_all(body).await
}

/// Acquires the admission semaphore, then spawns `handle_connection`.
/// Separated from the acceptor loop so tests can drive it directly.
pub fn spawn_handler(client: TcpStream, cache: ProxyCache, semaphore: Arc<Semaphore>) {
    tokio::spawn(async move {
        let permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore closed during shutdown
        };
        handle_connection(client, cache, permit).await;
    });
}
