//! The Acceptor / Admission loop (component E), plus the `proxy <port>` CLI
//! and the ambient logging/graceful-shutdown stack.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ronin_proxy::{ProxyCache, MAX_CLIENTS};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

fn parse_port() -> u16 {
    let mut args = std::env::args();
    let _program = args.next();
    let Some(port_arg) = args.next() else {
        println!("Too few arguments");
        std::process::exit(1);
    };

    port_arg.parse().unwrap_or_else(|_| {
        eprintln!("Invalid port: {port_arg}");
        std::process::exit(1);
    })
}

async fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(format!("0.0.0.0:{port}").parse().unwrap())?;
    socket.listen(MAX_CLIENTS as u32)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let port = parse_port();
    info!("RONIN proxy starting on port {port}");
    info!("Admission capacity: {MAX_CLIENTS} concurrent workers");

    let cache = ProxyCache::new();
    let listener = match bind_listener(port).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind/listen on port {port}: {e}");
            std::process::exit(1);
        }
    };

    let semaphore = Arc::new(Semaphore::new(MAX_CLIENTS));
    let active_connections = Arc::new(AtomicUsize::new(0));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .expect("failed to install SIGINT handler");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, draining active connections");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, draining active connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((client, addr)) => {
                        info!(peer = %addr, "accepted connection");
                        active_connections.fetch_add(1, Ordering::Relaxed);
                        let active = active_connections.clone();
                        let cache = cache.clone();
                        let semaphore = semaphore.clone();
                        spawn_handler_tracked(client, cache, semaphore, active);
                    }
                    Err(e) => {
                        // Accept errors are treated as fatal: the listener's
                        // state is no longer trustworthy past this point.
                        error!("accept() failed: {e}");
                        std::process::exit(1);
                    }
                }
            }
        }
    }

    info!(
        "waiting for {} active connection(s) to close",
        active_connections.load(Ordering::Relaxed)
    );
    while active_connections.load(Ordering::Relaxed) > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    info!("all connections closed, shutting down");
}

/// Wraps `spawn_handler` with the active-connection counter used only by the
/// graceful-shutdown drain above; this counter is not the admission
/// semaphore and does not gate concurrency.
fn spawn_handler_tracked(
    client: tokio::net::TcpStream,
    cache: ProxyCache,
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
) {
    let active_done = active.clone();
    tokio::spawn(async move {
        let permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("admission semaphore closed; dropping connection");
                active_done.fetch_sub(1, Ordering::Relaxed);
                return;
            }
        };
        ronin_proxy::handler::handle_connection(client, cache, permit).await;
        active_done.fetch_sub(1, Ordering::Relaxed);
    });
}
