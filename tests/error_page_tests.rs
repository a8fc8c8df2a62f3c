//! Wire-level checks for the error responder's per-status header order.

use ronin_proxy::error_page::write_error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn capture_error_response(status: u16) -> Vec<u8> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let writer = tokio::spawn(async move {
        let mut client = TcpStream::connect(addr).await.unwrap();
        write_error(&mut client, status).await.unwrap();
        // Half-close so the reader's `read_to_end` sees EOF instead of
        // blocking forever on a connection neither side ever closes.
        client.shutdown().await.unwrap();
    });

    let (mut server_side, _) = listener.accept().await.unwrap();
    let mut out = Vec::new();
    server_side.read_to_end(&mut out).await.unwrap();
    writer.await.unwrap();
    out
}

#[tokio::test]
async fn connection_first_statuses_put_connection_before_content_type() {
    for status in [400u16, 500, 501, 505] {
        let bytes = capture_error_response(status).await;
        let text = String::from_utf8_lossy(&bytes);
        let connection_idx = text.find("Connection:").unwrap();
        let content_type_idx = text.find("Content-Type:").unwrap();
        assert!(
            connection_idx < content_type_idx,
            "status {status}: expected Connection before Content-Type, got: {text}"
        );
    }
}

#[tokio::test]
async fn content_type_first_statuses_put_content_type_before_connection() {
    for status in [403u16, 404] {
        let bytes = capture_error_response(status).await;
        let text = String::from_utf8_lossy(&bytes);
        let connection_idx = text.find("Connection:").unwrap();
        let content_type_idx = text.find("Content-Type:").unwrap();
        assert!(
            content_type_idx < connection_idx,
            "status {status}: expected Content-Type before Connection, got: {text}"
        );
    }
}
