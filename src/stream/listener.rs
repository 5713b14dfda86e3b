//! Dedicated video stream listener
//!
//! Chunked video goes out over its own TCP port rather than through the
//! control API: each stream needs exclusive ownership of its socket for the
//! lifetime of the connection, so the listener accepts, reads off the request
//! head, and hands the raw socket to a [`StreamWorker`].

use crate::capture::CaptureSession;
use crate::stream::worker::{StreamMode, StreamWorker};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Bound on reading the client's request head.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Cap on request head size before the connection is dropped.
const REQUEST_HEAD_MAX: usize = 8192;

const UNAVAILABLE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
Content-Type: text/plain\r\n\
Connection: close\r\n\
Content-Length: 22\r\n\
\r\n\
Capture is not running";

/// Accept loop for the stream port. Runs until the listener task is dropped.
pub async fn run(listener: TcpListener, capture: Arc<CaptureSession>) {
    if let Ok(addr) = listener.local_addr() {
        info!("video stream listener on {}", addr);
    }

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("stream accept failed: {}", e);
                continue;
            }
        };
        debug!("stream client connected from {}", peer);

        let capture = Arc::clone(&capture);
        tokio::spawn(async move {
            serve_client(socket, capture).await;
        });
    }
}

/// Handle one client: drain the request head, then either start a stream
/// worker or answer 503 when capture is down.
async fn serve_client(mut socket: TcpStream, capture: Arc<CaptureSession>) {
    if let Err(e) = drain_request_head(&mut socket).await {
        debug!("stream client rejected: {}", e);
        return;
    }

    let cursor = match capture.cursor().await {
        Ok(cursor) => cursor,
        Err(_) => {
            let _ = socket.write_all(UNAVAILABLE).await;
            let _ = socket.shutdown().await;
            return;
        }
    };

    StreamWorker::new(socket, cursor, StreamMode::Shared).run().await;
}

/// Read and discard the HTTP request head (through the blank line). The
/// stream endpoint ignores method, path, and headers; it exists to hand the
/// socket over.
async fn drain_request_head(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut head = Vec::with_capacity(512);
    let mut buf = [0u8; 512];

    let drained = timeout(REQUEST_TIMEOUT, async {
        loop {
            let n = socket.read(&mut buf).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "client closed before request head",
                ));
            }
            head.extend_from_slice(&buf[..n]);
            if head.windows(4).any(|w| w == b"\r\n\r\n") {
                return Ok(());
            }
            if head.len() > REQUEST_HEAD_MAX {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "request head too large",
                ));
            }
        }
    })
    .await;

    match drained {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "request head timed out",
        )),
    }
}
