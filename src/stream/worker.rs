//! Chunked-HTTP stream worker
//!
//! One worker per connected client. The worker owns the transport outright:
//! it writes the response preamble itself, then relays encoded frames as
//! HTTP/1.1 chunks until the client disconnects or the capture session
//! closes, and finishes with the zero-length terminator chunk.

use crate::capture::sink::{Acquired, FrameCursor, EncodedFrame};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Raw HTTP response head sent before the first chunk. `Connection: close`
/// because the stream only ends by closing the socket.
pub const STREAM_PREAMBLE: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: video/h264\r\n\
Cache-Control: no-cache, no-store, must-revalidate\r\n\
Pragma: no-cache\r\n\
Expires: 0\r\n\
Access-Control-Allow-Origin: *\r\n\
Accept-Ranges: none\r\n\
Transfer-Encoding: chunked\r\n\
Connection: close\r\n\
\r\n";

/// Final zero-length chunk ending the chunked body.
pub const CHUNK_TERMINATOR: &[u8] = b"0\r\n\r\n";

/// Bounded wait when no unseen frame is available.
const EMPTY_PACE: Duration = Duration::from_millis(5);

/// Interval between per-client delivery-rate log lines.
const FPS_LOG_WINDOW: Duration = Duration::from_secs(3);

/// How the worker paces itself against the frame sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Relay whatever is available, skipping ahead when behind. Used for
    /// live fan-out where latency matters more than completeness.
    Shared,
    /// Block for every frame in order. Used when the reader must see the
    /// full sequence.
    Exclusive,
}

/// Relays frames from a [`FrameCursor`] to one client transport.
pub struct StreamWorker<T> {
    id: Uuid,
    transport: T,
    cursor: FrameCursor,
    mode: StreamMode,
    frame_count: u64,
    dropped_count: u32,
}

impl<T: AsyncWrite + Unpin> StreamWorker<T> {
    pub fn new(transport: T, cursor: FrameCursor, mode: StreamMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            cursor,
            mode,
            frame_count: 0,
            dropped_count: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drive the stream to completion. Consumes the worker; the transport is
    /// shut down on the way out regardless of how the stream ended.
    pub async fn run(mut self) {
        info!("stream {} starting ({:?})", self.id, self.mode);

        if let Err(e) = self.transport.write_all(STREAM_PREAMBLE).await {
            warn!("stream {}: client gone before preamble: {}", self.id, e);
            return;
        }

        let mut window_start = Instant::now();
        let mut window_frames = 0u64;

        loop {
            let acquired = match self.mode {
                StreamMode::Shared => self.cursor.wait_frame(EMPTY_PACE).await,
                StreamMode::Exclusive => match self.cursor.next().await {
                    Some(frame) => Acquired::Frame(frame),
                    None => Acquired::Closed,
                },
            };

            match acquired {
                Acquired::Frame(frame) => {
                    if self.dropped_count > 0 {
                        debug!(
                            "stream {}: frame after {} empty polls",
                            self.id, self.dropped_count
                        );
                        self.dropped_count = 0;
                    }
                    if let Err(e) = self.write_chunk(&frame).await {
                        debug!("stream {}: client disconnected: {}", self.id, e);
                        return;
                    }
                    self.frame_count += 1;
                    window_frames += 1;
                }
                Acquired::Empty => {
                    self.dropped_count += 1;
                    continue;
                }
                Acquired::Closed => {
                    debug!("stream {}: capture closed", self.id);
                    break;
                }
            }

            let elapsed = window_start.elapsed();
            if elapsed >= FPS_LOG_WINDOW {
                info!(
                    "stream {}: {:.1} fps, {} frames total",
                    self.id,
                    window_frames as f64 / elapsed.as_secs_f64(),
                    self.frame_count
                );
                window_start = Instant::now();
                window_frames = 0;
            }
        }

        // Clean end of stream: terminator chunk, then shut the socket down.
        if let Err(e) = self.transport.write_all(CHUNK_TERMINATOR).await {
            debug!("stream {}: terminator write failed: {}", self.id, e);
        }
        let _ = self.transport.shutdown().await;
        info!(
            "stream {} finished after {} frames",
            self.id, self.frame_count
        );
    }

    /// Write one frame as an HTTP/1.1 chunk: hex length, CRLF, payload, CRLF.
    async fn write_chunk(&mut self, frame: &Arc<EncodedFrame>) -> std::io::Result<()> {
        let header = format!("{:x}\r\n", frame.data.len());
        self.transport.write_all(header.as_bytes()).await?;
        self.transport.write_all(&frame.data).await?;
        self.transport.write_all(b"\r\n").await?;
        self.transport.flush().await
    }
}
