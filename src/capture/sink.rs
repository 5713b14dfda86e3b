//! Encoded-frame sink and per-reader cursors
//!
//! The capture pump pushes encoded frames into a bounded sink; any number of
//! stream workers read through independent cursors. Each frame carries a
//! monotonically increasing sequence number and a cursor only ever yields
//! frames newer than the last one it returned, so every reader observes
//! capture order even when it skips frames.
//!
//! When the sink is full the oldest frame is evicted: slow readers lose old
//! frames rather than stalling the pump. Frame payloads are reference-counted
//! `Bytes`, so a frame's memory is reclaimed when the sink and every reader
//! holding it have let go.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::debug;

/// One encoded video frame.
#[derive(Debug)]
pub struct EncodedFrame {
    /// Capture-order sequence number, starting at 1.
    pub seq: u64,
    pub data: Bytes,
}

/// Result of a non-blocking acquire.
pub enum Acquired {
    /// The next unseen frame.
    Frame(Arc<EncodedFrame>),
    /// No unseen frame is available right now.
    Empty,
    /// The sink was closed; no more frames will arrive.
    Closed,
}

struct SinkInner {
    frames: VecDeque<Arc<EncodedFrame>>,
    next_seq: u64,
    closed: bool,
}

/// Bounded fan-out buffer between the capture pump and stream workers.
pub struct FrameSink {
    inner: Mutex<SinkInner>,
    notify: Notify,
    capacity: usize,
}

impl FrameSink {
    pub fn new(capacity: usize) -> Arc<Self> {
        assert!(capacity > 0);
        Arc::new(Self {
            inner: Mutex::new(SinkInner {
                frames: VecDeque::with_capacity(capacity),
                next_seq: 1,
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        })
    }

    /// Append a frame, evicting the oldest when full. Returns the frame's
    /// sequence number, or `None` when the sink is already closed.
    pub fn push(&self, data: Bytes) -> Option<u64> {
        let seq = {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return None;
            }
            if inner.frames.len() == self.capacity {
                inner.frames.pop_front();
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.frames.push_back(Arc::new(EncodedFrame { seq, data }));
            seq
        };
        self.notify.notify_waiters();
        Some(seq)
    }

    /// Close the sink: drop buffered frames and fail all pending and future
    /// acquires. Idempotent.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.frames.clear();
        }
        debug!("frame sink closed");
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// New independent reader positioned after the newest buffered frame.
    pub fn cursor(self: &Arc<Self>) -> FrameCursor {
        let last_seq = {
            let inner = self.inner.lock().unwrap();
            inner.frames.back().map(|f| f.seq).unwrap_or(0)
        };
        FrameCursor {
            sink: Arc::clone(self),
            last_seq,
        }
    }
}

/// Independent read position into a [`FrameSink`].
pub struct FrameCursor {
    sink: Arc<FrameSink>,
    last_seq: u64,
}

impl FrameCursor {
    /// Non-blocking acquire of the oldest frame newer than the last one seen.
    pub fn try_next(&mut self) -> Acquired {
        let inner = self.sink.inner.lock().unwrap();
        if inner.closed {
            return Acquired::Closed;
        }
        for frame in &inner.frames {
            if frame.seq > self.last_seq {
                self.last_seq = frame.seq;
                return Acquired::Frame(Arc::clone(frame));
            }
        }
        Acquired::Empty
    }

    /// Await the next unseen frame. Returns `None` once the sink closes.
    pub async fn next(&mut self) -> Option<Arc<EncodedFrame>> {
        loop {
            // Arm the notification before checking, so a push between the
            // check and the await cannot be missed.
            let sink = Arc::clone(&self.sink);
            let notified = sink.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_next() {
                Acquired::Frame(frame) => return Some(frame),
                Acquired::Closed => return None,
                Acquired::Empty => notified.await,
            }
        }
    }

    /// Like [`try_next`](Self::try_next), but on `Empty` waits up to `pace`
    /// for a push before returning. Bounds the caller's retry loop without
    /// committing it to block until a frame arrives.
    pub async fn wait_frame(&mut self, pace: Duration) -> Acquired {
        let sink = Arc::clone(&self.sink);
        let notified = sink.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        match self.try_next() {
            Acquired::Empty => {
                let _ = timeout(pace, notified).await;
                self.try_next()
            }
            acquired => acquired,
        }
    }
}
