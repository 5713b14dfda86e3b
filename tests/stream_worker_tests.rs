//! Stream worker integration tests
//!
//! Drive workers over in-memory duplex transports and verify the wire
//! format: response preamble, chunk framing, the zero-length terminator,
//! and frame ordering across concurrent clients.

use bytes::Bytes;
use mediad::capture::FrameSink;
use mediad::stream::{StreamMode, StreamWorker};
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Read the transport to EOF.
async fn read_to_end(mut transport: tokio::io::DuplexStream) -> Vec<u8> {
    let mut out = Vec::new();
    transport.read_to_end(&mut out).await.unwrap();
    out
}

/// Split a raw chunked response into (head, decoded chunk payloads,
/// saw_terminator).
fn parse_chunked(raw: &[u8]) -> (String, Vec<Vec<u8>>, bool) {
    let head_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head")
        + 4;
    let head = String::from_utf8(raw[..head_end].to_vec()).unwrap();

    let mut chunks = Vec::new();
    let mut pos = head_end;
    let mut terminated = false;
    while pos < raw.len() {
        let line_end = raw[pos..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .expect("chunk size line")
            + pos;
        let size = usize::from_str_radix(
            std::str::from_utf8(&raw[pos..line_end]).unwrap().trim(),
            16,
        )
        .unwrap();
        pos = line_end + 2;
        if size == 0 {
            terminated = true;
            break;
        }
        chunks.push(raw[pos..pos + size].to_vec());
        pos += size + 2; // payload CRLF
    }

    (head, chunks, terminated)
}

#[tokio::test]
async fn preamble_then_chunks_then_terminator() {
    let sink = FrameSink::new(8);
    let (client, server) = tokio::io::duplex(65536);

    let worker = StreamWorker::new(server, sink.cursor(), StreamMode::Shared);
    let worker = tokio::spawn(worker.run());

    sink.push(Bytes::from_static(b"alpha"));
    sink.push(Bytes::from_static(b"beta"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    sink.close();

    worker.await.unwrap();
    let raw = read_to_end(client).await;
    let (head, chunks, terminated) = parse_chunked(&raw);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Type: video/h264\r\n"));
    assert!(head.contains("Transfer-Encoding: chunked\r\n"));
    assert!(head.contains("Cache-Control: no-cache, no-store, must-revalidate\r\n"));
    assert!(head.contains("Connection: close\r\n"));

    assert_eq!(chunks, vec![b"alpha".to_vec(), b"beta".to_vec()]);
    assert!(terminated);
}

#[tokio::test]
async fn exclusive_mode_delivers_every_frame_in_order() {
    let sink = FrameSink::new(16);
    let (client, server) = tokio::io::duplex(65536);

    let worker = StreamWorker::new(server, sink.cursor(), StreamMode::Exclusive);
    let worker = tokio::spawn(worker.run());

    for i in 0..10 {
        sink.push(Bytes::from(format!("frame-{}", i)));
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    sink.close();

    worker.await.unwrap();
    let raw = read_to_end(client).await;
    let (_, chunks, terminated) = parse_chunked(&raw);

    assert_eq!(chunks.len(), 10);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk, format!("frame-{}", i).as_bytes());
    }
    assert!(terminated);
}

#[tokio::test]
async fn concurrent_workers_each_get_ordered_frames() {
    let sink = FrameSink::new(16);

    let (client_a, server_a) = tokio::io::duplex(65536);
    let (client_b, server_b) = tokio::io::duplex(65536);

    let worker_a = tokio::spawn(
        StreamWorker::new(server_a, sink.cursor(), StreamMode::Shared).run(),
    );
    let worker_b = tokio::spawn(
        StreamWorker::new(server_b, sink.cursor(), StreamMode::Shared).run(),
    );

    for i in 0..20u32 {
        sink.push(Bytes::from(i.to_be_bytes().to_vec()));
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    sink.close();

    worker_a.await.unwrap();
    worker_b.await.unwrap();

    for client in [client_a, client_b] {
        let raw = read_to_end(client).await;
        let (_, chunks, terminated) = parse_chunked(&raw);
        assert!(terminated);
        assert!(!chunks.is_empty());

        let values: Vec<u32> = chunks
            .iter()
            .map(|c| u32::from_be_bytes(c.as_slice().try_into().unwrap()))
            .collect();
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1], "out of order: {:?}", values);
        }
    }
}

#[tokio::test]
async fn worker_exits_when_client_disconnects() {
    let sink = FrameSink::new(8);
    let (client, server) = tokio::io::duplex(256);

    let worker = StreamWorker::new(server, sink.cursor(), StreamMode::Shared);
    let worker = tokio::spawn(worker.run());

    // Dropping the read side makes the next chunk write fail.
    drop(client);
    for _ in 0..50 {
        sink.push(Bytes::from(vec![0u8; 128]));
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker must exit after disconnect")
        .unwrap();
}

#[tokio::test]
async fn closing_an_empty_sink_still_terminates_cleanly() {
    let sink = FrameSink::new(8);
    let (client, server) = tokio::io::duplex(65536);

    let worker = StreamWorker::new(server, sink.cursor(), StreamMode::Shared);
    let worker = tokio::spawn(worker.run());

    tokio::time::sleep(Duration::from_millis(20)).await;
    sink.close();
    worker.await.unwrap();

    let raw = read_to_end(client).await;
    let (head, chunks, terminated) = parse_chunked(&raw);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(chunks.is_empty());
    assert!(terminated);
}
