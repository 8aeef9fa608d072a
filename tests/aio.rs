mod common;

use std::io::{self, Cursor};
use std::time::Duration;

use async_trait::async_trait;
use stagevisor::{
    AsyncConfig, AsyncReader, AsyncWriter, BufferPool, StreamError, StreamRead, StreamWrite,
};

use common::{Flaky, SharedSink, pattern};

/// Serves `data` once, then fails.
struct Broken {
    data: Option<Vec<u8>>,
}

#[async_trait]
impl StreamRead for Broken {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        match self.data.take() {
            Some(data) => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
            None => Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer left").into()),
        }
    }
}

fn queue(buf_size: usize, queue_depth: usize, deadline: Duration) -> AsyncConfig {
    AsyncConfig {
        buf_size,
        queue_depth,
        deadline,
    }
}

#[tokio::test]
async fn write_behind_then_read_ahead_round_trip() {
    let data = pattern(10_000);
    let pool = BufferPool::new();
    let sink = SharedSink::default();

    let mut w = AsyncWriter::with_pool(sink.clone(), queue(7, 2, Duration::ZERO), pool.clone());
    assert!(!w.is_started());
    for piece in data.chunks(333) {
        assert_eq!(w.write(piece).await.unwrap(), piece.len());
    }
    w.close().await.unwrap();
    assert_eq!(sink.bytes(), data);

    let mut r = AsyncReader::with_pool(
        Cursor::new(sink.bytes()),
        queue(512, 3, Duration::ZERO),
        pool.clone(),
    );
    let mut out = Vec::new();
    let mut buf = [0u8; 100];
    loop {
        let n = r.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    r.close().await.unwrap();

    assert_eq!(out, data);
    let stats = pool.stats();
    assert_eq!(stats.outstanding(), 0);
    assert!(stats.reused > 0);
}

#[tokio::test]
async fn write_pump_error_is_sticky() {
    let (flaky, writes) = Flaky::new(1);
    let mut w = AsyncWriter::new(flaky, queue(4, 1, Duration::ZERO));

    // a full tail goes to the pump; the write itself succeeds
    assert_eq!(w.write(b"abcd").await.unwrap(), 4);
    for _ in 0..100 {
        if w.sticky_error().is_some() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(w.sticky_error().map(|e| e.as_label()), Some("stream_io"));

    assert_eq!(w.write(b"efgh").await.unwrap_err().as_label(), "stream_io");
    assert_eq!(w.flush().await.unwrap_err().as_label(), "stream_io");
    assert_eq!(w.close().await.unwrap_err().as_label(), "stream_io");
    assert_eq!(writes.lock().len(), 1);
}

#[tokio::test]
async fn read_pump_error_follows_the_data() {
    let mut r = AsyncReader::new(
        Broken {
            data: Some(b"abc".to_vec()),
        },
        queue(16, 2, Duration::ZERO),
    );

    let mut buf = [0u8; 16];
    assert_eq!(r.read(&mut buf).await.unwrap(), 3);
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(r.read(&mut buf).await.unwrap_err().as_label(), "stream_io");
    assert_eq!(r.read(&mut buf).await.unwrap_err().as_label(), "stream_io");
    assert!(r.sticky_error().is_some());
    r.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn deadline_flushes_an_idle_tail() {
    let sink = SharedSink::default();
    let mut w = AsyncWriter::new(sink.clone(), queue(64, 2, Duration::from_millis(50)));

    w.write(b"ab").await.unwrap();
    assert!(sink.bytes().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sink.bytes(), b"ab");

    w.write(b"cd").await.unwrap();
    w.close().await.unwrap();
    assert_eq!(sink.bytes(), b"abcd");
}

#[tokio::test]
async fn flush_hands_the_tail_over_without_closing() {
    let sink = SharedSink::default();
    let mut w = AsyncWriter::new(sink.clone(), queue(64, 2, Duration::ZERO));

    w.write(b"xy").await.unwrap();
    w.flush().await.unwrap();
    for _ in 0..100 {
        if !sink.bytes().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(sink.bytes(), b"xy");

    w.write(b"z").await.unwrap();
    w.close().await.unwrap();
    assert_eq!(sink.bytes(), b"xyz");
}
