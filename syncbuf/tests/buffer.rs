use std::num::NonZeroUsize;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use syncbuf::{JoinPolicy, Options, Pacing, StoragePolicy, SyncBuffer, SyncBufferError};
use tokio::time::{timeout, Instant};

fn item(i: u64) -> Bytes {
    Bytes::from(format!("{{{i}}}"))
}

fn ring(capacity: usize) -> StoragePolicy {
    StoragePolicy::Ring {
        capacity: NonZeroUsize::new(capacity).unwrap(),
    }
}

fn throttled() -> Pacing {
    Pacing::Throttle(Duration::from_millis(1))
}

async fn write_items(buffer: &SyncBuffer, count: u64) {
    for i in 0..count {
        assert_eq!(buffer.add(item(i)).await.unwrap(), i);
    }
}

#[tokio::test(start_paused = true)]
async fn test_reader_sees_every_item_in_order() {
    let buffer = SyncBuffer::new(StoragePolicy::Log, throttled());
    write_items(&buffer, 10).await;

    let mut reader = buffer.new_reader();
    let received: Vec<Bytes> = reader.stream().take(10).collect().await;
    let expected: Vec<Bytes> = (0..10).map(item).collect();
    assert_eq!(received, expected);

    buffer.close().await;
    reader.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_items_added_while_reading_arrive() {
    let buffer = SyncBuffer::new(StoragePolicy::Log, throttled());
    let mut reader = buffer.new_reader();
    let mut stream = reader.stream();

    for i in 0..5 {
        buffer.add(item(i)).await.unwrap();
        assert_eq!(stream.next().await, Some(item(i)));
    }

    buffer.close().await;
    // Everything was consumed: no final chunk
    assert_eq!(stream.next().await, None);
    reader.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_ring_reader_sees_last_capacity_items() {
    let buffer = SyncBuffer::new(ring(4), throttled());
    write_items(&buffer, 10).await;
    assert_eq!(buffer.oldest_available(), 6);

    let mut reader = buffer.new_reader();
    let received: Vec<Bytes> = reader.stream().take(4).collect().await;
    let expected: Vec<Bytes> = (6..10).map(item).collect();
    assert_eq!(received, expected);

    buffer.close().await;
    reader.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_replay_reader_jumps_to_oldest_retained() {
    let options = Options {
        join: JoinPolicy::Replay,
        ..Options::default()
    };
    let buffer = SyncBuffer::with_options(ring(3), throttled(), options);
    write_items(&buffer, 5).await;

    let mut reader = buffer.new_reader();
    let mut stream = reader.stream();
    assert_eq!(stream.next().await, Some(item(2)));
    assert_eq!(stream.next().await, Some(item(3)));
    assert_eq!(stream.next().await, Some(item(4)));

    buffer.close().await;
    assert_eq!(stream.next().await, None);
    reader.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_clock_tail_and_retained_history() {
    let (pacing, stepper) = Pacing::manual();
    let tail_options = Options {
        join: JoinPolicy::Tail,
        ..Options::default()
    };
    let buffer = SyncBuffer::with_options(StoragePolicy::Log, pacing, tail_options);

    write_items(&buffer, 10).await;
    assert_eq!(buffer.frontier(), Some(0));
    for _ in 0..5 {
        stepper.step().await.unwrap();
    }
    assert_eq!(buffer.frontier(), Some(5));
    assert_eq!(buffer.visible_end(), 5);

    // Tail reader: nothing until the clock moves on
    let mut tail = buffer.new_reader();
    let mut tail_stream = tail.stream();
    assert!(timeout(Duration::from_millis(50), tail_stream.next())
        .await
        .is_err());

    stepper.step().await.unwrap();
    assert_eq!(tail_stream.next().await, Some(item(5)));

    buffer.close().await;
    // Closing flushes what the clock never released
    let rest: Vec<u8> = (6..10).flat_map(|i| item(i).to_vec()).collect();
    assert_eq!(tail_stream.next().await, Some(Bytes::from(rest)));
    assert_eq!(tail_stream.next().await, None);
    tail.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_clock_retained_history_reader() {
    let (pacing, stepper) = Pacing::manual();
    let buffer = SyncBuffer::new(StoragePolicy::Log, pacing);
    assert_eq!(buffer.join_policy(), JoinPolicy::RetainedHistory);

    write_items(&buffer, 10).await;
    for _ in 0..5 {
        stepper.step().await.unwrap();
    }

    let mut reader = buffer.new_reader();
    let mut stream = reader.stream();
    for i in 0..5 {
        assert_eq!(stream.next().await, Some(item(i)));
    }
    // Position 5 is written but not yet visible
    assert!(timeout(Duration::from_millis(50), stream.next())
        .await
        .is_err());

    reader.close().await;
    buffer.close().await;
}

#[tokio::test]
async fn test_frontier_never_passes_total() {
    let (pacing, stepper) = Pacing::manual();
    let buffer = SyncBuffer::new(StoragePolicy::Log, pacing);

    write_items(&buffer, 2).await;
    for _ in 0..5 {
        stepper.step().await.unwrap();
    }
    assert_eq!(buffer.frontier(), Some(2));
    assert_eq!(stepper.steps(), 5);

    buffer.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_throttled_add_waits() {
    let interval = Duration::from_millis(30);
    let buffer = SyncBuffer::new(StoragePolicy::Log, Pacing::Throttle(interval));
    assert_eq!(buffer.frontier(), None);

    let started = Instant::now();
    buffer.add(item(0)).await.unwrap();
    buffer.add(item(1)).await.unwrap();
    assert!(started.elapsed() >= interval * 2);
    assert_eq!(buffer.visible_end(), 2);

    buffer.close().await;
}

#[tokio::test]
async fn test_clock_driven_add_does_not_wait() {
    let (pacing, _stepper) = Pacing::manual();
    let buffer = SyncBuffer::new(StoragePolicy::Log, pacing);

    // A manual clock never ticks here; add must still return
    timeout(Duration::from_secs(1), write_items(&buffer, 3))
        .await
        .unwrap();
    assert_eq!(buffer.total_inserted(), 3);
    assert_eq!(buffer.visible_end(), 0);

    buffer.close().await;
}

#[tokio::test]
async fn test_add_after_close() {
    let buffer = SyncBuffer::new(StoragePolicy::Log, Pacing::Throttle(Duration::ZERO));
    buffer.add(item(0)).await.unwrap();
    buffer.close().await;

    assert!(buffer.is_closed());
    assert!(matches!(
        buffer.add(item(1)).await,
        Err(SyncBufferError::Closed)
    ));
    assert_eq!(buffer.total_inserted(), 1);
}

#[tokio::test]
async fn test_close_twice() {
    let (pacing, stepper) = Pacing::manual();
    let buffer = SyncBuffer::new(StoragePolicy::Log, pacing);

    buffer.close().await;
    timeout(Duration::from_secs(1), buffer.close())
        .await
        .unwrap();
    assert!(matches!(
        stepper.step().await,
        Err(SyncBufferError::ClockStopped)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_close() {
    let buffer = std::sync::Arc::new(SyncBuffer::new(
        ring(8),
        Pacing::autonomous(Duration::from_millis(5)),
    ));
    buffer.add(item(0)).await.unwrap();

    let closers: Vec<_> = (0..4)
        .map(|_| {
            let buffer = std::sync::Arc::clone(&buffer);
            tokio::spawn(async move { buffer.close().await })
        })
        .collect();
    for closer in closers {
        timeout(Duration::from_secs(1), closer)
            .await
            .unwrap()
            .unwrap();
    }
    assert!(buffer.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_compaction_moves_replay_reader_forward() {
    let options = Options {
        join: JoinPolicy::Replay,
        ..Options::default()
    };
    let buffer = SyncBuffer::with_options(StoragePolicy::Log, throttled(), options);
    write_items(&buffer, 5).await;

    assert_eq!(buffer.compact(3).unwrap(), 3);
    assert_eq!(buffer.oldest_available(), 3);
    assert_eq!(buffer.total_inserted(), 5);

    let mut reader = buffer.new_reader();
    let mut stream = reader.stream();
    assert_eq!(stream.next().await, Some(item(3)));
    assert_eq!(stream.next().await, Some(item(4)));

    // Positions stay stable after compaction
    assert_eq!(buffer.add(item(5)).await.unwrap(), 5);
    assert_eq!(stream.next().await, Some(item(5)));

    buffer.close().await;
    reader.close().await;
}

#[tokio::test]
async fn test_ring_compaction_unsupported() {
    let buffer = SyncBuffer::new(ring(2), Pacing::Throttle(Duration::ZERO));
    buffer.add(item(0)).await.unwrap();
    assert!(matches!(
        buffer.compact(1),
        Err(SyncBufferError::CompactionUnsupported)
    ));
    buffer.close().await;
}

#[tokio::test]
async fn test_cursor_over_buffer() {
    let buffer = SyncBuffer::new(StoragePolicy::Log, Pacing::Throttle(Duration::ZERO));
    write_items(&buffer, 3).await;

    let cursor = buffer.cursor();
    assert_eq!(cursor.position(), 0);
    assert!(cursor.increment());
    assert_eq!(cursor.rest(), Bytes::from_static(b"{1}{2}"));

    buffer.close().await;
}
