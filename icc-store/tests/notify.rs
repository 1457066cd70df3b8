//! Delivery-order and cancellation properties of the notification stream.

use std::sync::Arc;
use std::time::Duration;

use icc_store::{Backend, CancellationToken, InMemoryStore, StoreConfig};

fn backend() -> Backend<InMemoryStore> {
    Backend::in_memory()
}

async fn receive_within(
    reader: &mut icc_store::NotifyReader<InMemoryStore>,
    timeout: Duration,
) -> Vec<u8> {
    tokio::time::timeout(timeout, reader.receive(&CancellationToken::new()))
        .await
        .expect("should receive within timeout")
        .expect("receive should succeed")
}

#[tokio::test]
async fn delivers_in_publish_order_one_per_call() {
    let backend = backend();
    let mut reader = backend.reader().await.unwrap();

    for i in 0..10 {
        backend.publish(format!("msg-{i}").as_bytes()).await.unwrap();
    }

    for i in 0..10 {
        let payload = receive_within(&mut reader, Duration::from_secs(1)).await;
        assert_eq!(payload, format!("msg-{i}").into_bytes());
    }
}

#[tokio::test]
async fn never_delivers_history_before_reader_creation() {
    let backend = backend();
    backend.publish(b"before-1").await.unwrap();
    backend.publish(b"before-2").await.unwrap();

    let mut reader = backend.reader().await.unwrap();
    backend.publish(b"after").await.unwrap();

    assert_eq!(
        receive_within(&mut reader, Duration::from_secs(1)).await,
        b"after"
    );
}

#[tokio::test]
async fn receive_blocks_until_publish() {
    let backend = Arc::new(backend());
    let mut reader = backend.reader().await.unwrap();

    let publisher = backend.publisher();
    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        publisher.publish(b"late").await.unwrap();
    });

    assert_eq!(
        receive_within(&mut reader, Duration::from_secs(2)).await,
        b"late"
    );
    late.await.unwrap();
}

#[tokio::test]
async fn cancelled_receive_leaves_cursor_unchanged() {
    let backend = backend();
    let mut reader = backend.reader().await.unwrap();
    let before = reader.cursor();

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        })
    };

    let err = reader.receive(&cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!err.is_connectivity());
    assert_eq!(reader.cursor(), before);
    canceller.await.unwrap();

    backend.publish(b"first").await.unwrap();
    backend.publish(b"second").await.unwrap();

    assert_eq!(
        receive_within(&mut reader, Duration::from_secs(1)).await,
        b"first"
    );
    assert_eq!(
        receive_within(&mut reader, Duration::from_secs(1)).await,
        b"second"
    );
}

#[tokio::test]
async fn cancelled_receive_releases_its_background_read() {
    let backend = backend();
    let mut reader = backend.reader().await.unwrap();

    for _ in 0..5 {
        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cancel.cancel();
            })
        };
        assert!(reader.receive(&cancel).await.unwrap_err().is_cancelled());
        canceller.await.unwrap();
    }

    // Aborted tasks are dropped the next time the runtime gets to them.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(backend.store().blocked_readers(), 0);
}

#[tokio::test]
async fn separate_streams_do_not_mix() {
    let store = Arc::new(InMemoryStore::new());
    let a = Backend::new(Arc::clone(&store), StoreConfig::default().with_keys("a", "za"));
    let b = Backend::new(Arc::clone(&store), StoreConfig::default().with_keys("b", "zb"));
    let mut reader = a.reader().await.unwrap();

    b.publish(b"for-b").await.unwrap();
    a.publish(b"for-a").await.unwrap();

    assert_eq!(
        receive_within(&mut reader, Duration::from_secs(1)).await,
        b"for-a"
    );
}
