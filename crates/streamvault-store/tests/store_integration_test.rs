//! Store integration tests
//!
//! End-to-end behavior of `StreamStore` + `MultiStreamCursor` over the
//! in-memory backing adapter: batched append error reporting, retention
//! bounds, mixed-position reads, and the selector grammar.

use std::sync::Arc;
use std::time::Duration;
use streamvault_core::{parse_selector, EntryId, Position};
use streamvault_store::{
    CursorConfig, CursorMode, MemoryBackend, MemoryBackendConfig, MultiStreamCursor, NewEntry,
    StoreConfig, StoreError, StreamStore,
};

fn store_with(maxlen: Option<u64>, granularity: u64) -> Arc<StreamStore> {
    Arc::new(StreamStore::new(
        Arc::new(MemoryBackend::new(MemoryBackendConfig {
            trim_granularity: granularity,
        })),
        StoreConfig {
            default_maxlen: maxlen,
            ..Default::default()
        },
    ))
}

#[tokio::test]
async fn batched_append_reports_errors_per_slot() {
    let store = store_with(None, 64);

    // The second entry targets an invalid stream; the first must still get
    // an ID and the call itself must succeed.
    let results = store
        .append(vec![
            NewEntry::auto("s1", "x"),
            NewEntry::auto("s2+not-a-valid-target", "y"),
        ])
        .await
        .unwrap();

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(StoreError::InvalidPosition(_))));
    assert_eq!(store.stream_stats("s1").await.unwrap().length, 1);
}

#[tokio::test]
async fn backend_rejections_are_also_per_slot() {
    let store = store_with(None, 64);
    let results = store
        .append(vec![
            NewEntry::with_id("s", EntryId::new(100, 0), "a"),
            NewEntry::with_id("s", EntryId::new(50, 0), "stale"),
            NewEntry::with_id("s", EntryId::new(101, 0), "b"),
        ])
        .await
        .unwrap();
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(StoreError::Backend(_))));
    assert!(results[2].is_ok());
}

#[tokio::test]
async fn approximate_retention_is_bounded() {
    let store = store_with(Some(10), 16);
    for _ in 0..100 {
        store.append(vec![NewEntry::auto("s", "x")]).await.unwrap();
    }
    let length = store.stream_stats("s").await.unwrap().length;
    assert!(length >= 10, "trimmed below the bound: {length}");
    assert!(length <= 10 + 16, "slack exceeded: {length}");
}

#[tokio::test]
async fn mixed_read_preserves_caller_stream_order() {
    let store = store_with(None, 64);
    store
        .append(vec![
            NewEntry::with_id("tail", EntryId::new(10, 0), "t1"),
            NewEntry::with_id("tail", EntryId::new(20, 0), "t2"),
            NewEntry::with_id("newest", EntryId::new(30, 0), "n1"),
            NewEntry::with_id("newest", EntryId::new(40, 0), "n2"),
        ])
        .await
        .unwrap();

    let selector = parse_selector("tail+newest", "0-0+*").unwrap();
    let batches = store.read(&selector, 10, None).await.unwrap();

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].stream, "tail");
    assert_eq!(batches[0].entries.len(), 2);
    assert_eq!(batches[1].stream, "newest");
    // Reverse scan comes back ascending.
    assert_eq!(
        batches[1].entries.iter().map(|e| e.id.ms).collect::<Vec<_>>(),
        [30, 40]
    );
}

#[tokio::test]
async fn cursor_tails_live_appends() {
    let store = store_with(None, 64);
    let selector = parse_selector("live", "$").unwrap();
    let mut cursor = MultiStreamCursor::new(
        store.clone(),
        selector,
        CursorConfig {
            mode: CursorMode::CatchUp,
            count: 10,
            block: Duration::from_secs(2),
            time_sync: None,
        },
    );

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store
                .append(vec![NewEntry::auto("live", "frame")])
                .await
                .unwrap();
        })
    };

    let batches = cursor.next().await.unwrap();
    writer.await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(&batches[0].entries[0].payload[..], b"frame");
}

#[tokio::test]
async fn blocking_read_times_out_empty() {
    let store = store_with(None, 64);
    let selector = vec![("quiet".to_string(), Position::At(EntryId::new(0, 0)))];

    let start = tokio::time::Instant::now();
    let batches = store
        .read(&selector, 10, Some(Duration::from_millis(50)))
        .await
        .unwrap();
    assert!(batches.is_empty());
    assert!(start.elapsed() >= Duration::from_millis(50));
}
