//! FileKvStore integration tests (scratch directories via tempfile)

use std::sync::Arc;

use abtrack::config::DispatcherConfig;
use abtrack::kv::{FileKvStore, KvStore, MemoryKvStore};
use abtrack::telemetry::{BatchDispatcher, Event, FlushMode, FlushOutcome, OFFLINE_EVENTS_KEY};
use abtrack::transport::RecordingTransport;
use abtrack::Error;

#[tokio::test]
async fn test_set_get_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileKvStore::open(dir.path()).unwrap();

    store.set("assignments:u1", b"{}".to_vec()).await.unwrap();
    assert_eq!(store.get("assignments:u1").await.unwrap(), Some(b"{}".to_vec()));
    assert!(store.exists("assignments:u1").await.unwrap());

    store.delete("assignments:u1").await.unwrap();
    assert_eq!(store.get("assignments:u1").await.unwrap(), None);
    store.delete("assignments:u1").await.unwrap();
}

#[tokio::test]
async fn test_open_creates_nested_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("state").join("tracker");
    let store = FileKvStore::open(&nested).unwrap();

    store.set("k", vec![1]).await.unwrap();

    assert_eq!(store.root(), nested.as_path());
    assert!(nested.is_dir());
}

#[tokio::test]
async fn test_overwrite_leaves_no_staging_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileKvStore::open(dir.path()).unwrap();

    store.set("offline-events", b"[1]".to_vec()).await.unwrap();
    store.set("offline-events", b"[1,2]".to_vec()).await.unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["offline-events.kv"]);
    assert_eq!(store.get("offline-events").await.unwrap(), Some(b"[1,2]".to_vec()));
}

#[tokio::test]
async fn test_offline_buffer_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::new());

    {
        let dispatcher = Arc::new(BatchDispatcher::new(
            DispatcherConfig::default(),
            "s-1",
            Arc::clone(&transport),
            FileKvStore::open(dir.path()).unwrap(),
        ));
        dispatcher.set_online(false);
        for i in 0..5 {
            dispatcher.enqueue(Event::new(format!("e{i}")));
        }
        assert!(matches!(
            dispatcher.flush(FlushMode::Async).await,
            FlushOutcome::Offline(5)
        ));
    }

    let store = FileKvStore::open(dir.path()).unwrap();
    assert!(store.exists(OFFLINE_EVENTS_KEY).await.unwrap());

    let dispatcher = Arc::new(BatchDispatcher::new(
        DispatcherConfig::default(),
        "s-2",
        Arc::clone(&transport),
        store,
    ));
    assert_eq!(dispatcher.init().await.unwrap(), 5);
    assert_eq!(dispatcher.pending_names(), vec!["e0", "e1", "e2", "e3", "e4"]);
    assert!(!FileKvStore::open(dir.path())
        .unwrap()
        .exists(OFFLINE_EVENTS_KEY)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_quota_exceeded_is_storage_error() {
    let store = MemoryKvStore::with_quota(8);
    let result = store.set("offline-events", vec![0; 64]).await;
    assert!(matches!(result, Err(Error::StorageError(_))));
}
