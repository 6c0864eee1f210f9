use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use super::*;
use crate::Error;
use crate::MemoryStore;
use crate::TerminationReason;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DbConfig {
    host: String,
    port: u16,
}

async fn engine(store: &Arc<MemoryStore>) -> Engine {
    Engine::builder(store.clone(), Settings::default())
        .register::<DbConfig>("/cfg/db/")
        .build()
        .await
}

#[tokio::test]
async fn test_raw_write_reaches_typed_cache() {
    let store = Arc::new(MemoryStore::default());
    let engine = engine(&store).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.add_prefix_watcher("/cfg/db/", move |key, kind| {
        let _ = tx.send((key.to_string(), kind));
    });

    engine
        .watch_put("/cfg/db/a", r#"{"host":"x","port":1}"#)
        .await
        .unwrap();

    let (key, kind) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((key.as_str(), kind), ("/cfg/db/a", EventKind::Put));
    assert_eq!(
        engine.get_config::<DbConfig>("/cfg/db/a"),
        Some(DbConfig {
            host: "x".into(),
            port: 1
        })
    );
    assert_eq!(engine.list_keys("/cfg/"), vec!["/cfg/db/a".to_string()]);
}

#[tokio::test]
async fn test_typed_write_is_visible_to_raw_reads() {
    let store = Arc::new(MemoryStore::default());
    let engine = engine(&store).await;
    let value = DbConfig {
        host: "y".into(),
        port: 2,
    };

    engine.put_config("/cfg/db/b", &value).await.unwrap();

    let raw = engine.watch_get("/cfg/db/b").await.unwrap();
    assert_eq!(serde_json::from_slice::<DbConfig>(&raw).unwrap(), value);

    engine.delete_config("/cfg/db/b").await.unwrap();
    assert!(matches!(engine.watch_get("/cfg/db/b").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_raw_watch_sees_typed_writes() {
    let store = Arc::new(MemoryStore::default());
    let engine = engine(&store).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();

    engine
        .watch("/cfg/", move |event| {
            sink.lock().push(event.key.clone());
            tx.send(())?;
            Ok(())
        })
        .await
        .unwrap();
    engine.watch_delete("/cfg/db/none").await.unwrap();
    engine
        .put_config(
            "/cfg/db/c",
            &DbConfig {
                host: "z".into(),
                port: 3,
            },
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*seen.lock(), vec!["/cfg/db/c".to_string()]);
}

#[tokio::test]
async fn test_store_is_shared() {
    let store = Arc::new(MemoryStore::default());
    let engine = engine(&store).await;

    engine.store().put("/x", "1".into()).await.unwrap();

    assert_eq!(store.get("/x").await.unwrap(), Some("1".into()));
    assert!(engine.is_healthy());
    assert!(engine.raw_watcher().watch_get("/x").await.is_ok());
    assert_eq!(engine.store_manager().cached_len(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_typed_and_raw_watches() {
    let store = Arc::new(MemoryStore::default());
    let engine = engine(&store).await;
    let raw = engine.watch("/cfg/", |_| Ok(())).await.unwrap();

    engine.shutdown().await;

    assert_eq!(
        engine.watch_status("/cfg/db/"),
        Some(WatchStatus::Terminated(TerminationReason::Cancelled))
    );
    assert_eq!(raw.status(), WatchStatus::Terminated(TerminationReason::Cancelled));
    assert!(engine.subscribe_status("/cfg/db/").is_some());
    assert!(!engine.is_healthy());
}
