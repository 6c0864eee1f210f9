use std::sync::Arc;

use d_config::EventKind;
use d_config::RemoteStore;
use d_config::Result;
use d_config::Settings;
use d_config::StoreManager;
use d_config::TerminationReason;
use d_config::WatchStatus;

use crate::commons::change_channel;
use crate::commons::next_change;
use crate::commons::put_json;
use crate::commons::seeded_store;
use crate::commons::DbConfig;

async fn db_manager(store: Arc<d_config::MemoryStore>) -> StoreManager {
    StoreManager::builder(store, Settings::default())
        .register::<DbConfig>("/cfg/db/")
        .build()
        .await
}

#[tokio::test]
async fn test_put_and_delete_flow_through_to_cache_and_watchers() -> Result<()> {
    let store = seeded_store().await?;
    let manager = db_manager(store.clone()).await;
    let (callback, mut changes) = change_channel();
    manager.add_prefix_watcher("/cfg/db/", callback);
    assert_eq!(
        next_change(&mut changes).await,
        ("/cfg/db/a".to_string(), EventKind::Put)
    );

    put_json(&store, "/cfg/db/b", &DbConfig::new("y", 2)).await?;
    assert_eq!(
        next_change(&mut changes).await,
        ("/cfg/db/b".to_string(), EventKind::Put)
    );
    assert_eq!(
        manager.get_config::<DbConfig>("/cfg/db/b"),
        Some(DbConfig::new("y", 2))
    );

    store.delete("/cfg/db/a").await?;
    assert_eq!(
        next_change(&mut changes).await,
        ("/cfg/db/a".to_string(), EventKind::Delete)
    );
    assert!(manager.get_config::<DbConfig>("/cfg/db/a").is_none());
    assert_eq!(manager.list_keys("/cfg/db/"), vec!["/cfg/db/b".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_bad_event_keeps_previous_value() -> Result<()> {
    let store = seeded_store().await?;
    let manager = db_manager(store.clone()).await;
    let (callback, mut changes) = change_channel();
    manager.add_prefix_watcher("/cfg/db/", callback);
    next_change(&mut changes).await;

    store.put("/cfg/db/a", "garbage".into()).await?;
    put_json(&store, "/cfg/db/c", &DbConfig::new("z", 3)).await?;

    // The undecodable put is not announced; the next good one is
    assert_eq!(
        next_change(&mut changes).await,
        ("/cfg/db/c".to_string(), EventKind::Put)
    );
    assert_eq!(
        manager.get_config::<DbConfig>("/cfg/db/a"),
        Some(DbConfig::new("x", 1))
    );
    Ok(())
}

#[tokio::test]
async fn test_writes_through_manager_round_trip() -> Result<()> {
    let store = seeded_store().await?;
    let manager = db_manager(store.clone()).await;
    let (callback, mut changes) = change_channel();
    let handle = manager.add_prefix_watcher("/cfg/db/", callback);
    next_change(&mut changes).await;

    manager.put_config("/cfg/db/a", &DbConfig::new("x", 2)).await?;
    next_change(&mut changes).await;
    assert_eq!(
        manager.get_config::<DbConfig>("/cfg/db/a"),
        Some(DbConfig::new("x", 2))
    );

    assert!(handle.remove());
    assert_eq!(manager.prefix_watcher_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_closed_store_freezes_cache() -> Result<()> {
    let store = seeded_store().await?;
    let manager = db_manager(store.clone()).await;
    let mut status = manager.subscribe_status("/cfg/db/").expect("registered prefix");

    store.close();
    status
        .wait_for(|s| s.is_terminated())
        .await
        .expect("status sender alive");

    assert_eq!(
        manager.watch_status("/cfg/db/"),
        Some(WatchStatus::Terminated(TerminationReason::StreamClosed))
    );
    assert_eq!(
        manager.get_config::<DbConfig>("/cfg/db/a"),
        Some(DbConfig::new("x", 1))
    );
    assert!(manager.put_config("/cfg/db/a", &DbConfig::new("x", 9)).await.is_err());
    Ok(())
}
