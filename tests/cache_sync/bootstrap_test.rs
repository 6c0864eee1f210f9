use d_config::RemoteStore;
use d_config::Result;
use d_config::Settings;
use d_config::StoreManager;
use d_config::WatchStatus;

use crate::commons::put_json;
use crate::commons::seeded_store;
use crate::commons::DbConfig;
use crate::commons::FeatureFlag;

#[tokio::test]
async fn test_registered_prefix_is_cached_after_build() -> Result<()> {
    let store = seeded_store().await?;

    let manager = StoreManager::builder(store.clone(), Settings::default())
        .register::<DbConfig>("/cfg/db/")
        .build()
        .await;

    assert_eq!(
        manager.get_config::<DbConfig>("/cfg/db/a"),
        Some(DbConfig::new("x", 1))
    );
    assert_eq!(manager.list_keys("/cfg/db/"), vec!["/cfg/db/a".to_string()]);
    // Not registered, so not cached
    assert!(manager.get_config::<FeatureFlag>("/cfg/flags/beta").is_none());
    assert_eq!(manager.watch_status("/cfg/db/"), Some(WatchStatus::Streaming));
    Ok(())
}

#[tokio::test]
async fn test_malformed_values_are_skipped_at_bootstrap() -> Result<()> {
    let store = seeded_store().await?;
    store.put("/cfg/db/broken", "{not json".into()).await?;
    put_json(&store, "/cfg/db/b", &DbConfig::new("y", 2)).await?;

    let manager = StoreManager::builder(store.clone(), Settings::default())
        .register::<DbConfig>("/cfg/db/")
        .register::<FeatureFlag>("/cfg/flags/")
        .build()
        .await;

    let mut keys = manager.list_keys("/cfg/");
    keys.sort();
    assert_eq!(keys, vec!["/cfg/db/a", "/cfg/db/b", "/cfg/flags/beta"]);
    assert!(manager.get_config::<DbConfig>("/cfg/db/broken").is_none());
    assert_eq!(
        manager.get_config::<FeatureFlag>("/cfg/flags/beta"),
        Some(FeatureFlag {
            enabled: true,
            rollout_percent: 10
        })
    );
    assert!(manager.is_healthy());
    Ok(())
}
