use std::io::Write;

use d_config::Engine;
use d_config::Error;
use d_config::EventKind;
use d_config::Result;
use d_config::Settings;
use d_config::WatchEvent;
use tokio::sync::mpsc;

use crate::commons::change_channel;
use crate::commons::next_change;
use crate::commons::seeded_store;
use crate::commons::DbConfig;
use crate::commons::FeatureFlag;

#[tokio::test]
async fn test_engine_from_config_file() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().expect("temp file");
    writeln!(
        file,
        r#"
[log]
service_name = "billing"
pod_name = "billing-0"

[store]
request_timeout_ms = 2000
snapshot_timeout_ms = 4000
"#
    )
    .expect("write config");

    let path = file.path().to_str().expect("utf-8 path");
    let settings = Settings::default().with_override_config(path)?.validate()?;
    assert_eq!(settings.store.request_timeout_ms, 2000);

    let store = seeded_store().await?;
    let engine = Engine::builder(store.clone(), settings)
        .register::<DbConfig>("/cfg/db/")
        .register::<FeatureFlag>("/cfg/flags/")
        .build()
        .await;

    assert!(engine.is_healthy());
    assert_eq!(
        engine.get_config::<DbConfig>("/cfg/db/a"),
        Some(DbConfig::new("x", 1))
    );
    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_raw_and_typed_paths_share_one_store() -> Result<()> {
    let store = seeded_store().await?;
    let engine = Engine::builder(store.clone(), Settings::default())
        .register::<DbConfig>("/cfg/db/")
        .build()
        .await;

    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<WatchEvent>();
    engine
        .watch("/cfg/db/", move |event| {
            raw_tx.send(event.clone())?;
            Ok(())
        })
        .await?;
    // Snapshot replay of the existing key
    assert_eq!(raw_rx.recv().await.map(|e| e.key), Some("/cfg/db/a".to_string()));

    let (callback, mut changes) = change_channel();
    engine.add_prefix_watcher("/cfg/db/", callback);
    next_change(&mut changes).await;

    engine.put_config("/cfg/db/b", &DbConfig::new("y", 2)).await?;

    assert_eq!(
        next_change(&mut changes).await,
        ("/cfg/db/b".to_string(), EventKind::Put)
    );
    let raw_event = raw_rx.recv().await.expect("raw event");
    assert_eq!(raw_event.kind, EventKind::Put);
    assert_eq!(
        serde_json::from_slice::<DbConfig>(raw_event.value.as_deref().unwrap_or_default()).ok(),
        Some(DbConfig::new("y", 2))
    );
    assert_eq!(engine.watch_get("/cfg/db/b").await?, raw_event.value.unwrap_or_default());

    engine.watch_delete("/cfg/db/b").await?;
    assert!(matches!(engine.watch_get("/cfg/db/b").await, Err(Error::NotFound(_))));
    Ok(())
}
