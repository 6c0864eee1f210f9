use serde::Deserialize;
use serde::Serialize;
use tracing_test::traced_test;

use super::*;
use crate::Error;
use crate::LogContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DbConfig {
    host: String,
    port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FeatureFlag {
    enabled: bool,
}

fn registry() -> TypeRegistry {
    TypeRegistry::new(&LogContext::default())
}

#[test]
fn test_register_is_idempotent_per_shape() {
    let mut registry = registry();

    let first = registry.register::<DbConfig>();
    let second = registry.register::<FeatureFlag>();
    let again = registry.register::<DbConfig>();

    assert_eq!(first, again);
    assert_ne!(first, second);
    assert_eq!(registry.shape_count(), 2);
    assert_eq!(registry.shape_id::<FeatureFlag>(), Some(second));
}

#[test]
fn test_put_then_get_returns_decoded_copy() {
    let mut registry = registry();
    let shape = registry.register::<DbConfig>();

    registry
        .put(shape, "/cfg/db/a", br#"{"host":"x","port":1}"#)
        .unwrap();

    let got: Option<DbConfig> = registry.get("/cfg/db/a");
    assert_eq!(
        got,
        Some(DbConfig {
            host: "x".into(),
            port: 1
        })
    );
}

#[test]
fn test_get_returns_value_copy_not_live_reference() {
    let mut registry = registry();
    let shape = registry.register::<DbConfig>();
    registry
        .put(shape, "/cfg/db/a", br#"{"host":"x","port":1}"#)
        .unwrap();

    let mut copy: DbConfig = registry.get("/cfg/db/a").unwrap();
    copy.host = "mutated".into();
    copy.port = 99;

    let fresh: DbConfig = registry.get("/cfg/db/a").unwrap();
    assert_eq!(fresh.host, "x");
    assert_eq!(fresh.port, 1);
}

#[test]
#[traced_test]
fn test_decode_failure_keeps_previous_entry() {
    let mut registry = registry();
    let shape = registry.register::<DbConfig>();
    registry
        .put(shape, "/cfg/db/a", br#"{"host":"x","port":1}"#)
        .unwrap();

    let result = registry.put(shape, "/cfg/db/a", b"not json");

    assert!(matches!(result, Err(Error::Codec(_))));
    let kept: DbConfig = registry.get("/cfg/db/a").unwrap();
    assert_eq!(kept.host, "x");
    assert!(logs_contain("decode failed"));
}

#[test]
fn test_decode_failure_does_not_create_entry() {
    let mut registry = registry();
    let shape = registry.register::<DbConfig>();

    assert!(registry.put(shape, "/cfg/db/a", br#"{"host":"x"}"#).is_err());

    assert!(registry.get::<DbConfig>("/cfg/db/a").is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_remove_absent_key_is_noop() {
    let mut registry = registry();
    let shape = registry.register::<DbConfig>();

    assert!(!registry.remove(shape, "/cfg/db/missing"));

    registry
        .put(shape, "/cfg/db/a", br#"{"host":"x","port":1}"#)
        .unwrap();
    assert!(registry.remove(shape, "/cfg/db/a"));
    assert!(registry.get::<DbConfig>("/cfg/db/a").is_none());
}

#[test]
fn test_get_with_unregistered_shape_is_a_miss() {
    let mut registry = registry();
    let shape = registry.register::<DbConfig>();
    registry
        .put(shape, "/cfg/db/a", br#"{"host":"x","port":1}"#)
        .unwrap();

    assert!(registry.get::<FeatureFlag>("/cfg/db/a").is_none());
    assert!(matches!(
        registry.try_get::<FeatureFlag>("/cfg/db/a"),
        Err(Error::ShapeNotRegistered { .. })
    ));
}

#[test]
fn test_get_with_registered_but_different_shape_is_absent() {
    let mut registry = registry();
    let db = registry.register::<DbConfig>();
    registry.register::<FeatureFlag>();
    registry
        .put(db, "/cfg/db/a", br#"{"host":"x","port":1}"#)
        .unwrap();

    assert!(matches!(registry.try_get::<FeatureFlag>("/cfg/db/a"), Ok(None)));
}

#[test]
fn test_list_keys_scans_every_shape() {
    let mut registry = registry();
    let db = registry.register::<DbConfig>();
    let flag = registry.register::<FeatureFlag>();

    registry
        .put(db, "/cfg/db/a", br#"{"host":"x","port":1}"#)
        .unwrap();
    registry
        .put(db, "/cfg/db/b", br#"{"host":"y","port":2}"#)
        .unwrap();
    registry
        .put(flag, "/cfg/flags/beta", br#"{"enabled":true}"#)
        .unwrap();

    let mut all = registry.list_keys("/cfg/");
    all.sort();
    assert_eq!(all, vec!["/cfg/db/a", "/cfg/db/b", "/cfg/flags/beta"]);

    let mut db_keys = registry.list_keys("/cfg/db/");
    db_keys.sort();
    assert_eq!(db_keys, vec!["/cfg/db/a", "/cfg/db/b"]);

    assert!(registry.list_keys("/nothing/").is_empty());
    assert_eq!(registry.len(), 3);
}

#[test]
#[traced_test]
fn test_foreign_shape_id_is_rejected_without_panic() {
    let mut small = registry();
    small.register::<DbConfig>();
    let mut large = registry();
    large.register::<DbConfig>();
    let foreign = large.register::<FeatureFlag>();

    assert!(matches!(
        small.put(foreign, "/cfg/flags/beta", br#"{"enabled":true}"#),
        Err(Error::ShapeNotRegistered { .. })
    ));
    assert!(!small.remove(foreign, "/cfg/flags/beta"));
    assert_eq!(small.shape_name(foreign), "<unknown>");
    assert!(small.is_empty());
    assert!(logs_contain("shape id not from this registry"));
}
