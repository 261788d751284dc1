use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use kira_store::store::{
    Action, CacheStore, DeleteOptions, MemoryBackend, Method, PERSONAL, QueryOptions, ScopeKey,
    StoreError, Stores, decode_meta,
};

fn personal() -> (CacheStore<Arc<MemoryBackend>>, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    (CacheStore::new(&PERSONAL, Arc::clone(&backend)), backend)
}

#[tokio::test]
async fn mention_and_areact_lifecycle() {
    let (store, backend) = personal();

    store.set(None, "mention", json!({"a": 1})).await.unwrap();
    store.set(None, "areact", json!("🔥")).await.unwrap();
    let values = store.get(None, &["mention", "areact"]).await.unwrap();
    assert_eq!(Value::Object(values), json!({"mention": {"a": 1}, "areact": "🔥"}));

    let merged = store
        .query(&["mention"], QueryOptions::default().content(json!({"b": 2})), Method::Add)
        .await
        .unwrap();
    assert_eq!(merged.into_json(), json!({"a": 1, "b": 2}));

    store
        .delete(None, "mention", DeleteOptions::id("a"))
        .await
        .unwrap();
    let values = store.get(None, &["mention"]).await.unwrap();
    assert_eq!(values["mention"], json!({"b": 2}));

    let err = store.delete(None, "areact", DeleteOptions::default()).await.unwrap_err();
    assert!(matches!(err, StoreError::DeleteRefused(_)));
    assert_eq!(store.get(None, &["areact"]).await.unwrap()["areact"], json!("🔥"));

    let row = backend.row(&ScopeKey::Singleton).unwrap();
    assert_eq!(row.columns["mention"], r#"{"b":2}"#);
    assert_eq!(row.columns["areact"], "🔥");
    let meta = decode_meta(&row.meta);
    assert_eq!(meta["mention"].last_action, Some(Action::Delete));
    assert_eq!(meta["areact"].last_action, Some(Action::Set));
    assert_eq!(meta["alive"].last_action, None);
}

#[tokio::test]
async fn field_write_leaves_other_columns_untouched() {
    let (store, backend) = personal();
    store.warm().await.unwrap();

    // Another process changes a column after warm-up.
    let mut row = backend.row(&ScopeKey::Singleton).unwrap();
    row.columns.insert("login".into(), "elsewhere".into());
    backend.put_row(row);

    store.set(None, "alive", json!("I'm here")).await.unwrap();

    let row = backend.row(&ScopeKey::Singleton).unwrap();
    assert_eq!(row.columns["alive"], "I'm here");
    assert_eq!(row.columns["login"], "elsewhere");
}

#[tokio::test]
async fn restart_reloads_persisted_state() {
    let backend = Arc::new(MemoryBackend::new());
    {
        let store = CacheStore::new(&PERSONAL, Arc::clone(&backend));
        store.set(None, "toggle", json!({"antilink": true})).await.unwrap();
    }

    let store = CacheStore::new(&PERSONAL, Arc::clone(&backend));
    store.warm().await.unwrap();
    let views = store.get_with_meta(None, &["toggle"]).await.unwrap();
    assert_eq!(views["toggle"].value, json!({"antilink": true}));
    assert_eq!(views["toggle"].meta.unwrap().last_action, Some(Action::Set));
    assert_eq!(backend.row_count(), 1);
}

#[tokio::test]
async fn stores_bundle_routes_by_family() {
    let stores = Stores::in_memory();
    stores.warm_all().await.unwrap();

    stores
        .global
        .query(&["motd"], QueryOptions::default().content(json!("hello")), Method::Set)
        .await
        .unwrap();
    stores
        .group
        .query(&["welcome"], QueryOptions::scoped("-100").content(json!({"on": true})), Method::Set)
        .await
        .unwrap();

    let err = stores
        .personal
        .query(&["motd"], QueryOptions::default(), Method::Get)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NoKnownFields { .. }));

    assert_eq!(stores.group.scopes(), vec!["-100".to_string()]);
    assert!(stores.global.scopes().is_empty());
    stores.persist_all().await.unwrap();
}
