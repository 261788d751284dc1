//! Read-through cache with write-through persistence.
//!
//! One [`CacheStore`] serves one store family. Reads are answered from
//! memory. Every mutation is applied in memory first, then persisted before
//! the call returns. A failed persist is reported to the caller but the
//! in-memory value is kept, so memory and storage can differ until the next
//! successful write of that field.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::backend::Backend;
use super::error::{BackendError, StoreError};
use super::record::{Row, ScopeKey, ScopeRecord, decode_meta, encode_meta};
use super::schema::{FieldKind, Keying, StoreSpec};
use super::value::{Action, Entry, EntryMeta, FieldValue};

/// Options for [`CacheStore::delete`].
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Key to remove from an object field.
    pub id: Option<String>,
    /// Allow deleting a non-object value.
    pub force: bool,
}

impl DeleteOptions {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            force: false,
        }
    }

    pub fn force() -> Self {
        Self {
            id: None,
            force: true,
        }
    }
}

/// A field's value together with its meta.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryView {
    pub value: Value,
    pub meta: Option<EntryMeta>,
}

/// Cache engine for one store family.
pub struct CacheStore<B = Arc<dyn Backend>> {
    spec: &'static StoreSpec,
    backend: B,
    scopes: RwLock<HashMap<ScopeKey, ScopeRecord>>,
    /// Persists for one scope run one at a time.
    persist_locks: DashMap<ScopeKey, Arc<Mutex<()>>>,
    warmed: AtomicBool,
    warm_gate: Mutex<()>,
}

impl<B: Backend> CacheStore<B> {
    /// Create a cold store. Memory is filled by [`warm`](Self::warm) or by the first call.
    pub fn new(spec: &'static StoreSpec, backend: B) -> Self {
        Self {
            spec,
            backend,
            scopes: RwLock::new(HashMap::new()),
            persist_locks: DashMap::new(),
            warmed: AtomicBool::new(false),
            warm_gate: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn spec(&self) -> &'static StoreSpec {
        self.spec
    }

    /// Load every durable row into memory. Idempotent.
    ///
    /// A singleton store without a row gets a default record, written back
    /// so storage and memory start out equal.
    pub async fn warm(&self) -> Result<(), StoreError> {
        if self.warmed.load(Ordering::Acquire) {
            return Ok(());
        }
        let _gate = self.warm_gate.lock().await;
        if self.warmed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.load_all().await?;
        self.warmed.store(true, Ordering::Release);
        Ok(())
    }

    /// Drop memory and load everything again from storage.
    pub async fn reload(&self) -> Result<(), StoreError> {
        let _gate = self.warm_gate.lock().await;
        self.warmed.store(false, Ordering::Release);
        self.load_all().await?;
        self.warmed.store(true, Ordering::Release);
        Ok(())
    }

    async fn load_all(&self) -> Result<(), StoreError> {
        self.backend.ensure().await.map_err(|e| self.warm_error(e))?;
        let rows = self.backend.find_all().await.map_err(|e| self.warm_error(e))?;
        let row_count = rows.len();

        let schema = &self.spec.schema;
        let mut loaded: HashMap<ScopeKey, ScopeRecord> = rows
            .iter()
            .map(|row| (row.scope.clone(), ScopeRecord::from_row(schema, row)))
            .collect();

        let seed = self.spec.keying == Keying::Singleton
            && !loaded.contains_key(&ScopeKey::Singleton);
        if seed {
            loaded.insert(ScopeKey::Singleton, ScopeRecord::with_defaults(schema));
        }

        *self.scopes.write() = loaded;

        if seed {
            self.persist_scope(&ScopeKey::Singleton)
                .await
                .map_err(|e| self.warm_error(e))?;
            info!("{} store: no row found, created defaults", self.spec.name);
        }

        info!("{} store warmed with {} row(s)", self.spec.name, row_count);
        Ok(())
    }

    fn warm_error(&self, source: BackendError) -> StoreError {
        StoreError::Warm {
            store: self.spec.name,
            source,
        }
    }

    /// Read fields of a scope.
    ///
    /// Unknown scopes are loaded from storage, or defaulted in memory without
    /// writing. Undeclared fields are skipped; schema-less keys that were
    /// never set read as `null`.
    pub async fn get(
        &self,
        scope: Option<&str>,
        fields: &[&str],
    ) -> Result<Map<String, Value>, StoreError> {
        let key = self.scope_key(scope)?;
        let known: Vec<&str> = fields
            .iter()
            .copied()
            .filter(|field| self.spec.schema.declares(field))
            .collect();
        if known.is_empty() {
            return Err(StoreError::NoKnownFields {
                store: self.spec.name,
            });
        }

        self.ensure_scope(&key).await?;

        let scopes = self.scopes.read();
        let record = scopes.get(&key);
        Ok(known
            .into_iter()
            .map(|field| {
                let value = record
                    .and_then(|r| r.get(field))
                    .map(|entry| entry.value.to_json())
                    .unwrap_or_else(|| self.missing_value(field));
                (field.to_string(), value)
            })
            .collect())
    }

    /// Replace a field's value.
    pub async fn set(
        &self,
        scope: Option<&str>,
        field: &str,
        content: Value,
    ) -> Result<(), StoreError> {
        let key = self.scope_key(scope)?;
        let kind = self.field_kind(field)?;
        self.ensure_scope(&key).await?;

        let value = FieldValue::coerce(kind, content);
        self.with_record(&key, |record| {
            record.insert(field, Entry::new(value, EntryMeta::touched(Action::Set)));
            Ok(())
        })?;

        self.persist_field(&key, field).await
    }

    /// Shallow-merge `content` into an object field; later keys win.
    ///
    /// Returns the merged mapping.
    pub async fn add(
        &self,
        scope: Option<&str>,
        field: &str,
        content: Map<String, Value>,
    ) -> Result<Map<String, Value>, StoreError> {
        let key = self.scope_key(scope)?;
        if self.field_kind(field)? == Some(FieldKind::String) {
            return Err(StoreError::NotAnObject(field.to_string()));
        }
        self.ensure_scope(&key).await?;

        let merged = self.with_record(&key, |record| {
            let mut merged = record
                .get(field)
                .and_then(|entry| entry.value.as_object().cloned())
                .unwrap_or_default();
            merged.extend(content);
            record.insert(
                field,
                Entry::new(
                    FieldValue::Object(merged.clone()),
                    EntryMeta::touched(Action::Add),
                ),
            );
            Ok(merged)
        })?;

        self.persist_field(&key, field).await?;
        Ok(merged)
    }

    /// Delete a key from an object field, or a whole scalar value with `force`.
    ///
    /// A forced delete resets a declared field to its default; a schema-less
    /// key is removed from memory and storage.
    pub async fn delete(
        &self,
        scope: Option<&str>,
        field: &str,
        options: DeleteOptions,
    ) -> Result<(), StoreError> {
        let key = self.scope_key(scope)?;
        let kind = self.field_kind(field)?;
        self.ensure_scope(&key).await?;

        self.with_record(&key, |record| {
            let Some(entry) = record.get_mut(field) else {
                return Err(StoreError::FieldAbsent(field.to_string()));
            };

            if let FieldValue::Object(map) = &mut entry.value {
                let id = options
                    .id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| StoreError::MissingId(field.to_string()))?;
                if map.remove(&id).is_none() {
                    return Err(StoreError::IdNotFound {
                        field: field.to_string(),
                        id,
                    });
                }
                entry.meta = EntryMeta::touched(Action::Delete);
                return Ok(());
            }

            if !options.force {
                return Err(StoreError::DeleteRefused(field.to_string()));
            }
            match kind {
                Some(kind) => {
                    *entry = Entry::new(
                        FieldValue::default_for(kind),
                        EntryMeta::touched(Action::Delete),
                    );
                }
                None => {
                    record.remove(field);
                }
            }
            Ok(())
        })?;

        self.persist_field(&key, field).await
    }

    /// Read fields with their meta. Absent fields yield `{value: null, meta: null}`.
    pub async fn get_with_meta(
        &self,
        scope: Option<&str>,
        fields: &[&str],
    ) -> Result<BTreeMap<String, EntryView>, StoreError> {
        let key = self.scope_key(scope)?;
        self.ensure_scope(&key).await?;

        let scopes = self.scopes.read();
        let record = scopes.get(&key);
        Ok(fields
            .iter()
            .map(|field| {
                let view = match record.and_then(|r| r.get(field)) {
                    Some(entry) => EntryView {
                        value: entry.value.to_json(),
                        meta: Some(entry.meta),
                    },
                    None => EntryView {
                        value: Value::Null,
                        meta: None,
                    },
                };
                (field.to_string(), view)
            })
            .collect())
    }

    /// Meta of a field already in memory. Never loads.
    pub fn get_meta(&self, scope: Option<&str>, field: &str) -> Option<EntryMeta> {
        let key = self.scope_key(scope).ok()?;
        self.scopes
            .read()
            .get(&key)
            .and_then(|record| record.get(field))
            .map(|entry| entry.meta)
    }

    /// Ids of the scopes held in memory. Empty for singleton stores.
    pub fn scopes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .scopes
            .read()
            .keys()
            .filter_map(|key| key.id().map(str::to_string))
            .collect();
        ids.sort();
        ids
    }

    /// Write every scope in memory to storage as a full row.
    pub async fn persist_all(&self) -> Result<(), StoreError> {
        self.warm().await?;

        let keys: Vec<ScopeKey> = self.scopes.read().keys().cloned().collect();
        let mut failed = 0;
        for key in &keys {
            if let Err(e) = self.persist_scope(key).await {
                error!("{} store: failed to flush scope {}: {}", self.spec.name, key, e);
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(StoreError::Flush {
                store: self.spec.name,
                failed,
                total: keys.len(),
            });
        }
        debug!("{} store: flushed {} scope(s)", self.spec.name, keys.len());
        Ok(())
    }

    fn scope_key(&self, scope: Option<&str>) -> Result<ScopeKey, StoreError> {
        match self.spec.keying {
            Keying::Singleton => Ok(ScopeKey::Singleton),
            Keying::ById => match scope {
                Some(id) if !id.is_empty() => Ok(ScopeKey::Keyed(id.to_string())),
                _ => Err(StoreError::MissingScope {
                    store: self.spec.name,
                }),
            },
        }
    }

    /// Kind of a writable field; `None` for schema-less keys.
    fn field_kind(&self, field: &str) -> Result<Option<FieldKind>, StoreError> {
        if !self.spec.schema.declares(field) {
            return Err(StoreError::UnknownField {
                store: self.spec.name,
                field: field.to_string(),
            });
        }
        Ok(self.spec.schema.kind_of(field))
    }

    fn missing_value(&self, field: &str) -> Value {
        self.spec
            .schema
            .kind_of(field)
            .map(|kind| FieldValue::default_for(kind).to_json())
            .unwrap_or(Value::Null)
    }

    /// Make sure `key` has a record in memory.
    async fn ensure_scope(&self, key: &ScopeKey) -> Result<(), StoreError> {
        self.warm().await?;
        if self.scopes.read().contains_key(key) {
            return Ok(());
        }

        let schema = &self.spec.schema;
        let row = self
            .backend
            .find_one(key)
            .await
            .map_err(|source| StoreError::Load {
                store: self.spec.name,
                scope: key.to_string(),
                source,
            })?;
        let record = match row {
            Some(row) => {
                debug!("{} store: loaded scope {} from storage", self.spec.name, key);
                ScopeRecord::from_row(schema, &row)
            }
            None => {
                debug!("{} store: new scope {}, using defaults", self.spec.name, key);
                ScopeRecord::with_defaults(schema)
            }
        };

        self.scopes.write().entry(key.clone()).or_insert(record);
        Ok(())
    }

    fn with_record<T>(
        &self,
        key: &ScopeKey,
        f: impl FnOnce(&mut ScopeRecord) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut scopes = self.scopes.write();
        let record = scopes
            .entry(key.clone())
            .or_insert_with(|| ScopeRecord::with_defaults(&self.spec.schema));
        f(record)
    }

    fn persist_lock(&self, key: &ScopeKey) -> Arc<Mutex<()>> {
        Arc::clone(
            self.persist_locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Drop the scope's lock entry once no other persist holds a handle to it.
    fn release_persist_lock(&self, key: &ScopeKey, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.persist_locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn persist_field(&self, key: &ScopeKey, field: &str) -> Result<(), StoreError> {
        let lock = self.persist_lock(key);
        let guard = lock.lock().await;
        let result = self.write_field(key, field).await;
        drop(guard);
        self.release_persist_lock(key, lock);

        match result {
            Ok(()) => {
                debug!("{} store: persisted '{}' for scope {}", self.spec.name, field, key);
                Ok(())
            }
            Err(source) => {
                error!(
                    "{} store: failed to persist '{}' for scope {}: {}",
                    self.spec.name, field, key, source
                );
                Err(StoreError::Persist {
                    store: self.spec.name,
                    scope: key.to_string(),
                    field: field.to_string(),
                    source,
                })
            }
        }
    }

    /// Merge one field into the durable row, or create the full row.
    async fn write_field(&self, key: &ScopeKey, field: &str) -> Result<(), BackendError> {
        let Some(mut row) = self.backend.find_one(key).await? else {
            let row = self.snapshot_row(key);
            return self.backend.create(&row).await;
        };

        // Read memory after the fetch so the newest value is the one written.
        let current = self
            .scopes
            .read()
            .get(key)
            .and_then(|record| record.get(field))
            .map(|entry| (entry.value.encode(), entry.meta));

        let mut meta = decode_meta(&row.meta);
        match current {
            Some((column, entry_meta)) => {
                row.columns.insert(field.to_string(), column);
                meta.insert(field.to_string(), entry_meta);
            }
            None => {
                row.columns.remove(field);
                meta.remove(field);
            }
        }
        row.meta = encode_meta(&meta);

        self.backend.update(&row).await
    }

    /// Write the whole record of a scope.
    async fn persist_scope(&self, key: &ScopeKey) -> Result<(), BackendError> {
        let lock = self.persist_lock(key);
        let guard = lock.lock().await;
        let result = self.write_scope(key).await;
        drop(guard);
        self.release_persist_lock(key, lock);
        result
    }

    async fn write_scope(&self, key: &ScopeKey) -> Result<(), BackendError> {
        let existing = self.backend.find_one(key).await?;
        let row = self.snapshot_row(key);
        match existing {
            Some(_) => self.backend.update(&row).await,
            None => self.backend.create(&row).await,
        }
    }

    fn snapshot_row(&self, key: &ScopeKey) -> Row {
        let schema = &self.spec.schema;
        match self.scopes.read().get(key) {
            Some(record) => record.to_row(schema, key.clone()),
            None => ScopeRecord::with_defaults(schema).to_row(schema, key.clone()),
        }
    }
}

impl<B> std::fmt::Debug for CacheStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("store", &self.spec.name)
            .field("scopes", &self.scopes.read().len())
            .field("warmed", &self.warmed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::MemoryBackend;
    use crate::store::schema::{GLOBAL, GROUP, PERSONAL};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store(spec: &'static StoreSpec) -> (CacheStore<Arc<MemoryBackend>>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (CacheStore::new(spec, Arc::clone(&backend)), backend)
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn test_warm_seeds_singleton_row_once() {
        let (store, backend) = store(&PERSONAL);
        store.warm().await.unwrap();
        store.warm().await.unwrap();

        assert_eq!(backend.row_count(), 1);
        assert_eq!(backend.write_count(), 1);
        let row = backend.row(&ScopeKey::Singleton).unwrap();
        assert_eq!(row.columns["mention"], "{}");
        assert_eq!(row.columns["areact"], "");
    }

    #[tokio::test]
    async fn test_warm_keyed_store_stays_empty() {
        let (store, backend) = store(&GROUP);
        store.warm().await.unwrap();
        assert_eq!(backend.row_count(), 0);
        assert!(store.scopes().is_empty());
    }

    #[tokio::test]
    async fn test_defaults_are_stable() {
        let (store, _) = store(&PERSONAL);
        for _ in 0..3 {
            let values = store.get(None, &["toggle", "alive"]).await.unwrap();
            assert_eq!(values["toggle"], json!({}));
            assert_eq!(values["alive"], json!(""));
        }
    }

    #[tokio::test]
    async fn test_get_skips_undeclared_fields() {
        let (store, _) = store(&PERSONAL);
        let values = store.get(None, &["areact", "bogus"]).await.unwrap();
        assert_eq!(values.len(), 1);

        let err = store.get(None, &["bogus"]).await.unwrap_err();
        assert!(matches!(err, StoreError::NoKnownFields { .. }));
    }

    #[tokio::test]
    async fn test_set_replaces_and_coerces() {
        let (store, backend) = store(&PERSONAL);
        store.set(None, "mention", json!({"a": 1})).await.unwrap();
        store.set(None, "mention", json!({"b": 2})).await.unwrap();
        store.set(None, "areact", json!(7)).await.unwrap();

        let values = store.get(None, &["mention", "areact"]).await.unwrap();
        assert_eq!(values["mention"], json!({"b": 2}));
        assert_eq!(values["areact"], json!("7"));

        let row = backend.row(&ScopeKey::Singleton).unwrap();
        assert_eq!(row.columns["mention"], r#"{"b":2}"#);
        assert_eq!(row.columns["areact"], "7");
    }

    #[tokio::test]
    async fn test_read_your_writes_when_persist_fails() {
        let (store, backend) = store(&PERSONAL);
        store.warm().await.unwrap();
        backend.set_failing(true);

        let err = store.set(None, "areact", json!("🔥")).await.unwrap_err();
        assert!(matches!(err, StoreError::Persist { .. }));
        assert!(!err.is_validation());

        let values = store.get(None, &["areact"]).await.unwrap();
        assert_eq!(values["areact"], json!("🔥"));

        backend.set_failing(false);
        let row = backend.row(&ScopeKey::Singleton).unwrap();
        assert_eq!(row.columns["areact"], "");
    }

    #[tokio::test]
    async fn test_add_merges_right_biased() {
        let (store, _) = store(&PERSONAL);
        store.add(None, "plugins", object(json!({"a": 1}))).await.unwrap();
        store.add(None, "plugins", object(json!({"b": 2}))).await.unwrap();
        assert_eq!(store.get(None, &["plugins"]).await.unwrap()["plugins"], json!({"a": 1, "b": 2}));

        let merged = store.add(None, "plugins", object(json!({"a": 9}))).await.unwrap();
        assert_eq!(Value::Object(merged), json!({"a": 9, "b": 2}));
        assert_eq!(store.get_meta(None, "plugins").unwrap().last_action, Some(Action::Add));
    }

    #[tokio::test]
    async fn test_add_rejects_string_field() {
        let (store, _) = store(&PERSONAL);
        let err = store.add(None, "areact", object(json!({"a": 1}))).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject(_)));
    }

    #[tokio::test]
    async fn test_delete_guard_on_object_field() {
        let (store, _) = store(&PERSONAL);
        store.set(None, "sticker_cmd", json!({"x": "ping", "y": "pong"})).await.unwrap();

        let err = store.delete(None, "sticker_cmd", DeleteOptions::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingId(_)));

        let err = store.delete(None, "sticker_cmd", DeleteOptions::id("z")).await.unwrap_err();
        assert!(matches!(err, StoreError::IdNotFound { .. }));

        let values = store.get(None, &["sticker_cmd"]).await.unwrap();
        assert_eq!(values["sticker_cmd"], json!({"x": "ping", "y": "pong"}));

        store.delete(None, "sticker_cmd", DeleteOptions::id("x")).await.unwrap();
        let values = store.get(None, &["sticker_cmd"]).await.unwrap();
        assert_eq!(values["sticker_cmd"], json!({"y": "pong"}));
        assert_eq!(
            store.get_meta(None, "sticker_cmd").unwrap().last_action,
            Some(Action::Delete)
        );
    }

    #[tokio::test]
    async fn test_scalar_delete_needs_force() {
        let (store, backend) = store(&PERSONAL);
        store.set(None, "ban", json!("123@s.whatsapp.net")).await.unwrap();

        let err = store.delete(None, "ban", DeleteOptions::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::DeleteRefused(_)));
        assert_eq!(store.get(None, &["ban"]).await.unwrap()["ban"], json!("123@s.whatsapp.net"));

        store.delete(None, "ban", DeleteOptions::force()).await.unwrap();
        assert_eq!(store.get(None, &["ban"]).await.unwrap()["ban"], json!(""));
        assert_eq!(backend.row(&ScopeKey::Singleton).unwrap().columns["ban"], "");
    }

    #[tokio::test]
    async fn test_global_open_keys() {
        let (store, backend) = store(&GLOBAL);
        assert_eq!(store.get(None, &["siteTitle"]).await.unwrap()["siteTitle"], Value::Null);

        store.set(None, "siteTitle", json!("My Site")).await.unwrap();
        store.set(None, "limits", json!(r#"{"daily": 5}"#)).await.unwrap();
        let values = store.get(None, &["siteTitle", "limits"]).await.unwrap();
        assert_eq!(values["siteTitle"], json!("My Site"));
        assert_eq!(values["limits"], json!({"daily": 5}));

        let err = store.delete(None, "siteTitle", DeleteOptions::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::DeleteRefused(_)));
        store.delete(None, "siteTitle", DeleteOptions::force()).await.unwrap();
        assert_eq!(store.get(None, &["siteTitle"]).await.unwrap()["siteTitle"], Value::Null);

        let row = backend.row(&ScopeKey::Singleton).unwrap();
        assert!(!row.columns.contains_key("siteTitle"));
        assert!(!decode_meta(&row.meta).contains_key("siteTitle"));

        let err = store.delete(None, "missing", DeleteOptions::force()).await.unwrap_err();
        assert!(matches!(err, StoreError::FieldAbsent(_)));
    }

    #[tokio::test]
    async fn test_global_add_on_scalar_starts_fresh() {
        let (store, _) = store(&GLOBAL);
        store.set(None, "counter", json!(3)).await.unwrap();
        let merged = store.add(None, "counter", object(json!({"n": 1}))).await.unwrap();
        assert_eq!(Value::Object(merged), json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_group_requires_scope() {
        let (store, _) = store(&GROUP);
        let err = store.get(None, &["welcome"]).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingScope { .. }));
        let err = store.set(Some(""), "pdm", json!("true")).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_group_lazy_defaults_do_not_write() {
        let (store, backend) = store(&GROUP);
        let values = store.get(Some("g1@g.us"), &["welcome", "pdm"]).await.unwrap();
        assert_eq!(values["welcome"], json!({}));
        assert_eq!(values["pdm"], json!(""));
        assert_eq!(backend.write_count(), 0);
        assert_eq!(store.scopes(), vec!["g1@g.us".to_string()]);

        store.set(Some("g1@g.us"), "pdm", json!("true")).await.unwrap();
        let row = backend.row(&ScopeKey::Keyed("g1@g.us".into())).unwrap();
        assert_eq!(row.columns.len(), GROUP.schema.fields().len());
        assert_eq!(row.columns["pdm"], "true");
    }

    #[tokio::test]
    async fn test_group_loads_existing_row_and_merges_one_field() {
        let scope = ScopeKey::Keyed("g2@g.us".into());
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::new(&GROUP, Arc::clone(&backend));
        store.warm().await.unwrap();

        // Row written by another process after warm-up.
        let mut seeded = ScopeRecord::with_defaults(&GROUP.schema).to_row(&GROUP.schema, scope.clone());
        seeded.columns.insert("word".into(), r#"{"spam":true}"#.into());
        backend.put_row(seeded);

        let values = store.get(Some("g2@g.us"), &["word"]).await.unwrap();
        assert_eq!(values["word"], json!({"spam": true}));

        store.set(Some("g2@g.us"), "demote", json!("true")).await.unwrap();
        let row = backend.row(&scope).unwrap();
        assert_eq!(row.columns["word"], r#"{"spam":true}"#);
        assert_eq!(row.columns["demote"], "true");
        let meta = decode_meta(&row.meta);
        assert_eq!(meta["demote"].last_action, Some(Action::Set));
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_one_scope_both_persist() {
        let (store, backend) = store(&GROUP);
        let (a, b) = tokio::join!(
            store.set(Some("g3@g.us"), "pdm", json!("true")),
            store.add(Some("g3@g.us"), "warn", object(json!({"u1": 2}))),
        );
        a.unwrap();
        b.unwrap();
        assert!(store.persist_locks.is_empty());

        let row = backend.row(&ScopeKey::Keyed("g3@g.us".into())).unwrap();
        assert_eq!(row.columns["pdm"], "true");
        assert_eq!(row.columns["warn"], r#"{"u1":2}"#);
        let meta = decode_meta(&row.meta);
        assert_eq!(meta["pdm"].last_action, Some(Action::Set));
        assert_eq!(meta["warn"].last_action, Some(Action::Add));
    }

    #[tokio::test]
    async fn test_get_with_meta() {
        let (store, _) = store(&PERSONAL);
        store.set(None, "login", json!("on")).await.unwrap();

        let views = store.get_with_meta(None, &["login", "nope"]).await.unwrap();
        assert_eq!(views["login"].value, json!("on"));
        let meta = views["login"].meta.unwrap();
        assert_eq!(meta.last_action, Some(Action::Set));
        assert!(meta.updated_at.is_some());
        assert_eq!(views["nope"], EntryView { value: Value::Null, meta: None });

        assert_eq!(store.get_meta(None, "alive"), Some(EntryMeta::default()));
        assert_eq!(store.get_meta(None, "nope"), None);
    }

    #[tokio::test]
    async fn test_reload_and_persist_all() {
        let backend = Arc::new(MemoryBackend::with_rows([Row {
            scope: ScopeKey::Singleton,
            columns: BTreeMap::from([("motd".to_string(), "\"hello\"".to_string())]),
            meta: "{}".into(),
        }]));
        let store = CacheStore::new(&GLOBAL, Arc::clone(&backend));
        assert_eq!(store.get(None, &["motd"]).await.unwrap()["motd"], json!("hello"));

        let mut changed = backend.row(&ScopeKey::Singleton).unwrap();
        changed.columns.insert("motd".into(), "\"bye\"".into());
        backend.put_row(changed);
        assert_eq!(store.get(None, &["motd"]).await.unwrap()["motd"], json!("hello"));

        store.reload().await.unwrap();
        assert_eq!(store.get(None, &["motd"]).await.unwrap()["motd"], json!("bye"));

        backend.set_failing(true);
        assert!(matches!(store.persist_all().await, Err(StoreError::Flush { failed: 1, .. })));
        backend.set_failing(false);
        store.persist_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_persist_locks_released_after_writes() {
        let (store, backend) = store(&GROUP);
        for group in ["g1@g.us", "g2@g.us", "g3@g.us"] {
            store.set(Some(group), "pdm", json!("true")).await.unwrap();
        }
        assert!(store.persist_locks.is_empty());

        backend.set_failing(true);
        let err = store.set(Some("g1@g.us"), "pdm", json!("false")).await.unwrap_err();
        assert!(matches!(err, StoreError::Persist { .. }));
        assert!(store.persist_locks.is_empty());
        backend.set_failing(false);

        store.persist_all().await.unwrap();
        store.reload().await.unwrap();
        assert!(store.persist_locks.is_empty());
        assert_eq!(store.scopes().len(), 3);
    }
}
