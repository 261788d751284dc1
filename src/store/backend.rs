//! Backing store interface and the in-process adapter.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::error::BackendError;
use super::record::{Row, ScopeKey};

/// Durable storage with one row per scope.
///
/// Adapters only move rows. Merging a field into an existing row is the
/// cache store's job.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Make sure the table or collection exists.
    async fn ensure(&self) -> Result<(), BackendError>;

    async fn find_one(&self, scope: &ScopeKey) -> Result<Option<Row>, BackendError>;

    async fn find_all(&self) -> Result<Vec<Row>, BackendError>;

    /// Insert a row for a scope that has none yet.
    async fn create(&self, row: &Row) -> Result<(), BackendError>;

    /// Replace the row of an existing scope.
    async fn update(&self, row: &Row) -> Result<(), BackendError>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn ensure(&self) -> Result<(), BackendError> {
        (**self).ensure().await
    }

    async fn find_one(&self, scope: &ScopeKey) -> Result<Option<Row>, BackendError> {
        (**self).find_one(scope).await
    }

    async fn find_all(&self) -> Result<Vec<Row>, BackendError> {
        (**self).find_all().await
    }

    async fn create(&self, row: &Row) -> Result<(), BackendError> {
        (**self).create(row).await
    }

    async fn update(&self, row: &Row) -> Result<(), BackendError> {
        (**self).update(row).await
    }
}

/// Rows kept in process memory.
///
/// Used when no database is configured, and as the adapter in tests.
/// [`set_failing`](Self::set_failing) makes every call return
/// [`BackendError::Unavailable`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: RwLock<BTreeMap<ScopeKey, Row>>,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with existing rows, as if loaded from an earlier run.
    pub fn with_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        let backend = Self::new();
        backend
            .rows
            .write()
            .extend(rows.into_iter().map(|row| (row.scope.clone(), row)));
        backend
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Current row of a scope.
    pub fn row(&self, scope: &ScopeKey) -> Option<Row> {
        self.rows.read().get(scope).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Number of successful `create` and `update` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Overwrite a row directly, bypassing the write counter.
    pub fn put_row(&self, row: Row) {
        self.rows.write().insert(row.scope.clone(), row);
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("memory backend set to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn ensure(&self) -> Result<(), BackendError> {
        self.check()
    }

    async fn find_one(&self, scope: &ScopeKey) -> Result<Option<Row>, BackendError> {
        self.check()?;
        Ok(self.row(scope))
    }

    async fn find_all(&self) -> Result<Vec<Row>, BackendError> {
        self.check()?;
        Ok(self.rows.read().values().cloned().collect())
    }

    async fn create(&self, row: &Row) -> Result<(), BackendError> {
        self.check()?;
        let mut rows = self.rows.write();
        if rows.contains_key(&row.scope) {
            return Err(BackendError::Conflict(row.scope.to_string()));
        }
        rows.insert(row.scope.clone(), row.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, row: &Row) -> Result<(), BackendError> {
        self.check()?;
        let mut rows = self.rows.write();
        match rows.get_mut(&row.scope) {
            Some(existing) => *existing = row.clone(),
            None => return Err(BackendError::Missing(row.scope.to_string())),
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(scope: ScopeKey) -> Row {
        Row {
            scope,
            columns: BTreeMap::new(),
            meta: "{}".into(),
        }
    }

    #[tokio::test]
    async fn test_create_then_update() {
        let backend = MemoryBackend::new();
        let scope = ScopeKey::Keyed("120363@g.us".into());

        assert!(backend.update(&row(scope.clone())).await.is_err());
        backend.create(&row(scope.clone())).await.unwrap();
        assert!(matches!(
            backend.create(&row(scope.clone())).await,
            Err(BackendError::Conflict(_))
        ));

        let mut changed = row(scope.clone());
        changed.columns.insert("pdm".into(), "true".into());
        backend.update(&changed).await.unwrap();

        assert_eq!(backend.find_one(&scope).await.unwrap(), Some(changed));
        assert_eq!(backend.write_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let backend = MemoryBackend::new();
        backend.set_failing(true);
        assert!(backend.find_all().await.is_err());
        backend.set_failing(false);
        assert!(backend.find_all().await.unwrap().is_empty());
    }
}
