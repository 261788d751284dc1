//! Settings stores.
//!
//! Three store families share one engine:
//! - `global` - bot-wide settings with free-form keys
//! - `personal` - the owner's account settings, fixed fields
//! - `group` - per-group settings, fixed fields, keyed by group id

mod backend;
mod engine;
mod error;
mod query;
mod record;
mod schema;
mod value;

use std::sync::Arc;

use tracing::info;

pub use backend::{Backend, MemoryBackend};
pub use engine::{CacheStore, DeleteOptions, EntryView};
pub use error::{BackendError, StoreError};
pub use query::{Method, QueryOptions, QueryOutput};
pub use record::{Row, ScopeKey, ScopeRecord, decode_meta, encode_meta};
pub use schema::{FieldKind, GLOBAL, GROUP, Keying, PERSONAL, Schema, StoreSpec};
pub use value::{Action, Entry, EntryMeta, FieldValue};

/// The three stores, shared across handlers.
#[derive(Clone)]
pub struct Stores {
    pub global: Arc<CacheStore>,
    pub personal: Arc<CacheStore>,
    pub group: Arc<CacheStore>,
}

impl Stores {
    /// Build the stores, asking `backend_for` for each store's adapter.
    pub fn new(mut backend_for: impl FnMut(&'static StoreSpec) -> Arc<dyn Backend>) -> Self {
        let mut open = |spec: &'static StoreSpec| Arc::new(CacheStore::new(spec, backend_for(spec)));
        Self {
            global: open(&GLOBAL),
            personal: open(&PERSONAL),
            group: open(&GROUP),
        }
    }

    /// Stores backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(|_| Arc::new(MemoryBackend::new()))
    }

    pub fn all(&self) -> [&Arc<CacheStore>; 3] {
        [&self.global, &self.personal, &self.group]
    }

    /// Warm every store. Stops at the first failure.
    pub async fn warm_all(&self) -> Result<(), StoreError> {
        for store in self.all() {
            store.warm().await?;
        }
        info!("All settings stores warmed");
        Ok(())
    }

    /// Flush every store, returning the first failure after trying all.
    pub async fn persist_all(&self) -> Result<(), StoreError> {
        let mut first_error = None;
        for store in self.all() {
            if let Err(e) = store.persist_all().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores")
            .field("global", &self.global)
            .field("personal", &self.personal)
            .field("group", &self.group)
            .finish()
    }
}
