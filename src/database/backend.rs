//! MongoDB adapter for the settings stores.
//!
//! One document per scope:
//!
//! ```text
//! { scope: null | "<group id>", columns: { field: "<text>", ... }, meta: "<json>" }
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::IndexOptions;
use mongodb::{Collection, IndexModel};
use tracing::{debug, warn};

use crate::store::{Backend, BackendError, Row, ScopeKey};

/// Settings rows of one store in one collection.
#[derive(Debug, Clone)]
pub struct MongoBackend {
    collection: Collection<Document>,
    store: &'static str,
}

impl MongoBackend {
    pub fn new(collection: Collection<Document>, store: &'static str) -> Self {
        Self { collection, store }
    }

    fn filter(scope: &ScopeKey) -> Document {
        match scope {
            ScopeKey::Singleton => doc! { "scope": Bson::Null },
            ScopeKey::Keyed(id) => doc! { "scope": id.as_str() },
        }
    }

    fn to_document(row: &Row) -> Document {
        let columns: Document = row
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), Bson::String(value.clone())))
            .collect();

        let scope = match &row.scope {
            ScopeKey::Singleton => Bson::Null,
            ScopeKey::Keyed(id) => Bson::String(id.clone()),
        };

        doc! {
            "scope": scope,
            "columns": columns,
            "meta": row.meta.as_str(),
        }
    }

    fn from_document(doc: &Document) -> Result<Row, BackendError> {
        let scope = match doc.get("scope") {
            None | Some(Bson::Null) => ScopeKey::Singleton,
            Some(Bson::String(id)) => ScopeKey::Keyed(id.clone()),
            Some(other) => {
                return Err(BackendError::Decode(format!(
                    "scope must be null or a string, got {}",
                    other
                )));
            }
        };

        let mut columns = BTreeMap::new();
        if let Ok(stored) = doc.get_document("columns") {
            for (name, value) in stored {
                match value {
                    Bson::String(text) => {
                        columns.insert(name.clone(), text.clone());
                    }
                    other => warn!("Skipping non-text column '{}' in scope {}: {}", name, scope, other),
                }
            }
        }

        let meta = doc.get_str("meta").unwrap_or("{}").to_string();

        Ok(Row {
            scope,
            columns,
            meta,
        })
    }
}

#[async_trait]
impl Backend for MongoBackend {
    async fn ensure(&self) -> Result<(), BackendError> {
        let index = IndexModel::builder()
            .keys(doc! { "scope": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(index).await?;
        debug!("Ensured collection {} for {} store", self.collection.name(), self.store);
        Ok(())
    }

    async fn find_one(&self, scope: &ScopeKey) -> Result<Option<Row>, BackendError> {
        match self.collection.find_one(Self::filter(scope)).await? {
            Some(doc) => Self::from_document(&doc).map(Some),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<Row>, BackendError> {
        let mut cursor = self.collection.find(doc! {}).await?;
        let mut rows = Vec::new();

        while let Some(result) = cursor.next().await {
            match Self::from_document(&result?) {
                Ok(row) => rows.push(row),
                Err(e) => warn!("Skipping malformed {} row: {}", self.store, e),
            }
        }
        Ok(rows)
    }

    async fn create(&self, row: &Row) -> Result<(), BackendError> {
        self.collection.insert_one(Self::to_document(row)).await?;
        debug!("Created {} row for scope {}", self.store, row.scope);
        Ok(())
    }

    async fn update(&self, row: &Row) -> Result<(), BackendError> {
        let result = self
            .collection
            .replace_one(Self::filter(&row.scope), Self::to_document(row))
            .await?;
        if result.matched_count == 0 {
            return Err(BackendError::Missing(row.scope.to_string()));
        }
        Ok(())
    }
}
