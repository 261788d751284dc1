//! Method-dispatched entry point used by command handlers.

use std::str::FromStr;

use serde_json::{Map, Value};

use super::backend::Backend;
use super::engine::{CacheStore, DeleteOptions};
use super::error::StoreError;

/// Operation selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Set,
    Add,
    Delete,
}

impl FromStr for Method {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(Self::Get),
            "set" => Ok(Self::Set),
            "add" => Ok(Self::Add),
            "delete" => Ok(Self::Delete),
            other => Err(StoreError::UnknownMethod(other.to_string())),
        }
    }
}

/// Caller options for [`CacheStore::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Scope id. Required by keyed stores, ignored by singletons.
    pub scope: Option<String>,
    /// Value for `set`, mapping for `add`, `{"id": ...}` for `delete`.
    pub content: Value,
    pub force: bool,
}

impl QueryOptions {
    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    #[must_use]
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Result of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Field values returned by `get`.
    Values(Map<String, Value>),
    /// `set` and `delete` succeeded.
    Done,
    /// Mapping produced by `add`.
    Merged(Map<String, Value>),
}

impl QueryOutput {
    /// Wire form: the mapping for `get`/`add`, `true` otherwise.
    pub fn into_json(self) -> Value {
        match self {
            Self::Values(map) | Self::Merged(map) => Value::Object(map),
            Self::Done => Value::Bool(true),
        }
    }
}

impl<B: Backend> CacheStore<B> {
    /// Run `method` against `fields`.
    ///
    /// Writes act on the first declared field only. Unknown fields are
    /// dropped before dispatch.
    pub async fn query(
        &self,
        fields: &[&str],
        options: QueryOptions,
        method: Method,
    ) -> Result<QueryOutput, StoreError> {
        let scope = options.scope.as_deref();
        match method {
            Method::Get => self.get(scope, fields).await.map(QueryOutput::Values),
            Method::Set => {
                let field = self.first_declared(fields)?;
                self.set(scope, field, options.content).await?;
                Ok(QueryOutput::Done)
            }
            Method::Add => {
                let field = self.first_declared(fields)?;
                let content = add_content(field, options.content)?;
                self.add(scope, field, content).await.map(QueryOutput::Merged)
            }
            Method::Delete => {
                let field = self.first_declared(fields)?;
                let delete = DeleteOptions {
                    id: delete_id(&options.content),
                    force: options.force,
                };
                self.delete(scope, field, delete).await?;
                Ok(QueryOutput::Done)
            }
        }
    }

    fn first_declared<'a>(&self, fields: &[&'a str]) -> Result<&'a str, StoreError> {
        fields
            .iter()
            .copied()
            .find(|field| self.spec().schema.declares(field))
            .ok_or(StoreError::NoKnownFields { store: self.name() })
    }
}

fn add_content(field: &str, content: Value) -> Result<Map<String, Value>, StoreError> {
    let invalid = |reason| StoreError::InvalidContent {
        field: field.to_string(),
        reason,
    };
    match content {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        Value::String(text) => match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(invalid("expected a JSON object")),
            Err(_) => Err(invalid("not valid JSON")),
        },
        _ => Err(invalid("expected an object")),
    }
}

fn delete_id(content: &Value) -> Option<String> {
    match content.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
