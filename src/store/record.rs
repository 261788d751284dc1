//! Scope records and their durable row form.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::warn;

use super::schema::Schema;
use super::value::{Entry, EntryMeta, FieldValue};

/// Identity of a scope within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKey {
    Singleton,
    Keyed(String),
}

impl ScopeKey {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Singleton => None,
            Self::Keyed(id) => Some(id),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => f.write_str("singleton"),
            Self::Keyed(id) => f.write_str(id),
        }
    }
}

/// A durable row: flat text columns plus a JSON meta column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub scope: ScopeKey,
    pub columns: BTreeMap<String, String>,
    pub meta: String,
}

/// Parse a meta column.
///
/// Malformed text yields an empty map. A malformed entry falls back to
/// [`EntryMeta::default`] without affecting the other keys.
pub fn decode_meta(raw: &str) -> BTreeMap<String, EntryMeta> {
    if raw.is_empty() {
        return BTreeMap::new();
    }
    let entries: Map<String, Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Malformed meta column, starting from empty meta: {}", e);
            return BTreeMap::new();
        }
    };

    entries
        .into_iter()
        .map(|(field, value)| {
            let meta = serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Malformed meta for '{}', using default: {}", field, e);
                EntryMeta::default()
            });
            (field, meta)
        })
        .collect()
}

pub fn encode_meta(meta: &BTreeMap<String, EntryMeta>) -> String {
    serde_json::to_string(meta).unwrap_or_else(|_| "{}".to_string())
}

/// All fields of one scope, held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeRecord {
    entries: BTreeMap<String, Entry>,
}

impl ScopeRecord {
    /// Record holding the default of every declared field.
    pub fn with_defaults(schema: &Schema) -> Self {
        let entries = schema
            .fields()
            .iter()
            .map(|(name, kind)| (name.to_string(), Entry::default_for(*kind)))
            .collect();
        Self { entries }
    }

    /// Load a row. Declared fields missing from the row get defaults.
    pub fn from_row(schema: &Schema, row: &Row) -> Self {
        let meta = decode_meta(&row.meta);
        let names: Vec<&str> = if schema.is_open() {
            row.columns.keys().map(String::as_str).collect()
        } else {
            schema.fields().iter().map(|(name, _)| *name).collect()
        };

        let entries = names
            .into_iter()
            .map(|name| {
                let kind = schema.kind_of(name);
                let raw = row.columns.get(name).map(String::as_str);
                let value = FieldValue::decode(kind, raw).unwrap_or_else(|e| {
                    warn!("Malformed JSON in field '{}' of scope {}: {}", name, row.scope, e);
                    FieldValue::Object(Default::default())
                });
                let entry_meta = meta.get(name).copied().unwrap_or_default();
                (name.to_string(), Entry::new(value, entry_meta))
            })
            .collect();

        Self { entries }
    }

    /// Full row payload for this record.
    pub fn to_row(&self, schema: &Schema, scope: ScopeKey) -> Row {
        let mut columns = BTreeMap::new();
        let mut meta = BTreeMap::new();

        if schema.is_open() {
            for (name, entry) in &self.entries {
                columns.insert(name.clone(), entry.value.encode());
                meta.insert(name.clone(), entry.meta);
            }
        } else {
            for (name, kind) in schema.fields() {
                let (value, entry_meta) = match self.entries.get(*name) {
                    Some(entry) => (entry.value.encode(), entry.meta),
                    None => (FieldValue::default_for(*kind).encode(), EntryMeta::default()),
                };
                columns.insert(name.to_string(), value);
                meta.insert(name.to_string(), entry_meta);
            }
        }

        Row {
            scope,
            columns,
            meta: encode_meta(&meta),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Entry> {
        self.entries.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Entry> {
        self.entries.get_mut(field)
    }

    pub fn insert(&mut self, field: &str, entry: Entry) {
        self.entries.insert(field.to_string(), entry);
    }

    pub fn remove(&mut self, field: &str) -> Option<Entry> {
        self.entries.remove(field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
