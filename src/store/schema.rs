//! Store definitions: field schemas and scope keying.
//!
//! Each store family is a static [`StoreSpec`]. The engine reads the schema
//! to pick (de)serialization and defaults, and the keying to decide whether
//! a scope id is required.

use serde::{Deserialize, Serialize};

/// Declared shape of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// JSON mapping, stored as JSON text.
    Object,
    /// Plain text, stored as-is.
    String,
}

/// Field declarations for a store.
#[derive(Debug, Clone, Copy)]
pub enum Schema {
    /// A fixed list of fields, each with a kind.
    Fixed(&'static [(&'static str, FieldKind)]),
    /// Any key is accepted and holds an opaque JSON value.
    Open,
}

impl Schema {
    /// Kind of a declared field. Always `None` for open schemas.
    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        match self {
            Self::Fixed(fields) => fields
                .iter()
                .find(|(name, _)| *name == field)
                .map(|(_, kind)| *kind),
            Self::Open => None,
        }
    }

    /// Whether `field` may be read or written.
    pub fn declares(&self, field: &str) -> bool {
        match self {
            Self::Fixed(_) => self.kind_of(field).is_some(),
            Self::Open => !field.is_empty(),
        }
    }

    /// Declared fields, in declaration order. Empty for open schemas.
    pub fn fields(&self) -> &'static [(&'static str, FieldKind)] {
        match self {
            Self::Fixed(fields) => fields,
            Self::Open => &[],
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// How scopes are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keying {
    /// Exactly one scope; callers never pass an id.
    Singleton,
    /// One scope per external id (a group id).
    ById,
}

/// A store family: name, backing collection, schema and keying.
#[derive(Debug)]
pub struct StoreSpec {
    pub name: &'static str,
    pub collection: &'static str,
    pub schema: Schema,
    pub keying: Keying,
}

use FieldKind::{Object, String as Text};

const PERSONAL_FIELDS: &[(&str, FieldKind)] = &[
    ("mention", Object),
    ("areact", Text),
    ("ban", Text),
    ("alive", Text),
    ("login", Text),
    ("shutoff", Text),
    ("owner_updt", Text),
    ("commit_key", Text),
    ("sticker_cmd", Object),
    ("plugins", Object),
    ("toggle", Object),
    ("autostatus", Text),
    ("autostatus_react", Text),
    ("chatbot", Object),
    ("always_online", Text),
    ("status_view", Text),
    ("save_status", Text),
];

const GROUP_FIELDS: &[(&str, FieldKind)] = &[
    ("bot", Object),
    ("delete", Text),
    ("fake", Object),
    ("link", Object),
    ("word", Object),
    ("demote", Text),
    ("promote", Text),
    ("filter", Object),
    ("warn", Object),
    ("welcome", Object),
    ("exit", Object),
    ("pdm", Text),
    ("chatbot", Object),
];

/// Bot-wide key-value settings with free-form keys.
pub static GLOBAL: StoreSpec = StoreSpec {
    name: "global",
    collection: "global_settings",
    schema: Schema::Open,
    keying: Keying::Singleton,
};

/// Settings of the bot owner's own account.
pub static PERSONAL: StoreSpec = StoreSpec {
    name: "personal",
    collection: "personal_settings",
    schema: Schema::Fixed(PERSONAL_FIELDS),
    keying: Keying::Singleton,
};

/// Per-group settings, keyed by group id.
pub static GROUP: StoreSpec = StoreSpec {
    name: "group",
    collection: "group_settings",
    schema: Schema::Fixed(GROUP_FIELDS),
    keying: Keying::ById,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_schema_lookup() {
        assert_eq!(PERSONAL.schema.kind_of("mention"), Some(FieldKind::Object));
        assert_eq!(PERSONAL.schema.kind_of("areact"), Some(FieldKind::String));
        assert_eq!(PERSONAL.schema.kind_of("nope"), None);
        assert!(!PERSONAL.schema.declares("nope"));
        assert_eq!(GROUP.schema.fields().len(), 13);
    }

    #[test]
    fn test_open_schema_accepts_any_key() {
        assert!(GLOBAL.schema.declares("siteTitle"));
        assert!(!GLOBAL.schema.declares(""));
        assert_eq!(GLOBAL.schema.kind_of("siteTitle"), None);
        assert!(GLOBAL.schema.fields().is_empty());
    }
}
