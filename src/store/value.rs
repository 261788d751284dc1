//! Field values and per-field meta information.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::FieldKind;

/// Last mutation applied to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Set,
    Add,
    Delete,
}

/// When and how a field was last written.
///
/// Serialized as `{"updatedAt": <unix ms>|null, "lastAction": "set"|"add"|"delete"|null}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMeta {
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub last_action: Option<Action>,
}

impl EntryMeta {
    /// Meta for a write happening now.
    pub fn touched(action: Action) -> Self {
        Self {
            updated_at: Some(Utc::now().timestamp_millis()),
            last_action: Some(action),
        }
    }
}

/// A stored value, resolved against the field's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Value of an object field, or a mapping in the global store.
    Object(Map<String, Value>),
    /// Value of a string field.
    Text(String),
    /// Any other JSON value. Only the global store holds these.
    Json(Value),
}

impl FieldValue {
    pub fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Object => Self::Object(Map::new()),
            FieldKind::String => Self::Text(String::new()),
        }
    }

    /// Coerce caller content into a value for a field of `kind`.
    ///
    /// `None` means a schema-less key: strings holding JSON are stored parsed,
    /// anything else is stored as given.
    pub fn coerce(kind: Option<FieldKind>, content: Value) -> Self {
        match kind {
            Some(FieldKind::Object) => match content {
                Value::Object(map) => Self::Object(map),
                Value::String(text) => match serde_json::from_str(&text) {
                    Ok(Value::Object(map)) => Self::Object(map),
                    _ => Self::Object(Map::new()),
                },
                _ => Self::Object(Map::new()),
            },
            Some(FieldKind::String) => Self::Text(match content {
                Value::Null => String::new(),
                Value::String(text) => text,
                other => other.to_string(),
            }),
            None => match content {
                Value::String(text) => match serde_json::from_str(&text) {
                    Ok(parsed) => Self::from_json(parsed),
                    Err(_) => Self::Json(Value::String(text)),
                },
                other => Self::from_json(other),
            },
        }
    }

    /// Decode a stored column.
    ///
    /// Fails only for object fields holding malformed JSON; callers substitute
    /// an empty object. Missing or empty columns decode to the kind's default.
    pub fn decode(kind: Option<FieldKind>, raw: Option<&str>) -> Result<Self, serde_json::Error> {
        match kind {
            Some(FieldKind::Object) => match raw {
                None | Some("") => Ok(Self::Object(Map::new())),
                Some(text) => match serde_json::from_str(text)? {
                    Value::Object(map) => Ok(Self::Object(map)),
                    _ => Ok(Self::Object(Map::new())),
                },
            },
            Some(FieldKind::String) => Ok(Self::Text(raw.unwrap_or_default().to_string())),
            None => {
                let text = raw.unwrap_or("null");
                Ok(serde_json::from_str(text)
                    .map(Self::from_json)
                    .unwrap_or_else(|_| Self::Json(Value::String(text.to_string()))))
            }
        }
    }

    /// Encode for a row column.
    pub fn encode(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Object(map) => Value::Object(map.clone()).to_string(),
            Self::Json(value) => value.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Object(map) => Value::Object(map.clone()),
            Self::Text(text) => Value::String(text.clone()),
            Self::Json(value) => value.clone(),
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(map),
            other => Self::Json(other),
        }
    }
}

/// In-memory unit for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: FieldValue,
    pub meta: EntryMeta,
}

impl Entry {
    pub fn new(value: FieldValue, meta: EntryMeta) -> Self {
        Self { value, meta }
    }

    /// Never-written entry for a declared field.
    pub fn default_for(kind: FieldKind) -> Self {
        Self::new(FieldValue::default_for(kind), EntryMeta::default())
    }
}
