//! Turns a nested metadata document into flat `(category, key) -> value` entries.
//!
//! Top-level keys are categories. A map category yields one field per inner
//! key, a list of maps yields synthetic `<category>_<index>` categories.
//! Output is a `BTreeMap`, so the same document always flattens to the same
//! ordered set of fields, which the diff engine relies on.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ingest::normalize;
use crate::utils::config::FlattenSettings;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldKey {
    pub category: String,
    pub key: String,
}

impl FieldKey {
    pub fn new(category: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.category, self.key)
    }
}

pub type FieldMap = BTreeMap<FieldKey, String>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub fields: FieldMap,
    pub derived: FieldMap,
}

impl Extracted {
    /// Everything that ends up in the fields table.
    pub fn all(&self) -> FieldMap {
        let mut all = self.fields.clone();
        all.extend(self.derived.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }
}

#[derive(Debug, Clone)]
pub struct Flattener {
    settings: FlattenSettings,
}

impl Flattener {
    pub fn new(settings: FlattenSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FlattenSettings {
        &self.settings
    }

    /// Flattened fields and, separately, the normalized fields derived from
    /// them. Both are stored; only the former is tracked in history.
    pub fn extract(&self, document: &Value) -> Extracted {
        let fields = self.flatten(document);
        let derived = normalize::normalized_fields(&fields, &self.settings.normalized_category);
        Extracted { fields, derived }
    }

    pub fn flatten(&self, document: &Value) -> FieldMap {
        let mut fields = FieldMap::new();
        let Value::Object(categories) = document else {
            return fields;
        };

        for (category, value) in categories {
            if self.is_reserved(category) {
                continue;
            }
            match value {
                Value::Null => {}
                Value::Object(map) => self.flatten_category(category, map, &mut fields),
                Value::Array(items) if items.iter().all(Value::is_object) => {
                    for (index, item) in items.iter().enumerate() {
                        if let Value::Object(map) = item {
                            let synthetic = format!("{}_{}", category, index);
                            self.flatten_category(&synthetic, map, &mut fields);
                        }
                    }
                }
                // Bare scalars and mixed lists are kept as a single field.
                other => {
                    if let Some(text) = self.stringify(other) {
                        fields.insert(FieldKey::new(category.as_str(), "value"), text);
                    }
                }
            }
        }

        fields
    }

    fn flatten_category(&self, category: &str, map: &Map<String, Value>, fields: &mut FieldMap) {
        if self.is_locked(map) {
            return;
        }
        for (key, value) in map {
            if self.is_reserved(key) {
                continue;
            }
            if let Some(text) = self.stringify(value) {
                fields.insert(FieldKey::new(category, key.as_str()), text);
            }
        }
    }

    fn is_reserved(&self, key: &str) -> bool {
        !self.settings.reserved_prefix.is_empty() && key.starts_with(&self.settings.reserved_prefix)
    }

    fn is_locked(&self, map: &Map<String, Value>) -> bool {
        match map.get(&self.settings.locked_marker) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    /// Null means absent. Composite values are serialized to compact JSON
    /// and everything is cut to `max_value_len` characters.
    fn stringify(&self, value: &Value) -> Option<String> {
        let text = match value {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => value.to_string(),
        };
        Some(truncate_chars(text, self.settings.max_value_len))
    }
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text,
    }
}
