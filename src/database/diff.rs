use crate::database::models::ChangeType;
use crate::ingest::flatten::{FieldKey, FieldMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub change_type: ChangeType,
    pub field: FieldKey,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Classifies every `(category, key)` present in either map. Unchanged
/// fields produce nothing. Output is ordered by field key.
pub fn diff_fields(current: &FieldMap, incoming: &FieldMap) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    for (field, new_value) in incoming {
        match current.get(field) {
            None => changes.push(FieldChange {
                change_type: ChangeType::Added,
                field: field.clone(),
                old_value: None,
                new_value: Some(new_value.clone()),
            }),
            Some(old_value) if old_value != new_value => changes.push(FieldChange {
                change_type: ChangeType::Updated,
                field: field.clone(),
                old_value: Some(old_value.clone()),
                new_value: Some(new_value.clone()),
            }),
            Some(_) => {}
        }
    }

    for (field, old_value) in current {
        if !incoming.contains_key(field) {
            changes.push(FieldChange {
                change_type: ChangeType::Removed,
                field: field.clone(),
                old_value: Some(old_value.clone()),
                new_value: None,
            });
        }
    }

    changes.sort_by(|a, b| a.field.cmp(&b.field));
    changes
}
