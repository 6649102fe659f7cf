//! Field snapshots and the snapshot diff.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field name → value of one entity at one revision.
pub type Snapshot = BTreeMap<String, Value>;

/// Old and new value of a changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub old: Value,
    pub new: Value,
}

/// Compare two snapshots field by field.
///
/// Only fields whose value differs are returned. A field missing on one side
/// is compared as `null`.
#[must_use]
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> BTreeMap<String, FieldDiff> {
    let mut diff = BTreeMap::new();
    for name in old.keys().chain(new.keys()) {
        if diff.contains_key(name) {
            continue;
        }
        let before = old.get(name).unwrap_or(&Value::Null);
        let after = new.get(name).unwrap_or(&Value::Null);
        if before != after {
            diff.insert(
                name.clone(),
                FieldDiff {
                    old: before.clone(),
                    new: after.clone(),
                },
            );
        }
    }
    diff
}

/// Names of the fields whose value differs between two snapshots.
#[must_use]
pub fn changed_fields(old: &Snapshot, new: &Snapshot) -> Vec<String> {
    diff_snapshots(old, new).into_keys().collect()
}
