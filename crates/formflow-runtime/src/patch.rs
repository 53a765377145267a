//! Deep-patch reconciliation
//!
//! Structurally matches an arbitrary external data object's keys against a
//! graph's control names and assigns the found values. Traversal is
//! pre-order depth-first: object entries in document order, array elements
//! in index order, descending into each value before moving to the next
//! sibling. The first occurrence of a control name wins; later occurrences
//! at any depth are ignored. Unknown keys are silent no-ops, so data
//! objects may carry more fields than any one schema cares about.

use serde_json::Value;
use std::collections::HashSet;

/// Collect `(control, value)` assignments for every control name found in
/// the data object. Deterministic and idempotent for a fixed data object.
pub fn deep_patch_values(data: &Value, control_names: &HashSet<String>) -> Vec<(String, Value)> {
    let mut patches = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    walk(data, control_names, &mut seen, &mut patches);
    patches
}

fn walk<'a>(
    node: &'a Value,
    control_names: &HashSet<String>,
    seen: &mut HashSet<&'a str>,
    patches: &mut Vec<(String, Value)>,
) {
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                if control_names.contains(key.as_str()) && seen.insert(key.as_str()) {
                    patches.push((key.clone(), value.clone()));
                }
                walk(value, control_names, seen, patches);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, control_names, seen, patches);
            }
        }
        _ => {}
    }
}
