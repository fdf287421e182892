use serde_json::{Map, Value};

/// Deep-merges `overlay` into `base`.
///
/// Nested objects merge key by key; any other overlay value replaces the base
/// value outright.
pub fn merge_json(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_json(existing, incoming),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
