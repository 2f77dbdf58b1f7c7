/// Before/after value capture for update events
use crate::error::{IpamError, IpamResult};
use serde::Serialize;
use serde_json::{Map, Value};

pub type Values = Map<String, Value>;

/// Serialize a record into a flat JSON object
pub fn snapshot_of<T: Serialize>(value: &T) -> IpamResult<Values> {
    match serde_json::to_value(value)
        .map_err(|e| IpamError::Internal(format!("Failed to snapshot record: {}", e)))?
    {
        Value::Object(map) => Ok(map),
        other => Err(IpamError::Internal(format!(
            "Snapshot is not an object: {}",
            other
        ))),
    }
}

/// Keep only the listed keys
pub fn only(values: &Values, keys: &[&str]) -> Values {
    keys.iter()
        .filter_map(|key| values.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

/// Supplied fields paired with their prior values
///
/// `old` and `new` always carry the same key set: exactly the supplied keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDiff {
    pub old: Values,
    pub new: Values,
}

impl FieldDiff {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty()
    }

    /// Keys whose value actually differs
    pub fn changed_keys(&self) -> Vec<String> {
        self.new
            .iter()
            .filter(|(key, value)| self.old.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Compare supplied values against the record's prior state
pub fn changed_fields(before: &Values, supplied: &Values) -> FieldDiff {
    let mut diff = FieldDiff::default();
    for (key, value) in supplied {
        diff.old
            .insert(key.clone(), before.get(key).cloned().unwrap_or(Value::Null));
        diff.new.insert(key.clone(), value.clone());
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Values {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_key_sets_match_supplied_fields() {
        let before = object(json!({"id": 1, "name": "Alice", "email": "a@example.com", "status": "active"}));
        let supplied = object(json!({"name": "Alicia", "status": "active"}));

        let diff = changed_fields(&before, &supplied);

        let old_keys: Vec<&String> = diff.old.keys().collect();
        let new_keys: Vec<&String> = diff.new.keys().collect();
        assert_eq!(old_keys, new_keys);
        assert_eq!(diff.old["name"], json!("Alice"));
        assert_eq!(diff.changed_keys(), vec!["name".to_string()]);
    }

    #[test]
    fn test_applying_new_values_reproduces_current_state() {
        let before = object(json!({"label": "core", "comment": null, "ip": "10.0.0.5"}));
        let supplied = object(json!({"label": "edge", "comment": "moved"}));

        let diff = changed_fields(&before, &supplied);

        let mut restored = before.clone();
        for (key, value) in &diff.old {
            assert_eq!(restored.get(key), Some(value));
        }
        for (key, value) in &diff.new {
            restored.insert(key.clone(), value.clone());
        }
        assert_eq!(restored["label"], json!("edge"));
        assert_eq!(restored["ip"], json!("10.0.0.5"));
    }

    #[test]
    fn test_snapshot_and_only() {
        #[derive(Serialize)]
        struct Row {
            id: i64,
            name: &'static str,
            secret: &'static str,
        }

        let snapshot = snapshot_of(&Row { id: 4, name: "x", secret: "s" }).unwrap();
        let trimmed = only(&snapshot, &["id", "name", "missing"]);

        assert_eq!(trimmed.len(), 2);
        assert!(!trimmed.contains_key("secret"));
        assert!(snapshot_of(&5).is_err());
    }

    #[test]
    fn test_unchanged_supply_keeps_keys() {
        let before = object(json!({"label": "core"}));
        let supplied = object(json!({"label": "core"}));

        let diff = changed_fields(&before, &supplied);
        assert!(!diff.is_empty());
        assert!(diff.changed_keys().is_empty());
        assert!(changed_fields(&before, &Values::new()).is_empty());
    }
}
