use serde_json::{Map, Value};

/// Shallow key-union of thread state: every key from `incoming` overwrites the
/// same key in `existing`, every other existing key is kept. Never a
/// wholesale replace.
pub fn merge_state(existing: &Map<String, Value>, incoming: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = existing.clone();
    for (key, value) in incoming {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Newer of two provider event timestamps; thread recency only moves forward.
pub fn latest_event_at(existing: Option<i64>, incoming: i64) -> i64 {
    existing.map_or(incoming, |e| e.max(incoming))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn new_keys_win_and_old_keys_survive() {
        let existing = map(json!({"a": 1, "b": {"x": 1}}));
        let incoming = map(json!({"b": {"y": 2}, "c": 3}));
        let merged = merge_state(&existing, &incoming);
        assert_eq!(Value::Object(merged), json!({"a": 1, "b": {"y": 2}, "c": 3}));
    }

    #[test]
    fn empty_incoming_is_identity() {
        let existing = map(json!({"a": 1}));
        assert_eq!(merge_state(&existing, &Map::new()), existing);
    }

    #[test]
    fn recency_never_moves_backwards() {
        assert_eq!(latest_event_at(None, 5), 5);
        assert_eq!(latest_event_at(Some(10), 5), 10);
        assert_eq!(latest_event_at(Some(10), 20), 20);
    }
}
