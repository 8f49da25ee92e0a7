//! Custom assertions for integration tests

use std::collections::BTreeMap;

use serde_json::Value;

/// Assert that two file trees are byte-identical, naming the first difference
pub fn assert_same_tree(before: &BTreeMap<String, Vec<u8>>, after: &BTreeMap<String, Vec<u8>>) {
    for (path, bytes) in before {
        match after.get(path) {
            None => panic!("{} disappeared", path),
            Some(now) => assert!(now == bytes, "{} changed", path),
        }
    }
    for path in after.keys() {
        assert!(before.contains_key(path), "{} appeared", path);
    }
}

/// Assert a tool envelope succeeded and return it
pub fn assert_tool_success(envelope: &Value) -> &Value {
    assert_eq!(
        envelope["success"],
        Value::Bool(true),
        "expected success:\n{}",
        serde_json::to_string_pretty(envelope).unwrap_or_default()
    );
    envelope
}

/// Assert a tool envelope failed with `category`
pub fn assert_tool_failure(envelope: &Value, category: &str) {
    assert_eq!(envelope["success"], Value::Bool(false), "expected failure: {}", envelope);
    assert_eq!(envelope["category"], Value::String(category.to_string()));
    assert!(envelope["error"].is_string(), "failure without error: {}", envelope);
    assert!(envelope["timestamp"].is_string(), "failure without timestamp: {}", envelope);
}

/// Strings of a JSON array
pub fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
