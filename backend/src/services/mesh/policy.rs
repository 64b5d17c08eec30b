//! Shared ACL document that keeps each namespace on its own segment.
//!
//! The control plane denies everything not matched by an `acls` entry, so a
//! namespace is isolated once it has exactly the self-referencing rule
//! `ns@ -> ns@:*` and nothing grants it wider reach.

use serde::de::Error as _;
use serde_json::{json, Value};

fn principal(namespace: &str) -> String {
    format!("{}@", namespace)
}

pub fn isolation_rule(namespace: &str) -> Value {
    let who = principal(namespace);
    json!({
        "action": "accept",
        "src": [who.clone()],
        "dst": [format!("{}:*", who)],
    })
}

pub fn has_isolation_rule(policy: &Value, namespace: &str) -> bool {
    let expected = isolation_rule(namespace);
    policy
        .get("acls")
        .and_then(Value::as_array)
        .map(|rules| rules.iter().any(|rule| *rule == expected))
        .unwrap_or(false)
}

/// Adds the namespace's rule to `raw`.
///
/// Returns `Ok(None)` when the rule is already present, so callers can skip
/// the write. An empty document is treated as a fresh policy; a document that
/// is not an object, or whose `acls` is not an array, is refused unchanged.
pub fn with_isolation_rule(raw: &str, namespace: &str) -> Result<Option<String>, serde_json::Error> {
    let mut policy: Value = if raw.trim().is_empty() {
        json!({ "acls": [] })
    } else {
        serde_json::from_str(raw)?
    };
    if has_isolation_rule(&policy, namespace) {
        return Ok(None);
    }

    let Some(document) = policy.as_object_mut() else {
        return Err(serde_json::Error::custom("policy is not a JSON object"));
    };
    let rule = isolation_rule(namespace);
    match document.get_mut("acls") {
        None => {
            document.insert("acls".to_string(), json!([rule]));
        }
        Some(Value::Array(rules)) => rules.push(rule),
        Some(_) => return Err(serde_json::Error::custom("policy acls is not an array")),
    }
    serde_json::to_string_pretty(&policy).map(Some)
}
