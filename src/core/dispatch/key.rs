//! Idempotency keys for function calls.
//!
//! The upstream service may retransmit a call, so identity is derived from
//! the call's content and the timestamp of the event that carried it.

use std::collections::BTreeMap;

use time::OffsetDateTime;
use xxhash_rust::xxh3::xxh3_128;

/// Canonical serialization of call arguments: a key-sorted JSON object.
pub fn canonical_args(args: &BTreeMap<String, String>) -> String {
    // BTreeMap iterates in key order, so the JSON object is sorted.
    serde_json::to_string(args).unwrap_or_default()
}

/// Deterministic identity of a function call, as 32 lowercase hex chars.
pub fn idempotency_key(
    name: &str,
    args: &BTreeMap<String, String>,
    issued_at: OffsetDateTime,
) -> String {
    let mut s = String::new();
    s.push_str(name);
    s.push('|');
    s.push_str(&canonical_args(args));
    s.push('|');
    s.push_str(&issued_at.unix_timestamp_nanos().to_string());
    let hash = xxh3_128(s.as_bytes());
    format!("{hash:032x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_key_is_stable() {
        let at = datetime!(2025-06-01 10:00:00.123456789 UTC);
        let a = idempotency_key("create_task", &args(&[("title", "Buy milk")]), at);
        let b = idempotency_key("create_task", &args(&[("title", "Buy milk")]), at);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_argument_insertion_order_is_irrelevant() {
        let at = datetime!(2025-06-01 10:00:00 UTC);
        let mut first = BTreeMap::new();
        first.insert("b".to_string(), "2".to_string());
        first.insert("a".to_string(), "1".to_string());
        let second = args(&[("a", "1"), ("b", "2")]);

        assert_eq!(canonical_args(&first), r#"{"a":"1","b":"2"}"#);
        assert_eq!(
            idempotency_key("f", &first, at),
            idempotency_key("f", &second, at)
        );
    }

    #[test]
    fn test_each_component_changes_key() {
        let at = datetime!(2025-06-01 10:00:00 UTC);
        let base = idempotency_key("create_task", &args(&[("title", "a")]), at);

        assert_ne!(
            base,
            idempotency_key("delete_task", &args(&[("title", "a")]), at)
        );
        assert_ne!(
            base,
            idempotency_key("create_task", &args(&[("title", "b")]), at)
        );
        assert_ne!(
            base,
            idempotency_key(
                "create_task",
                &args(&[("title", "a")]),
                at + time::Duration::nanoseconds(1)
            )
        );
    }

    #[test]
    fn test_separator_cannot_be_forged_by_name() {
        let at = datetime!(2025-06-01 10:00:00 UTC);
        // JSON quoting keeps argument text from colliding with the name.
        assert_ne!(
            idempotency_key("a|{}", &BTreeMap::new(), at),
            idempotency_key("a", &BTreeMap::new(), at)
        );
    }
}
