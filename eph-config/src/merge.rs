//! Deep merging of layered YAML documents.
//!
//! A key can be in three states in an overlay document: absent (the base value
//! is kept), set to `null` (a tombstone that replaces the base value), or set
//! to a value. Mappings merge key by key, sequences and scalars are replaced.

use eph_core::{Result, WorkspaceError};
use serde_yaml_ng::{Mapping, Value};

/// Merge `overlay` into `base` in place, with overlay taking precedence.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        // Sequences, scalars and explicit nulls replace whatever was there
        (base_val, overlay_val) => {
            *base_val = overlay_val;
        }
    }
}

/// Return a merged copy of two documents.
///
/// A `null` overlay document is an empty layer, not a tombstone for the whole
/// base; tombstones only exist for keys.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    let mut merged = base.clone();
    if !overlay.is_null() {
        deep_merge(&mut merged, overlay.clone());
    }
    merged
}

/// Merge the three layers of a chart-values document in precedence order:
/// system defaults, values computed from the request, then the caller's
/// override document.
pub fn merge_layers(defaults: &Value, computed: &Value, user: &Value) -> Value {
    merge(&merge(defaults, computed), user)
}

/// Parse a YAML document that must be a mapping. Empty input is an empty
/// mapping.
pub fn parse_document(source: &str) -> Result<Value> {
    if source.trim().is_empty() {
        return Ok(Value::Mapping(Mapping::new()));
    }

    let value: Value = serde_yaml_ng::from_str(source)?;
    match value {
        Value::Mapping(_) => Ok(value),
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        other => Err(WorkspaceError::Config(format!(
            "values document must be a mapping, got {}",
            kind_name(&other)
        ))),
    }
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc(source: &str) -> Value {
        parse_document(source).unwrap()
    }

    #[test]
    fn test_deep_merge_keeps_sibling_keys() {
        let base = doc("pachd:\n  rootToken: x\nproxy:\n  enabled: true\n");
        let overlay = doc("pachd:\n  rootToken: y\n");

        let merged = merge(&base, &overlay);

        assert_eq!(merged, doc("pachd:\n  rootToken: y\nproxy:\n  enabled: true\n"));
    }

    #[test]
    fn test_sequences_are_replaced() {
        let base = doc("hosts: [a, b, c]\nports:\n  web: 80\n");
        let overlay = doc("hosts: [z]\nports:\n  api: 81\n");

        let merged = merge(&base, &overlay);

        assert_eq!(merged["hosts"], doc("v: [z]")["v"]);
        assert_eq!(merged["ports"]["web"], Value::from(80));
        assert_eq!(merged["ports"]["api"], Value::from(81));
    }

    #[test]
    fn test_explicit_null_is_a_tombstone() {
        let base = doc("console:\n  enabled: true\n  config:\n    port: 4000\n");
        let overlay = doc("console:\n  config: ~\n");

        let merged = merge(&base, &overlay);

        assert_eq!(merged["console"]["enabled"], Value::Bool(true));
        assert!(merged["console"]["config"].is_null());
        let console = merged["console"].as_mapping().unwrap();
        assert!(console.contains_key("config"));
    }

    #[test]
    fn test_absent_key_is_a_no_op() {
        let base = doc("a: 1\nb: 2\n");
        let overlay = doc("c: 3\n");
        let merged = merge(&base, &overlay);
        assert_eq!(merged, doc("a: 1\nb: 2\nc: 3\n"));
    }

    #[test]
    fn test_null_document_is_an_empty_layer() {
        let base = doc("a: 1\n");
        assert_eq!(merge(&base, &Value::Null), base);
    }

    #[test]
    fn test_mapping_replaces_scalar() {
        let base = doc("tls: false\n");
        let overlay = doc("tls:\n  enabled: true\n");
        assert_eq!(merge(&base, &overlay), overlay);
    }

    #[test]
    fn test_parse_document_rejects_non_mappings() {
        assert!(parse_document("- a\n- b\n").is_err());
        assert!(parse_document("just a string").is_err());
        assert!(parse_document("key: [unclosed").is_err());
        assert_eq!(parse_document("   \n").unwrap(), Value::Mapping(Mapping::new()));
        assert_eq!(parse_document("~").unwrap(), Value::Mapping(Mapping::new()));
    }

    fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|i| Value::from(i64::from(i))),
            "[a-z]{0,6}".prop_map(Value::String),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Sequence),
                prop::collection::btree_map("[a-d]", inner, 0..4).prop_map(|entries| {
                    Value::Mapping(
                        entries
                            .into_iter()
                            .map(|(k, v)| (Value::String(k), v))
                            .collect(),
                    )
                }),
            ]
        })
    }

    fn arb_document() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-d]", arb_value(), 0..5).prop_map(|entries| {
            Value::Mapping(
                entries
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), v))
                    .collect(),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(a in arb_document(), b in arb_document()) {
            let once = merge(&a, &b);
            let twice = merge(&once, &b);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_overlay_scalars_win(a in arb_document(), b in arb_document()) {
            let merged = merge(&a, &b);
            let overlay = b.as_mapping().unwrap();
            for (key, value) in overlay {
                if !matches!(value, Value::Mapping(_)) {
                    prop_assert_eq!(&merged[key], value);
                }
            }
        }

        #[test]
        fn prop_base_only_keys_survive(a in arb_document(), b in arb_document()) {
            let merged = merge(&a, &b);
            let overlay = b.as_mapping().unwrap();
            for (key, value) in a.as_mapping().unwrap() {
                if !overlay.contains_key(key) {
                    prop_assert_eq!(&merged[key], value);
                }
            }
        }
    }
}
