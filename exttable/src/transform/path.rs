//! Null-safe traversal of loosely structured JSON records.

use serde_json::Value;

/// Key holding the payload of a wrapped leaf, as in `{"Value": 1}`.
const WRAPPED_VALUE_KEY: &str = "Value";

/// Follows `path` into `record`, one segment per nesting level.
///
/// Objects are indexed by key and arrays by numeric position. Any missing key, out of range
/// index, non-numeric array segment, indexing into a scalar or `null` intermediate ends the walk
/// with [`None`].
pub fn lookup<'a, S>(record: &'a Value, path: &[S]) -> Option<&'a Value>
where
    S: AsRef<str>,
{
    let Some((segment, rest)) = path.split_first() else {
        return Some(record);
    };

    let child = match record {
        Value::Object(map) => map.get(segment.as_ref())?,
        Value::Array(items) => items.get(segment.as_ref().parse::<usize>().ok()?)?,
        _ => return None,
    };

    lookup(child, rest)
}

/// Extracts the scalar carried by a leaf.
///
/// Wrapped leaves (`{"Value": x}`) yield `x`. Scalars yield themselves. `null`, arrays and objects
/// without a `Value` key yield [`None`].
pub fn leaf_value(value: &Value) -> Option<&Value> {
    match value {
        Value::Null | Value::Array(_) => None,
        Value::Object(map) => match map.get(WRAPPED_VALUE_KEY)? {
            Value::Null | Value::Array(_) | Value::Object(_) => None,
            inner => Some(inner),
        },
        scalar => Some(scalar),
    }
}

/// Looks up `path` and extracts its leaf in one step.
pub fn lookup_leaf<'a, S>(record: &'a Value, path: &[S]) -> Option<&'a Value>
where
    S: AsRef<str>,
{
    lookup(record, path).and_then(leaf_value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn walks_nested_objects() {
        let record = json!({"addr": {"city": {"Value": "Bristol"}}});

        assert_eq!(
            lookup_leaf(&record, &["addr", "city"]),
            Some(&json!("Bristol"))
        );
    }

    #[test]
    fn indexes_arrays_by_position() {
        let record = json!({"phones": [{"Value": "a"}, {"Value": "b"}]});

        assert_eq!(lookup_leaf(&record, &["phones", "1"]), Some(&json!("b")));
        assert_eq!(lookup_leaf(&record, &["phones", "2"]), None);
        assert_eq!(lookup_leaf(&record, &["phones", "first"]), None);
    }

    #[test]
    fn failures_short_circuit_to_none() {
        let record = json!({"addr": null, "name": "x"});

        assert_eq!(lookup(&record, &["addr", "city"]), None);
        assert_eq!(lookup(&record, &["name", "first"]), None);
        assert_eq!(lookup(&record, &["missing"]), None);
    }

    #[test]
    fn leaves_unwrap_value_objects_and_keep_scalars() {
        assert_eq!(leaf_value(&json!({"Value": 3})), Some(&json!(3)));
        assert_eq!(leaf_value(&json!(true)), Some(&json!(true)));
        assert_eq!(leaf_value(&json!({"Value": null})), None);
        assert_eq!(leaf_value(&json!({"Other": 1})), None);
        assert_eq!(leaf_value(&json!([1, 2])), None);
        assert_eq!(leaf_value(&Value::Null), None);
    }
}
