//! Recursive key lowercasing for JSON values

use serde_json::{Map, Value};
use statsync_common::Dataset;

/// Return a copy of `value` with every mapping key lowercased, at any depth
///
/// Sequences keep their order and scalars pass through untouched. When two
/// keys of one mapping lowercase to the same string, the one that comes later
/// in the source mapping wins. The input is never modified, and applying the
/// function to its own output changes nothing.
pub fn lowercase_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                out.insert(key.to_lowercase(), lowercase_keys(inner));
            }
            Value::Object(out)
        },
        Value::Array(items) => Value::Array(items.iter().map(lowercase_keys).collect()),
        scalar => scalar.clone(),
    }
}

/// Apply [`lowercase_keys`] to every record of a dataset
pub fn normalize_dataset(dataset: &Dataset) -> Dataset {
    dataset.map(lowercase_keys)
}
