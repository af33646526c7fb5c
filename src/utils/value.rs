/// Rendering of parsed YAML/JSON scalars as plain strings
use serde_yaml::Value;

/// Render a scalar value the way it reads in the source document.
///
/// Returns `None` for `null`, sequences and mappings. Tagged scalars are
/// rendered by their inner value.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}
