/*!
 * Serde utilities for the loosely-typed fields of cloud update payloads.
 *
 * The management plane has shipped the same field with different JSON
 * representations over time: numeric actions sometimes arrive quoted, and
 * the update manifest arrives either as an object or as a string holding
 * serialized JSON. These helpers accept every representation seen in the
 * field.
 */

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize an optional integer that may be represented as a number or string.
///
/// Accepts:
/// - Missing/null (returns None)
/// - Integer numbers
/// - Floating-point numbers (truncated)
/// - String representations of numbers
///
/// # Usage with serde
///
/// ```rust
/// use serde::Deserialize;
/// use update_agent_core::utils::serde::deserialize_optional_numeric;
///
/// #[derive(Deserialize)]
/// struct Workflow {
///     #[serde(default, deserialize_with = "deserialize_optional_numeric")]
///     action: Option<i64>,
/// }
/// ```
pub fn deserialize_optional_numeric<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Some(f as i64))
            } else {
                Err(D::Error::custom(format!("Invalid numeric value: {n}")))
            }
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .or_else(|_| s.trim().parse::<f64>().map(|f| Some(f as i64)))
            .map_err(|_| D::Error::custom(format!("Cannot parse '{s}' as numeric"))),
        Some(other) => Err(D::Error::custom(format!(
            "Expected numeric value, found: {other:?}"
        ))),
    }
}

/// Deserialize a JSON document that may be embedded as a string.
///
/// `"{\"a\":1}"` and `{"a":1}` both yield the object; null or a missing field
/// yields `None`.
pub fn deserialize_embedded_json<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| D::Error::custom(format!("Embedded JSON is invalid: {e}"))),
        Some(other) => Ok(Some(other)),
    }
}
