//! Serde helpers for the backend's wire shapes.
//!
//! The backend renders choice fields as `{"value": "active", "label": "Active"}`
//! in responses but accepts the bare value on writes. These helpers accept
//! both forms and always serialize the bare value.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize an optional choice field from a bare value or a `{value, label}` object.
pub fn choice<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let inner = match raw {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(mut map)) => map.remove("value").unwrap_or(Value::Null),
        Some(other) => other,
    };
    if inner.is_null() {
        return Ok(None);
    }
    T::deserialize(inner).map(Some).map_err(D::Error::custom)
}

/// Deserialize a number the backend may render as a decimal string (`"2.00"`).
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid decimal {s:?}: {e}"))),
        Some(other) => Err(D::Error::custom(format!("expected a number, got {other}"))),
    }
}
