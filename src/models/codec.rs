//! Value codec for nested structures persisted as JSON text.
//!
//! Binary values written by existing databases appear in one of two shapes:
//! the Node Buffer form `{"type": "Buffer", "data": [18, 52]}` or an object
//! keyed by element index `{"0": 18, "1": 52}`. The decoder restores either;
//! the encoder always emits the Buffer form.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Serde adapter for `Option<Vec<u8>>` fields stored in Buffer form.
pub mod buffer_opt {
    use super::*;
    use serde::ser::SerializeMap;

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            None => serializer.serialize_none(),
            Some(bytes) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "Buffer")?;
                map.serialize_entry("data", bytes)?;
                map.end()
            }
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(other) => decode_binary(&other)
                .map(Some)
                .ok_or_else(|| D::Error::custom("expected a Buffer-encoded binary value")),
        }
    }
}

/// Decodes a binary value from either persisted JSON shape.
pub fn decode_binary(value: &Value) -> Option<Vec<u8>> {
    let map = value.as_object()?;

    if map.get("type").and_then(Value::as_str) == Some("Buffer") {
        let data = map.get("data")?.as_array()?;
        return data
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect();
    }

    // Index-keyed object form: {"0": b0, "1": b1, ...}
    let mut entries: Vec<(usize, u8)> = Vec::with_capacity(map.len());
    for (key, v) in map {
        let index = key.parse::<usize>().ok()?;
        let byte = v.as_u64().and_then(|n| u8::try_from(n).ok())?;
        entries.push((index, byte));
    }
    entries.sort_by_key(|(index, _)| *index);
    Some(entries.into_iter().map(|(_, byte)| byte).collect())
}
