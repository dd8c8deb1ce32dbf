//! Conversion between Firestore typed values and plain JSON.
//!
//! Firestore REST encodes every field as a one-key object naming its type,
//! e.g. `{"stringValue": "Ann"}` or `{"integerValue": "42"}`. Timestamps,
//! references and bytes come back as strings; geo points as
//! `{latitude, longitude}`.

use serde_json::{json, Map, Value};

use crate::provider::ProviderError;

/// Encode a JSON value as a Firestore value.
#[must_use]
pub fn to_firestore(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_firestore).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": fields_to_firestore(map) } }),
    }
}

#[must_use]
pub fn fields_to_firestore(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), to_firestore(value)))
        .collect()
}

/// Decode a Firestore value into plain JSON.
///
/// # Errors
/// Returns `ProviderError::Decode` for unknown value types or malformed payloads.
pub fn from_firestore(value: &Value) -> Result<Value, ProviderError> {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Err(ProviderError::Decode(format!("not a firestore value: {value}")));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "doubleValue" => Ok(inner.clone()),
        "integerValue" => {
            // Encoded as a decimal string (int64).
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                other => other.as_i64(),
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| ProviderError::Decode(format!("bad integerValue: {inner}")))
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = match inner.get("values").and_then(Value::as_array) {
                Some(values) => values
                    .iter()
                    .map(from_firestore)
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "mapValue" => {
            let fields = inner.get("fields").and_then(Value::as_object);
            Ok(Value::Object(match fields {
                Some(fields) => fields_from_firestore(fields)?,
                None => Map::new(),
            }))
        }
        other => Err(ProviderError::Decode(format!(
            "unsupported firestore value type: {other}"
        ))),
    }
}

/// Decode the `fields` object of a document.
///
/// # Errors
/// Returns the first field that fails to decode.
pub fn fields_from_firestore(fields: &Map<String, Value>) -> Result<Map<String, Value>, ProviderError> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), from_firestore(value)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_interview_document_fields() -> Result<(), ProviderError> {
        let fields = json!({
            "userId": { "stringValue": "u1" },
            "finalized": { "booleanValue": true },
            "createdAt": { "timestampValue": "2025-03-01T10:00:00Z" },
            "amount": { "integerValue": "12" },
            "score": { "doubleValue": 4.5 },
            "coverImage": { "nullValue": null },
            "techstack": { "arrayValue": { "values": [
                { "stringValue": "React" },
                { "stringValue": "Rust" }
            ] } },
            "meta": { "mapValue": { "fields": { "level": { "stringValue": "junior" } } } },
            "empty": { "arrayValue": {} }
        });
        let Some(fields) = fields.as_object() else {
            panic!("fixture is an object");
        };

        let decoded = Value::Object(fields_from_firestore(fields)?);
        assert_eq!(
            decoded,
            json!({
                "userId": "u1",
                "finalized": true,
                "createdAt": "2025-03-01T10:00:00Z",
                "amount": 12,
                "score": 4.5,
                "coverImage": null,
                "techstack": ["React", "Rust"],
                "meta": { "level": "junior" },
                "empty": []
            })
        );
        Ok(())
    }

    #[test]
    fn encodes_user_profile() {
        let encoded = to_firestore(&json!({ "name": "Ann", "age": 30, "tags": [true] }));
        assert_eq!(
            encoded,
            json!({ "mapValue": { "fields": {
                "name": { "stringValue": "Ann" },
                "age": { "integerValue": "30" },
                "tags": { "arrayValue": { "values": [ { "booleanValue": true } ] } }
            } } })
        );
    }

    #[test]
    fn rejects_unknown_types() {
        let result = from_firestore(&json!({ "vectorValue": {} }));
        assert!(matches!(result, Err(ProviderError::Decode(_))));
        assert!(from_firestore(&json!("bare")).is_err());
        assert!(from_firestore(&json!({ "integerValue": "x" })).is_err());
    }
}
