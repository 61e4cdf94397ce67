//! Serde helpers for exchange payloads that encode numbers inconsistently.

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

/// Deserialize a number that may be encoded either as a JSON number or a JSON string.
///
/// eg/ `"16578.50"` or `16578.5`
pub fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_as_f64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected numeric value, got {value}")))
}

/// Optional variant of [`de_f64`], treating `null` and empty strings as `None`.
pub fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(value) => value_as_f64(&value).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!("expected numeric value, got {value}"))
        }),
    }
}

/// Deserialize a value into `T`, yielding `None` rather than failing if the value is missing,
/// `null`, or of the wrong shape.
///
/// Used for externally generated documents where a single malformed optional field must not
/// invalidate the whole payload.
pub fn de_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

/// Deserialize an optional number leniently, accepting numeric strings and yielding `None` for
/// anything else.
pub fn de_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| value_as_f64(&value))
}

/// Deserialize a list leniently, skipping elements that fail to deserialize. A missing,
/// `null`, or non-array value yields an empty list.
pub fn de_lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(vec![]);
    };

    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Deserialize a possibly `null` collection as its `Default`.
pub fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Interpret a JSON number or numeric string as an `f64`.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
    .filter(|number: &f64| number.is_finite())
}

/// Interpret a JSON number or numeric string as an `i64`.
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64)),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_as_f64() {
        struct TestCase {
            input: Value,
            expected: Option<f64>,
        }

        let tests = vec![
            TestCase {
                // TC0: string encoded number
                input: json!("16578.50"),
                expected: Some(16578.5),
            },
            TestCase {
                // TC1: json number
                input: json!(0.001),
                expected: Some(0.001),
            },
            TestCase {
                // TC2: non numeric string
                input: json!("abc"),
                expected: None,
            },
            TestCase {
                // TC3: null
                input: Value::Null,
                expected: None,
            },
            TestCase {
                // TC4: non finite
                input: json!("NaN"),
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = value_as_f64(&test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_de_lenient_and_null_default() {
        #[derive(Debug, Deserialize)]
        struct Doc {
            #[serde(default, deserialize_with = "de_lenient")]
            level: Option<f64>,
            #[serde(default, deserialize_with = "de_null_default")]
            items: Vec<u32>,
        }

        let doc: Doc = serde_json::from_str(r#"{"level": "not a number", "items": null}"#).unwrap();
        assert_eq!(doc.level, None);
        assert!(doc.items.is_empty());

        let doc: Doc = serde_json::from_str(r#"{"level": 2500.5, "items": [1, 2]}"#).unwrap();
        assert_eq!(doc.level, Some(2500.5));
        assert_eq!(doc.items, vec![1, 2]);

        let doc: Doc = serde_json::from_str("{}").unwrap();
        assert_eq!(doc.level, None);
    }

    #[test]
    fn test_de_lenient_vec_and_f64() {
        #[derive(Debug, Deserialize)]
        struct Level {
            #[serde(default, deserialize_with = "de_lenient_f64")]
            price: Option<f64>,
        }

        #[derive(Debug, Deserialize)]
        struct Doc {
            #[serde(default, deserialize_with = "de_lenient_vec")]
            levels: Vec<Level>,
        }

        let doc: Doc =
            serde_json::from_str(r#"{"levels": [{"price": "2500.5"}, 7, {"price": true}, {}]}"#)
                .unwrap();
        let prices = doc.levels.iter().map(|level| level.price).collect::<Vec<_>>();
        assert_eq!(prices, vec![Some(2500.5), None, None]);

        let doc: Doc = serde_json::from_str(r#"{"levels": {"price": 1}}"#).unwrap();
        assert!(doc.levels.is_empty());
    }
}
