//! Body parser strategy.
//!
//! The dispatcher turns response bodies into values, and caller objects into
//! request parameters, through a [`Parser`]. The default [`JsonParser`] is
//! backed by `serde_json`; a client can be built with any other implementation.

use serde_json::Value;
use std::collections::BTreeMap;

/// Pluggable conversion between bodies and values.
pub trait Parser: Send + Sync + 'static {
    /// Parse a response body.
    fn parse(&self, body: &[u8]) -> Result<Value, String>;

    /// Serialize a value into a request body.
    fn serialize(&self, value: &Value) -> Result<String, String>;

    /// Flatten an object into string parameters.
    fn to_string_map(&self, value: &Value) -> Result<BTreeMap<String, String>, String>;
}

/// `serde_json` parser.
///
/// `to_string_map` accepts a flat object; strings are taken verbatim, other
/// scalars use their JSON text, and `null` members are skipped.
///
/// ```
/// use relay_http::parser::{JsonParser, Parser};
/// use serde_json::json;
///
/// let map = JsonParser.to_string_map(&json!({"page": 2, "q": "rust", "x": null})).unwrap();
/// assert_eq!(map["page"], "2");
/// assert_eq!(map["q"], "rust");
/// assert!(!map.contains_key("x"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn parse(&self, body: &[u8]) -> Result<Value, String> {
        serde_json::from_slice(body).map_err(|e| e.to_string())
    }

    fn serialize(&self, value: &Value) -> Result<String, String> {
        serde_json::to_string(value).map_err(|e| e.to_string())
    }

    fn to_string_map(&self, value: &Value) -> Result<BTreeMap<String, String>, String> {
        let object = value
            .as_object()
            .ok_or_else(|| format!("expected an object, got {}", value))?;

        let mut map = BTreeMap::new();
        for (key, member) in object {
            match member {
                Value::Null => {}
                Value::String(s) => {
                    map.insert(key.clone(), s.clone());
                }
                other => {
                    map.insert(key.clone(), other.to_string());
                }
            }
        }
        Ok(map)
    }
}
