//! Property values for dataset nodes
//!
//! Node properties are an open mapping with JSON-scalar values. The map is
//! ordered so that its JSON rendering is stable across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// JSON-scalar property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Null,
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Float value, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{}", s),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Float(fl) => write!(f, "{}", fl),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::Null => write!(f, "null"),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Integer(i)
    }
}

impl From<usize> for PropertyValue {
    fn from(i: usize) -> Self {
        PropertyValue::Integer(i as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        PropertyValue::Float(f)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(PropertyValue::Null)
    }
}

/// Ordered property map for dataset nodes
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Render a property map as compact JSON with keys in lexical order.
pub fn properties_to_json(props: &PropertyMap) -> serde_json::Result<String> {
    serde_json::to_string(props)
}

/// Parse a JSON property column. Unknown keys are kept as-is.
pub fn properties_from_json(json: &str) -> serde_json::Result<PropertyMap> {
    if json.trim().is_empty() {
        return Ok(PropertyMap::new());
    }
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_conversions() {
        let string_prop: PropertyValue = "hello".into();
        assert_eq!(string_prop.as_string(), Some("hello"));

        let int_prop: PropertyValue = 42i64.into();
        assert_eq!(int_prop.as_integer(), Some(42));
        assert_eq!(int_prop.as_float(), Some(42.0));

        let bool_prop: PropertyValue = true.into();
        assert_eq!(bool_prop, PropertyValue::Boolean(true));
        assert_eq!(bool_prop.to_string(), "true");

        let none: PropertyValue = Option::<&str>::None.into();
        assert!(none.is_null());
    }

    #[test]
    fn test_json_is_ordered_and_untagged() {
        let mut props = PropertyMap::new();
        props.insert("zeta".to_string(), 1i64.into());
        props.insert("alpha".to_string(), "x".into());
        props.insert("area".to_string(), 12.5.into());
        props.insert("spare".to_string(), PropertyValue::Null);
        let json = properties_to_json(&props).unwrap();
        assert_eq!(json, r#"{"alpha":"x","area":12.5,"spare":null,"zeta":1}"#);
    }

    #[test]
    fn test_json_round_trip_tolerates_unknown_keys() {
        let parsed = properties_from_json(r#"{"quantity":"temperature","vendor_tag":7,"ok":true}"#).unwrap();
        assert_eq!(parsed.get("quantity").unwrap().as_string(), Some("temperature"));
        assert_eq!(parsed.get("vendor_tag").unwrap().as_integer(), Some(7));
        assert_eq!(parsed.get("ok"), Some(&PropertyValue::Boolean(true)));
        assert!(properties_from_json("").unwrap().is_empty());
    }
}
