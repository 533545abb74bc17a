//! Primary-store records.
//!
//! A record is an ordered mapping of field name to value. Values may nest
//! one record inside another (e.g. a row wrapped under its entity alias, or
//! an embedded association). Field order is insertion order and is the
//! order the extractor concatenates text in.

use std::borrow::Cow;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::key::AssociationKey;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Raw bytes as stored; may not be valid UTF-8.
    Bytes(Vec<u8>),
    Nested(Record),
}

impl FieldValue {
    /// Text content for string-like values (`Text` and `Bytes`).
    ///
    /// Bytes are decoded lossily: undecodable sequences become U+FFFD.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            FieldValue::Bytes(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, FieldValue::Text(_) | FieldValue::Bytes(_))
    }

    pub fn as_nested(&self) -> Option<&Record> {
        match self {
            FieldValue::Nested(r) => Some(r),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

impl From<Record> for FieldValue {
    fn from(value: Record) -> Self {
        FieldValue::Nested(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// An ordered field name → value mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Insert or replace a field, keeping its original position on replace.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.shift_remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read the association key stored in `primary_key`.
    ///
    /// Text and integer values qualify; empty text does not.
    pub fn key_of(&self, primary_key: &str) -> Option<AssociationKey> {
        let key = match self.fields.get(primary_key)? {
            FieldValue::Integer(i) => AssociationKey::from(*i),
            value @ (FieldValue::Text(_) | FieldValue::Bytes(_)) => {
                AssociationKey::new(value.as_text()?.into_owned())
            }
            _ => return None,
        };
        (!key.is_empty()).then_some(key)
    }

    /// Unwrap a record nested under its entity alias.
    ///
    /// `{"Person": {"id": 1, ...}}` yields the inner record; any other shape
    /// yields `self`.
    pub fn unwrap_alias(&self, alias: &str) -> &Record {
        match self.fields.get(alias) {
            Some(FieldValue::Nested(inner)) => inner,
            _ => self,
        }
    }

    /// Flatten nested records into dotted paths, in iteration order.
    ///
    /// `{"a": {"b": "x"}, "c": 1}` becomes `[("a.b", "x"), ("c", 1)]`.
    pub fn flatten(&self) -> Vec<(String, &FieldValue)> {
        let mut out = Vec::with_capacity(self.fields.len());
        flatten_into(self, None, &mut out);
        out
    }
}

fn flatten_into<'a>(
    record: &'a Record,
    prefix: Option<&str>,
    out: &mut Vec<(String, &'a FieldValue)>,
) {
    for (name, value) in &record.fields {
        let path = match prefix {
            Some(p) => format!("{}.{}", p, name),
            None => name.clone(),
        };
        match value {
            FieldValue::Nested(inner) => flatten_into(inner, Some(&path), out),
            leaf => out.push((path, leaf)),
        }
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_preserves_order_and_paths() {
        let record = Record::new()
            .with("id", 1)
            .with("name", "alan")
            .with("address", Record::new().with("city", "Boise").with("zip", 83702))
            .with("bio", "junk");

        let flat: Vec<String> = record.flatten().into_iter().map(|(k, _)| k).collect();
        assert_eq!(flat, vec!["id", "name", "address.city", "address.zip", "bio"]);
    }

    #[test]
    fn test_key_of() {
        let record = Record::new().with("id", 222).with("uuid", "page-1").with("blank", "");
        assert_eq!(record.key_of("id"), Some(AssociationKey::from("222")));
        assert_eq!(record.key_of("uuid"), Some(AssociationKey::from("page-1")));
        assert_eq!(record.key_of("blank"), None);
        assert_eq!(record.key_of("missing"), None);
    }

    #[test]
    fn test_unwrap_alias() {
        let inner = Record::new().with("id", 1);
        let wrapped = Record::new().with("User", inner.clone());
        assert_eq!(wrapped.unwrap_alias("User"), &inner);
        assert_eq!(inner.unwrap_alias("User"), &inner);
    }

    #[test]
    fn test_bytes_decode_lossily() {
        let value = FieldValue::Bytes(vec![b'o', b'k', 0xFF]);
        assert_eq!(value.as_text().unwrap(), "ok\u{FFFD}");
        assert!(value.is_string());
        assert!(!FieldValue::Integer(3).is_string());
    }

    #[test]
    fn test_json_shape() {
        let record: Record =
            serde_json::from_str(r#"{"id": 5, "title": "Hi", "meta": {"draft": true}, "x": null}"#)
                .unwrap();
        assert_eq!(record.get("id"), Some(&FieldValue::Integer(5)));
        assert_eq!(record.get("title"), Some(&FieldValue::Text("Hi".into())));
        assert!(record.get("meta").unwrap().as_nested().is_some());
        assert_eq!(record.get("x"), Some(&FieldValue::Null));
    }
}
