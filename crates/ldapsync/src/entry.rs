//! Directory entry model
//!
//! Entries as delivered by a directory search: a distinguished name plus a
//! set of named, ordered, possibly binary attribute values.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// UTF-8 text value.
    Text(String),
    /// Raw binary value.
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Build a value from raw bytes, keeping it as text when it is valid UTF-8.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => AttributeValue::Text(text),
            Err(err) => AttributeValue::Binary(err.into_bytes()),
        }
    }

    /// Raw bytes of the value.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeValue::Text(s) => s.as_bytes(),
            AttributeValue::Binary(b) => b,
        }
    }

    /// Text of the value; binary values are decoded lossily.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            AttributeValue::Text(s) => Cow::Borrowed(s),
            AttributeValue::Binary(b) => String::from_utf8_lossy(b),
        }
    }

    /// Text of the value when it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Binary(b) => std::str::from_utf8(b).ok(),
        }
    }

    /// Check if this is a binary value.
    pub fn is_binary(&self) -> bool {
        matches!(self, AttributeValue::Binary(_))
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

/// A named attribute with its ordered values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    values: Vec<AttributeValue>,
}

impl Attribute {
    /// Create an attribute.
    pub fn new(name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Attribute name as the directory spelled it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values in directory order.
    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the attribute carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One directory record.
///
/// Attribute names are matched case-insensitively, as LDAP does (RFC 4512).
/// Once built, an entry is only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    dn: String,
    attributes: Vec<Attribute>,
}

impl DirectoryEntry {
    /// Create an entry with no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Add values for an attribute using builder pattern.
    ///
    /// Values for a name that is already present are appended to it.
    pub fn with_values<V: Into<AttributeValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_values(name, values.into_iter().map(Into::into));
        self
    }

    /// Add a single value using builder pattern.
    pub fn with(self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.with_values(name, [value.into()])
    }

    pub(crate) fn push_value(&mut self, name: &str, value: AttributeValue) {
        self.push_values(name, std::iter::once(value));
    }

    /// Insert a value at `index`, or append it if the attribute is shorter.
    pub(crate) fn insert_value(&mut self, name: &str, index: usize, value: AttributeValue) {
        match self.position(name) {
            Some(position) => {
                let values = &mut self.attributes[position].values;
                values.insert(index.min(values.len()), value);
            }
            None => self.attributes.push(Attribute::new(name, vec![value])),
        }
    }

    fn push_values(&mut self, name: impl Into<String>, values: impl Iterator<Item = AttributeValue>) {
        let name = name.into();
        match self.position(&name) {
            Some(position) => self.attributes[position].values.extend(values),
            None => self.attributes.push(Attribute::new(name, values.collect())),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Distinguished name; used as the source key.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Get an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.position(name).map(|i| &self.attributes[i])
    }

    /// Check if an attribute exists.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Text values of an attribute, empty if absent.
    pub fn text_values(&self, name: &str) -> Vec<Cow<'_, str>> {
        self.attribute(name)
            .map(|a| a.values.iter().map(AttributeValue::to_text).collect())
            .unwrap_or_default()
    }

    /// Binary values of an attribute, empty if absent.
    pub fn binary_values(&self, name: &str) -> Vec<&[u8]> {
        self.attribute(name)
            .map(|a| a.values.iter().map(AttributeValue::as_bytes).collect())
            .unwrap_or_default()
    }

    /// All attributes in arrival order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// All attribute names.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    /// Total number of values over all attributes.
    pub fn value_count(&self) -> usize {
        self.attributes.iter().map(Attribute::len).sum()
    }
}
