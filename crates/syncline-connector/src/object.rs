//! Remote object model
//!
//! Types describing objects in target systems: unique identifiers, attribute
//! sets and the snapshots returned by read operations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved attribute name carrying the remote display/unique name of an
/// object, where the target system distinguishes it from the unique id.
pub const NAME_ATTR: &str = "__NAME__";

/// Reserved attribute name carrying the password, treated as operational by
/// target systems rather than as an ordinary attribute.
pub const PASSWORD_ATTR: &str = "__PASSWORD__";

/// Unique identifier of an object in a target system.
///
/// Different systems use different identifier schemes: an LDAP entry DN or
/// entryUUID, a database primary key, a SaaS resource id. The value is opaque
/// to the propagation engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    /// Create a new UID from the target system's identifier value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the identifier value.
    pub fn value(&self) -> &str {
        &self.0
    }

    /// Consume the UID, returning the identifier value.
    pub fn into_value(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Uid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A value for an attribute, which may be single or multi-valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// No value (null).
    Null,
    /// A single string value.
    String(String),
    /// A single integer value.
    Integer(i64),
    /// A single boolean value.
    Boolean(bool),
    /// Multiple values.
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Check if this value counts as "null or empty": null, an empty string,
    /// or an array with no elements.
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            AttributeValue::Null => true,
            AttributeValue::String(s) => s.is_empty(),
            AttributeValue::Array(values) => values.is_empty(),
            _ => false,
        }
    }

    /// Get as a string if this is a single string value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as strings (works for both single and multi-valued).
    pub fn as_strings(&self) -> Vec<&str> {
        match self {
            AttributeValue::String(s) => vec![s.as_str()],
            AttributeValue::Array(values) => values.iter().filter_map(|v| v.as_string()).collect(),
            _ => vec![],
        }
    }

    /// Get as an integer if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::Array(values.into_iter().map(Into::into).collect())
    }
}

/// A set of named attributes, as prepared for a write or returned by a read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    #[serde(flatten)]
    attributes: HashMap<String, AttributeValue>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Get a single-valued string attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_string)
    }

    /// Check if an attribute exists.
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Remove an attribute, returning its value if present.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// Get all attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }

    /// Merge another attribute set into this one, overwriting on conflict.
    pub fn merge(&mut self, other: AttributeSet) {
        self.attributes.extend(other.attributes);
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// Snapshot of an object as read from (or just written to) a target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorObject {
    /// The object class in the target system.
    pub object_class: String,
    /// The unique identifier assigned by the target system.
    pub uid: Uid,
    /// The object's attributes.
    pub attributes: AttributeSet,
}

impl ConnectorObject {
    /// Create a new snapshot for the given class and identifier.
    pub fn new(object_class: impl Into<String>, uid: impl Into<Uid>) -> Self {
        Self {
            object_class: object_class.into(),
            uid: uid.into(),
            attributes: AttributeSet::new(),
        }
    }

    /// Set the full attribute set.
    #[must_use]
    pub fn with_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set a single attribute.
    #[must_use]
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.set(name, value);
        self
    }

    /// The remote display/unique name, where the target system carries one.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get_string(NAME_ATTR)
    }
}

/// Options accompanying a connector operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationOptions {
    /// Additional attributes to retrieve on reads.
    pub attributes_to_get: Vec<String>,
    /// Whether key matching should ignore case.
    pub ignore_case_match: bool,
}

impl OperationOptions {
    /// Options requesting the given extra attributes on reads.
    pub fn with_attributes_to_get(attributes: impl IntoIterator<Item = String>) -> Self {
        Self {
            attributes_to_get: attributes.into_iter().collect(),
            ignore_case_match: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid() {
        let uid = Uid::new("cn=john,ou=users,dc=example,dc=com");
        assert_eq!(uid.value(), "cn=john,ou=users,dc=example,dc=com");
        assert_eq!(uid.to_string(), "cn=john,ou=users,dc=example,dc=com");
    }

    #[test]
    fn test_attribute_set() {
        let attrs = AttributeSet::new()
            .with("mail", "john@example.com")
            .with("loginShell", "/bin/bash")
            .with("uidNumber", 1000i64)
            .with("active", true);

        assert_eq!(attrs.get_string("mail"), Some("john@example.com"));
        assert_eq!(attrs.get("uidNumber").and_then(|v| v.as_integer()), Some(1000));
        assert_eq!(attrs.get("active").and_then(|v| v.as_boolean()), Some(true));
        assert!(!attrs.has("memberOf"));
        assert_eq!(attrs.len(), 4);
    }

    #[test]
    fn test_null_or_empty() {
        assert!(AttributeValue::Null.is_null_or_empty());
        assert!(AttributeValue::String(String::new()).is_null_or_empty());
        assert!(AttributeValue::Array(vec![]).is_null_or_empty());
        assert!(!AttributeValue::String("x".into()).is_null_or_empty());
        assert!(!AttributeValue::from(vec!["a"]).is_null_or_empty());
    }

    #[test]
    fn test_multi_valued() {
        let attrs = AttributeSet::new().with("memberOf", vec!["admins", "users"]);
        let groups = attrs.get("memberOf").unwrap().as_strings();
        assert_eq!(groups, vec!["admins", "users"]);
    }

    #[test]
    fn test_connector_object_name() {
        let obj = ConnectorObject::new("user", "entry-42")
            .with_attribute(NAME_ATTR, "uid=john")
            .with_attribute("mail", "john@example.com");

        assert_eq!(obj.name(), Some("uid=john"));
        assert_eq!(obj.uid.value(), "entry-42");
    }

    #[test]
    fn test_attribute_set_serialization() {
        let attrs = AttributeSet::new()
            .with("mail", "john@example.com")
            .with("uidNumber", 1000i64);

        let json = serde_json::to_string(&attrs).unwrap();
        let parsed: AttributeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get_string("mail"), Some("john@example.com"));
    }

    #[test]
    fn test_merge_overwrites() {
        let mut attrs = AttributeSet::new().with("cn", "old");
        attrs.merge(AttributeSet::new().with("cn", "new").with("sn", "Doe"));
        assert_eq!(attrs.get_string("cn"), Some("new"));
        assert_eq!(attrs.get_string("sn"), Some("Doe"));
    }
}
