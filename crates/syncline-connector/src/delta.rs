//! Incremental attribute changes
//!
//! [`AttributeDelta`] describes an update as per-attribute additions,
//! removals and replacements, for target systems that support incremental
//! modification instead of full-set replacement.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::object::AttributeValue;

/// Changes to apply to an object during an incremental update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDelta {
    /// Values to add to multi-valued attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub add: HashMap<String, Vec<AttributeValue>>,

    /// Values to remove from multi-valued attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub remove: HashMap<String, Vec<AttributeValue>>,

    /// Attributes to replace entirely (single-valued and operational
    /// attributes such as passwords).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub replace: HashMap<String, Vec<AttributeValue>>,
}

impl AttributeDelta {
    /// Create a new empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record values to add for an attribute.
    pub fn add_values(
        &mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = AttributeValue>,
    ) -> &mut Self {
        self.add
            .entry(name.into())
            .or_default()
            .extend(values);
        self
    }

    /// Record values to remove for an attribute.
    pub fn remove_values(
        &mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = AttributeValue>,
    ) -> &mut Self {
        self.remove
            .entry(name.into())
            .or_default()
            .extend(values);
        self
    }

    /// Record a full replacement for an attribute.
    pub fn replace_values(
        &mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = AttributeValue>,
    ) -> &mut Self {
        self.replace
            .entry(name.into())
            .or_default()
            .extend(values);
        self
    }

    /// Check if this delta has any changes.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.replace.is_empty()
    }

    /// Get all affected attribute names, sorted and deduplicated.
    pub fn affected_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .add
            .keys()
            .chain(self.remove.keys())
            .chain(self.replace.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_accumulates() {
        let mut delta = AttributeDelta::new();
        delta
            .add_values("memberOf", vec![AttributeValue::from("staff")])
            .remove_values("memberOf", vec![AttributeValue::from("guests")])
            .replace_values("mail", vec![AttributeValue::from("new@example.com")]);

        assert!(!delta.is_empty());
        assert_eq!(delta.affected_attributes(), vec!["mail", "memberOf"]);
        assert_eq!(delta.add["memberOf"].len(), 1);
        assert_eq!(delta.remove["memberOf"].len(), 1);
    }

    #[test]
    fn test_empty_delta() {
        assert!(AttributeDelta::new().is_empty());
    }
}
