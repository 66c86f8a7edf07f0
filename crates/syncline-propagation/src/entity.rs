//! Identity object boundary types
//!
//! In-memory views of the identity objects being propagated. The persistence
//! layer owns the real entities; the engine only needs the slices relevant to
//! building and executing propagation tasks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::types::AnyTypeKind;

/// An account on an external resource linked to a user, with its own
/// connector-object-key distinct from the user's own mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedAccount {
    /// The resource hosting the account.
    pub resource: String,
    /// The account's connector-object-key value on that resource.
    pub conn_object_key_value: String,
}

impl LinkedAccount {
    /// Create a linked account reference.
    pub fn new(resource: impl Into<String>, conn_object_key_value: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            conn_object_key_value: conn_object_key_value.into(),
        }
    }
}

/// In-memory view of an identity object (user, group or any-object).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityObject {
    /// Entity key.
    pub key: Uuid,
    /// Kind of object.
    pub kind: AnyTypeKind,
    /// The configured any-type (e.g. "USER", "PRINTER").
    pub any_type: String,
    /// Plain attribute values, as visible to mandatory-condition expressions.
    #[serde(default)]
    pub plain_attrs: HashMap<String, serde_json::Value>,
    /// Keys of the resources currently assigned to this object.
    #[serde(default)]
    pub resources: Vec<String>,
    /// Linked accounts (users only).
    #[serde(default)]
    pub linked_accounts: Vec<LinkedAccount>,
}

impl IdentityObject {
    /// Create an identity object of the given kind and any-type.
    pub fn new(key: Uuid, kind: AnyTypeKind, any_type: impl Into<String>) -> Self {
        Self {
            key,
            kind,
            any_type: any_type.into(),
            plain_attrs: HashMap::new(),
            resources: Vec::new(),
            linked_accounts: Vec::new(),
        }
    }

    /// Set a plain attribute value.
    #[must_use]
    pub fn with_plain_attr(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.plain_attrs.insert(name.into(), value.into());
        self
    }

    /// Assign a resource.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    /// Add a linked account.
    #[must_use]
    pub fn with_linked_account(mut self, account: LinkedAccount) -> Self {
        self.linked_accounts.push(account);
        self
    }

    /// Find a linked account by resource and connector-object-key value.
    pub fn linked_account(&self, resource: &str, conn_object_key_value: &str) -> Option<&LinkedAccount> {
        self.linked_accounts
            .iter()
            .find(|a| a.resource == resource && a.conn_object_key_value == conn_object_key_value)
    }
}

/// In-memory view of an organizational realm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Realm {
    /// Realm key.
    pub key: Uuid,
    /// Full path from the root realm (e.g. "/corp/emea").
    pub full_path: String,
    /// Keys of the resources assigned to this realm.
    #[serde(default)]
    pub resources: Vec<String>,
}

impl Realm {
    /// Create a realm view.
    pub fn new(key: Uuid, full_path: impl Into<String>) -> Self {
        Self {
            key,
            full_path: full_path.into(),
            resources: Vec::new(),
        }
    }
}

/// A requested virtual attribute value: not stored locally, pushed straight
/// to the owning resource during propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirAttr {
    /// The virtual schema name.
    pub schema: String,
    /// The values to push.
    pub values: Vec<String>,
}

impl VirAttr {
    /// Create a virtual attribute request.
    pub fn new(schema: impl Into<String>, values: impl IntoIterator<Item = String>) -> Self {
        Self {
            schema: schema.into(),
            values: values.into_iter().collect(),
        }
    }
}

/// Definition of a virtual schema: which resource owns it, which external
/// attribute it maps to, and which any-types may carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirSchema {
    /// Schema name.
    pub key: String,
    /// Whether the schema is read-only (never propagated outwards).
    #[serde(default)]
    pub readonly: bool,
    /// The external attribute this schema maps to.
    pub ext_attr_name: String,
    /// The resource owning this schema.
    pub resource: String,
    /// Any-types allowed to carry this schema.
    #[serde(default)]
    pub any_types: Vec<String>,
}

impl VirSchema {
    /// Whether the given any-type may carry this schema.
    pub fn allowed_for(&self, any_type: &str) -> bool {
        self.any_types.iter().any(|t| t == any_type)
    }
}

/// Acting principal and tenant domain under which propagation runs.
///
/// Captured at submission time and handed explicitly to every worker, so that
/// connector calls and audit emission never depend on ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    /// The acting principal (username or service identity).
    pub who: String,
    /// The tenant/domain the operation belongs to.
    pub domain: String,
}

impl SecurityContext {
    /// Create a context for the given principal and domain.
    pub fn new(who: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            who: who.into(),
            domain: domain.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linked_account_lookup() {
        let user = IdentityObject::new(Uuid::new_v4(), AnyTypeKind::User, "USER")
            .with_linked_account(LinkedAccount::new("ldap", "uid=john.admin"));

        assert!(user.linked_account("ldap", "uid=john.admin").is_some());
        assert!(user.linked_account("ldap", "uid=other").is_none());
        assert!(user.linked_account("db", "uid=john.admin").is_none());
    }

    #[test]
    fn test_vir_schema_allowed() {
        let schema = VirSchema {
            key: "vMail".to_string(),
            readonly: false,
            ext_attr_name: "mail".to_string(),
            resource: "ldap".to_string(),
            any_types: vec!["USER".to_string()],
        };

        assert!(schema.allowed_for("USER"));
        assert!(!schema.allowed_for("GROUP"));
    }
}
