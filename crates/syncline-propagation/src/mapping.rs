//! Mapping boundary
//!
//! The attribute-mapping engine is a collaborator, not part of this crate:
//! given an entity and a provision (or org unit), it produces the
//! connector-object-key and the prepared attribute set, applying mapping
//! expressions, password handling and enable/disable semantics. These traits
//! describe that boundary.

use async_trait::async_trait;
use thiserror::Error;

use syncline_connector::object::AttributeSet;

use crate::entity::{IdentityObject, LinkedAccount, Realm, VirSchema};
use crate::resource::{ExternalResource, OrgUnit, Provision};

/// Errors raised while preparing attributes for propagation.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A mapping expression could not be evaluated.
    #[error("expression evaluation failed for '{item}': {message}")]
    Expression { item: String, message: String },

    /// The mapping configuration is unusable.
    #[error("invalid mapping: {message}")]
    InvalidMapping { message: String },

    /// A referenced schema does not exist.
    #[error("unknown schema: {schema}")]
    UnknownSchema { schema: String },
}

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// The output of attribute preparation: the connector-object-key and the
/// attribute set to send.
#[derive(Debug, Clone, Default)]
pub struct PreparedAttrs {
    /// The connector-object-key value, when the mapping produced one.
    pub conn_object_key: Option<String>,
    /// The prepared attributes.
    pub attributes: AttributeSet,
}

impl PreparedAttrs {
    /// Create prepared attributes.
    pub fn new(conn_object_key: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            conn_object_key: Some(conn_object_key.into()),
            attributes,
        }
    }
}

/// Prepares connector attributes from identity objects, per provision.
#[async_trait]
pub trait MappingHandler: Send + Sync {
    /// Prepare the connector-object-key and attribute set for an entity.
    ///
    /// `change_pwd` asks for the password to be included among the prepared
    /// attributes; `enable` carries the requested enable/disable status, when
    /// any.
    async fn prepare_attrs(
        &self,
        entity: &IdentityObject,
        password: Option<&str>,
        change_pwd: bool,
        enable: Option<bool>,
        resource: &ExternalResource,
        provision: &Provision,
    ) -> MappingResult<PreparedAttrs>;

    /// Prepare the attribute set for a linked account; the
    /// connector-object-key is the account's own.
    async fn prepare_attrs_from_linked_account(
        &self,
        user: &IdentityObject,
        account: &LinkedAccount,
        password: Option<&str>,
        change_pwd: bool,
        provision: &Provision,
    ) -> MappingResult<AttributeSet>;

    /// Prepare the connector-object-key and attribute set for a realm.
    async fn prepare_attrs_from_realm(
        &self,
        realm: &Realm,
        resource: &ExternalResource,
        org_unit: &OrgUnit,
    ) -> MappingResult<PreparedAttrs>;
}

/// Looks up virtual schema definitions.
#[async_trait]
pub trait VirSchemaStore: Send + Sync {
    /// Find a virtual schema by name.
    async fn find(&self, key: &str) -> Option<VirSchema>;
}

/// Evaluates a mapping item's mandatory-condition expression against an
/// entity.
///
/// A blank condition means "never mandatory"; the literals `true` and `false`
/// are honored without consulting the entity.
pub trait MandatoryConditionEvaluator: Send + Sync {
    /// Whether the condition holds for the given entity.
    fn evaluate(&self, condition: &str, entity: &IdentityObject) -> bool;
}
