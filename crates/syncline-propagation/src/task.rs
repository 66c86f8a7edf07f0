//! Propagation task value types
//!
//! A [`PropagationTaskInfo`] is the resolved, resource-bound description of
//! one write against an external system, produced by the manager and consumed
//! exactly once by the executor. [`PropagationTask`] and [`TaskExec`] are the
//! persisted forms, retained according to the resource's trace levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use syncline_connector::delta::AttributeDelta;
use syncline_connector::object::{AttributeSet, ConnectorObject};
use syncline_connector::traits::ProvisioningConnector;

use crate::resource::ExternalResource;
use crate::types::{AnyTypeKind, ExecStatus, ResourceOperation};

/// Reserved attribute carrying the external names of mandatory mapping items
/// that produced no value at all. Stripped by the executor before any
/// connector call; fatal only for true creates.
pub const MANDATORY_MISSING_ATTR: &str = "__MANDATORY_MISSING__";

/// Reserved attribute carrying the external names of mandatory mapping items
/// whose value came out null or empty. Stripped by the executor before any
/// connector call; fatal for creates and updates alike.
pub const MANDATORY_NULL_OR_EMPTY_ATTR: &str = "__MANDATORY_NULL_OR_EMPTY__";

/// Closed classification of single-task failures.
///
/// Timeout is deliberately kept apart from other connector failures so that
/// callers can apply their own retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationErrorKind {
    /// A mandatory mapping item was missing (create) or empty (any write).
    Validation,
    /// The connector call raised.
    Connector,
    /// The connector call timed out.
    Timeout,
    /// The execution backend refused to schedule the task.
    Rejected,
}

impl fmt::Display for PropagationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PropagationErrorKind::Validation => "validation",
            PropagationErrorKind::Connector => "connector",
            PropagationErrorKind::Timeout => "timeout",
            PropagationErrorKind::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// The attribute payload of a propagation task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropagationData {
    /// The full prepared attribute set.
    pub attributes: AttributeSet,
    /// Incremental modification, when the resource's policy enables the
    /// delta update path and a before-snapshot was available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_delta: Option<AttributeDelta>,
}

impl PropagationData {
    /// Wrap a prepared attribute set.
    pub fn new(attributes: AttributeSet) -> Self {
        Self {
            attributes,
            attribute_delta: None,
        }
    }
}

/// One resource-bound unit of propagation work.
///
/// Immutable once handed to the executor, except for attribute-set mutation
/// performed by `PropagationActions` before-hooks.
#[derive(Clone)]
pub struct PropagationTaskInfo {
    /// The resolved target resource.
    pub resource: Arc<ExternalResource>,
    /// Operation to perform.
    pub operation: ResourceOperation,
    /// Object class in the target system.
    pub object_class: String,
    /// Kind of the identity object; `None` for realms.
    pub any_type_kind: Option<AnyTypeKind>,
    /// The configured any-type; `None` for realms.
    pub any_type: Option<String>,
    /// Key of the entity (or realm) being propagated.
    pub entity_key: Option<Uuid>,
    /// The connector-object-key value.
    pub conn_object_key: Option<String>,
    /// The pre-rename connector-object-key, when a rename occurred upstream.
    pub old_conn_object_key: Option<String>,
    /// Prepared attribute payload.
    pub data: PropagationData,
    /// Remote state read before execution, when already known to the caller.
    pub before_obj: Option<ConnectorObject>,
    /// Pre-resolved connector handle, reused by the executor when present.
    pub connector: Option<Arc<dyn ProvisioningConnector>>,
}

impl PropagationTaskInfo {
    /// Create a task for the given resource and operation; remaining fields
    /// start empty and are filled by the manager.
    pub fn new(
        resource: Arc<ExternalResource>,
        operation: ResourceOperation,
        object_class: impl Into<String>,
    ) -> Self {
        Self {
            resource,
            operation,
            object_class: object_class.into(),
            any_type_kind: None,
            any_type: None,
            entity_key: None,
            conn_object_key: None,
            old_conn_object_key: None,
            data: PropagationData::default(),
            before_obj: None,
            connector: None,
        }
    }

    /// The connector-object-key to read with: the current one, or the old one
    /// when a rename is in progress and a non-latest read is requested.
    pub fn read_conn_object_key(&self, latest: bool) -> Option<&str> {
        if latest {
            self.conn_object_key.as_deref()
        } else {
            self.old_conn_object_key
                .as_deref()
                .or(self.conn_object_key.as_deref())
        }
    }
}

impl fmt::Debug for PropagationTaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropagationTaskInfo")
            .field("resource", &self.resource.key)
            .field("operation", &self.operation)
            .field("object_class", &self.object_class)
            .field("any_type", &self.any_type)
            .field("entity_key", &self.entity_key)
            .field("conn_object_key", &self.conn_object_key)
            .field("old_conn_object_key", &self.old_conn_object_key)
            .finish_non_exhaustive()
    }
}

/// Persisted form of a propagation task, kept when the registration rule
/// admits the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationTask {
    /// Task key.
    pub key: Uuid,
    /// Target resource key.
    pub resource: String,
    /// Object class in the target system.
    pub object_class: String,
    /// Kind of the identity object; `None` for realms.
    pub any_type_kind: Option<AnyTypeKind>,
    /// The configured any-type; `None` for realms.
    pub any_type: Option<String>,
    /// Key of the entity being propagated.
    pub entity_key: Option<Uuid>,
    /// Operation performed.
    pub operation: ResourceOperation,
    /// The connector-object-key value.
    pub conn_object_key: Option<String>,
    /// The pre-rename connector-object-key.
    pub old_conn_object_key: Option<String>,
    /// Serialized attribute payload.
    pub data: PropagationData,
}

impl PropagationTask {
    /// Build the persisted form of a task info.
    pub fn from_info(info: &PropagationTaskInfo) -> Self {
        Self {
            key: Uuid::new_v4(),
            resource: info.resource.key.clone(),
            object_class: info.object_class.clone(),
            any_type_kind: info.any_type_kind,
            any_type: info.any_type.clone(),
            entity_key: info.entity_key,
            operation: info.operation,
            conn_object_key: info.conn_object_key.clone(),
            old_conn_object_key: info.old_conn_object_key.clone(),
            data: info.data.clone(),
        }
    }
}

/// The execution record for one task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExec {
    /// Execution key.
    pub key: Uuid,
    /// Attempt status.
    pub status: ExecStatus,
    /// The acting principal that ran the attempt.
    pub executor: String,
    /// When the attempt started.
    pub start: DateTime<Utc>,
    /// When the attempt finished.
    pub end: Option<DateTime<Utc>>,
    /// Human-readable outcome or failure detail.
    pub message: Option<String>,
    /// Failure classification, when the attempt failed.
    pub error_kind: Option<PropagationErrorKind>,
}

impl TaskExec {
    /// Create a fresh record in the `Created` state.
    pub fn started(executor: impl Into<String>) -> Self {
        Self {
            key: Uuid::new_v4(),
            status: ExecStatus::Created,
            executor: executor.into(),
            start: Utc::now(),
            end: None,
            message: None,
            error_kind: None,
        }
    }

    /// Whether the attempt finished with `Success`.
    pub fn is_success(&self) -> bool {
        self.status == ExecStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_key_prefers_old_for_non_latest() {
        let resource = Arc::new(ExternalResource::new("ldap"));
        let mut info =
            PropagationTaskInfo::new(resource, ResourceOperation::Update, "inetOrgPerson");
        info.conn_object_key = Some("uid=new".to_string());
        info.old_conn_object_key = Some("uid=old".to_string());

        assert_eq!(info.read_conn_object_key(true), Some("uid=new"));
        assert_eq!(info.read_conn_object_key(false), Some("uid=old"));

        info.old_conn_object_key = None;
        assert_eq!(info.read_conn_object_key(false), Some("uid=new"));
    }

    #[test]
    fn test_task_from_info() {
        let resource = Arc::new(ExternalResource::new("ldap"));
        let mut info =
            PropagationTaskInfo::new(resource, ResourceOperation::Create, "inetOrgPerson");
        info.any_type = Some("USER".to_string());
        info.conn_object_key = Some("uid=john".to_string());

        let task = PropagationTask::from_info(&info);
        assert_eq!(task.resource, "ldap");
        assert_eq!(task.operation, ResourceOperation::Create);
        assert_eq!(task.conn_object_key.as_deref(), Some("uid=john"));
    }

    #[test]
    fn test_exec_record_lifecycle() {
        let exec = TaskExec::started("admin@corp");
        assert_eq!(exec.status, ExecStatus::Created);
        assert!(exec.end.is_none());
        assert!(!exec.is_success());
    }
}
