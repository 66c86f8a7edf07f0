//! Propagation task execution
//!
//! The executor runs batches of [`PropagationTaskInfo`] against their target
//! resources: a strictly sequential lane for priority resources and a
//! bounded worker pool for everything else. Single-task execution lives in
//! [`runner`], the batch scheduling policy in [`priority`].

pub mod priority;
pub mod retry;
pub mod runner;

pub use priority::PriorityPropagationTaskExecutor;
pub use runner::TaskRunner;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use syncline_connector::error::ConnectorResult;
use syncline_connector::object::ConnectorObject;
use syncline_connector::traits::ProvisioningConnector;

use crate::entity::SecurityContext;
use crate::reporter::PropagationReporter;
use crate::resource::ExternalResource;
use crate::task::{PropagationTask, PropagationTaskInfo, TaskExec};
use crate::types::ResourceOperation;

/// Error raised by the task persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record could not be saved.
    #[error("task store failure: {message}")]
    SaveFailed { message: String },
}

impl StoreError {
    /// Create a save failure with the given message.
    pub fn save_failed(message: impl Into<String>) -> Self {
        StoreError::SaveFailed {
            message: message.into(),
        }
    }
}

/// Resolves a connector for an external resource.
#[async_trait]
pub trait ConnectorResolver: Send + Sync {
    /// Resolve the connector configured for the given resource.
    async fn resolve(
        &self,
        resource: &ExternalResource,
    ) -> ConnectorResult<Arc<dyn ProvisioningConnector>>;
}

/// Durable history boundary: persists a task together with one appended
/// execution record, governed by the registration rule.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Save the task with the given execution appended.
    async fn save(&self, task: PropagationTask, exec: TaskExec) -> Result<(), StoreError>;
}

/// Writes a target-generated identifier back onto the entity after a create,
/// when the resource's provision declares a uid-on-create schema.
#[async_trait]
pub trait UidOnCreateHandler: Send + Sync {
    /// Record the identifier under the given schema.
    async fn record(
        &self,
        entity_key: Option<Uuid>,
        schema: &str,
        uid_value: &str,
    ) -> Result<(), StoreError>;
}

/// Notification boundary; consulted after each execution, never affecting the
/// task's own status.
#[async_trait]
pub trait NotificationManager: Send + Sync {
    /// Whether any notification is subscribed for this event.
    async fn notifications_available(
        &self,
        any_type_kind: &str,
        resource: &str,
        operation: ResourceOperation,
    ) -> bool;

    /// Create the notification tasks for an execution outcome.
    #[allow(clippy::too_many_arguments)]
    async fn create_tasks(
        &self,
        ctx: &SecurityContext,
        any_type_kind: &str,
        resource: &str,
        operation: ResourceOperation,
        success: bool,
        before_obj: Option<&ConnectorObject>,
        after_obj: Option<&ConnectorObject>,
        exec: &TaskExec,
    );
}

/// Audit boundary; consulted after each execution, never affecting the task's
/// own status.
#[async_trait]
pub trait AuditManager: Send + Sync {
    /// Whether auditing is requested for this event.
    async fn audit_requested(
        &self,
        who: &str,
        any_type_kind: &str,
        resource: &str,
        operation: ResourceOperation,
    ) -> bool;

    /// Record the audit entry for an execution outcome.
    #[allow(clippy::too_many_arguments)]
    async fn audit(
        &self,
        ctx: &SecurityContext,
        any_type_kind: &str,
        resource: &str,
        operation: ResourceOperation,
        success: bool,
        before_obj: Option<&ConnectorObject>,
        after_obj: Option<&ConnectorObject>,
        exec: &TaskExec,
    );
}

/// Resolves candidate remote objects for a task and describes matches for
/// downstream reporting.
#[async_trait]
pub trait OutboundMatcher: Send + Sync {
    /// Candidate remote objects matching the given connector-object-key.
    async fn match_objects(
        &self,
        task: &PropagationTaskInfo,
        connector: Arc<dyn ProvisioningConnector>,
        conn_object_key_value: &str,
    ) -> ConnectorResult<Vec<ConnectorObject>>;

    /// A filter expression describing the matched object, for reporting.
    fn filter_for(&self, resource: &ExternalResource, obj: &ConnectorObject) -> Option<String>;
}

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of non-priority tasks executed concurrently.
    pub pool_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { pool_size: 4 }
    }
}

/// Executes propagation tasks.
#[async_trait]
pub trait PropagationTaskExecutor: Send + Sync {
    /// Execute one task to completion, reporting its outcome.
    async fn execute(
        &self,
        task: PropagationTaskInfo,
        reporter: &PropagationReporter,
        ctx: &SecurityContext,
    ) -> TaskExec;

    /// Record that a task could not even be scheduled: synthesizes a
    /// NOT_ATTEMPTED record with the given reason, applies the registration
    /// rule and reports it.
    async fn rejected(
        &self,
        task: &PropagationTaskInfo,
        reason: &str,
        reporter: &PropagationReporter,
        ctx: &SecurityContext,
    ) -> TaskExec;

    /// Execute a batch of tasks under the priority/concurrency policy.
    ///
    /// With `null_priority_async`, non-priority tasks are fire-and-forget:
    /// each is reported as CREATED immediately and the call returns without
    /// waiting for them (the reporter is shared, so late worker writes are
    /// dropped by its first-write-wins rule).
    async fn execute_all(
        &self,
        tasks: Vec<PropagationTaskInfo>,
        null_priority_async: bool,
        ctx: &SecurityContext,
    ) -> Arc<PropagationReporter>;
}
