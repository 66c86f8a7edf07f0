//! Propagation actions (plugin contract)
//!
//! Resource-specific plugins invoked around each task's execution. They may
//! rewrite the outgoing attribute set (e.g. swap which attribute serves as
//! the remote unique name, inject a generated password, rewrite membership
//! attributes) or, in `after`, persist a vendor-assigned identifier back into
//! local storage.
//!
//! Implementations are assembled into an explicit ordered list per resource
//! by the caller and handed to the executor; there is no runtime lookup.

use async_trait::async_trait;
use thiserror::Error;

use syncline_connector::object::ConnectorObject;

use crate::task::{PropagationErrorKind, PropagationTaskInfo, TaskExec};

/// Error raised by a propagation action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action failed.
    #[error("action failed: {message}")]
    Failed { message: String },
}

impl ActionError {
    /// Create a failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed {
            message: message.into(),
        }
    }
}

/// Result type for action hooks.
pub type ActionResult<T> = Result<T, ActionError>;

/// Ordered plugin chain invoked around each task's execution.
///
/// A `before` error is fatal to the task: the connector is not invoked and
/// the task fails. `on_error` and `after` errors are isolated: logged by the
/// executor, never escalated.
#[async_trait]
pub trait PropagationActions: Send + Sync {
    /// Invoked before the connector call; may mutate the task's attribute
    /// set. The pre-read remote snapshot, when the caller supplied one, is
    /// visible as `task.before_obj`.
    async fn before(&self, task: &mut PropagationTaskInfo) -> ActionResult<()> {
        let _ = task;
        Ok(())
    }

    /// Invoked when the task failed, with the failing execution record.
    async fn on_error(
        &self,
        task: &PropagationTaskInfo,
        exec: &TaskExec,
        error_kind: PropagationErrorKind,
        error: &str,
    ) -> ActionResult<()> {
        let _ = (task, exec, error_kind, error);
        Ok(())
    }

    /// Invoked once the task finished, with the final execution record and
    /// the post-operation remote snapshot, when one could be obtained.
    async fn after(
        &self,
        task: &PropagationTaskInfo,
        exec: &TaskExec,
        after_obj: Option<&ConnectorObject>,
    ) -> ActionResult<()> {
        let _ = (task, exec, after_obj);
        Ok(())
    }
}
