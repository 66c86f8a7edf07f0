//! Propagation reporting
//!
//! [`PropagationReporter`] accumulates one outcome per resource for a whole
//! batch and exposes an insertion-ordered snapshot to the caller. Appends may
//! come concurrently from pool workers; the first write per resource key
//! wins, which makes duplicate reporting from retries benign.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error};

use syncline_connector::object::ConnectorObject;

use crate::task::PropagationTaskInfo;
use crate::types::ExecStatus;

/// The reporter-facing outcome for one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationStatus {
    /// The resource this outcome belongs to.
    pub resource: String,
    /// Final status of the attempt.
    pub status: ExecStatus,
    /// Failure detail, when the attempt failed.
    pub failure_reason: Option<String>,
    /// Remote state before the attempt, when read.
    pub before_obj: Option<ConnectorObject>,
    /// Remote state after the attempt, when read or synthesized.
    pub after_obj: Option<ConnectorObject>,
    /// Filter expression describing the matched remote object, for
    /// downstream consumers.
    pub match_filter: Option<String>,
}

#[derive(Default)]
struct ReporterInner {
    statuses: Vec<PropagationStatus>,
    reported: HashSet<String>,
}

/// Accumulates per-resource outcomes for one batch.
#[derive(Default)]
pub struct PropagationReporter {
    inner: Mutex<ReporterInner>,
}

impl PropagationReporter {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a task executed to completion (success, or the
    /// failure of a non-priority resource).
    ///
    /// Idempotent per resource key: later calls for an already-reported
    /// resource are ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn on_success_or_non_priority_resource_failures(
        &self,
        task: &PropagationTaskInfo,
        status: ExecStatus,
        failure_reason: Option<String>,
        match_filter: Option<String>,
        before_obj: Option<ConnectorObject>,
        after_obj: Option<ConnectorObject>,
    ) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let resource = task.resource.key.clone();
        if !inner.reported.insert(resource.clone()) {
            debug!(resource = %resource, "Outcome already reported, keeping first");
            return;
        }

        inner.statuses.push(PropagationStatus {
            resource,
            status,
            failure_reason,
            before_obj,
            after_obj,
            match_filter,
        });
    }

    /// Record that a priority resource failed, aborting the batch.
    ///
    /// The failing resource is located among the original tasks to build the
    /// synthesized message; when it cannot be found the situation is logged
    /// as an error and no entry is appended.
    pub fn on_priority_resource_failure(
        &self,
        failing_resource: &str,
        tasks: &[PropagationTaskInfo],
    ) {
        let Some(task) = tasks.iter().find(|t| t.resource.key == failing_resource) else {
            error!(
                resource = %failing_resource,
                "Priority failure on a resource not part of the batch"
            );
            return;
        };

        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !inner.reported.insert(failing_resource.to_string()) {
            return;
        }

        inner.statuses.push(PropagationStatus {
            resource: failing_resource.to_string(),
            status: ExecStatus::Failure,
            failure_reason: Some(format!(
                "Propagation of {} on resource {} failed, aborting the remaining tasks",
                task.operation, failing_resource
            )),
            before_obj: None,
            after_obj: None,
            match_filter: None,
        });
    }

    /// An immutable snapshot of the accumulated statuses, insertion order
    /// preserved.
    pub fn get_statuses(&self) -> Vec<PropagationStatus> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .statuses
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ExternalResource;
    use crate::types::ResourceOperation;
    use std::sync::Arc;

    fn task_for(resource: &str) -> PropagationTaskInfo {
        PropagationTaskInfo::new(
            Arc::new(ExternalResource::new(resource)),
            ResourceOperation::Create,
            "inetOrgPerson",
        )
    }

    #[test]
    fn test_first_write_wins() {
        let reporter = PropagationReporter::new();
        let task = task_for("ldap");

        reporter.on_success_or_non_priority_resource_failures(
            &task,
            ExecStatus::Success,
            None,
            None,
            None,
            None,
        );
        reporter.on_success_or_non_priority_resource_failures(
            &task,
            ExecStatus::Failure,
            Some("late duplicate".to_string()),
            None,
            None,
            None,
        );

        let statuses = reporter.get_statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, ExecStatus::Success);
        assert!(statuses[0].failure_reason.is_none());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let reporter = PropagationReporter::new();
        for key in ["c", "a", "b"] {
            reporter.on_success_or_non_priority_resource_failures(
                &task_for(key),
                ExecStatus::Success,
                None,
                None,
                None,
                None,
            );
        }

        let order: Vec<String> = reporter
            .get_statuses()
            .into_iter()
            .map(|s| s.resource)
            .collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_priority_failure_synthesized() {
        let reporter = PropagationReporter::new();
        let tasks = vec![task_for("ldap"), task_for("db")];

        reporter.on_priority_resource_failure("ldap", &tasks);

        let statuses = reporter.get_statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, ExecStatus::Failure);
        assert!(statuses[0]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("ldap"));
    }

    #[test]
    fn test_priority_failure_unknown_resource() {
        let reporter = PropagationReporter::new();
        let tasks = vec![task_for("ldap")];

        reporter.on_priority_resource_failure("unknown", &tasks);
        assert!(reporter.get_statuses().is_empty());
    }
}
