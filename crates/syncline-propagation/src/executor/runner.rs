//! Single-task execution
//!
//! [`TaskRunner`] drives one propagation task through its state machine:
//! resolve the connector, run the before-hooks, read the remote state, decide
//! between create/update/delete (or nothing at all), and finalize the
//! execution record: registration per trace level, reporter handoff, after
//! hooks and notification/audit emission.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use syncline_connector::error::ConnectorError;
use syncline_connector::object::{
    AttributeSet, AttributeValue, ConnectorObject, OperationOptions, Uid, NAME_ATTR,
};
use syncline_connector::traits::{
    CreateOp, DeleteOp, ProvisioningConnector, SearchOp, UpdateOp,
};

use crate::actions::{ActionError, PropagationActions};
use crate::entity::SecurityContext;
use crate::reporter::PropagationReporter;
use crate::resource::ExternalResource;
use crate::task::{
    PropagationErrorKind, PropagationTask, PropagationTaskInfo, TaskExec, MANDATORY_MISSING_ATTR,
    MANDATORY_NULL_OR_EMPTY_ATTR,
};
use crate::types::{ExecStatus, ResourceOperation, TraceLevel};

use super::retry;
use super::{
    AuditManager, ConnectorResolver, NotificationManager, OutboundMatcher, TaskStore,
    UidOnCreateHandler,
};

/// Structured result of a connector dispatch: the identifier obtained, when
/// any, and whether a connector call was actually made.
#[derive(Debug, Clone)]
pub struct ProvisionResult {
    /// The remote identifier, when one was obtained or already known.
    pub uid: Option<Uid>,
    /// Whether the connector was actually invoked.
    pub attempted: bool,
}

/// Everything one attempt produced: the execution record plus the material
/// the reporter needs for the per-resource status.
struct ExecOutcome {
    exec: TaskExec,
    before_obj: Option<ConnectorObject>,
    after_obj: Option<ConnectorObject>,
    failure_reason: Option<String>,
    match_filter: Option<String>,
}

/// Single-task failure, classified per the closed error taxonomy.
#[derive(Debug)]
enum TaskError {
    /// Mandatory mapping items without usable values.
    Validation { attr_names: Vec<String> },
    /// A before-hook failed, aborting the task without a connector call.
    Action(ActionError),
    /// The connector raised; timeouts keep their own kind.
    Connector(ConnectorError),
}

impl TaskError {
    fn kind(&self) -> PropagationErrorKind {
        match self {
            TaskError::Validation { .. } => PropagationErrorKind::Validation,
            TaskError::Action(_) => PropagationErrorKind::Connector,
            TaskError::Connector(e) if e.is_timeout() => PropagationErrorKind::Timeout,
            TaskError::Connector(_) => PropagationErrorKind::Connector,
        }
    }

    /// Human-readable failure detail, preferring a connector-specific inner
    /// cause over a full error chain dump.
    fn message(&self) -> String {
        match self {
            TaskError::Validation { attr_names } => format!(
                "Not attempted because there are mandatory attributes without value(s): {attr_names:?}"
            ),
            TaskError::Action(e) => e.to_string(),
            TaskError::Connector(e) => match std::error::Error::source(e) {
                Some(cause) => {
                    let first_line = cause.to_string();
                    let first_line = first_line.lines().next().unwrap_or_default().to_string();
                    format!("{e}\n\n Cause: {first_line}")
                }
                None => e.to_string(),
            },
        }
    }
}

/// Case-insensitive attribute comparison: every desired attribute must exist
/// remotely under a case-insensitively equal name with an equal value.
fn attrs_equal_ignore_case(desired: &AttributeSet, remote: &AttributeSet) -> bool {
    let remote_by_name: HashMap<String, &AttributeValue> = remote
        .iter()
        .map(|(name, value)| (name.to_uppercase(), value))
        .collect();

    desired.iter().all(|(name, value)| {
        remote_by_name
            .get(&name.to_uppercase())
            .map(|remote_value| *remote_value == value)
            .unwrap_or(false)
    })
}

/// Executes one propagation task at a time.
pub struct TaskRunner {
    connector_resolver: Arc<dyn ConnectorResolver>,
    task_store: Arc<dyn TaskStore>,
    /// Ordered action chains per resource key, assembled by the caller.
    actions: HashMap<String, Vec<Arc<dyn PropagationActions>>>,
    uid_on_create: Option<Arc<dyn UidOnCreateHandler>>,
    notification_manager: Option<Arc<dyn NotificationManager>>,
    audit_manager: Option<Arc<dyn AuditManager>>,
    outbound_matcher: Option<Arc<dyn OutboundMatcher>>,
}

impl TaskRunner {
    /// Create a runner with the mandatory collaborators.
    pub fn new(
        connector_resolver: Arc<dyn ConnectorResolver>,
        task_store: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            connector_resolver,
            task_store,
            actions: HashMap::new(),
            uid_on_create: None,
            notification_manager: None,
            audit_manager: None,
            outbound_matcher: None,
        }
    }

    /// Set the per-resource action chains.
    #[must_use]
    pub fn with_actions(
        mut self,
        actions: HashMap<String, Vec<Arc<dyn PropagationActions>>>,
    ) -> Self {
        self.actions = actions;
        self
    }

    /// Set the uid-on-create write-back handler.
    #[must_use]
    pub fn with_uid_on_create(mut self, handler: Arc<dyn UidOnCreateHandler>) -> Self {
        self.uid_on_create = Some(handler);
        self
    }

    /// Set the notification boundary.
    #[must_use]
    pub fn with_notification_manager(mut self, manager: Arc<dyn NotificationManager>) -> Self {
        self.notification_manager = Some(manager);
        self
    }

    /// Set the audit boundary.
    #[must_use]
    pub fn with_audit_manager(mut self, manager: Arc<dyn AuditManager>) -> Self {
        self.audit_manager = Some(manager);
        self
    }

    /// Set the outbound matcher.
    #[must_use]
    pub fn with_outbound_matcher(mut self, matcher: Arc<dyn OutboundMatcher>) -> Self {
        self.outbound_matcher = Some(matcher);
        self
    }

    fn actions_for(&self, resource: &ExternalResource) -> Vec<Arc<dyn PropagationActions>> {
        self.actions.get(&resource.key).cloned().unwrap_or_default()
    }

    /// Execute the task, retrying per the resource's propagation policy, and
    /// hand the final per-resource outcome to the reporter.
    #[instrument(skip_all, fields(resource = %task.resource.key, operation = %task.operation))]
    pub async fn execute(
        &self,
        task: &mut PropagationTaskInfo,
        reporter: &PropagationReporter,
        ctx: &SecurityContext,
    ) -> TaskExec {
        let policy = task.resource.propagation_policy.clone();
        let outcome = match policy {
            Some(policy) if policy.max_attempts > 1 => {
                let mut attempt = 0;
                loop {
                    attempt += 1;
                    debug!(attempt, "Propagation attempt");

                    let outcome = self.do_execute(task, ctx).await;
                    if outcome.exec.status != ExecStatus::Failure
                        || attempt >= policy.max_attempts
                    {
                        break outcome;
                    }

                    let delay = retry::backoff_delay(&policy, attempt);
                    debug!(
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            _ => self.do_execute(task, ctx).await,
        };

        reporter.on_success_or_non_priority_resource_failures(
            task,
            outcome.exec.status,
            outcome.failure_reason,
            outcome.match_filter,
            outcome.before_obj,
            outcome.after_obj,
        );

        outcome.exec
    }

    /// One execution attempt, start to finish.
    async fn do_execute(&self, task: &mut PropagationTaskInfo, ctx: &SecurityContext) -> ExecOutcome {
        let actions = self.actions_for(&task.resource);
        let fetch = task.resource.fetch_around_provisioning();

        let mut exec = TaskExec::started(&ctx.who);

        let (connector, before_obj, outcome) = self.attempt(task, &actions, fetch).await;

        let mut uid = None;
        let mut failure_reason = None;
        match outcome {
            Ok(result) => {
                exec.status = if result.attempted {
                    ExecStatus::Success
                } else {
                    ExecStatus::NotAttempted
                };
                uid = result.uid;
                debug!(resource = %task.resource.key, "Successfully propagated");
            }
            Err(e) => {
                exec.status = ExecStatus::Failure;
                exec.error_kind = Some(e.kind());
                let message = e.message();
                error!(
                    resource = %task.resource.key,
                    error = %message,
                    "Exception during provision on resource"
                );
                exec.message = Some(message.clone());
                failure_reason = Some(message.clone());

                for action in &actions {
                    if let Err(hook_err) = action.on_error(task, &exec, e.kind(), &message).await {
                        error!(error = %hook_err, "onError hook failed, ignoring");
                    }
                }
            }
        }

        // The remote identifier, once known, becomes the task's key.
        if let Some(uid) = &uid {
            task.conn_object_key = Some(uid.value().to_string());
        }

        // Best-effort read of the remote state after the attempt.
        let mut after_obj = None;
        if fetch {
            if let Some(connector) = &connector {
                match self.get_remote_object(task, connector, true).await {
                    Ok(obj) => after_obj = obj,
                    Err(e) => error!(error = %e, "Error retrieving after object, ignoring"),
                }
            }
        }

        if exec.status != ExecStatus::Failure
            && after_obj.is_none()
            && task.operation != ResourceOperation::Delete
        {
            if let Some(uid) = uid.clone() {
                after_obj = Some(synthesize_after(task, uid));
            }
        }

        exec.end = Some(Utc::now());
        debug!(status = %exec.status, "Execution finished");

        self.register_if_needed(task, &exec).await;

        let match_filter = self.outbound_matcher.as_ref().and_then(|matcher| {
            after_obj
                .as_ref()
                .or(before_obj.as_ref())
                .and_then(|obj| matcher.filter_for(&task.resource, obj))
        });

        for action in &actions {
            if let Err(hook_err) = action.after(task, &exec, after_obj.as_ref()).await {
                error!(error = %hook_err, "after hook failed, ignoring");
            }
        }

        self.emit_events(
            task,
            &exec,
            exec.status != ExecStatus::Failure,
            before_obj.as_ref(),
            after_obj.as_ref(),
            ctx,
        )
        .await;

        ExecOutcome {
            exec,
            before_obj,
            after_obj,
            failure_reason,
            match_filter,
        }
    }

    /// Resolve the connector, run the before hooks, read the remote state and
    /// dispatch by operation. The first failure short-circuits the attempt.
    async fn attempt(
        &self,
        task: &mut PropagationTaskInfo,
        actions: &[Arc<dyn PropagationActions>],
        fetch: bool,
    ) -> (
        Option<Arc<dyn ProvisioningConnector>>,
        Option<ConnectorObject>,
        Result<ProvisionResult, TaskError>,
    ) {
        let connector = match task.connector.clone() {
            Some(connector) => connector,
            None => match self.connector_resolver.resolve(&task.resource).await {
                Ok(connector) => connector,
                Err(e) => return (None, None, Err(TaskError::Connector(e))),
            },
        };

        for action in actions {
            if let Err(e) = action.before(task).await {
                return (Some(connector), None, Err(TaskError::Action(e)));
            }
        }

        let before_obj = if task.before_obj.is_some() {
            task.before_obj.clone()
        } else if fetch {
            match self.get_remote_object(task, &connector, false).await {
                Ok(obj) => {
                    task.before_obj = obj.clone();
                    obj
                }
                Err(e) => return (Some(connector), None, Err(TaskError::Connector(e))),
            }
        } else {
            None
        };

        let outcome = match task.operation {
            ResourceOperation::Create | ResourceOperation::Update => {
                self.create_or_update(task, fetch, before_obj.as_ref(), &connector)
                    .await
            }
            ResourceOperation::Delete => {
                self.delete(task, fetch, before_obj.as_ref(), &connector)
                    .await
            }
        };

        (Some(connector), before_obj, outcome)
    }

    /// Create-or-update dispatch: strip the mandatory-violation markers,
    /// enforce them (missing is fatal only for a true create; null-or-empty
    /// always), then create or update based on the remote state.
    async fn create_or_update(
        &self,
        task: &PropagationTaskInfo,
        fetch: bool,
        before_obj: Option<&ConnectorObject>,
        connector: &Arc<dyn ProvisioningConnector>,
    ) -> Result<ProvisionResult, TaskError> {
        if let Some(delta) = task.data.attribute_delta.clone() {
            let uid = Uid::new(task.conn_object_key.clone().unwrap_or_default());
            debug!(uid = %uid, resource = %task.resource.key, "Update delta");
            let uid = connector
                .update_delta(&task.object_class, &uid, delta, &OperationOptions::default())
                .await
                .map_err(TaskError::Connector)?;
            return Ok(ProvisionResult {
                uid: Some(uid),
                attempted: true,
            });
        }

        let mut attrs = task.data.attributes.clone();
        let missing = take_marker(&mut attrs, MANDATORY_MISSING_ATTR);
        let null_or_empty = take_marker(&mut attrs, MANDATORY_NULL_OR_EMPTY_ATTR);

        let will_create =
            before_obj.is_none() && (fetch || task.operation == ResourceOperation::Create);

        let mut violated = Vec::new();
        if will_create {
            violated.extend(missing);
        }
        violated.extend(null_or_empty);
        if !violated.is_empty() {
            return Err(TaskError::Validation {
                attr_names: violated,
            });
        }

        if will_create {
            self.do_create(task, attrs, connector).await
        } else {
            self.do_update(task, attrs, before_obj, connector).await
        }
    }

    async fn do_create(
        &self,
        task: &PropagationTaskInfo,
        attrs: AttributeSet,
        connector: &Arc<dyn ProvisioningConnector>,
    ) -> Result<ProvisionResult, TaskError> {
        debug!(resource = %task.resource.key, "Create on resource");

        let uid = connector
            .create(&task.object_class, attrs, &OperationOptions::default())
            .await
            .map_err(TaskError::Connector)?;

        if let Some(handler) = &self.uid_on_create {
            if let Some(schema) = task
                .resource
                .provision_by_object_class(&task.object_class)
                .and_then(|p| p.uid_on_create.clone())
            {
                if let Err(e) = handler.record(task.entity_key, &schema, uid.value()).await {
                    warn!(schema = %schema, error = %e, "Could not record uid-on-create");
                }
            }
        }

        Ok(ProvisionResult {
            uid: Some(uid),
            attempted: true,
        })
    }

    async fn do_update(
        &self,
        task: &PropagationTaskInfo,
        mut attrs: AttributeSet,
        before_obj: Option<&ConnectorObject>,
        connector: &Arc<dyn ProvisioningConnector>,
    ) -> Result<ProvisionResult, TaskError> {
        if let Some(before) = before_obj {
            // A rename attribute matching the remote name (while the name is
            // not the unique id itself) would make the target system perform
            // a pointless rename.
            if let Some(desired_name) = attrs.get_string(NAME_ATTR).map(str::to_string) {
                if Some(desired_name.as_str()) == before.name()
                    && desired_name != before.uid.value()
                {
                    debug!("Remote object name unchanged");
                    attrs.remove(NAME_ATTR);
                }
            }

            if attrs_equal_ignore_case(&attrs, &before.attributes) {
                debug!(
                    resource = %task.resource.key,
                    "Remote state already matches, nothing to propagate"
                );
                return Ok(ProvisionResult {
                    uid: Some(before.uid.clone()),
                    attempted: false,
                });
            }
        }

        let object_class = before_obj
            .map(|b| b.object_class.clone())
            .unwrap_or_else(|| task.object_class.clone());
        let uid = match before_obj {
            Some(before) => before.uid.clone(),
            None => Uid::new(
                task.read_conn_object_key(false)
                    .unwrap_or_default()
                    .to_string(),
            ),
        };

        debug!(uid = %uid, resource = %task.resource.key, "Update on resource");

        let uid = connector
            .update(&object_class, &uid, attrs, &OperationOptions::default())
            .await
            .map_err(TaskError::Connector)?;

        Ok(ProvisionResult {
            uid: Some(uid),
            attempted: true,
        })
    }

    /// Idempotent delete: an object already absent from the target system is
    /// a no-op, not a failure.
    async fn delete(
        &self,
        task: &PropagationTaskInfo,
        fetch: bool,
        before_obj: Option<&ConnectorObject>,
        connector: &Arc<dyn ProvisioningConnector>,
    ) -> Result<ProvisionResult, TaskError> {
        if fetch && before_obj.is_none() {
            debug!(
                conn_object_key = task.conn_object_key.as_deref().unwrap_or_default(),
                resource = %task.resource.key,
                "Not found on resource, ignoring delete"
            );
            return Ok(ProvisionResult {
                uid: None,
                attempted: false,
            });
        }

        let object_class = before_obj
            .map(|b| b.object_class.clone())
            .unwrap_or_else(|| task.object_class.clone());
        let uid = match before_obj {
            Some(before) => before.uid.clone(),
            None => Uid::new(task.conn_object_key.clone().unwrap_or_default()),
        };

        debug!(uid = %uid, resource = %task.resource.key, "Delete on resource");

        connector
            .delete(&object_class, &uid, &OperationOptions::default())
            .await
            .map_err(TaskError::Connector)?;

        Ok(ProvisionResult {
            uid: Some(uid),
            attempted: true,
        })
    }

    /// Read the remote object for the task; `latest = false` reads through
    /// the old connector-object-key when a rename is in progress.
    async fn get_remote_object(
        &self,
        task: &PropagationTaskInfo,
        connector: &Arc<dyn ProvisioningConnector>,
        latest: bool,
    ) -> Result<Option<ConnectorObject>, ConnectorError> {
        let Some(key_value) = task.read_conn_object_key(latest).map(str::to_string) else {
            return Ok(None);
        };

        if let Some(matcher) = &self.outbound_matcher {
            let matches = matcher
                .match_objects(task, Arc::clone(connector), &key_value)
                .await?;
            debug!(count = matches.len(), "Matches found for propagation task");
            return Ok(matches.into_iter().next());
        }

        let Some((key_attr, attrs_to_get)) = key_item_for(task) else {
            return Ok(None);
        };
        let options = OperationOptions::with_attributes_to_get(attrs_to_get);

        connector
            .get(&task.object_class, &key_attr, &key_value, &options)
            .await
    }

    /// Persist the task and execution record when the registration rule
    /// holds: failures at trace level FAILURES and above, everything at ALL.
    async fn register_if_needed(&self, task: &PropagationTaskInfo, exec: &TaskExec) {
        let failed = exec.status != ExecStatus::Success;
        let level = task.resource.trace_level_for(task.operation);

        let register = (failed && level >= TraceLevel::Failures) || level == TraceLevel::All;
        if !register {
            return;
        }

        debug!(execution = %exec.key, "Execution to be stored");
        if let Err(e) = self
            .task_store
            .save(PropagationTask::from_info(task), exec.clone())
            .await
        {
            error!(error = %e, "Could not store execution record");
        }
    }

    /// Emit notification/audit events when a consumer is subscribed. Never
    /// affects the task's own status.
    async fn emit_events(
        &self,
        task: &PropagationTaskInfo,
        exec: &TaskExec,
        success: bool,
        before_obj: Option<&ConnectorObject>,
        after_obj: Option<&ConnectorObject>,
        ctx: &SecurityContext,
    ) {
        let any_type_kind = task
            .any_type_kind
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|| "realm".to_string());

        if let Some(notification_manager) = &self.notification_manager {
            if notification_manager
                .notifications_available(&any_type_kind, &task.resource.key, task.operation)
                .await
            {
                notification_manager
                    .create_tasks(
                        ctx,
                        &any_type_kind,
                        &task.resource.key,
                        task.operation,
                        success,
                        before_obj,
                        after_obj,
                        exec,
                    )
                    .await;
            }
        }

        if let Some(audit_manager) = &self.audit_manager {
            if audit_manager
                .audit_requested(&ctx.who, &any_type_kind, &task.resource.key, task.operation)
                .await
            {
                audit_manager
                    .audit(
                        ctx,
                        &any_type_kind,
                        &task.resource.key,
                        task.operation,
                        success,
                        before_obj,
                        after_obj,
                        exec,
                    )
                    .await;
            }
        }
    }

    /// Synthesize a NOT_ATTEMPTED record for a task that could not be
    /// scheduled, applying the registration rule and reporting it.
    pub async fn rejected(
        &self,
        task: &PropagationTaskInfo,
        reason: &str,
        reporter: &PropagationReporter,
        ctx: &SecurityContext,
    ) -> TaskExec {
        let mut exec = TaskExec::started(&ctx.who);
        exec.status = ExecStatus::NotAttempted;
        exec.error_kind = Some(PropagationErrorKind::Rejected);
        exec.message = Some(reason.to_string());
        exec.end = Some(exec.start);

        self.register_if_needed(task, &exec).await;

        reporter.on_success_or_non_priority_resource_failures(
            task,
            exec.status,
            Some(reason.to_string()),
            None,
            None,
            None,
        );

        exec
    }
}

/// Remove a marker attribute, returning the external names it carried.
fn take_marker(attrs: &mut AttributeSet, marker: &str) -> Vec<String> {
    attrs
        .remove(marker)
        .map(|value| value.as_strings().into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Build an "after" snapshot from the identifier and the attributes just
/// sent, for operations where no remote read succeeded.
fn synthesize_after(task: &PropagationTaskInfo, uid: Uid) -> ConnectorObject {
    let mut attrs = task.data.attributes.clone();
    attrs.remove(MANDATORY_MISSING_ATTR);
    attrs.remove(MANDATORY_NULL_OR_EMPTY_ATTR);
    if !attrs.has(NAME_ATTR) {
        if let Some(key) = &task.conn_object_key {
            attrs.set(NAME_ATTR, key.as_str());
        }
    }

    ConnectorObject::new(task.object_class.clone(), uid).with_attributes(attrs)
}

/// The key attribute to read with, plus the external attribute names to
/// fetch, from the task's provision or org unit.
fn key_item_for(task: &PropagationTaskInfo) -> Option<(String, Vec<String>)> {
    let mapping = task
        .resource
        .provision_by_object_class(&task.object_class)
        .map(|p| &p.mapping)
        .or_else(|| {
            task.resource
                .org_unit
                .as_ref()
                .filter(|ou| ou.object_class == task.object_class)
                .map(|ou| &ou.mapping)
        })?;

    let key_attr = mapping
        .iter()
        .find(|item| item.conn_object_key)
        .map(|item| item.ext_attr_name.clone())?;
    let attrs_to_get = mapping.iter().map(|item| item.ext_attr_name.clone()).collect();

    Some((key_attr, attrs_to_get))
}
