//! Propagation manager
//!
//! Builds the list of [`PropagationTaskInfo`] for a create/update/delete of
//! an identity object or realm: resolves resources and provisions, asks the
//! mapping collaborator to prepare attributes, merges requested virtual
//! attribute values, evaluates mandatory conditions into the violation
//! markers, and handles linked accounts.
//!
//! Unknown or misconfigured resources are logged and skipped, never raised:
//! the batch proceeds for every resolvable resource.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use syncline_connector::delta::AttributeDelta;
use syncline_connector::object::{AttributeSet, AttributeValue, NAME_ATTR, PASSWORD_ATTR};

use crate::by_resource::PropagationByResource;
use crate::entity::{IdentityObject, LinkedAccount, Realm, VirAttr};
use crate::mapping::{
    MandatoryConditionEvaluator, MappingHandler, PreparedAttrs, VirSchemaStore,
};
use crate::resource::{ExternalResource, MappingItem, Provision};
use crate::task::{
    PropagationData, PropagationTaskInfo, MANDATORY_MISSING_ATTR, MANDATORY_NULL_OR_EMPTY_ATTR,
};
use crate::types::{AnyTypeKind, ResourceOperation};

/// Bookkeeping key for linked accounts: `(resource, connector-object-key)`.
pub type AccountKey = (String, String);

/// Resolves external resource configurations by key.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Find a resource by key.
    async fn find(&self, key: &str) -> Option<Arc<ExternalResource>>;
}

/// Builds propagation tasks out of identity changes.
pub struct PropagationManager {
    resource_store: Arc<dyn ResourceStore>,
    mapping_handler: Arc<dyn MappingHandler>,
    vir_schema_store: Arc<dyn VirSchemaStore>,
    mandatory_evaluator: Arc<dyn MandatoryConditionEvaluator>,
}

impl PropagationManager {
    /// Create a manager with its collaborators.
    pub fn new(
        resource_store: Arc<dyn ResourceStore>,
        mapping_handler: Arc<dyn MappingHandler>,
        vir_schema_store: Arc<dyn VirSchemaStore>,
        mandatory_evaluator: Arc<dyn MandatoryConditionEvaluator>,
    ) -> Self {
        Self {
            resource_store,
            mapping_handler,
            vir_schema_store,
            mandatory_evaluator,
        }
    }

    /// Build the tasks for a newly created entity.
    ///
    /// The password, when given, is propagated to every resource involved.
    #[instrument(skip_all, fields(entity = %entity.key))]
    pub async fn create_tasks(
        &self,
        entity: &IdentityObject,
        password: Option<&str>,
        enable: Option<bool>,
        prop_by_res: &mut PropagationByResource,
        prop_by_linked_account: Option<&mut PropagationByResource<AccountKey>>,
        vir_attrs: &[VirAttr],
        excluded_resources: &[String],
    ) -> Vec<PropagationTaskInfo> {
        if prop_by_res.is_empty()
            && prop_by_linked_account
                .as_ref()
                .map(|p| p.is_empty())
                .unwrap_or(true)
        {
            return Vec::new();
        }

        prop_by_res.remove_all_for(ResourceOperation::Create, excluded_resources);
        let prop_by_linked_account = prop_by_linked_account.map(|p| {
            p.remove_if_for(ResourceOperation::Create, |(resource, _)| {
                excluded_resources.contains(resource)
            });
            p
        });

        // On create the password goes to every resource involved.
        let mut change_pwd_res: Vec<String> =
            prop_by_res.as_map().into_iter().map(|(k, _)| k).collect();
        if let Some(by_account) = prop_by_linked_account.as_ref() {
            change_pwd_res.extend(by_account.as_map().into_iter().map(|((r, _), _)| r));
        }

        self.build_tasks(
            entity,
            password,
            &change_pwd_res,
            enable,
            prop_by_res,
            prop_by_linked_account,
            vir_attrs,
        )
        .await
    }

    /// Build the tasks for an updated entity.
    ///
    /// `change_pwd_res` names the resources whose propagation must include
    /// the password.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(entity = %entity.key))]
    pub async fn update_tasks(
        &self,
        entity: &IdentityObject,
        password: Option<&str>,
        change_pwd_res: &[String],
        enable: Option<bool>,
        prop_by_res: &mut PropagationByResource,
        prop_by_linked_account: Option<&mut PropagationByResource<AccountKey>>,
        vir_attrs: &[VirAttr],
        excluded_resources: &[String],
    ) -> Vec<PropagationTaskInfo> {
        prop_by_res.remove_all(excluded_resources);
        let prop_by_linked_account = prop_by_linked_account.map(|p| {
            p.remove_if(|(resource, _)| excluded_resources.contains(resource));
            p
        });

        self.build_tasks(
            entity,
            password,
            change_pwd_res,
            enable,
            prop_by_res,
            prop_by_linked_account,
            vir_attrs,
        )
        .await
    }

    /// Build the tasks for a deleted entity.
    ///
    /// When `prop_by_res` carries no directive, every resource currently
    /// assigned to the entity is slated for deletion.
    #[instrument(skip_all, fields(entity = %entity.key))]
    pub async fn delete_tasks(
        &self,
        entity: &IdentityObject,
        prop_by_res: &mut PropagationByResource,
        prop_by_linked_account: Option<&mut PropagationByResource<AccountKey>>,
        excluded_resources: &[String],
    ) -> Vec<PropagationTaskInfo> {
        if prop_by_res.is_empty() {
            prop_by_res.add_all(ResourceOperation::Delete, entity.resources.iter().cloned());
        }

        prop_by_res.remove_all(excluded_resources);
        let prop_by_linked_account = prop_by_linked_account.map(|p| {
            p.remove_if(|(resource, _)| excluded_resources.contains(resource));
            p
        });

        self.build_tasks(
            entity,
            None,
            &[],
            None,
            prop_by_res,
            prop_by_linked_account,
            &[],
        )
        .await
    }

    /// Build the tasks for a realm change, keyed on each resource's org unit.
    #[instrument(skip_all, fields(realm = %realm.full_path))]
    pub async fn realm_tasks(
        &self,
        realm: &Realm,
        prop_by_res: &mut PropagationByResource,
        excluded_resources: &[String],
    ) -> Vec<PropagationTaskInfo> {
        prop_by_res.remove_all(excluded_resources);

        debug!(prop_by_res = ?prop_by_res.as_map(), "Provisioning realm");
        prop_by_res.purge();

        let mut tasks = Vec::new();

        for (resource_key, operation) in prop_by_res.as_map() {
            let Some(resource) = self.resource_store.find(&resource_key).await else {
                error!(resource = %resource_key, "Invalid resource name specified, ignoring");
                continue;
            };
            let Some(org_unit) = resource.org_unit.clone() else {
                error!(resource = %resource_key, "No orgUnit specified on resource, ignoring");
                continue;
            };
            if org_unit.conn_object_link.trim().is_empty() {
                warn!(
                    realm = %realm.full_path,
                    resource = %resource_key,
                    "Requesting propagation but no connObjectLink provided"
                );
                continue;
            }

            let prepared = match self
                .mapping_handler
                .prepare_attrs_from_realm(realm, &resource, &org_unit)
                .await
            {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!(resource = %resource_key, error = %e, "Could not prepare attributes, ignoring");
                    continue;
                }
            };

            let mut task = PropagationTaskInfo::new(
                Arc::clone(&resource),
                operation,
                org_unit.object_class.clone(),
            );
            task.entity_key = Some(realm.key);
            task.conn_object_key = prepared.conn_object_key;
            task.old_conn_object_key = prop_by_res
                .get_old_conn_object_key(&resource_key)
                .map(str::to_string);
            task.data = PropagationData::new(prepared.attributes);

            debug!(task = ?task, "PropagationTask created");
            tasks.push(task);
        }

        tasks
    }

    /// Core task building, shared by the per-operation entry points.
    #[allow(clippy::too_many_arguments)]
    async fn build_tasks(
        &self,
        entity: &IdentityObject,
        password: Option<&str>,
        change_pwd_res: &[String],
        enable: Option<bool>,
        prop_by_res: &mut PropagationByResource,
        prop_by_linked_account: Option<&mut PropagationByResource<AccountKey>>,
        vir_attrs: &[VirAttr],
    ) -> Vec<PropagationTaskInfo> {
        debug!(prop_by_res = ?prop_by_res.as_map(), "Provisioning entity");
        prop_by_res.purge();
        debug!(prop_by_res = ?prop_by_res.as_map(), "After purge");

        let vir_attr_map = self
            .resolve_virtual_attributes(entity, prop_by_res, vir_attrs)
            .await;

        let mut tasks = Vec::new();

        for (resource_key, operation) in prop_by_res.as_map() {
            let Some(resource) = self.resource_store.find(&resource_key).await else {
                error!(resource = %resource_key, "Invalid resource name specified, ignoring");
                continue;
            };
            let Some(provision) = resource.provision_for(&entity.any_type).cloned() else {
                error!(
                    resource = %resource_key,
                    any_type = %entity.any_type,
                    "No provision specified on resource for type, ignoring"
                );
                continue;
            };
            if provision.mapping.is_empty() {
                warn!(
                    resource = %resource_key,
                    any_type = %entity.any_type,
                    "Requesting propagation but no mapping provided"
                );
                continue;
            }

            let prepared = match self
                .mapping_handler
                .prepare_attrs(
                    entity,
                    password,
                    change_pwd_res.contains(&resource_key),
                    enable,
                    &resource,
                    &provision,
                )
                .await
            {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!(resource = %resource_key, error = %e, "Could not prepare attributes, ignoring");
                    continue;
                }
            };

            let mut task = self.new_task(entity, &resource, operation, &provision, prepared);
            if let Some(values) = vir_attr_map.get(&resource_key) {
                for (ext_attr_name, attr_values) in values {
                    task.data
                        .attributes
                        .set(ext_attr_name.clone(), attr_values.clone());
                }
            }
            task.old_conn_object_key = prop_by_res
                .get_old_conn_object_key(&resource_key)
                .map(str::to_string);

            debug!(task = ?task, "PropagationTask created");
            tasks.push(task);
        }

        if entity.kind == AnyTypeKind::User {
            if let Some(prop_by_linked_account) = prop_by_linked_account {
                prop_by_linked_account.purge();
                tasks.extend(
                    self.linked_account_tasks(entity, password, change_pwd_res, prop_by_linked_account)
                        .await,
                );
            }
        }

        tasks
    }

    /// Resolve requested virtual attribute values into per-resource attribute
    /// merges, enrolling each touched resource for UPDATE unless it is
    /// already slated for CREATE.
    async fn resolve_virtual_attributes(
        &self,
        entity: &IdentityObject,
        prop_by_res: &mut PropagationByResource,
        vir_attrs: &[VirAttr],
    ) -> HashMap<String, Vec<(String, Vec<AttributeValue>)>> {
        let mut vir_attr_map: HashMap<String, Vec<(String, Vec<AttributeValue>)>> = HashMap::new();
        if vir_attrs.is_empty() {
            return vir_attr_map;
        }

        let mut virtual_resources: Vec<String> = prop_by_res
            .get(ResourceOperation::Create)
            .into_iter()
            .chain(prop_by_res.get(ResourceOperation::Update))
            .collect();
        virtual_resources.extend(entity.resources.iter().cloned());

        for vir_attr in vir_attrs {
            let Some(schema) = self.vir_schema_store.find(&vir_attr.schema).await else {
                warn!(schema = %vir_attr.schema, "Ignoring invalid virtual schema");
                continue;
            };
            if schema.readonly {
                warn!(schema = %vir_attr.schema, "Ignoring read-only virtual schema");
                continue;
            }
            if !schema.allowed_for(&entity.any_type)
                || !virtual_resources.contains(&schema.resource)
            {
                warn!(
                    schema = %vir_attr.schema,
                    resource = %schema.resource,
                    "Virtual schema not owned by an active resource or not allowed for entity"
                );
                continue;
            }

            let values: Vec<AttributeValue> = vir_attr
                .values
                .iter()
                .map(|v| AttributeValue::from(v.as_str()))
                .collect();
            vir_attr_map
                .entry(schema.resource.clone())
                .or_default()
                .push((schema.ext_attr_name.clone(), values));

            if !prop_by_res.contains(ResourceOperation::Create, &schema.resource) {
                prop_by_res.add(ResourceOperation::Update, schema.resource.clone());
            }
        }

        debug!(vir_attr_map = ?vir_attr_map.keys().collect::<Vec<_>>(), "With virtual attributes");
        vir_attr_map
    }

    /// Build one task for an entity on a resource, attaching the
    /// mandatory-violation markers.
    fn new_task(
        &self,
        entity: &IdentityObject,
        resource: &Arc<ExternalResource>,
        operation: ResourceOperation,
        provision: &Provision,
        prepared: PreparedAttrs,
    ) -> PropagationTaskInfo {
        let mut attributes = prepared.attributes;
        self.apply_mandatory_markers(entity, &provision.mapping, &mut attributes);

        let mut task = PropagationTaskInfo::new(
            Arc::clone(resource),
            operation,
            provision.object_class.clone(),
        );
        task.any_type_kind = Some(entity.kind);
        task.any_type = Some(entity.any_type.clone());
        task.entity_key = Some(entity.key);
        task.conn_object_key = prepared.conn_object_key;
        task.data = PropagationData::new(attributes);
        task
    }

    /// Evaluate each mapping item's mandatory condition against the entity;
    /// items that come out mandatory but missing (or present-but-empty)
    /// contribute their external name to the corresponding marker, later
    /// interpreted by the executor.
    fn apply_mandatory_markers(
        &self,
        entity: &IdentityObject,
        mapping: &[MappingItem],
        attributes: &mut AttributeSet,
    ) {
        let mut mandatory_missing = Vec::new();
        let mut mandatory_null_or_empty = Vec::new();

        for item in mapping.iter().filter(|item| {
            !item.conn_object_key
                && self
                    .mandatory_evaluator
                    .evaluate(&item.mandatory_condition, entity)
        }) {
            match attributes.get(&item.ext_attr_name) {
                None => mandatory_missing.push(item.ext_attr_name.clone()),
                Some(value) if value.is_null_or_empty() => {
                    mandatory_null_or_empty.push(item.ext_attr_name.clone());
                }
                Some(_) => {}
            }
        }

        if !mandatory_missing.is_empty() {
            attributes.set(MANDATORY_MISSING_ATTR, mandatory_missing);
        }
        if !mandatory_null_or_empty.is_empty() {
            attributes.set(MANDATORY_NULL_OR_EMPTY_ATTR, mandatory_null_or_empty);
        }
    }

    /// Build one task per pending linked-account directive.
    ///
    /// A DELETE for an account the in-memory user no longer carries still
    /// produces a task, through a synthesized placeholder with the account's
    /// resource and external key.
    async fn linked_account_tasks(
        &self,
        user: &IdentityObject,
        password: Option<&str>,
        change_pwd_res: &[String],
        prop_by_linked_account: &PropagationByResource<AccountKey>,
    ) -> Vec<PropagationTaskInfo> {
        let mut tasks = Vec::new();

        for ((resource_key, account_key), operation) in prop_by_linked_account.as_map() {
            let account = match user.linked_account(&resource_key, &account_key) {
                Some(account) => account.clone(),
                None if operation == ResourceOperation::Delete => {
                    // The account is already gone locally; a read-only
                    // placeholder still lets the delete go out.
                    LinkedAccount::new(resource_key.clone(), account_key.clone())
                }
                None => {
                    error!(
                        operation = %operation,
                        account = %account_key,
                        resource = %resource_key,
                        "Invalid operation on deleted account, ignoring"
                    );
                    continue;
                }
            };

            let Some(resource) = self.resource_store.find(&resource_key).await else {
                error!(resource = %resource_key, "Invalid resource name specified, ignoring");
                continue;
            };
            let Some(provision) = resource.provision_for(&user.any_type).cloned() else {
                error!(
                    resource = %resource_key,
                    any_type = %user.any_type,
                    "No provision specified on resource for type, ignoring"
                );
                continue;
            };
            if provision.mapping.is_empty() {
                warn!(
                    resource = %resource_key,
                    any_type = %user.any_type,
                    "Requesting propagation but no mapping provided"
                );
                continue;
            }

            let attributes = match self
                .mapping_handler
                .prepare_attrs_from_linked_account(
                    user,
                    &account,
                    password,
                    change_pwd_res.contains(&resource_key),
                    &provision,
                )
                .await
            {
                Ok(attributes) => attributes,
                Err(e) => {
                    error!(resource = %resource_key, error = %e, "Could not prepare attributes, ignoring");
                    continue;
                }
            };

            let task = self.new_task(
                user,
                &resource,
                operation,
                &provision,
                PreparedAttrs::new(account.conn_object_key_value.clone(), attributes),
            );

            debug!(account = %account.conn_object_key_value, task = ?task, "PropagationTask created for linked account");
            tasks.push(task);
        }

        tasks
    }

    /// Capture pre-update attribute sets for every resource of the entity
    /// whose policy enables delta updates, keyed by
    /// `(resource, connector-object-key)`.
    pub async fn prepare_before_attrs(
        &self,
        entity: &IdentityObject,
        password: Option<&str>,
        change_pwd_res: &[String],
        enable: Option<bool>,
        excluded_resources: &[String],
    ) -> HashMap<AccountKey, AttributeSet> {
        let mut before_attrs = HashMap::new();

        for resource_key in entity
            .resources
            .iter()
            .filter(|r| !excluded_resources.contains(r))
        {
            let Some(resource) = self.resource_store.find(resource_key).await else {
                continue;
            };
            let delta_enabled = resource
                .propagation_policy
                .as_ref()
                .map(|p| p.update_delta)
                .unwrap_or(false);
            if !delta_enabled {
                continue;
            }
            let Some(provision) = resource.provision_for(&entity.any_type).cloned() else {
                continue;
            };

            match self
                .mapping_handler
                .prepare_attrs(
                    entity,
                    password,
                    change_pwd_res.contains(resource_key),
                    enable,
                    &resource,
                    &provision,
                )
                .await
            {
                Ok(prepared) => {
                    if let Some(conn_object_key) = prepared.conn_object_key {
                        before_attrs
                            .insert((resource.key.clone(), conn_object_key), prepared.attributes);
                    }
                }
                Err(e) => {
                    warn!(resource = %resource_key, error = %e, "Could not capture before-attributes");
                }
            }
        }

        debug!(count = before_attrs.len(), "Prepared before-attributes");
        before_attrs
    }

    /// Rewrite tasks to carry incremental deltas computed against the given
    /// pre-update attribute sets.
    ///
    /// Rename tasks keep the full-set path (renames are not expressible as
    /// deltas), as do tasks with no captured before-attributes.
    pub fn set_attribute_deltas(
        &self,
        tasks: &mut [PropagationTaskInfo],
        before_attrs: &HashMap<AccountKey, AttributeSet>,
    ) {
        if before_attrs.is_empty() {
            return;
        }

        for task in tasks.iter_mut() {
            if let (Some(old), Some(new)) =
                (task.old_conn_object_key.as_deref(), task.conn_object_key.as_deref())
            {
                if old != new {
                    continue;
                }
            }

            let Some(conn_object_key) = task.conn_object_key.clone() else {
                continue;
            };
            let Some(prev_attrs) =
                before_attrs.get(&(task.resource.key.clone(), conn_object_key))
            else {
                continue;
            };

            let mut prev_attrs = prev_attrs.clone();
            prev_attrs.remove(MANDATORY_MISSING_ATTR);
            prev_attrs.remove(MANDATORY_NULL_OR_EMPTY_ATTR);

            let delta = build_delta(&task.data.attributes, &prev_attrs);
            if !delta.is_empty() {
                task.data.attribute_delta = Some(delta);
            }
        }
    }
}

/// Whether an attribute takes the ordinary add/remove delta shape, as opposed
/// to operational attributes that are always replaced.
fn is_ordinary_for_delta(name: &str) -> bool {
    name != NAME_ATTR && name != PASSWORD_ATTR
}

fn values_of(value: &AttributeValue) -> Vec<AttributeValue> {
    match value {
        AttributeValue::Null => Vec::new(),
        AttributeValue::Array(values) => values.clone(),
        other => vec![other.clone()],
    }
}

/// Compute the incremental delta turning `prev` into `next`.
fn build_delta(next: &AttributeSet, prev: &AttributeSet) -> AttributeDelta {
    let mut delta = AttributeDelta::new();

    for (name, next_value) in next.iter() {
        if name == MANDATORY_MISSING_ATTR || name == MANDATORY_NULL_OR_EMPTY_ATTR {
            continue;
        }

        let next_values = values_of(next_value);
        match prev.get(name) {
            Some(prev_value) => {
                // The password never differs from the captured snapshot but
                // must be carried anyway.
                if name == PASSWORD_ATTR {
                    delta.replace_values(name.clone(), next_values);
                    continue;
                }

                let prev_values = values_of(prev_value);
                let to_add: Vec<AttributeValue> = next_values
                    .iter()
                    .filter(|v| !prev_values.contains(v))
                    .cloned()
                    .collect();
                let to_remove: Vec<AttributeValue> = prev_values
                    .iter()
                    .filter(|v| !next_values.contains(v))
                    .cloned()
                    .collect();

                if is_ordinary_for_delta(name) {
                    if !to_add.is_empty() {
                        delta.add_values(name.clone(), to_add);
                    }
                    if !to_remove.is_empty() {
                        delta.remove_values(name.clone(), to_remove);
                    }
                } else if !to_add.is_empty() {
                    delta.replace_values(name.clone(), to_add);
                }
            }
            None if is_ordinary_for_delta(name) => {
                if !next_values.is_empty() {
                    delta.add_values(name.clone(), next_values);
                }
            }
            None => {
                delta.replace_values(name.clone(), next_values);
            }
        }
    }

    for (name, prev_value) in prev.iter() {
        if !is_ordinary_for_delta(name) || next.has(name) {
            continue;
        }
        let prev_values = values_of(prev_value);
        if !prev_values.is_empty() {
            delta.remove_values(name.clone(), prev_values);
        }
    }

    delta
}
