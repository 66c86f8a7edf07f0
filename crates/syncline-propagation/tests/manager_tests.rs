//! Propagation Manager Tests
//!
//! Task-building scenarios with mock resource/mapping collaborators:
//! skipping of unknown or misconfigured resources, purge semantics,
//! mandatory-violation markers, virtual attributes, linked accounts,
//! realm propagation and delta computation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use syncline_connector::object::{AttributeSet, AttributeValue};

use syncline_propagation::{
    AnyTypeKind, ExternalResource, IdentityObject, LinkedAccount, MappingError, MappingHandler,
    MappingItem, MappingResult, OrgUnit, PreparedAttrs, PropagationByResource, PropagationManager,
    PropagationPolicy, Provision, Realm, ResourceOperation, ResourceStore, RhaiMandatoryEvaluator,
    VirAttr, VirSchema, VirSchemaStore, MANDATORY_MISSING_ATTR, MANDATORY_NULL_OR_EMPTY_ATTR,
};

// =============================================================================
// Mock collaborators
// =============================================================================

#[derive(Default)]
struct StaticResourceStore {
    resources: HashMap<String, Arc<ExternalResource>>,
}

impl StaticResourceStore {
    fn with(mut self, resource: ExternalResource) -> Self {
        self.resources
            .insert(resource.key.clone(), Arc::new(resource));
        self
    }
}

#[async_trait]
impl ResourceStore for StaticResourceStore {
    async fn find(&self, key: &str) -> Option<Arc<ExternalResource>> {
        self.resources.get(key).cloned()
    }
}

#[derive(Default)]
struct StaticVirSchemaStore {
    schemas: HashMap<String, VirSchema>,
}

impl StaticVirSchemaStore {
    fn with(mut self, schema: VirSchema) -> Self {
        self.schemas.insert(schema.key.clone(), schema);
        self
    }
}

#[async_trait]
impl VirSchemaStore for StaticVirSchemaStore {
    async fn find(&self, key: &str) -> Option<VirSchema> {
        self.schemas.get(key).cloned()
    }
}

/// Mapping handler returning canned attribute sets per resource, with the
/// connector-object-key fixed to "uid=john".
#[derive(Default)]
struct TestMappingHandler {
    attrs: HashMap<String, AttributeSet>,
    change_pwd_seen: Mutex<HashMap<String, bool>>,
}

impl TestMappingHandler {
    fn with_attrs(mut self, resource: &str, attrs: AttributeSet) -> Self {
        self.attrs.insert(resource.to_string(), attrs);
        self
    }
}

#[async_trait]
impl MappingHandler for TestMappingHandler {
    async fn prepare_attrs(
        &self,
        _entity: &IdentityObject,
        _password: Option<&str>,
        change_pwd: bool,
        _enable: Option<bool>,
        resource: &ExternalResource,
        _provision: &Provision,
    ) -> MappingResult<PreparedAttrs> {
        self.change_pwd_seen
            .lock()
            .unwrap()
            .insert(resource.key.clone(), change_pwd);
        Ok(PreparedAttrs::new(
            "uid=john",
            self.attrs.get(&resource.key).cloned().unwrap_or_default(),
        ))
    }

    async fn prepare_attrs_from_linked_account(
        &self,
        _user: &IdentityObject,
        account: &LinkedAccount,
        _password: Option<&str>,
        _change_pwd: bool,
        _provision: &Provision,
    ) -> MappingResult<AttributeSet> {
        Ok(self
            .attrs
            .get(&account.resource)
            .cloned()
            .unwrap_or_default())
    }

    async fn prepare_attrs_from_realm(
        &self,
        realm: &Realm,
        _resource: &ExternalResource,
        _org_unit: &OrgUnit,
    ) -> MappingResult<PreparedAttrs> {
        Ok(PreparedAttrs::new(
            format!("ou={}", realm.full_path),
            AttributeSet::new().with("name", realm.full_path.as_str()),
        ))
    }
}

/// Mapping handler that always fails, to exercise the skip path.
struct BrokenMappingHandler;

#[async_trait]
impl MappingHandler for BrokenMappingHandler {
    async fn prepare_attrs(
        &self,
        _entity: &IdentityObject,
        _password: Option<&str>,
        _change_pwd: bool,
        _enable: Option<bool>,
        _resource: &ExternalResource,
        _provision: &Provision,
    ) -> MappingResult<PreparedAttrs> {
        Err(MappingError::InvalidMapping {
            message: "broken".to_string(),
        })
    }

    async fn prepare_attrs_from_linked_account(
        &self,
        _user: &IdentityObject,
        _account: &LinkedAccount,
        _password: Option<&str>,
        _change_pwd: bool,
        _provision: &Provision,
    ) -> MappingResult<AttributeSet> {
        Err(MappingError::InvalidMapping {
            message: "broken".to_string(),
        })
    }

    async fn prepare_attrs_from_realm(
        &self,
        _realm: &Realm,
        _resource: &ExternalResource,
        _org_unit: &OrgUnit,
    ) -> MappingResult<PreparedAttrs> {
        Err(MappingError::InvalidMapping {
            message: "broken".to_string(),
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn user_provision() -> Provision {
    Provision::new("USER", "inetOrgPerson")
        .with_item(MappingItem::new("username", "uid").as_conn_object_key())
        .with_item(MappingItem::new("email", "mail"))
}

fn user_resource(key: &str) -> ExternalResource {
    ExternalResource::new(key).with_provision(user_provision())
}

fn john() -> IdentityObject {
    IdentityObject::new(Uuid::new_v4(), AnyTypeKind::User, "USER")
        .with_plain_attr("email", "john@example.com")
}

fn manager(store: StaticResourceStore, handler: TestMappingHandler) -> PropagationManager {
    PropagationManager::new(
        Arc::new(store),
        Arc::new(handler),
        Arc::new(StaticVirSchemaStore::default()),
        Arc::new(RhaiMandatoryEvaluator::new()),
    )
}

fn manager_with_schemas(
    store: StaticResourceStore,
    handler: TestMappingHandler,
    schemas: StaticVirSchemaStore,
) -> PropagationManager {
    PropagationManager::new(
        Arc::new(store),
        Arc::new(handler),
        Arc::new(schemas),
        Arc::new(RhaiMandatoryEvaluator::new()),
    )
}

// =============================================================================
// Basic task building
// =============================================================================

#[tokio::test]
async fn create_builds_one_task_per_resource() {
    let manager = manager(
        StaticResourceStore::default()
            .with(user_resource("ldap"))
            .with(user_resource("db")),
        TestMappingHandler::default()
            .with_attrs("ldap", AttributeSet::new().with("mail", "john@example.com")),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Create, "ldap".to_string());
    prop_by_res.add(ResourceOperation::Create, "db".to_string());

    let tasks = manager
        .create_tasks(&john(), Some("s3cret"), Some(true), &mut prop_by_res, None, &[], &[])
        .await;

    assert_eq!(tasks.len(), 2);
    for task in &tasks {
        assert_eq!(task.operation, ResourceOperation::Create);
        assert_eq!(task.object_class, "inetOrgPerson");
        assert_eq!(task.conn_object_key.as_deref(), Some("uid=john"));
        assert_eq!(task.any_type.as_deref(), Some("USER"));
    }
}

#[tokio::test]
async fn create_propagates_password_everywhere() {
    let handler = Arc::new(TestMappingHandler::default());
    let manager = PropagationManager::new(
        Arc::new(
            StaticResourceStore::default()
                .with(user_resource("ldap"))
                .with(user_resource("db")),
        ),
        Arc::clone(&handler) as Arc<dyn MappingHandler>,
        Arc::new(StaticVirSchemaStore::default()),
        Arc::new(RhaiMandatoryEvaluator::new()),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Create, "ldap".to_string());
    prop_by_res.add(ResourceOperation::Create, "db".to_string());

    manager
        .create_tasks(&john(), Some("s3cret"), None, &mut prop_by_res, None, &[], &[])
        .await;

    let seen = handler.change_pwd_seen.lock().unwrap();
    assert_eq!(seen.get("ldap"), Some(&true));
    assert_eq!(seen.get("db"), Some(&true));
}

#[tokio::test]
async fn excluded_resources_are_dropped_first() {
    let manager = manager(
        StaticResourceStore::default()
            .with(user_resource("ldap"))
            .with(user_resource("db")),
        TestMappingHandler::default(),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Create, "ldap".to_string());
    prop_by_res.add(ResourceOperation::Create, "db".to_string());

    let tasks = manager
        .create_tasks(
            &john(),
            None,
            None,
            &mut prop_by_res,
            None,
            &[],
            &["db".to_string()],
        )
        .await;

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].resource.key, "ldap");
}

#[tokio::test]
async fn unknown_and_misconfigured_resources_are_skipped_not_raised() {
    let manager = manager(
        StaticResourceStore::default()
            .with(user_resource("ldap"))
            // no provision at all
            .with(ExternalResource::new("no-provision"))
            // provision without mapping items
            .with(
                ExternalResource::new("empty-mapping")
                    .with_provision(Provision::new("USER", "inetOrgPerson")),
            ),
        TestMappingHandler::default(),
    );

    let mut prop_by_res = PropagationByResource::new();
    for key in ["ldap", "ghost", "no-provision", "empty-mapping"] {
        prop_by_res.add(ResourceOperation::Update, key.to_string());
    }

    let tasks = manager
        .update_tasks(&john(), None, &[], None, &mut prop_by_res, None, &[], &[])
        .await;

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].resource.key, "ldap");
}

#[tokio::test]
async fn mapping_errors_skip_the_resource() {
    let manager = PropagationManager::new(
        Arc::new(StaticResourceStore::default().with(user_resource("ldap"))),
        Arc::new(BrokenMappingHandler),
        Arc::new(StaticVirSchemaStore::default()),
        Arc::new(RhaiMandatoryEvaluator::new()),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Create, "ldap".to_string());

    let tasks = manager
        .create_tasks(&john(), None, None, &mut prop_by_res, None, &[], &[])
        .await;
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn conflicting_directives_collapse_to_one_task() {
    let manager = manager(
        StaticResourceStore::default().with(user_resource("ldap")),
        TestMappingHandler::default(),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Create, "ldap".to_string());
    prop_by_res.add(ResourceOperation::Delete, "ldap".to_string());

    let tasks = manager
        .delete_tasks(&john(), &mut prop_by_res, None, &[])
        .await;

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].operation, ResourceOperation::Delete);
}

#[tokio::test]
async fn old_conn_object_key_carried_onto_task() {
    let manager = manager(
        StaticResourceStore::default().with(user_resource("ldap")),
        TestMappingHandler::default(),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Update, "ldap".to_string());
    prop_by_res.set_old_conn_object_key("ldap".to_string(), "uid=john.old");

    let tasks = manager
        .update_tasks(&john(), None, &[], None, &mut prop_by_res, None, &[], &[])
        .await;

    assert_eq!(tasks[0].old_conn_object_key.as_deref(), Some("uid=john.old"));
}

#[tokio::test]
async fn delete_defaults_to_all_assigned_resources() {
    let manager = manager(
        StaticResourceStore::default()
            .with(user_resource("ldap"))
            .with(user_resource("db")),
        TestMappingHandler::default(),
    );

    let entity = john().with_resource("ldap").with_resource("db");
    let mut prop_by_res = PropagationByResource::new();

    let tasks = manager
        .delete_tasks(&entity, &mut prop_by_res, None, &[])
        .await;

    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.operation == ResourceOperation::Delete));
}

// =============================================================================
// Mandatory-violation markers
// =============================================================================

#[tokio::test]
async fn missing_mandatory_attribute_marks_task() {
    let resource = ExternalResource::new("ldap").with_provision(
        Provision::new("USER", "inetOrgPerson")
            .with_item(MappingItem::new("username", "uid").as_conn_object_key())
            .with_item(MappingItem::new("email", "mail").mandatory("true")),
    );
    let manager = manager(
        StaticResourceStore::default().with(resource),
        // prepared attrs do not contain "mail"
        TestMappingHandler::default().with_attrs("ldap", AttributeSet::new().with("cn", "John")),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Create, "ldap".to_string());

    let tasks = manager
        .create_tasks(&john(), None, None, &mut prop_by_res, None, &[], &[])
        .await;

    let marker = tasks[0].data.attributes.get(MANDATORY_MISSING_ATTR).unwrap();
    assert_eq!(marker.as_strings(), vec!["mail"]);
    assert!(!tasks[0].data.attributes.has(MANDATORY_NULL_OR_EMPTY_ATTR));
}

#[tokio::test]
async fn empty_mandatory_attribute_marks_task() {
    let resource = ExternalResource::new("ldap").with_provision(
        Provision::new("USER", "inetOrgPerson")
            .with_item(MappingItem::new("username", "uid").as_conn_object_key())
            .with_item(MappingItem::new("email", "mail").mandatory("true")),
    );
    let manager = manager(
        StaticResourceStore::default().with(resource),
        TestMappingHandler::default()
            .with_attrs("ldap", AttributeSet::new().with("mail", AttributeValue::Array(vec![]))),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Update, "ldap".to_string());

    let tasks = manager
        .update_tasks(&john(), None, &[], None, &mut prop_by_res, None, &[], &[])
        .await;

    let marker = tasks[0]
        .data
        .attributes
        .get(MANDATORY_NULL_OR_EMPTY_ATTR)
        .unwrap();
    assert_eq!(marker.as_strings(), vec!["mail"]);
}

#[tokio::test]
async fn conn_object_key_item_never_marked() {
    let resource = ExternalResource::new("ldap").with_provision(
        Provision::new("USER", "inetOrgPerson")
            // key item is mandatory but missing from the prepared attrs;
            // key items are excluded from the mandatory check
            .with_item(
                MappingItem::new("username", "uid")
                    .as_conn_object_key()
                    .mandatory("true"),
            ),
    );
    let manager = manager(
        StaticResourceStore::default().with(resource),
        TestMappingHandler::default(),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Create, "ldap".to_string());

    let tasks = manager
        .create_tasks(&john(), None, None, &mut prop_by_res, None, &[], &[])
        .await;

    assert!(!tasks[0].data.attributes.has(MANDATORY_MISSING_ATTR));
}

#[tokio::test]
async fn mandatory_condition_sees_entity_attributes() {
    let resource = ExternalResource::new("ldap").with_provision(
        Provision::new("USER", "inetOrgPerson")
            .with_item(MappingItem::new("username", "uid").as_conn_object_key())
            .with_item(
                MappingItem::new("email", "mail").mandatory(r#"attrs["employee_type"] == "staff""#),
            ),
    );
    let manager = manager(
        StaticResourceStore::default().with(resource),
        TestMappingHandler::default(),
    );

    let staff = john().with_plain_attr("employee_type", "staff");
    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Create, "ldap".to_string());
    let tasks = manager
        .create_tasks(&staff, None, None, &mut prop_by_res, None, &[], &[])
        .await;
    assert!(tasks[0].data.attributes.has(MANDATORY_MISSING_ATTR));

    let contractor = john().with_plain_attr("employee_type", "contractor");
    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Create, "ldap".to_string());
    let tasks = manager
        .create_tasks(&contractor, None, None, &mut prop_by_res, None, &[], &[])
        .await;
    assert!(!tasks[0].data.attributes.has(MANDATORY_MISSING_ATTR));
}

// =============================================================================
// Virtual attributes
// =============================================================================

fn v_mail_schema() -> VirSchema {
    VirSchema {
        key: "vMail".to_string(),
        readonly: false,
        ext_attr_name: "mail".to_string(),
        resource: "ldap".to_string(),
        any_types: vec!["USER".to_string()],
    }
}

#[tokio::test]
async fn virtual_attribute_enrolls_resource_for_update() {
    let manager = manager_with_schemas(
        StaticResourceStore::default().with(user_resource("ldap")),
        TestMappingHandler::default(),
        StaticVirSchemaStore::default().with(v_mail_schema()),
    );

    let entity = john().with_resource("ldap");
    let mut prop_by_res = PropagationByResource::new();
    let vir_attrs = vec![VirAttr::new("vMail", vec!["john@example.com".to_string()])];

    let tasks = manager
        .update_tasks(&entity, None, &[], None, &mut prop_by_res, None, &vir_attrs, &[])
        .await;

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].operation, ResourceOperation::Update);
    let mail = tasks[0].data.attributes.get("mail").unwrap();
    assert_eq!(mail.as_strings(), vec!["john@example.com"]);
}

#[tokio::test]
async fn virtual_attribute_merged_into_pending_create() {
    let manager = manager_with_schemas(
        StaticResourceStore::default().with(user_resource("ldap")),
        TestMappingHandler::default(),
        StaticVirSchemaStore::default().with(v_mail_schema()),
    );

    let entity = john().with_resource("ldap");
    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Create, "ldap".to_string());
    let vir_attrs = vec![VirAttr::new("vMail", vec!["john@example.com".to_string()])];

    let tasks = manager
        .create_tasks(&entity, None, None, &mut prop_by_res, None, &vir_attrs, &[])
        .await;

    // still a single CREATE task, virtual values folded in
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].operation, ResourceOperation::Create);
    assert!(tasks[0].data.attributes.has("mail"));
}

#[tokio::test]
async fn invalid_virtual_attributes_are_ignored() {
    let readonly = VirSchema {
        readonly: true,
        key: "vReadonly".to_string(),
        ..v_mail_schema()
    };
    let group_only = VirSchema {
        key: "vGroups".to_string(),
        any_types: vec!["GROUP".to_string()],
        ..v_mail_schema()
    };

    let manager = manager_with_schemas(
        StaticResourceStore::default().with(user_resource("ldap")),
        TestMappingHandler::default(),
        StaticVirSchemaStore::default()
            .with(readonly)
            .with(group_only),
    );

    let entity = john().with_resource("ldap");
    let mut prop_by_res = PropagationByResource::new();
    let vir_attrs = vec![
        VirAttr::new("vGhost", vec!["x".to_string()]),
        VirAttr::new("vReadonly", vec!["x".to_string()]),
        VirAttr::new("vGroups", vec!["x".to_string()]),
    ];

    let tasks = manager
        .update_tasks(&entity, None, &[], None, &mut prop_by_res, None, &vir_attrs, &[])
        .await;

    assert!(tasks.is_empty());
}

// =============================================================================
// Linked accounts
// =============================================================================

#[tokio::test]
async fn linked_account_tasks_use_account_key() {
    let manager = manager(
        StaticResourceStore::default().with(user_resource("ldap")),
        TestMappingHandler::default(),
    );

    let user = john().with_linked_account(LinkedAccount::new("ldap", "uid=john.admin"));
    let mut prop_by_res = PropagationByResource::new();
    let mut by_account = PropagationByResource::new();
    by_account.add(
        ResourceOperation::Update,
        ("ldap".to_string(), "uid=john.admin".to_string()),
    );

    let tasks = manager
        .update_tasks(
            &user,
            None,
            &[],
            None,
            &mut prop_by_res,
            Some(&mut by_account),
            &[],
            &[],
        )
        .await;

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].conn_object_key.as_deref(), Some("uid=john.admin"));
}

#[tokio::test]
async fn linked_account_delete_survives_account_removal() {
    let manager = manager(
        StaticResourceStore::default().with(user_resource("ldap")),
        TestMappingHandler::default(),
    );

    // The in-memory user no longer carries the account.
    let user = john();
    let mut prop_by_res = PropagationByResource::new();
    let mut by_account = PropagationByResource::new();
    by_account.add(
        ResourceOperation::Delete,
        ("ldap".to_string(), "uid=john.admin".to_string()),
    );

    let tasks = manager
        .update_tasks(
            &user,
            None,
            &[],
            None,
            &mut prop_by_res,
            Some(&mut by_account),
            &[],
            &[],
        )
        .await;

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].operation, ResourceOperation::Delete);
    assert_eq!(tasks[0].conn_object_key.as_deref(), Some("uid=john.admin"));
}

#[tokio::test]
async fn linked_account_update_on_missing_account_skipped() {
    let manager = manager(
        StaticResourceStore::default().with(user_resource("ldap")),
        TestMappingHandler::default(),
    );

    let user = john();
    let mut prop_by_res = PropagationByResource::new();
    let mut by_account = PropagationByResource::new();
    by_account.add(
        ResourceOperation::Update,
        ("ldap".to_string(), "uid=john.admin".to_string()),
    );

    let tasks = manager
        .update_tasks(
            &user,
            None,
            &[],
            None,
            &mut prop_by_res,
            Some(&mut by_account),
            &[],
            &[],
        )
        .await;

    assert!(tasks.is_empty());
}

// =============================================================================
// Realms
// =============================================================================

#[tokio::test]
async fn realm_tasks_keyed_on_org_unit() {
    let with_org_unit = ExternalResource::new("ldap").with_org_unit(OrgUnit {
        object_class: "organizationalUnit".to_string(),
        conn_object_link: "'ou=' + name".to_string(),
        mapping: vec![MappingItem::new("name", "ou").as_conn_object_key()],
    });
    let blank_link = ExternalResource::new("blank").with_org_unit(OrgUnit {
        object_class: "organizationalUnit".to_string(),
        conn_object_link: "  ".to_string(),
        mapping: vec![],
    });
    let no_org_unit = user_resource("no-org-unit");

    let manager = manager(
        StaticResourceStore::default()
            .with(with_org_unit)
            .with(blank_link)
            .with(no_org_unit),
        TestMappingHandler::default(),
    );

    let realm = Realm::new(Uuid::new_v4(), "/corp/emea");
    let mut prop_by_res = PropagationByResource::new();
    for key in ["ldap", "blank", "no-org-unit"] {
        prop_by_res.add(ResourceOperation::Create, key.to_string());
    }

    let tasks = manager.realm_tasks(&realm, &mut prop_by_res, &[]).await;

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].resource.key, "ldap");
    assert_eq!(tasks[0].object_class, "organizationalUnit");
    assert_eq!(tasks[0].conn_object_key.as_deref(), Some("ou=/corp/emea"));
    assert_eq!(tasks[0].entity_key, Some(realm.key));
    assert!(tasks[0].any_type_kind.is_none());
}

// =============================================================================
// Attribute deltas
// =============================================================================

#[tokio::test]
async fn set_attribute_deltas_rewrites_matching_tasks() {
    let resource = user_resource("ldap").with_policy(PropagationPolicy {
        update_delta: true,
        ..PropagationPolicy::default()
    });
    let manager = manager(
        StaticResourceStore::default().with(resource),
        TestMappingHandler::default().with_attrs(
            "ldap",
            AttributeSet::new().with("memberOf", vec!["staff", "admins"]),
        ),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Update, "ldap".to_string());
    let mut tasks = manager
        .update_tasks(&john(), None, &[], None, &mut prop_by_res, None, &[], &[])
        .await;

    let mut before_attrs = HashMap::new();
    before_attrs.insert(
        ("ldap".to_string(), "uid=john".to_string()),
        AttributeSet::new().with("memberOf", vec!["staff", "guests"]),
    );

    manager.set_attribute_deltas(&mut tasks, &before_attrs);

    let delta = tasks[0].data.attribute_delta.as_ref().unwrap();
    assert_eq!(delta.add["memberOf"], vec![AttributeValue::from("admins")]);
    assert_eq!(delta.remove["memberOf"], vec![AttributeValue::from("guests")]);
}

#[tokio::test]
async fn set_attribute_deltas_skips_renames() {
    let manager = manager(
        StaticResourceStore::default().with(user_resource("ldap")),
        TestMappingHandler::default()
            .with_attrs("ldap", AttributeSet::new().with("mail", "new@example.com")),
    );

    let mut prop_by_res = PropagationByResource::new();
    prop_by_res.add(ResourceOperation::Update, "ldap".to_string());
    prop_by_res.set_old_conn_object_key("ldap".to_string(), "uid=john.old");
    let mut tasks = manager
        .update_tasks(&john(), None, &[], None, &mut prop_by_res, None, &[], &[])
        .await;

    let mut before_attrs = HashMap::new();
    before_attrs.insert(
        ("ldap".to_string(), "uid=john".to_string()),
        AttributeSet::new().with("mail", "old@example.com"),
    );

    manager.set_attribute_deltas(&mut tasks, &before_attrs);
    assert!(tasks[0].data.attribute_delta.is_none());
}

#[tokio::test]
async fn prepare_before_attrs_only_for_delta_resources() {
    let delta_resource = user_resource("ldap").with_policy(PropagationPolicy {
        update_delta: true,
        ..PropagationPolicy::default()
    });
    let plain_resource = user_resource("db");

    let manager = manager(
        StaticResourceStore::default()
            .with(delta_resource)
            .with(plain_resource),
        TestMappingHandler::default(),
    );

    let entity = john().with_resource("ldap").with_resource("db");
    let before_attrs = manager
        .prepare_before_attrs(&entity, None, &[], None, &[])
        .await;

    assert_eq!(before_attrs.len(), 1);
    assert!(before_attrs.contains_key(&("ldap".to_string(), "uid=john".to_string())));
}
