//! External resource configuration model
//!
//! Read-only configuration describing a target system: how identity types
//! map onto its object classes, which trace levels it retains, and the
//! optional propagation policy (priority, retries, fetch behavior).

use serde::{Deserialize, Serialize};

use crate::types::TraceLevel;

/// One item of an attribute mapping: how an internal attribute relates to an
/// external one, and whether it is mandatory for the current entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingItem {
    /// Internal attribute name.
    pub int_attr_name: String,
    /// External attribute name, as known to the target system.
    pub ext_attr_name: String,
    /// Expression deciding whether this attribute is required for the
    /// current entity. Blank means never mandatory.
    #[serde(default)]
    pub mandatory_condition: String,
    /// Whether this item provides the connector-object-key.
    #[serde(default)]
    pub conn_object_key: bool,
}

impl MappingItem {
    /// Create a plain item mapping an internal to an external attribute.
    pub fn new(int_attr_name: impl Into<String>, ext_attr_name: impl Into<String>) -> Self {
        Self {
            int_attr_name: int_attr_name.into(),
            ext_attr_name: ext_attr_name.into(),
            mandatory_condition: String::new(),
            conn_object_key: false,
        }
    }

    /// Set the mandatory condition expression.
    #[must_use]
    pub fn mandatory(mut self, condition: impl Into<String>) -> Self {
        self.mandatory_condition = condition.into();
        self
    }

    /// Mark this item as the connector-object-key provider.
    #[must_use]
    pub fn as_conn_object_key(mut self) -> Self {
        self.conn_object_key = true;
        self
    }
}

/// Mapping configuration binding an any-type to an external object class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provision {
    /// The any-type this provision covers (e.g. "USER", "PRINTER").
    pub any_type: String,
    /// The object class in the target system.
    pub object_class: String,
    /// Schema to receive the target-generated identifier after a create,
    /// if the resource declares one.
    #[serde(default)]
    pub uid_on_create: Option<String>,
    /// The attribute mapping items.
    pub mapping: Vec<MappingItem>,
}

impl Provision {
    /// Create a provision for the given any-type and object class.
    pub fn new(any_type: impl Into<String>, object_class: impl Into<String>) -> Self {
        Self {
            any_type: any_type.into(),
            object_class: object_class.into(),
            uid_on_create: None,
            mapping: Vec::new(),
        }
    }

    /// Add a mapping item.
    #[must_use]
    pub fn with_item(mut self, item: MappingItem) -> Self {
        self.mapping.push(item);
        self
    }

    /// Set the uid-on-create schema.
    #[must_use]
    pub fn with_uid_on_create(mut self, schema: impl Into<String>) -> Self {
        self.uid_on_create = Some(schema.into());
        self
    }
}

/// Mapping configuration for realms, keyed on an organizational unit in the
/// target system instead of a per-any-type provision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgUnit {
    /// The object class in the target system.
    pub object_class: String,
    /// Template producing the connector-object-link for a realm.
    #[serde(default)]
    pub conn_object_link: String,
    /// The attribute mapping items.
    pub mapping: Vec<MappingItem>,
}

/// How retry delays grow between propagation attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay between every attempt.
    #[default]
    Fixed,
    /// Delay multiplied after each attempt, up to a maximum.
    Exponential,
    /// Exponential with a deterministic per-attempt spread.
    Random,
}

/// Per-resource propagation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationPolicy {
    /// Total attempts per task, including the first.
    pub max_attempts: u32,
    /// Backoff strategy between attempts.
    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,
    /// Initial delay between attempts, in milliseconds.
    pub initial_interval_ms: u64,
    /// Upper bound for the delay, in milliseconds.
    #[serde(default)]
    pub max_interval_ms: Option<u64>,
    /// Multiplier for exponential strategies.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Whether to read the remote object around each write. When false the
    /// engine issues no before/after reads and trusts the requested
    /// operation.
    #[serde(default = "default_true")]
    pub fetch_around_provisioning: bool,
    /// Whether updates should be propagated as incremental deltas.
    #[serde(default)]
    pub update_delta: bool,
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

impl Default for PropagationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_strategy: BackoffStrategy::Fixed,
            initial_interval_ms: 5_000,
            max_interval_ms: None,
            multiplier: default_multiplier(),
            fetch_around_provisioning: true,
            update_delta: false,
        }
    }
}

/// A configured target system.
///
/// Configured by administrators and read-only to the propagation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalResource {
    /// Unique resource identifier.
    pub key: String,
    /// Propagation priority; resources carrying a value run sequentially,
    /// ascending, and abort the batch on failure. Absent means non-priority.
    #[serde(default)]
    pub propagation_priority: Option<i32>,
    /// Trace level for create operations.
    #[serde(default)]
    pub create_trace_level: TraceLevel,
    /// Trace level for update operations.
    #[serde(default)]
    pub update_trace_level: TraceLevel,
    /// Trace level for delete operations.
    #[serde(default)]
    pub delete_trace_level: TraceLevel,
    /// Per-any-type mapping configurations.
    #[serde(default)]
    pub provisions: Vec<Provision>,
    /// Realm mapping configuration, at most one.
    #[serde(default)]
    pub org_unit: Option<OrgUnit>,
    /// Names of the propagation actions configured for this resource, in
    /// invocation order.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Optional propagation policy (retries, fetch behavior, deltas).
    #[serde(default)]
    pub propagation_policy: Option<PropagationPolicy>,
}

impl ExternalResource {
    /// Create a resource with the given key and defaults everywhere else.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            propagation_priority: None,
            create_trace_level: TraceLevel::default(),
            update_trace_level: TraceLevel::default(),
            delete_trace_level: TraceLevel::default(),
            provisions: Vec::new(),
            org_unit: None,
            actions: Vec::new(),
            propagation_policy: None,
        }
    }

    /// Set the propagation priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.propagation_priority = Some(priority);
        self
    }

    /// Add a provision.
    #[must_use]
    pub fn with_provision(mut self, provision: Provision) -> Self {
        self.provisions.push(provision);
        self
    }

    /// Set the org unit.
    #[must_use]
    pub fn with_org_unit(mut self, org_unit: OrgUnit) -> Self {
        self.org_unit = Some(org_unit);
        self
    }

    /// Set the propagation policy.
    #[must_use]
    pub fn with_policy(mut self, policy: PropagationPolicy) -> Self {
        self.propagation_policy = Some(policy);
        self
    }

    /// Set all three trace levels at once.
    #[must_use]
    pub fn with_trace_levels(mut self, level: TraceLevel) -> Self {
        self.create_trace_level = level;
        self.update_trace_level = level;
        self.delete_trace_level = level;
        self
    }

    /// Find the provision for the given any-type.
    pub fn provision_for(&self, any_type: &str) -> Option<&Provision> {
        self.provisions.iter().find(|p| p.any_type == any_type)
    }

    /// Find the provision for the given object class.
    pub fn provision_by_object_class(&self, object_class: &str) -> Option<&Provision> {
        self.provisions
            .iter()
            .find(|p| p.object_class == object_class)
    }

    /// Trace level applying to the given operation.
    pub fn trace_level_for(&self, operation: crate::types::ResourceOperation) -> TraceLevel {
        match operation {
            crate::types::ResourceOperation::Create => self.create_trace_level,
            crate::types::ResourceOperation::Update => self.update_trace_level,
            crate::types::ResourceOperation::Delete => self.delete_trace_level,
        }
    }

    /// Whether the policy (if any) asks for remote reads around writes.
    pub fn fetch_around_provisioning(&self) -> bool {
        self.propagation_policy
            .as_ref()
            .map(|p| p.fetch_around_provisioning)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceOperation;

    #[test]
    fn test_provision_lookup() {
        let resource = ExternalResource::new("ldap")
            .with_provision(Provision::new("USER", "inetOrgPerson"))
            .with_provision(Provision::new("GROUP", "groupOfNames"));

        assert!(resource.provision_for("USER").is_some());
        assert!(resource.provision_for("PRINTER").is_none());
        assert_eq!(
            resource
                .provision_by_object_class("groupOfNames")
                .map(|p| p.any_type.as_str()),
            Some("GROUP")
        );
    }

    #[test]
    fn test_trace_level_per_operation() {
        let mut resource = ExternalResource::new("db").with_trace_levels(TraceLevel::All);
        resource.delete_trace_level = TraceLevel::None;

        assert_eq!(resource.trace_level_for(ResourceOperation::Create), TraceLevel::All);
        assert_eq!(resource.trace_level_for(ResourceOperation::Delete), TraceLevel::None);
    }

    #[test]
    fn test_fetch_default_true() {
        let resource = ExternalResource::new("rest");
        assert!(resource.fetch_around_provisioning());

        let resource = resource.with_policy(PropagationPolicy {
            fetch_around_provisioning: false,
            ..PropagationPolicy::default()
        });
        assert!(!resource.fetch_around_provisioning());
    }
}
