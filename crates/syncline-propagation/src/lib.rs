//! # Propagation Engine
//!
//! Turns a create/update/delete on an identity object (user, group,
//! any-object, organizational realm) into write operations against the
//! external systems it is provisioned to, each reached through a
//! `syncline-connector` connector.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────────┐     ┌─────────────────┐
//! │ PropagationBy    │────►│  PropagationManager  │────►│ PropagationTask │
//! │ Resource (purge) │     │  (mapping, markers)  │     │ Info list       │
//! └──────────────────┘     └──────────────────────┘     └────────┬────────┘
//!                                                               │
//!                          ┌────────────────────────────────────▼─────────┐
//!                          │       PriorityPropagationTaskExecutor        │
//!                          │  priority lane (sequential, abort on error)  │
//!                          │  non-priority lane (bounded worker pool)     │
//!                          └────────────────────┬─────────────────────────┘
//!                                               │
//!                   ┌───────────────┐     ┌─────▼─────────┐
//!                   │ Propagation   │◄────│  TaskRunner   │──► Connector
//!                   │ Reporter      │     │  (per task)   │──► PropagationActions
//!                   └───────────────┘     └───────────────┘──► TaskStore / audit
//! ```
//!
//! ## Scheduling policy
//!
//! Resources configured with a propagation priority execute strictly in
//! ascending priority order on the calling task; the first one that does not
//! finish with SUCCESS aborts the remaining priority work and the whole
//! non-priority lane. Non-priority resources run concurrently on a bounded
//! pool and their failures stay isolated, one reporter entry per resource.
//!
//! ## Partial failure
//!
//! Task-level failures never escape a batch: each is captured in the
//! per-resource [`PropagationStatus`], classified by a closed error-kind
//! enumeration in which connector timeouts stay distinguishable from generic
//! connector failures.

pub mod actions;
pub mod by_resource;
pub mod entity;
pub mod executor;
pub mod expr;
pub mod manager;
pub mod mapping;
pub mod reporter;
pub mod resource;
pub mod task;
pub mod types;

// Re-exports for convenience
pub use actions::{ActionError, ActionResult, PropagationActions};
pub use by_resource::PropagationByResource;
pub use entity::{IdentityObject, LinkedAccount, Realm, SecurityContext, VirAttr, VirSchema};
pub use executor::{
    AuditManager, ConnectorResolver, ExecutorConfig, NotificationManager, OutboundMatcher,
    PriorityPropagationTaskExecutor, PropagationTaskExecutor, StoreError, TaskRunner, TaskStore,
    UidOnCreateHandler,
};
pub use expr::RhaiMandatoryEvaluator;
pub use manager::{AccountKey, PropagationManager, ResourceStore};
pub use mapping::{
    MandatoryConditionEvaluator, MappingError, MappingHandler, MappingResult, PreparedAttrs,
    VirSchemaStore,
};
pub use reporter::{PropagationReporter, PropagationStatus};
pub use resource::{
    BackoffStrategy, ExternalResource, MappingItem, OrgUnit, PropagationPolicy, Provision,
};
pub use task::{
    PropagationData, PropagationErrorKind, PropagationTask, PropagationTaskInfo, TaskExec,
    MANDATORY_MISSING_ATTR, MANDATORY_NULL_OR_EMPTY_ATTR,
};
pub use types::{AnyTypeKind, ExecStatus, ResourceOperation, TraceLevel};
