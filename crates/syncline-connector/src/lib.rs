//! # Connector Framework
//!
//! Core abstractions for writing identity objects to external systems.
//!
//! This crate provides the foundation the propagation engine builds on:
//! typed remote identifiers, an attribute model, and capability-based
//! connector traits for create/update/delete/search against targets such as
//! LDAP directories, databases and SaaS identity APIs.
//!
//! ## Architecture
//!
//! The framework uses a capability-based trait system:
//!
//! - [`Connector`] - Base trait all connectors implement
//! - [`CreateOp`], [`UpdateOp`], [`DeleteOp`] - CRUD operations
//! - [`SearchOp`] - Retrieve remote objects by key attribute
//! - [`ProvisioningConnector`] - marker for connectors supporting all of the
//!   above, consumed by the propagation executor
//!
//! ## Errors
//!
//! Every operation returns [`ConnectorResult`]. Timeouts are surfaced as the
//! dedicated [`ConnectorError::Timeout`] variant so that callers can apply
//! their own retry policy; they are never folded into a generic failure.
//!
//! ## Example
//!
//! ```ignore
//! use syncline_connector::prelude::*;
//!
//! let attrs = AttributeSet::new()
//!     .with("mail", "user@example.com")
//!     .with("cn", "John Doe");
//! let uid = connector.create("user", attrs, &OperationOptions::default()).await?;
//! ```

pub mod delta;
pub mod error;
pub mod object;
pub mod traits;

/// Prelude module for convenient imports.
///
/// ```
/// use syncline_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::delta::AttributeDelta;
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::object::{
        AttributeSet, AttributeValue, ConnectorObject, OperationOptions, Uid, NAME_ATTR,
        PASSWORD_ATTR,
    };
    pub use crate::traits::{
        Connector, CreateOp, DeleteOp, ProvisioningConnector, SearchOp, UpdateOp,
    };
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
