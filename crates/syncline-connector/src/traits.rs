//! Connector capability traits
//!
//! Capability-based trait definitions: a connector implements only what its
//! target system supports. The propagation executor consumes
//! [`ProvisioningConnector`], the combination of all CRUD capabilities.

use async_trait::async_trait;

use crate::delta::AttributeDelta;
use crate::error::ConnectorResult;
use crate::object::{AttributeSet, ConnectorObject, OperationOptions, Uid};

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Test the connection to the target system.
    async fn test_connection(&self) -> ConnectorResult<()>;

    /// Check if the connector is currently healthy.
    ///
    /// This is a lightweight check, different from `test_connection` which
    /// may perform a more thorough validation.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Capability for creating objects in the target system.
#[async_trait]
pub trait CreateOp: Connector {
    /// Create a new object in the target system.
    ///
    /// Returns the unique identifier assigned by the target system; some
    /// systems derive it from the attributes, others generate their own.
    async fn create(
        &self,
        object_class: &str,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid>;
}

/// Capability for updating objects in the target system.
#[async_trait]
pub trait UpdateOp: Connector {
    /// Replace the given attributes on an existing object.
    ///
    /// Returns the object's UID, which may change on systems where a rename
    /// alters the identifier (e.g. an LDAP DN).
    async fn update(
        &self,
        object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid>;

    /// Apply an incremental modification to an existing object.
    async fn update_delta(
        &self,
        object_class: &str,
        uid: &Uid,
        delta: AttributeDelta,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid>;
}

/// Capability for deleting objects from the target system.
#[async_trait]
pub trait DeleteOp: Connector {
    /// Delete an object from the target system.
    async fn delete(
        &self,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<()>;
}

/// Capability for retrieving objects from the target system.
#[async_trait]
pub trait SearchOp: Connector {
    /// Get a single object by the value of its key attribute.
    ///
    /// Returns `None` when no object matches; reads used to decide between
    /// create and update rely on that distinction.
    async fn get(
        &self,
        object_class: &str,
        key_attribute: &str,
        key_value: &str,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>>;
}

/// Marker trait for connectors supporting every operation the propagation
/// engine dispatches.
pub trait ProvisioningConnector: CreateOp + UpdateOp + DeleteOp + SearchOp {}

// Blanket implementation for any connector that implements all CRUD ops
impl<T> ProvisioningConnector for T where T: CreateOp + UpdateOp + DeleteOp + SearchOp {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockConnector {
        name: String,
        healthy: AtomicBool,
    }

    impl MockConnector {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                healthy: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        fn display_name(&self) -> &str {
            &self.name
        }

        async fn test_connection(&self) -> ConnectorResult<()> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ConnectorError::connection_failed("not healthy"))
            }
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_mock_connector() {
        let connector = MockConnector::new("ldap-test");
        assert_eq!(connector.display_name(), "ldap-test");
        assert!(connector.is_healthy());
        assert!(connector.test_connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_unhealthy_connector() {
        let connector = MockConnector::new("ldap-test");
        connector.healthy.store(false, Ordering::SeqCst);
        assert!(!connector.is_healthy());
        assert!(connector.test_connection().await.is_err());
    }
}
