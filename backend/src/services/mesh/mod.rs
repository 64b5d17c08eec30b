//! Mesh control-plane contract.
//!
//! The core never trusts an implementation to filter by tenant: every node
//! read or delete is re-checked against the caller's namespace by
//! [`crate::services::nodes::NodeService`].

pub mod headscale;
pub mod memory;
pub mod policy;

use async_trait::async_trait;
use chrono::Duration;

use crate::error::CoreError;
use crate::models::mesh::{JoinCredential, MeshNamespace, MeshNode};

pub use headscale::HeadscaleGateway;
pub use memory::InMemoryMeshGateway;

/// Operations the coordinator needs from the mesh control plane.
///
/// Every call is bounded by the gateway's own timeout; failures surface as
/// [`CoreError::MeshGatewayUnavailable`]. Namespace creation and policy
/// updates are idempotent so provisioning can be retried after a partial run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MeshGateway: Send + Sync {
    async fn get_or_create_namespace(&self, name: &str) -> Result<MeshNamespace, CoreError>;

    /// Makes sure the shared policy lets `namespace` reach only itself.
    async fn apply_isolation_policy(&self, namespace: &str) -> Result<(), CoreError>;

    async fn create_join_credential(
        &self,
        namespace: &str,
        ttl: Duration,
        reusable: bool,
    ) -> Result<JoinCredential, CoreError>;

    async fn list_nodes(&self, namespace: &str) -> Result<Vec<MeshNode>, CoreError>;

    /// `None` when the control plane has no such node.
    async fn get_node(&self, node_id: &str) -> Result<Option<MeshNode>, CoreError>;

    async fn delete_node(&self, node_id: &str) -> Result<(), CoreError>;
}
