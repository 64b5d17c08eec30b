//! Realm-scoped view of mesh nodes.
//!
//! The control plane's answers are re-checked against the caller's
//! namespace; a node from another namespace is reported as absent.

use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{mesh::MeshNode, realm::Realm};
use crate::services::mesh::MeshGateway;

pub struct NodeService {
    mesh: Arc<dyn MeshGateway>,
}

impl NodeService {
    pub fn new(mesh: Arc<dyn MeshGateway>) -> Self {
        Self { mesh }
    }

    pub async fn list_nodes(&self, realm: &Realm) -> Result<Vec<MeshNode>, CoreError> {
        let nodes = self.mesh.list_nodes(&realm.mesh_namespace).await?;
        let total = nodes.len();
        let owned: Vec<MeshNode> = nodes
            .into_iter()
            .filter(|node| node.namespace == realm.mesh_namespace)
            .collect();
        if owned.len() != total {
            tracing::warn!(
                realm_id = %realm.id,
                dropped = total - owned.len(),
                "Mesh gateway returned nodes from other namespaces"
            );
        }
        Ok(owned)
    }

    pub async fn get_node(&self, realm: &Realm, node_id: &str) -> Result<MeshNode, CoreError> {
        match self.mesh.get_node(node_id).await? {
            Some(node) if node.namespace == realm.mesh_namespace => Ok(node),
            Some(_) => {
                tracing::warn!(realm_id = %realm.id, node_id = %node_id, "Cross-realm node access refused");
                Err(CoreError::NodeNotFound)
            }
            None => Err(CoreError::NodeNotFound),
        }
    }

    /// Deletes a node only after confirming it belongs to `realm`.
    pub async fn delete_node(&self, realm: &Realm, node_id: &str) -> Result<(), CoreError> {
        let node = self.get_node(realm, node_id).await?;
        self.mesh.delete_node(&node.id).await?;
        tracing::info!(realm_id = %realm.id, node_id = %node.id, "Deleted node");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mesh::MockMeshGateway;
    use chrono::Utc;

    fn node(id: &str, namespace: &str) -> MeshNode {
        MeshNode {
            id: id.to_string(),
            name: format!("host-{}", id),
            namespace: namespace.to_string(),
            ip_addresses: vec![],
            online: true,
            last_seen: None,
        }
    }

    #[tokio::test]
    async fn list_drops_foreign_nodes() {
        let realm = Realm::new("u", "U", Utc::now());
        let own = realm.mesh_namespace.clone();
        let mut mesh = MockMeshGateway::new();
        mesh.expect_list_nodes().returning(move |_| {
            Ok(vec![node("1", &own), node("2", "realm-other"), node("3", "")])
        });

        let svc = NodeService::new(Arc::new(mesh));
        let nodes = svc.list_nodes(&realm).await.expect("list");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "1");
    }

    #[tokio::test]
    async fn foreign_node_reads_as_not_found() {
        let realm = Realm::new("u", "U", Utc::now());
        let mut mesh = MockMeshGateway::new();
        mesh.expect_get_node()
            .returning(|id| Ok(Some(node(id, "realm-other"))));
        mesh.expect_delete_node().never();

        let svc = NodeService::new(Arc::new(mesh));
        assert!(matches!(
            svc.get_node(&realm, "9").await,
            Err(CoreError::NodeNotFound)
        ));
        assert!(matches!(
            svc.delete_node(&realm, "9").await,
            Err(CoreError::NodeNotFound)
        ));
    }

    #[tokio::test]
    async fn own_node_can_be_deleted() {
        let realm = Realm::new("u", "U", Utc::now());
        let own = realm.mesh_namespace.clone();
        let mut mesh = MockMeshGateway::new();
        mesh.expect_get_node()
            .returning(move |id| Ok(Some(node(id, &own))));
        mesh.expect_delete_node().times(1).returning(|_| Ok(()));

        let svc = NodeService::new(Arc::new(mesh));
        svc.delete_node(&realm, "4").await.expect("delete");
    }
}
