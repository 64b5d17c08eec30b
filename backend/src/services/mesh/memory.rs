//! Process-local mesh control plane for development and tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::RngCore;

use super::MeshGateway;
use crate::error::CoreError;
use crate::models::mesh::{JoinCredential, MeshNamespace, MeshNode};

#[derive(Default)]
struct MeshState {
    namespaces: HashMap<String, MeshNamespace>,
    isolated: HashSet<String>,
    nodes: Vec<MeshNode>,
    issued: Vec<JoinCredential>,
}

#[derive(Default)]
pub struct InMemoryMeshGateway {
    login_server: String,
    state: Mutex<MeshState>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    /// Return every node from `list_nodes`, ignoring the namespace filter.
    leak_nodes: AtomicBool,
}

impl InMemoryMeshGateway {
    pub fn new(login_server: &str) -> Self {
        Self {
            login_server: login_server.to_string(),
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, MeshState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), CoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::MeshGatewayUnavailable(
                "in-memory gateway switched off".to_string(),
            ));
        }
        Ok(())
    }

    /// Makes every subsequent call fail as if the control plane were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Simulates a control plane that does not filter nodes by namespace.
    pub fn set_leak_nodes(&self, leak: bool) {
        self.leak_nodes.store(leak, Ordering::SeqCst);
    }

    /// Registers a node as if a worker had joined.
    pub fn add_node(&self, namespace: &str, name: &str) -> MeshNode {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let node = MeshNode {
            id: id.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            ip_addresses: vec![format!("100.64.{}.{}", (id >> 8) & 0xff, id & 0xff)],
            online: true,
            last_seen: Some(Utc::now()),
        };
        self.state().nodes.push(node.clone());
        node
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.state().namespaces.contains_key(name)
    }

    pub fn is_isolated(&self, namespace: &str) -> bool {
        self.state().isolated.contains(namespace)
    }

    /// Forgets all namespaces and policy, as after a control-plane reset.
    pub fn reset(&self) {
        let mut state = self.state();
        state.namespaces.clear();
        state.isolated.clear();
    }

    pub fn issued_credentials(&self) -> Vec<JoinCredential> {
        self.state().issued.clone()
    }
}

#[async_trait]
impl MeshGateway for InMemoryMeshGateway {
    async fn get_or_create_namespace(&self, name: &str) -> Result<MeshNamespace, CoreError> {
        self.check_available()?;
        let next_id = &self.next_id;
        let namespace = self
            .state()
            .namespaces
            .entry(name.to_string())
            .or_insert_with(|| MeshNamespace {
                id: (next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string(),
                name: name.to_string(),
            })
            .clone();
        Ok(namespace)
    }

    async fn apply_isolation_policy(&self, namespace: &str) -> Result<(), CoreError> {
        self.check_available()?;
        self.state().isolated.insert(namespace.to_string());
        Ok(())
    }

    async fn create_join_credential(
        &self,
        namespace: &str,
        ttl: Duration,
        reusable: bool,
    ) -> Result<JoinCredential, CoreError> {
        self.check_available()?;
        let mut state = self.state();
        if !state.namespaces.contains_key(namespace) {
            return Err(CoreError::MeshGatewayUnavailable(format!(
                "unknown namespace {}",
                namespace
            )));
        }
        let now = Utc::now();
        state.issued.retain(|issued| issued.expires_at > now);

        let mut bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut bytes);
        let credential = JoinCredential {
            auth_key: hex::encode(bytes),
            namespace: namespace.to_string(),
            login_server: self.login_server.clone(),
            expires_at: now + ttl,
            reusable,
        };
        state.issued.push(credential.clone());
        Ok(credential)
    }

    async fn list_nodes(&self, namespace: &str) -> Result<Vec<MeshNode>, CoreError> {
        self.check_available()?;
        let leak = self.leak_nodes.load(Ordering::SeqCst);
        Ok(self
            .state()
            .nodes
            .iter()
            .filter(|node| leak || node.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<MeshNode>, CoreError> {
        self.check_available()?;
        Ok(self.state().nodes.iter().find(|n| n.id == node_id).cloned())
    }

    async fn delete_node(&self, node_id: &str) -> Result<(), CoreError> {
        self.check_available()?;
        self.state().nodes.retain(|n| n.id != node_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn namespace_creation_is_idempotent() {
        let gateway = InMemoryMeshGateway::new("https://mesh");
        let first = gateway.get_or_create_namespace("realm-a").await.expect("create");
        let again = gateway.get_or_create_namespace("realm-a").await.expect("get");
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn credentials_require_an_existing_namespace() {
        let gateway = InMemoryMeshGateway::new("https://mesh");
        assert!(gateway
            .create_join_credential("missing", Duration::minutes(5), false)
            .await
            .is_err());
        gateway.get_or_create_namespace("realm-a").await.expect("create");
        let credential = gateway
            .create_join_credential("realm-a", Duration::minutes(5), false)
            .await
            .expect("credential");
        assert!(credential.is_well_formed());
        assert_eq!(credential.login_server, "https://mesh");
    }

    #[tokio::test]
    async fn expired_credentials_are_forgotten_on_next_issue() {
        let gateway = InMemoryMeshGateway::new("https://mesh");
        gateway.get_or_create_namespace("realm-a").await.expect("create");
        gateway
            .create_join_credential("realm-a", Duration::seconds(-1), false)
            .await
            .expect("stale credential");
        let live = gateway
            .create_join_credential("realm-a", Duration::minutes(5), false)
            .await
            .expect("credential");

        let issued = gateway.issued_credentials();
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].auth_key, live.auth_key);
    }

    #[tokio::test]
    async fn switched_off_gateway_fails_every_call() {
        let gateway = InMemoryMeshGateway::new("https://mesh");
        gateway.set_unavailable(true);
        assert!(matches!(
            gateway.list_nodes("realm-a").await,
            Err(CoreError::MeshGatewayUnavailable(_))
        ));
    }
}
