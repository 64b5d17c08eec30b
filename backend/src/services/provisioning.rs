//! Realm provisioning and identity-to-realm resolution.
//!
//! Each owner has at most one active realm. Provisioning is a sequence of
//! idempotent steps (row insert, namespace get-or-create, policy merge) with
//! no cross-system transaction; a failed or cancelled run is repaired by the
//! next resolution of the same identity.

use std::sync::Arc;

use chrono::Utc;

use crate::error::CoreError;
use crate::models::{identity::IdentityClaims, realm::Realm, service_principal::ServicePrincipal};
use crate::repositories::{RealmRepository, ServicePrincipalRepository, StoreError};
use crate::services::mesh::MeshGateway;
use crate::types::RealmId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRealm {
    pub realm: Realm,
    pub is_service_principal: bool,
}

pub struct RealmService {
    realms: Arc<dyn RealmRepository>,
    principals: Arc<dyn ServicePrincipalRepository>,
    mesh: Arc<dyn MeshGateway>,
}

impl RealmService {
    pub fn new(
        realms: Arc<dyn RealmRepository>,
        principals: Arc<dyn ServicePrincipalRepository>,
        mesh: Arc<dyn MeshGateway>,
    ) -> Self {
        Self {
            realms,
            principals,
            mesh,
        }
    }

    /// Creates a realm for `owner_id` together with its namespace and policy.
    ///
    /// If the owner already has an active realm (including one created by a
    /// concurrent call), that realm is completed and returned instead.
    pub async fn provision_realm(
        &self,
        owner_id: &str,
        display_name: &str,
    ) -> Result<Realm, CoreError> {
        let candidate = Realm::new(owner_id, display_name, Utc::now());
        let realm = match self.realms.insert(&candidate).await {
            Ok(()) => {
                tracing::info!(
                    realm_id = %candidate.id,
                    namespace = %candidate.mesh_namespace,
                    "Provisioned realm"
                );
                candidate
            }
            Err(StoreError::Conflict(_)) => self
                .realms
                .find_by_owner(owner_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("realm namespace collision for new realm"))?,
            Err(err) => return Err(err.into()),
        };

        self.ensure_mesh_namespace(&realm.mesh_namespace).await?;
        Ok(realm)
    }

    /// Get-or-create of the namespace plus policy membership. Safe to call on
    /// every login; repairs a control plane that was reset independently.
    pub async fn ensure_mesh_namespace(&self, mesh_namespace: &str) -> Result<(), CoreError> {
        self.mesh.get_or_create_namespace(mesh_namespace).await?;
        self.mesh.apply_isolation_policy(mesh_namespace).await?;
        Ok(())
    }

    /// Maps verified identity claims to exactly one realm.
    ///
    /// Service principals are looked up through their binding and never
    /// create realms. Humans get get-or-create keyed by subject.
    pub async fn resolve_realm_from_identity(
        &self,
        claims: &IdentityClaims,
    ) -> Result<ResolvedRealm, CoreError> {
        if claims.is_service_principal() {
            let binding = self
                .principals
                .find(&claims.subject)
                .await?
                .ok_or(CoreError::ServiceAccountNotFound)?;
            let realm = self
                .realms
                .find_by_id(binding.realm_id)
                .await?
                .ok_or(CoreError::RealmNotFound)?;
            self.ensure_mesh_namespace(&realm.mesh_namespace).await?;
            return Ok(ResolvedRealm {
                realm,
                is_service_principal: true,
            });
        }

        let realm = match self.realms.find_by_owner(&claims.subject).await? {
            Some(realm) => {
                self.ensure_mesh_namespace(&realm.mesh_namespace).await?;
                realm
            }
            None => {
                self.provision_realm(&claims.subject, &claims.display_name())
                    .await?
            }
        };
        Ok(ResolvedRealm {
            realm,
            is_service_principal: false,
        })
    }

    pub async fn get_realm(&self, id: RealmId) -> Result<Realm, CoreError> {
        self.realms
            .find_by_id(id)
            .await?
            .ok_or(CoreError::RealmNotFound)
    }

    /// Soft-deletes the realm. Outstanding join tokens for it stop working
    /// because exchange re-resolves the realm.
    pub async fn delete_realm(&self, id: RealmId) -> Result<(), CoreError> {
        if !self.realms.soft_delete(id, Utc::now()).await? {
            return Err(CoreError::RealmNotFound);
        }
        tracing::info!(realm_id = %id, "Deleted realm");
        Ok(())
    }

    pub async fn bind_service_principal(
        &self,
        service_principal_id: &str,
        realm_id: RealmId,
    ) -> Result<ServicePrincipal, CoreError> {
        self.get_realm(realm_id).await?;
        let principal = ServicePrincipal {
            service_principal_id: service_principal_id.to_string(),
            realm_id,
            created_at: Utc::now(),
        };
        self.principals.upsert(&principal).await?;
        tracing::info!(
            service_principal_id = %service_principal_id,
            realm_id = %realm_id,
            "Bound service principal"
        );
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{MockRealmRepository, MockServicePrincipalRepository};
    use crate::services::mesh::MockMeshGateway;
    use crate::models::mesh::MeshNamespace;
    use mockall::predicate::eq;

    fn healthy_mesh() -> MockMeshGateway {
        let mut mesh = MockMeshGateway::new();
        mesh.expect_get_or_create_namespace().returning(|name| {
            Ok(MeshNamespace {
                id: "1".into(),
                name: name.to_string(),
            })
        });
        mesh.expect_apply_isolation_policy().returning(|_| Ok(()));
        mesh
    }

    fn service(
        realms: MockRealmRepository,
        principals: MockServicePrincipalRepository,
        mesh: MockMeshGateway,
    ) -> RealmService {
        RealmService::new(Arc::new(realms), Arc::new(principals), Arc::new(mesh))
    }

    #[tokio::test]
    async fn first_login_provisions_a_realm() {
        let mut realms = MockRealmRepository::new();
        realms.expect_find_by_owner().returning(|_| Ok(None));
        realms.expect_insert().times(1).returning(|_| Ok(()));

        let svc = service(realms, MockServicePrincipalRepository::new(), healthy_mesh());
        let resolved = svc
            .resolve_realm_from_identity(&IdentityClaims::human("user-1"))
            .await
            .expect("resolve");
        assert_eq!(resolved.realm.owner_id, "user-1");
        assert!(!resolved.is_service_principal);
    }

    #[tokio::test]
    async fn returning_login_reuses_realm_and_heals_namespace() {
        let existing = Realm::new("user-1", "User", Utc::now());
        let namespace = existing.mesh_namespace.clone();
        let found = existing.clone();

        let mut realms = MockRealmRepository::new();
        realms
            .expect_find_by_owner()
            .with(eq("user-1"))
            .returning(move |_| Ok(Some(found.clone())));
        realms.expect_insert().never();

        let mut mesh = MockMeshGateway::new();
        mesh.expect_get_or_create_namespace()
            .with(eq(namespace.clone()))
            .times(1)
            .returning(|name| {
                Ok(MeshNamespace {
                    id: "1".into(),
                    name: name.to_string(),
                })
            });
        mesh.expect_apply_isolation_policy()
            .with(eq(namespace))
            .times(1)
            .returning(|_| Ok(()));

        let svc = service(realms, MockServicePrincipalRepository::new(), mesh);
        let resolved = svc
            .resolve_realm_from_identity(&IdentityClaims::human("user-1"))
            .await
            .expect("resolve");
        assert_eq!(resolved.realm.id, existing.id);
    }

    #[tokio::test]
    async fn concurrent_provisioning_returns_the_winning_realm() {
        let winner = Realm::new("user-1", "User", Utc::now());
        let found = winner.clone();

        let mut realms = MockRealmRepository::new();
        realms
            .expect_insert()
            .returning(|_| Err(StoreError::Conflict("realm owner or namespace")));
        realms
            .expect_find_by_owner()
            .returning(move |_| Ok(Some(found.clone())));

        let svc = service(realms, MockServicePrincipalRepository::new(), healthy_mesh());
        let realm = svc.provision_realm("user-1", "User").await.expect("provision");
        assert_eq!(realm.id, winner.id);
    }

    #[tokio::test]
    async fn unbound_service_principal_is_rejected_without_provisioning() {
        let mut realms = MockRealmRepository::new();
        realms.expect_insert().never();
        let mut principals = MockServicePrincipalRepository::new();
        principals.expect_find().returning(|_| Ok(None));

        let svc = service(realms, principals, MockMeshGateway::new());
        let err = svc
            .resolve_realm_from_identity(&IdentityClaims::service("robot"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ServiceAccountNotFound));
    }

    #[tokio::test]
    async fn bound_service_principal_resolves_to_its_realm() {
        let realm = Realm::new("user-1", "User", Utc::now());
        let realm_id = realm.id;
        let found = realm.clone();

        let mut realms = MockRealmRepository::new();
        realms
            .expect_find_by_id()
            .with(eq(realm_id))
            .returning(move |_| Ok(Some(found.clone())));
        let mut principals = MockServicePrincipalRepository::new();
        principals.expect_find().returning(move |id| {
            Ok(Some(ServicePrincipal {
                service_principal_id: id.to_string(),
                realm_id,
                created_at: Utc::now(),
            }))
        });

        let svc = service(realms, principals, healthy_mesh());
        let resolved = svc
            .resolve_realm_from_identity(&IdentityClaims::service("robot"))
            .await
            .expect("resolve");
        assert!(resolved.is_service_principal);
        assert_eq!(resolved.realm.id, realm_id);
    }

    #[tokio::test]
    async fn mesh_outage_surfaces_as_gateway_error() {
        let mut realms = MockRealmRepository::new();
        realms.expect_find_by_owner().returning(|_| Ok(None));
        realms.expect_insert().returning(|_| Ok(()));
        let mut mesh = MockMeshGateway::new();
        mesh.expect_get_or_create_namespace()
            .returning(|_| Err(CoreError::MeshGatewayUnavailable("timeout".into())));

        let svc = service(realms, MockServicePrincipalRepository::new(), mesh);
        let err = svc
            .resolve_realm_from_identity(&IdentityClaims::human("user-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MeshGatewayUnavailable(_)));
    }

    #[tokio::test]
    async fn deleting_unknown_realm_is_not_found() {
        let mut realms = MockRealmRepository::new();
        realms.expect_soft_delete().returning(|_, _| Ok(false));
        let svc = service(
            realms,
            MockServicePrincipalRepository::new(),
            MockMeshGateway::new(),
        );
        assert!(matches!(
            svc.delete_realm(RealmId::new()).await,
            Err(CoreError::RealmNotFound)
        ));
    }
}
