//! Realm records: one isolated mesh namespace per tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::types::RealmId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Realm {
    pub id: RealmId,
    /// External identity (OIDC subject) that owns the realm.
    pub owner_id: String,
    /// Control-plane name of the realm's network segment. Unique, 1:1 with `id`.
    pub mesh_namespace: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Realm {
    pub fn new(owner_id: &str, display_name: &str, now: DateTime<Utc>) -> Self {
        let id = RealmId::new();
        Self {
            id,
            owner_id: owner_id.to_string(),
            mesh_namespace: namespace_for(id),
            display_name: display_name.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Derives the namespace from the realm id so the pair is collision resistant
/// and stable across provisioning retries.
pub fn namespace_for(id: RealmId) -> String {
    format!("realm-{}", id.as_uuid().simple())
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RealmResponse {
    #[schema(value_type = String)]
    pub id: RealmId,
    pub display_name: String,
    pub mesh_namespace: String,
    pub created_at: DateTime<Utc>,
}

impl From<Realm> for RealmResponse {
    fn from(realm: Realm) -> Self {
        Self {
            id: realm.id,
            display_name: realm.display_name,
            mesh_namespace: realm.mesh_namespace,
            created_at: realm.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_derived_from_realm_id() {
        let realm = Realm::new("owner-1", "Owner", Utc::now());
        assert_eq!(realm.mesh_namespace, namespace_for(realm.id));
        assert!(realm.mesh_namespace.starts_with("realm-"));
        assert_eq!(realm.mesh_namespace.len(), "realm-".len() + 32);
    }

    #[test]
    fn distinct_realms_get_distinct_namespaces() {
        let a = Realm::new("owner-1", "A", Utc::now());
        let b = Realm::new("owner-1", "B", Utc::now());
        assert_ne!(a.mesh_namespace, b.mesh_namespace);
    }
}
