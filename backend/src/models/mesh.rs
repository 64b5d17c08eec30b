//! Shapes exchanged with the mesh control plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshNamespace {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MeshNode {
    pub id: String,
    pub name: String,
    /// Owning namespace as reported by the control plane.
    pub namespace: String,
    pub ip_addresses: Vec<String>,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Secret that lets a machine register itself into one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JoinCredential {
    pub auth_key: String,
    pub namespace: String,
    /// Control-plane URL the machine should log in to.
    pub login_server: String,
    pub expires_at: DateTime<Utc>,
    pub reusable: bool,
}

impl JoinCredential {
    pub fn is_well_formed(&self) -> bool {
        !self.auth_key.is_empty() && !self.namespace.is_empty()
    }
}
