use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::types::RealmId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
/// Binding of a machine identity to the realm it acts for.
pub struct ServicePrincipal {
    pub service_principal_id: String,
    #[schema(value_type = String)]
    pub realm_id: RealmId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BindServicePrincipalRequest {
    #[validate(length(min = 1, max = 255))]
    pub service_principal_id: String,
    #[schema(value_type = String)]
    pub realm_id: RealmId,
}
