//! Device authorization requests (RFC 8628 shape).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;

use crate::models::mesh::JoinCredential;
use crate::types::RealmId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Pending => "pending",
            DeviceStatus::Approved => "approved",
            DeviceStatus::Denied => "denied",
            DeviceStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DeviceRequest {
    /// Secret shared only between the coordinator and the polling worker.
    pub device_code: String,
    /// Short code typed by the approving human.
    pub user_code: String,
    pub status: DeviceStatus,
    pub realm_id: Option<RealmId>,
    pub issued_credential: Option<Json<JoinCredential>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DeviceRequest {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Status as seen at `now`: a pending request past its deadline is expired
    /// even if the sweep has not removed it yet.
    pub fn effective_status(&self, now: DateTime<Utc>) -> DeviceStatus {
        match self.status {
            DeviceStatus::Pending if self.is_expired_at(now) => DeviceStatus::Expired,
            status => status,
        }
    }
}

/// What a polling worker learns about its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    AuthorizationPending,
    Approved(JoinCredential),
    AccessDenied,
    ExpiredToken,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pub verification_url_complete: String,
    /// Seconds until the device code expires.
    pub expires_in: u64,
    /// Minimum seconds between polls.
    pub interval: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceVerifyAction {
    #[default]
    Approve,
    Deny,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DeviceVerifyRequest {
    pub user_code: String,
    #[serde(default)]
    pub action: DeviceVerifyAction,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceVerifyResponse {
    pub status: DeviceStatus,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DeviceTokenRequest {
    pub device_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(status: DeviceStatus, expires_at: DateTime<Utc>) -> DeviceRequest {
        DeviceRequest {
            device_code: "d".repeat(64),
            user_code: "ABCD-EFGH".into(),
            status,
            realm_id: None,
            issued_credential: None,
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn pending_past_deadline_reads_as_expired() {
        let now = Utc::now();
        let req = request(DeviceStatus::Pending, now - Duration::seconds(1));
        assert_eq!(req.effective_status(now), DeviceStatus::Expired);
    }

    #[test]
    fn terminal_states_are_not_rewritten_by_expiry() {
        let now = Utc::now();
        let req = request(DeviceStatus::Denied, now - Duration::seconds(1));
        assert_eq!(req.effective_status(now), DeviceStatus::Denied);
    }

    #[test]
    fn verify_action_defaults_to_approve() {
        let req: DeviceVerifyRequest =
            serde_json::from_str(r#"{"user_code":"ABCD-EFGH"}"#).expect("json");
        assert_eq!(req.action, DeviceVerifyAction::Approve);
    }
}
