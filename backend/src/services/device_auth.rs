//! Device authorization engine (RFC 8628 shape).
//!
//! A request moves `pending -> approved | denied`; a pending request past its
//! deadline reads as expired even before the sweep removes it. Terminal
//! states are delivered to the polling worker once, by deleting the row.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::CoreError;
use crate::models::device_request::{
    DeviceCodeResponse, DeviceRequest, DeviceStatus, PollOutcome,
};
use crate::models::realm::Realm;
use crate::repositories::{DeviceRequestRepository, StoreError};
use crate::services::mesh::MeshGateway;
use crate::utils::secrets::{
    generate_device_code, generate_user_code, is_valid_device_code, is_valid_user_code,
    normalize_user_code,
};

/// Attempts at drawing an unused user code before giving up.
const MAX_CODE_ATTEMPTS: usize = 10;

#[derive(Debug, Clone)]
pub struct DeviceFlowSettings {
    pub code_ttl: Duration,
    pub poll_interval_secs: u64,
    pub credential_ttl: Duration,
    pub verification_url: String,
}

pub struct DeviceAuthService {
    requests: Arc<dyn DeviceRequestRepository>,
    mesh: Arc<dyn MeshGateway>,
    settings: DeviceFlowSettings,
}

impl DeviceAuthService {
    pub fn new(
        requests: Arc<dyn DeviceRequestRepository>,
        mesh: Arc<dyn MeshGateway>,
        settings: DeviceFlowSettings,
    ) -> Self {
        Self {
            requests,
            mesh,
            settings,
        }
    }

    /// Starts a new request. User codes are unique among live requests; a
    /// collision draws a new code.
    pub async fn initiate(&self) -> Result<DeviceCodeResponse, CoreError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let user_code = generate_user_code();
            if self.requests.user_code_exists(&user_code).await? {
                continue;
            }

            let now = Utc::now();
            let request = DeviceRequest {
                device_code: generate_device_code(),
                user_code,
                status: DeviceStatus::Pending,
                realm_id: None,
                issued_credential: None,
                created_at: now,
                expires_at: now + self.settings.code_ttl,
            };
            match self.requests.insert(&request).await {
                Ok(()) => {
                    tracing::debug!(user_code = %request.user_code, "Device authorization started");
                    return Ok(DeviceCodeResponse {
                        verification_url_complete: format!(
                            "{}?user_code={}",
                            self.settings.verification_url, request.user_code
                        ),
                        verification_url: self.settings.verification_url.clone(),
                        expires_in: self.settings.code_ttl.num_seconds().max(0) as u64,
                        interval: self.settings.poll_interval_secs,
                        device_code: request.device_code,
                        user_code: request.user_code,
                    });
                }
                // Lost a race for the same user code.
                Err(StoreError::Conflict(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(anyhow::anyhow!(
            "no free user code after {} attempts",
            MAX_CODE_ATTEMPTS
        )
        .into())
    }

    /// Normalizes `user_code` and checks that it names a live pending request.
    async fn find_pending(&self, user_code: &str) -> Result<String, CoreError> {
        let user_code = normalize_user_code(user_code);
        if !is_valid_user_code(&user_code) {
            return Err(CoreError::InvalidCodeFormat);
        }
        let request = self
            .requests
            .find_by_user_code(&user_code)
            .await?
            .ok_or(CoreError::DeviceRequestNotFound)?;
        match request.effective_status(Utc::now()) {
            DeviceStatus::Pending => Ok(user_code),
            DeviceStatus::Expired => Err(CoreError::DeviceRequestNotFound),
            DeviceStatus::Approved | DeviceStatus::Denied => Err(CoreError::CodeAlreadyUsed),
        }
    }

    /// Binds the request to `realm` and stores a freshly minted credential.
    ///
    /// The credential is minted before the conditional transition; when a
    /// concurrent approval wins, the loser's credential is never delivered
    /// and lapses at its own expiry.
    pub async fn approve(&self, user_code: &str, realm: &Realm) -> Result<(), CoreError> {
        let user_code = self.find_pending(user_code).await?;

        let credential = self
            .mesh
            .create_join_credential(&realm.mesh_namespace, self.settings.credential_ttl, false)
            .await?;
        if !credential.is_well_formed() || credential.namespace != realm.mesh_namespace {
            return Err(CoreError::MeshGatewayUnavailable(
                "control plane returned an unusable credential".to_string(),
            ));
        }

        if !self
            .requests
            .approve(&user_code, realm.id, &credential, Utc::now())
            .await?
        {
            tracing::warn!(
                user_code = %user_code,
                realm_id = %realm.id,
                "Device request changed state during approval; minted credential discarded"
            );
            return Err(CoreError::CodeAlreadyUsed);
        }

        tracing::info!(user_code = %user_code, realm_id = %realm.id, "Device request approved");
        Ok(())
    }

    pub async fn deny(&self, user_code: &str, realm: &Realm) -> Result<(), CoreError> {
        let user_code = self.find_pending(user_code).await?;
        if !self
            .requests
            .deny(&user_code, realm.id, Utc::now())
            .await?
        {
            return Err(CoreError::CodeAlreadyUsed);
        }
        tracing::info!(user_code = %user_code, realm_id = %realm.id, "Device request denied");
        Ok(())
    }

    /// Worker-side poll. Format is checked before any store access.
    pub async fn poll(&self, device_code: &str) -> Result<PollOutcome, CoreError> {
        if !is_valid_device_code(device_code) {
            return Err(CoreError::InvalidCodeFormat);
        }

        let request = self
            .requests
            .find_by_device_code(device_code)
            .await?
            .ok_or(CoreError::DeviceRequestNotFound)?;
        if request.effective_status(Utc::now()) == DeviceStatus::Pending {
            return Ok(PollOutcome::AuthorizationPending);
        }

        // Terminal: whoever deletes the row delivers the outcome.
        let taken = self
            .requests
            .take(device_code)
            .await?
            .ok_or(CoreError::DeviceRequestNotFound)?;

        let outcome = match taken.effective_status(Utc::now()) {
            DeviceStatus::Approved => match taken.issued_credential {
                Some(credential) => PollOutcome::Approved(credential.0),
                None => {
                    tracing::error!("Approved device request has no credential");
                    PollOutcome::ExpiredToken
                }
            },
            DeviceStatus::Denied => PollOutcome::AccessDenied,
            DeviceStatus::Expired | DeviceStatus::Pending => PollOutcome::ExpiredToken,
        };
        Ok(outcome)
    }
}
