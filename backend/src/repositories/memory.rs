//! In-memory stores.
//!
//! Process-local and therefore single-instance only; a multi-instance
//! deployment must use the Postgres stores. Each mutating method holds the
//! map lock for its whole check-and-set, which gives the same exactly-once
//! semantics as the conditional SQL updates.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use super::{
    ApiKeyRepository, AuthStateRepository, DeviceRequestRepository, RealmRepository,
    ServicePrincipalRepository, SessionRepository, StoreError, StoreResult,
};
use crate::models::{
    api_key::ApiKey,
    auth_state::AuthState,
    device_request::{DeviceRequest, DeviceStatus},
    mesh::JoinCredential,
    realm::Realm,
    service_principal::ServicePrincipal,
    session::Session,
};
use crate::types::{ApiKeyId, RealmId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryRealmRepository {
    realms: Mutex<HashMap<RealmId, Realm>>,
}

impl MemoryRealmRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RealmRepository for MemoryRealmRepository {
    async fn insert(&self, realm: &Realm) -> StoreResult<()> {
        let mut realms = lock(&self.realms);
        let clash = realms.values().any(|existing| {
            existing.id == realm.id
                || existing.mesh_namespace == realm.mesh_namespace
                || (existing.owner_id == realm.owner_id
                    && !existing.is_deleted()
                    && !realm.is_deleted())
        });
        if clash {
            return Err(StoreError::Conflict("realm owner or namespace"));
        }
        realms.insert(realm.id, realm.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: RealmId) -> StoreResult<Option<Realm>> {
        Ok(lock(&self.realms)
            .get(&id)
            .filter(|realm| !realm.is_deleted())
            .cloned())
    }

    async fn find_by_owner(&self, owner_id: &str) -> StoreResult<Option<Realm>> {
        Ok(lock(&self.realms)
            .values()
            .filter(|realm| realm.owner_id == owner_id && !realm.is_deleted())
            .min_by_key(|realm| (realm.created_at, realm.id))
            .cloned())
    }

    async fn soft_delete(&self, id: RealmId, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut realms = lock(&self.realms);
        match realms.get_mut(&id) {
            Some(realm) if !realm.is_deleted() => {
                realm.deleted_at = Some(now);
                realm.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn insert(&self, session: &Session) -> StoreResult<()> {
        let mut sessions = lock(&self.sessions);
        if sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict("session id"));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> StoreResult<Option<Session>> {
        Ok(lock(&self.sessions).get(id).cloned())
    }

    async fn touch(&self, id: &str, last_used_at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(session) = lock(&self.sessions).get_mut(id) {
            session.last_used_at = Some(last_used_at);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        lock(&self.sessions).remove(id);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryApiKeyRepository {
    keys: Mutex<HashMap<ApiKeyId, ApiKey>>,
}

impl MemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryApiKeyRepository {
    async fn insert(&self, key: &ApiKey) -> StoreResult<()> {
        let mut keys = lock(&self.keys);
        if keys
            .values()
            .any(|existing| existing.id == key.id || existing.key_hash == key.key_hash)
        {
            return Err(StoreError::Conflict("api key hash"));
        }
        keys.insert(key.id, key.clone());
        Ok(())
    }

    async fn find_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        Ok(lock(&self.keys)
            .values()
            .find(|key| key.key_hash == key_hash)
            .cloned())
    }

    async fn find_for_realm(
        &self,
        realm_id: RealmId,
        id: ApiKeyId,
    ) -> StoreResult<Option<ApiKey>> {
        Ok(lock(&self.keys)
            .get(&id)
            .filter(|key| key.realm_id == realm_id)
            .cloned())
    }

    async fn list_for_realm(&self, realm_id: RealmId) -> StoreResult<Vec<ApiKey>> {
        let mut keys: Vec<ApiKey> = lock(&self.keys)
            .values()
            .filter(|key| key.realm_id == realm_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(keys)
    }

    async fn delete_for_realm(&self, realm_id: RealmId, id: ApiKeyId) -> StoreResult<bool> {
        let mut keys = lock(&self.keys);
        if keys.get(&id).map(|key| key.realm_id) == Some(realm_id) {
            keys.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn touch(&self, id: ApiKeyId, last_used_at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(key) = lock(&self.keys).get_mut(&id) {
            key.last_used_at = Some(last_used_at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDeviceRequestRepository {
    requests: Mutex<HashMap<String, DeviceRequest>>,
}

impl MemoryDeviceRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(
        &self,
        user_code: &str,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut DeviceRequest),
    ) -> bool {
        let mut requests = lock(&self.requests);
        let target = requests.values_mut().find(|request| {
            request.user_code == user_code
                && request.status == DeviceStatus::Pending
                && !request.is_expired_at(now)
        });
        match target {
            Some(request) => {
                apply(request);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl DeviceRequestRepository for MemoryDeviceRequestRepository {
    async fn insert(&self, request: &DeviceRequest) -> StoreResult<()> {
        let mut requests = lock(&self.requests);
        if requests.contains_key(&request.device_code)
            || requests
                .values()
                .any(|existing| existing.user_code == request.user_code)
        {
            return Err(StoreError::Conflict("device or user code"));
        }
        requests.insert(request.device_code.clone(), request.clone());
        Ok(())
    }

    async fn user_code_exists(&self, user_code: &str) -> StoreResult<bool> {
        Ok(lock(&self.requests)
            .values()
            .any(|request| request.user_code == user_code))
    }

    async fn find_by_user_code(&self, user_code: &str) -> StoreResult<Option<DeviceRequest>> {
        Ok(lock(&self.requests)
            .values()
            .find(|request| request.user_code == user_code)
            .cloned())
    }

    async fn find_by_device_code(
        &self,
        device_code: &str,
    ) -> StoreResult<Option<DeviceRequest>> {
        Ok(lock(&self.requests).get(device_code).cloned())
    }

    async fn approve(
        &self,
        user_code: &str,
        realm_id: RealmId,
        credential: &JoinCredential,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(self.transition(user_code, now, |request| {
            request.status = DeviceStatus::Approved;
            request.realm_id = Some(realm_id);
            request.issued_credential = Some(Json(credential.clone()));
        }))
    }

    async fn deny(
        &self,
        user_code: &str,
        realm_id: RealmId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(self.transition(user_code, now, |request| {
            request.status = DeviceStatus::Denied;
            request.realm_id = Some(realm_id);
        }))
    }

    async fn take(&self, device_code: &str) -> StoreResult<Option<DeviceRequest>> {
        Ok(lock(&self.requests).remove(device_code))
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let mut expired: Vec<(DateTime<Utc>, String)> = lock(&self.requests)
            .values()
            .filter(|request| request.is_expired_at(now))
            .map(|request| (request.expires_at, request.device_code.clone()))
            .collect();
        expired.sort();
        Ok(expired.into_iter().map(|(_, code)| code).collect())
    }

    async fn delete(&self, device_code: &str) -> StoreResult<bool> {
        Ok(lock(&self.requests).remove(device_code).is_some())
    }
}

#[derive(Default)]
pub struct MemoryAuthStateRepository {
    states: Mutex<HashMap<String, AuthState>>,
}

impl MemoryAuthStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStateRepository for MemoryAuthStateRepository {
    async fn insert(&self, state: &AuthState) -> StoreResult<()> {
        let mut states = lock(&self.states);
        if states.contains_key(&state.state) {
            return Err(StoreError::Conflict("auth state"));
        }
        states.insert(state.state.clone(), state.clone());
        Ok(())
    }

    async fn take(&self, state: &str) -> StoreResult<Option<AuthState>> {
        Ok(lock(&self.states).remove(state))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut states = lock(&self.states);
        let before = states.len();
        states.retain(|_, state| !state.is_expired_at(now));
        Ok((before - states.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryServicePrincipalRepository {
    principals: Mutex<HashMap<String, ServicePrincipal>>,
}

impl MemoryServicePrincipalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServicePrincipalRepository for MemoryServicePrincipalRepository {
    async fn find(&self, service_principal_id: &str) -> StoreResult<Option<ServicePrincipal>> {
        Ok(lock(&self.principals).get(service_principal_id).cloned())
    }

    async fn upsert(&self, principal: &ServicePrincipal) -> StoreResult<()> {
        lock(&self.principals)
            .entry(principal.service_principal_id.clone())
            .and_modify(|existing| existing.realm_id = principal.realm_id)
            .or_insert_with(|| principal.clone());
        Ok(())
    }
}
