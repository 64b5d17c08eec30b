//! Headscale REST client.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{policy, MeshGateway};
use crate::error::CoreError;
use crate::models::mesh::{JoinCredential, MeshNamespace, MeshNode};

pub struct HeadscaleGateway {
    http: Client,
    api_url: String,
    api_key: String,
    /// URL handed to workers as their login server.
    public_url: String,
    /// Serializes read-modify-write of the shared policy document.
    policy_lock: Mutex<()>,
}

impl std::fmt::Debug for HeadscaleGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadscaleGateway")
            .field("api_url", &self.api_url)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct HsUser {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListUsersResponse {
    #[serde(default)]
    users: Vec<HsUser>,
}

#[derive(Debug, Deserialize)]
struct CreateUserResponse {
    user: HsUser,
}

#[derive(Debug, Serialize)]
struct CreateUserRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePreAuthKeyRequest<'a> {
    user: &'a str,
    reusable: bool,
    ephemeral: bool,
    expiration: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct HsPreAuthKey {
    key: String,
    #[serde(default)]
    reusable: bool,
    expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePreAuthKeyResponse {
    pre_auth_key: HsPreAuthKey,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HsNode {
    id: String,
    name: String,
    #[serde(default)]
    given_name: Option<String>,
    user: Option<HsUserRef>,
    #[serde(default)]
    ip_addresses: Vec<String>,
    #[serde(default)]
    online: bool,
    last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct HsUserRef {
    name: String,
}

impl From<HsNode> for MeshNode {
    fn from(node: HsNode) -> Self {
        MeshNode {
            id: node.id,
            name: node.given_name.filter(|n| !n.is_empty()).unwrap_or(node.name),
            // A node without an owner belongs to no realm and never matches one.
            namespace: node.user.map(|u| u.name).unwrap_or_default(),
            ip_addresses: node.ip_addresses,
            online: node.online,
            last_seen: node.last_seen,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListNodesResponse {
    #[serde(default)]
    nodes: Vec<HsNode>,
}

#[derive(Debug, Deserialize)]
struct GetNodeResponse {
    node: HsNode,
}

#[derive(Debug, Deserialize, Serialize)]
struct PolicyDocument {
    #[serde(default)]
    policy: String,
}

/// Headscale node ids are decimal integers; anything else is not a node and
/// must never be spliced into a request path.
fn is_node_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 20 && id.bytes().all(|b| b.is_ascii_digit())
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> CoreError {
    CoreError::MeshGatewayUnavailable(format!("{}: {}", context, err))
}

impl HeadscaleGateway {
    pub fn new(
        api_url: &str,
        api_key: &str,
        public_url: &str,
        timeout: StdDuration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
            policy_lock: Mutex::new(()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/api/v1/{}", self.api_url, path))
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, context: &str, builder: RequestBuilder) -> Result<Response, CoreError> {
        let response = builder.send().await.map_err(|e| unavailable(context, e))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(unavailable(context, format!("status {} body {}", status, body)))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        context: &str,
        builder: RequestBuilder,
    ) -> Result<T, CoreError> {
        self.send(context, builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| unavailable(context, e))
    }

    async fn find_user(&self, name: &str) -> Result<Option<HsUser>, CoreError> {
        let listed: ListUsersResponse = self
            .send_json(
                "list users",
                self.request(Method::GET, "user").query(&[("name", name)]),
            )
            .await?;
        Ok(listed.users.into_iter().find(|u| u.name == name))
    }
}

#[async_trait]
impl MeshGateway for HeadscaleGateway {
    async fn get_or_create_namespace(&self, name: &str) -> Result<MeshNamespace, CoreError> {
        if let Some(user) = self.find_user(name).await? {
            return Ok(MeshNamespace {
                id: user.id,
                name: user.name,
            });
        }

        let created = self
            .request(Method::POST, "user")
            .json(&CreateUserRequest { name });
        match self.send_json::<CreateUserResponse>("create user", created).await {
            Ok(resp) => {
                tracing::info!(namespace = %name, "Created mesh namespace");
                Ok(MeshNamespace {
                    id: resp.user.id,
                    name: resp.user.name,
                })
            }
            Err(err) => {
                // Lost a creation race with a concurrent provisioning attempt.
                match self.find_user(name).await? {
                    Some(user) => Ok(MeshNamespace {
                        id: user.id,
                        name: user.name,
                    }),
                    None => Err(err),
                }
            }
        }
    }

    async fn apply_isolation_policy(&self, namespace: &str) -> Result<(), CoreError> {
        let _guard = self.policy_lock.lock().await;

        let current: PolicyDocument = match self
            .request(Method::GET, "policy")
            .send()
            .await
            .map_err(|e| unavailable("get policy", e))?
        {
            // No policy has been stored yet.
            resp if resp.status() == StatusCode::NOT_FOUND => PolicyDocument {
                policy: String::new(),
            },
            resp if resp.status().is_success() => resp
                .json()
                .await
                .map_err(|e| unavailable("get policy", e))?,
            resp => {
                return Err(unavailable("get policy", format!("status {}", resp.status())));
            }
        };

        let updated = policy::with_isolation_rule(&current.policy, namespace)
            .map_err(|e| unavailable("parse policy", e))?;
        let Some(updated) = updated else {
            return Ok(());
        };

        self.send(
            "set policy",
            self.request(Method::PUT, "policy")
                .json(&PolicyDocument { policy: updated }),
        )
        .await?;
        tracing::info!(namespace = %namespace, "Applied isolation policy");
        Ok(())
    }

    async fn create_join_credential(
        &self,
        namespace: &str,
        ttl: Duration,
        reusable: bool,
    ) -> Result<JoinCredential, CoreError> {
        let expiration = Utc::now() + ttl;
        let resp: CreatePreAuthKeyResponse = self
            .send_json(
                "create pre-auth key",
                self.request(Method::POST, "preauthkey")
                    .json(&CreatePreAuthKeyRequest {
                        user: namespace,
                        reusable,
                        ephemeral: false,
                        expiration,
                    }),
            )
            .await?;

        let key = resp.pre_auth_key;
        if key.key.is_empty() {
            return Err(unavailable("create pre-auth key", "empty key returned"));
        }
        Ok(JoinCredential {
            auth_key: key.key,
            namespace: namespace.to_string(),
            login_server: self.public_url.clone(),
            expires_at: key.expiration.unwrap_or(expiration),
            reusable: key.reusable,
        })
    }

    async fn list_nodes(&self, namespace: &str) -> Result<Vec<MeshNode>, CoreError> {
        let resp: ListNodesResponse = self
            .send_json(
                "list nodes",
                self.request(Method::GET, "node").query(&[("user", namespace)]),
            )
            .await?;
        Ok(resp.nodes.into_iter().map(MeshNode::from).collect())
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<MeshNode>, CoreError> {
        if !is_node_id(node_id) {
            return Ok(None);
        }
        let resp = self
            .request(Method::GET, &format!("node/{}", node_id))
            .send()
            .await
            .map_err(|e| unavailable("get node", e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(unavailable("get node", format!("status {}", resp.status())));
        }
        let body: GetNodeResponse = resp.json().await.map_err(|e| unavailable("get node", e))?;
        Ok(Some(body.node.into()))
    }

    async fn delete_node(&self, node_id: &str) -> Result<(), CoreError> {
        if !is_node_id(node_id) {
            return Err(CoreError::NodeNotFound);
        }
        self.send(
            "delete node",
            self.request(Method::DELETE, &format!("node/{}", node_id)),
        )
        .await?;
        Ok(())
    }
}
