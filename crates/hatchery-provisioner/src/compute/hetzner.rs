// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hetzner Cloud compute backend.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::cloud_init;
use super::traits::*;
use crate::http::{check_status, join_url};
use crate::secret::SecretString;

/// Default Hetzner Cloud API base URL.
pub const DEFAULT_API_URL: &str = "https://api.hetzner.cloud/v1";

/// Settings for the Hetzner backend.
#[derive(Debug, Clone)]
pub struct HetznerConfig {
    /// API token with read/write scope.
    pub api_token: SecretString,
    /// API base URL.
    pub api_url: String,
    /// Server type (e.g., "cx22").
    pub server_type: String,
    /// Location (e.g., "fsn1").
    pub location: String,
    /// Image name (e.g., "ubuntu-24.04").
    pub image: String,
}

/// Hetzner Cloud implementation of [`ComputeProvider`].
pub struct HetznerProvider {
    client: reqwest::Client,
    config: HetznerConfig,
}

#[derive(Serialize)]
struct CreateServerRequest<'a> {
    name: &'a str,
    server_type: &'a str,
    image: &'a str,
    location: &'a str,
    user_data: String,
    start_after_create: bool,
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: Server,
}

#[derive(Deserialize)]
struct Server {
    id: u64,
    status: String,
    #[serde(default)]
    public_net: Option<PublicNet>,
}

#[derive(Deserialize)]
struct PublicNet {
    #[serde(default)]
    ipv4: Option<PublicIpv4>,
}

#[derive(Deserialize)]
struct PublicIpv4 {
    ip: String,
}

/// Map Hetzner's server status vocabulary onto [`CanonicalStatus`].
pub fn normalize_status(status: &str) -> CanonicalStatus {
    match status {
        "running" => CanonicalStatus::Active,
        "initializing" | "starting" | "migrating" | "rebuilding" => CanonicalStatus::Provisioning,
        "off" | "stopping" | "deleting" => CanonicalStatus::Stopped,
        _ => CanonicalStatus::Unknown,
    }
}

impl HetznerProvider {
    /// Create a Hetzner backend with its own HTTP client.
    pub fn new(client: reqwest::Client, config: HetznerConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.config.api_url, path)
    }
}

#[async_trait]
impl ComputeProvider for HetznerProvider {
    fn provider_name(&self) -> &'static str {
        "hetzner"
    }

    async fn create(&self, name: &str, secret: &SecretString) -> Result<ResourceId> {
        let request = CreateServerRequest {
            name,
            server_type: &self.config.server_type,
            image: &self.config.image,
            location: &self.config.location,
            user_data: cloud_init::user_data(secret)?,
            start_after_create: true,
        };

        let response = self
            .client
            .post(self.url("servers"))
            .bearer_auth(self.config.api_token.expose())
            .json(&request)
            .send()
            .await?;
        let envelope: ServerEnvelope = check_status(response).await?.json().await?;

        info!(
            provider = "hetzner",
            resource_id = envelope.server.id,
            name,
            "Server created"
        );

        Ok(envelope.server.id)
    }

    async fn get_state(&self, id: ResourceId) -> Result<ComputeState> {
        let response = self
            .client
            .get(self.url(&format!("servers/{id}")))
            .bearer_auth(self.config.api_token.expose())
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ComputeError::NotFound(id));
        }
        let envelope: ServerEnvelope = check_status(response).await?.json().await?;
        let server = envelope.server;

        let ipv4 = server
            .public_net
            .and_then(|net| net.ipv4)
            .map(|v4| {
                v4.ip.parse::<Ipv4Addr>().map_err(|_| {
                    ComputeError::InvalidResponse(format!("invalid IPv4 address: {}", v4.ip))
                })
            })
            .transpose()?;

        debug!(resource_id = id, status = %server.status, "Fetched server state");

        Ok(ComputeState {
            status: normalize_status(&server.status),
            ipv4,
        })
    }

    async fn delete(&self, id: ResourceId) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("servers/{id}")))
            .bearer_auth(self.config.api_token.expose())
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ComputeError::NotFound(id));
        }
        check_status(response).await?;

        info!(provider = "hetzner", resource_id = id, "Server deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HetznerProvider {
        HetznerProvider::new(
            reqwest::Client::new(),
            HetznerConfig {
                api_token: SecretString::new("hz-token"),
                api_url: server.uri(),
                server_type: "cx22".to_string(),
                location: "fsn1".to_string(),
                image: "ubuntu-24.04".to_string(),
            },
        )
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status("running"), CanonicalStatus::Active);
        assert_eq!(normalize_status("initializing"), CanonicalStatus::Provisioning);
        assert_eq!(normalize_status("off"), CanonicalStatus::Stopped);
        assert_eq!(normalize_status("weird"), CanonicalStatus::Unknown);
    }

    #[tokio::test]
    async fn test_create_returns_server_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servers"))
            .and(header("Authorization", "Bearer hz-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "server": {"id": 42, "status": "initializing", "public_net": {"ipv4": null}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = provider(&server)
            .create("alice", &SecretString::new("pw"))
            .await
            .unwrap();

        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn test_get_state_extracts_ipv4() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "server": {
                    "id": 42,
                    "status": "running",
                    "public_net": {"ipv4": {"ip": "203.0.113.5"}}
                }
            })))
            .mount(&server)
            .await;

        let state = provider(&server).get_state(42).await.unwrap();

        assert_eq!(state.status, CanonicalStatus::Active);
        assert_eq!(state.ready_ip(), Some(Ipv4Addr::new(203, 0, 113, 5)));
    }

    #[tokio::test]
    async fn test_get_state_without_address_is_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "server": {"id": 7, "status": "running", "public_net": {"ipv4": null}}
            })))
            .mount(&server)
            .await;

        let state = provider(&server).get_state(7).await.unwrap();

        assert!(state.status.is_active());
        assert_eq!(state.ready_ip(), None);
    }

    #[tokio::test]
    async fn test_delete_missing_server() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/servers/9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = provider(&server).delete(9).await.unwrap_err();

        assert!(matches!(err, ComputeError::NotFound(9)));
    }
}
