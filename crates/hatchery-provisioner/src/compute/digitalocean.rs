// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! DigitalOcean compute backend.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::cloud_init;
use super::traits::*;
use crate::http::{check_status, join_url};
use crate::secret::SecretString;

/// Default DigitalOcean API base URL.
pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com/v2";

/// Settings for the DigitalOcean backend.
#[derive(Debug, Clone)]
pub struct DigitalOceanConfig {
    /// Personal access token.
    pub api_token: SecretString,
    /// API base URL.
    pub api_url: String,
    /// Region slug (e.g., "fra1").
    pub region: String,
    /// Size slug (e.g., "s-2vcpu-4gb").
    pub size: String,
    /// Image slug (e.g., "ubuntu-24-04-x64").
    pub image: String,
}

/// DigitalOcean implementation of [`ComputeProvider`].
pub struct DigitalOceanProvider {
    client: reqwest::Client,
    config: DigitalOceanConfig,
}

#[derive(Serialize)]
struct CreateDropletRequest<'a> {
    name: &'a str,
    region: &'a str,
    size: &'a str,
    image: &'a str,
    user_data: String,
}

#[derive(Deserialize)]
struct DropletEnvelope {
    droplet: Droplet,
}

#[derive(Deserialize)]
struct Droplet {
    id: u64,
    status: String,
    #[serde(default)]
    networks: Networks,
}

#[derive(Deserialize, Default)]
struct Networks {
    #[serde(default)]
    v4: Vec<NetworkV4>,
}

#[derive(Deserialize)]
struct NetworkV4 {
    ip_address: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Map DigitalOcean's droplet status vocabulary onto [`CanonicalStatus`].
pub fn normalize_status(status: &str) -> CanonicalStatus {
    match status {
        "active" => CanonicalStatus::Active,
        "new" => CanonicalStatus::Provisioning,
        "off" | "archive" => CanonicalStatus::Stopped,
        _ => CanonicalStatus::Unknown,
    }
}

impl DigitalOceanProvider {
    /// Create a DigitalOcean backend with its own HTTP client.
    pub fn new(client: reqwest::Client, config: DigitalOceanConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.config.api_url, path)
    }
}

#[async_trait]
impl ComputeProvider for DigitalOceanProvider {
    fn provider_name(&self) -> &'static str {
        "digitalocean"
    }

    async fn create(&self, name: &str, secret: &SecretString) -> Result<ResourceId> {
        let request = CreateDropletRequest {
            name,
            region: &self.config.region,
            size: &self.config.size,
            image: &self.config.image,
            user_data: cloud_init::user_data(secret)?,
        };

        let response = self
            .client
            .post(self.url("droplets"))
            .bearer_auth(self.config.api_token.expose())
            .json(&request)
            .send()
            .await?;
        let envelope: DropletEnvelope = check_status(response).await?.json().await?;

        info!(
            provider = "digitalocean",
            resource_id = envelope.droplet.id,
            name,
            "Droplet created"
        );

        Ok(envelope.droplet.id)
    }

    async fn get_state(&self, id: ResourceId) -> Result<ComputeState> {
        let response = self
            .client
            .get(self.url(&format!("droplets/{id}")))
            .bearer_auth(self.config.api_token.expose())
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ComputeError::NotFound(id));
        }
        let envelope: DropletEnvelope = check_status(response).await?.json().await?;
        let droplet = envelope.droplet;

        let ipv4 = droplet
            .networks
            .v4
            .iter()
            .find(|net| net.kind == "public")
            .map(|net| {
                net.ip_address.parse::<Ipv4Addr>().map_err(|_| {
                    ComputeError::InvalidResponse(format!(
                        "invalid IPv4 address: {}",
                        net.ip_address
                    ))
                })
            })
            .transpose()?;

        debug!(resource_id = id, status = %droplet.status, "Fetched droplet state");

        Ok(ComputeState {
            status: normalize_status(&droplet.status),
            ipv4,
        })
    }

    async fn delete(&self, id: ResourceId) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("droplets/{id}")))
            .bearer_auth(self.config.api_token.expose())
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ComputeError::NotFound(id));
        }
        check_status(response).await?;

        info!(provider = "digitalocean", resource_id = id, "Droplet deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> DigitalOceanProvider {
        DigitalOceanProvider::new(
            reqwest::Client::new(),
            DigitalOceanConfig {
                api_token: SecretString::new("do-token"),
                api_url: server.uri(),
                region: "fra1".to_string(),
                size: "s-2vcpu-4gb".to_string(),
                image: "ubuntu-24-04-x64".to_string(),
            },
        )
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status("active"), CanonicalStatus::Active);
        assert_eq!(normalize_status("new"), CanonicalStatus::Provisioning);
        assert_eq!(normalize_status("off"), CanonicalStatus::Stopped);
    }

    #[tokio::test]
    async fn test_get_state_picks_public_address() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/droplets/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "droplet": {
                    "id": 42,
                    "status": "active",
                    "networks": {"v4": [
                        {"ip_address": "10.0.0.4", "type": "private"},
                        {"ip_address": "203.0.113.5", "type": "public"}
                    ]}
                }
            })))
            .mount(&server)
            .await;

        let state = provider(&server).get_state(42).await.unwrap();

        assert_eq!(state.ready_ip(), Some(Ipv4Addr::new(203, 0, 113, 5)));
    }

    #[tokio::test]
    async fn test_create_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/droplets"))
            .respond_with(ResponseTemplate::new(422).set_body_string("size unavailable"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .create("alice", &SecretString::new("pw"))
            .await
            .unwrap_err();

        match err {
            ComputeError::Api(failure) => {
                assert_eq!(failure.status, 422);
                assert!(failure.body.contains("size unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
