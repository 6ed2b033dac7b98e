// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cloudflare DNS backend.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::traits::*;
use crate::http::{check_status, join_url};
use crate::secret::SecretString;

/// Default Cloudflare API base URL.
pub const DEFAULT_API_URL: &str = "https://api.cloudflare.com/client/v4";

/// TTL for tenant records, in seconds.
const RECORD_TTL: u32 = 60;

/// Settings for the Cloudflare backend.
#[derive(Debug, Clone)]
pub struct CloudflareConfig {
    /// API token with DNS edit permission on the zone.
    pub api_token: SecretString,
    /// API base URL.
    pub api_url: String,
    /// Zone identifier.
    pub zone_id: String,
    /// Zone apex (e.g., "agents.example.com").
    pub base_domain: String,
}

/// Cloudflare implementation of [`DnsProvider`].
pub struct CloudflareDns {
    client: reqwest::Client,
    config: CloudflareConfig,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RecordRef {
    id: String,
}

#[derive(Serialize)]
struct CreateRecordRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    name: &'a str,
    content: String,
    ttl: u32,
    proxied: bool,
}

impl<T> Envelope<T> {
    fn into_result(self, operation: &'static str) -> Result<Option<T>> {
        if self.success {
            Ok(self.result)
        } else {
            let message = self
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            Err(DnsError::Rejected { operation, message })
        }
    }
}

impl CloudflareDns {
    /// Create a Cloudflare backend with its own HTTP client.
    pub fn new(client: reqwest::Client, config: CloudflareConfig) -> Self {
        Self { client, config }
    }

    fn records_url(&self) -> String {
        join_url(
            &self.config.api_url,
            &format!("zones/{}/dns_records", self.config.zone_id),
        )
    }

    async fn list_a_records(&self, fqdn: &str) -> Result<Vec<RecordRef>> {
        let response = self
            .client
            .get(self.records_url())
            .bearer_auth(self.config.api_token.expose())
            .query(&[("type", "A"), ("name", fqdn)])
            .send()
            .await?;
        let envelope: Envelope<Vec<RecordRef>> = check_status(response).await?.json().await?;
        Ok(envelope.into_result("list")?.unwrap_or_default())
    }

    async fn delete_record_id(&self, record_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/{}", self.records_url(), record_id))
            .bearer_auth(self.config.api_token.expose())
            .send()
            .await?;
        let envelope: Envelope<serde_json::Value> = check_status(response).await?.json().await?;
        envelope.into_result("delete")?;
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for CloudflareDns {
    fn base_domain(&self) -> &str {
        &self.config.base_domain
    }

    async fn create_record(&self, subdomain: &str, ip: Ipv4Addr) -> Result<String> {
        let fqdn = self.fqdn(subdomain);

        // Exactly one A record per name once this returns.
        for stale in self.list_a_records(&fqdn).await? {
            debug!(fqdn = %fqdn, record_id = %stale.id, "Removing stale A record");
            self.delete_record_id(&stale.id).await?;
        }

        let request = CreateRecordRequest {
            kind: "A",
            name: &fqdn,
            content: ip.to_string(),
            ttl: RECORD_TTL,
            proxied: false,
        };
        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(self.config.api_token.expose())
            .json(&request)
            .send()
            .await?;
        let envelope: Envelope<RecordRef> = check_status(response).await?.json().await?;
        envelope.into_result("create")?;

        info!(fqdn = %fqdn, ip = %ip, "DNS record created");
        Ok(fqdn)
    }

    async fn delete_record(&self, subdomain: &str) -> Result<()> {
        let fqdn = self.fqdn(subdomain);
        let records = self.list_a_records(&fqdn).await?;
        for record in &records {
            self.delete_record_id(&record.id).await?;
        }

        info!(fqdn = %fqdn, removed = records.len(), "DNS records deleted");
        Ok(())
    }
}
