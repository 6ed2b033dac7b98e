// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant infrastructure record and its client-safe view.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compute::ResourceId;
use crate::database::ProjectRef;
use crate::secret::SecretString;

/// Lifecycle status of a tenant record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    /// Provisioned and serving.
    Active,
}

impl TenantStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
        }
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            other => Err(format!("unknown tenant status: {other}")),
        }
    }
}

/// Everything provisioned for one tenant.
///
/// Built once, after every provisioning step succeeded, and persisted in a
/// single write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantInfrastructure {
    /// Tenant id.
    pub tenant_id: String,
    /// Compute resource id.
    pub resource_id: ResourceId,
    /// Compute resource display name.
    pub resource_name: String,
    /// Client-facing gateway URL.
    pub public_gateway_url: String,
    /// Operator gateway URL. Never leaves the backend.
    pub internal_gateway_url: String,
    /// Gateway auth token.
    pub gateway_token: SecretString,
    /// Remote-access secret. Never leaves the backend.
    pub remote_secret: SecretString,
    /// Public IPv4 address.
    pub public_ip: Ipv4Addr,
    /// DNS label, absent when no DNS provider is configured.
    pub subdomain: Option<String>,
    /// When provisioning finished.
    pub created_at: DateTime<Utc>,
    /// Record status.
    pub status: TenantStatus,
    /// Whether the gateway sits behind TLS.
    pub tls_enabled: bool,
    /// Database project reference.
    pub database_project_ref: ProjectRef,
    /// Database service credential.
    pub database_service_key: SecretString,
    /// Configured tool names.
    pub tools: Vec<String>,
}

/// Client-safe view of a [`TenantInfrastructure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantInfrastructureView {
    /// Tenant id.
    pub tenant_id: String,
    /// Compute resource id.
    pub resource_id: ResourceId,
    /// Compute resource display name.
    pub resource_name: String,
    /// Client-facing gateway URL.
    pub public_gateway_url: String,
    /// Gateway auth token.
    pub gateway_token: SecretString,
    /// Public IPv4 address.
    pub public_ip: Ipv4Addr,
    /// DNS label.
    pub subdomain: Option<String>,
    /// When provisioning finished.
    pub created_at: DateTime<Utc>,
    /// Record status.
    pub status: TenantStatus,
    /// Whether the gateway sits behind TLS.
    pub tls_enabled: bool,
    /// Database project reference.
    pub database_project_ref: ProjectRef,
    /// Database service credential.
    pub database_service_key: SecretString,
    /// Configured tool names.
    pub tools: Vec<String>,
}

impl From<&TenantInfrastructure> for TenantInfrastructureView {
    fn from(record: &TenantInfrastructure) -> Self {
        let TenantInfrastructure {
            tenant_id,
            resource_id,
            resource_name,
            public_gateway_url,
            internal_gateway_url: _,
            gateway_token,
            remote_secret: _,
            public_ip,
            subdomain,
            created_at,
            status,
            tls_enabled,
            database_project_ref,
            database_service_key,
            tools,
        } = record;

        Self {
            tenant_id: tenant_id.clone(),
            resource_id: *resource_id,
            resource_name: resource_name.clone(),
            public_gateway_url: public_gateway_url.clone(),
            gateway_token: gateway_token.clone(),
            public_ip: *public_ip,
            subdomain: subdomain.clone(),
            created_at: *created_at,
            status: *status,
            tls_enabled: *tls_enabled,
            database_project_ref: database_project_ref.clone(),
            database_service_key: database_service_key.clone(),
            tools: tools.clone(),
        }
    }
}

impl TenantInfrastructure {
    /// View safe to return outside the backend.
    pub fn to_client_projection(&self) -> TenantInfrastructureView {
        TenantInfrastructureView::from(self)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn record(tenant_id: &str) -> TenantInfrastructure {
        TenantInfrastructure {
            tenant_id: tenant_id.to_string(),
            resource_id: 42,
            resource_name: "alice".to_string(),
            public_gateway_url: "https://alice.agents.example.com".to_string(),
            internal_gateway_url: "wss://alice.agents.example.com".to_string(),
            gateway_token: SecretString::new("gw-token"),
            remote_secret: SecretString::new("root-password"),
            public_ip: Ipv4Addr::new(203, 0, 113, 5),
            subdomain: Some("alice".to_string()),
            created_at: Utc::now(),
            status: TenantStatus::Active,
            tls_enabled: true,
            database_project_ref: ProjectRef::from("proj0001"),
            database_service_key: SecretString::new("service-key"),
            tools: vec!["github".to_string()],
        }
    }
}
