// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute provider trait definitions.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::ApiFailure;
use crate::secret::SecretString;

/// Identifier of a compute resource, as assigned by the provider.
pub type ResourceId = u64;

/// Errors from compute provider operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComputeError {
    /// Transport-level failure talking to the provider API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider API rejected the request.
    #[error("Provider API error: {0}")]
    Api(#[from] ApiFailure),

    /// The resource does not exist (anymore).
    #[error("Compute resource not found: {0}")]
    NotFound(ResourceId),

    /// The provider response did not have the expected shape.
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for compute provider operations.
pub type Result<T> = std::result::Result<T, ComputeError>;

/// Provider-agnostic lifecycle status of a compute resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    /// Booted and running.
    Active,
    /// Being created, started or migrated.
    Provisioning,
    /// Powered off or being deleted.
    Stopped,
    /// A status this adapter does not recognize.
    Unknown,
}

impl CanonicalStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Provisioning => "provisioning",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the resource counts as active.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized state of a compute resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeState {
    /// Canonical lifecycle status.
    pub status: CanonicalStatus,
    /// Public IPv4 address, once assigned.
    pub ipv4: Option<Ipv4Addr>,
}

impl ComputeState {
    /// The address to use once the resource is active and addressable.
    pub fn ready_ip(&self) -> Option<Ipv4Addr> {
        if self.status.is_active() {
            self.ipv4
        } else {
            None
        }
    }
}

/// Trait for compute backends.
///
/// Implementations normalize their own status vocabulary into
/// [`CanonicalStatus`] so callers never branch on the backend.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Provider identifier (e.g., "hetzner", "digitalocean").
    fn provider_name(&self) -> &'static str;

    /// Create a virtual machine whose initial root credential is `secret`.
    async fn create(&self, name: &str, secret: &SecretString) -> Result<ResourceId>;

    /// Query the current state of a resource.
    async fn get_state(&self, id: ResourceId) -> Result<ComputeState>;

    /// Delete a resource.
    async fn delete(&self, id: ResourceId) -> Result<()>;
}
