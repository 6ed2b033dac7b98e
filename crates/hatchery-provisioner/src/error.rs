// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the provisioner.

use thiserror::Error;

use crate::compute::{ComputeError, ResourceId};
use crate::config::ConfigError;
use crate::database::DatabaseProjectError;
use crate::dns::DnsError;
use crate::poll::DeadlineExceeded;
use crate::remote::RemoteError;
use crate::status::Phase;
use crate::store::StoreError;
use crate::tools::ToolError;

/// Provisioner errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Compute provider operation failed.
    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),

    /// DNS provider operation failed.
    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    /// Remote command or readiness probe failed.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Database project operation failed.
    #[error("Database project error: {0}")]
    DatabaseProject(#[from] DatabaseProjectError),

    /// Tool configuration failed.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Tenant record store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A wait loop ran out of time.
    #[error(transparent)]
    DeadlineExceeded(#[from] DeadlineExceeded),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compute resource is not tracked.
    #[error("Resource not found: {0}")]
    ResourceNotFound(ResourceId),

    /// Tenant has no infrastructure record.
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// A provisioning run was already started for the resource.
    #[error("Provisioning of resource {id} already started (phase {phase})")]
    AlreadyStarted {
        /// Compute resource id.
        id: ResourceId,
        /// Phase the resource is in.
        phase: Phase,
    },

    /// A file read back from a host does not carry the written tokens.
    #[error("Token mismatch after writing {path}")]
    TokenMismatch {
        /// Remote file path.
        path: String,
    },

    /// The provisioning queue is at capacity.
    #[error("Provisioning queue is full")]
    QueueFull,

    /// The provisioning queue no longer accepts jobs.
    #[error("Provisioning queue is closed")]
    QueueClosed,

    /// Request validation failed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type using the provisioner Error.
pub type Result<T> = std::result::Result<T, Error>;
