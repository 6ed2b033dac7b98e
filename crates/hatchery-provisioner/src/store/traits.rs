// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant record store trait definitions.

use async_trait::async_trait;
use thiserror::Error;

use crate::database::ProjectRef;
use crate::tenant::TenantInfrastructure;

/// Errors from tenant record storage.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back to a record.
    #[error("Corrupt tenant record {tenant_id}: {message}")]
    Corrupt {
        /// Tenant id of the row.
        tenant_id: String,
        /// What was wrong.
        message: String,
    },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable storage for tenant infrastructure records.
///
/// `save` writes the record and its project index together or not at all.
#[async_trait]
pub trait TenantRecordStore: Send + Sync {
    /// Insert or replace a record and its `project_ref -> tenant_id` index entry.
    async fn save(&self, record: &TenantInfrastructure) -> Result<()>;

    /// Fetch a record.
    async fn get(&self, tenant_id: &str) -> Result<Option<TenantInfrastructure>>;

    /// Delete a record. Returns whether one existed.
    async fn delete(&self, tenant_id: &str) -> Result<bool>;

    /// Delete a project index entry. Returns whether one existed.
    async fn delete_project_index(&self, project: &ProjectRef) -> Result<bool>;

    /// Tenant owning a database project.
    async fn find_tenant_by_project(&self, project: &ProjectRef) -> Result<Option<String>>;
}
