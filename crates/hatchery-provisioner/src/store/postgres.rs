// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL tenant record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::traits::*;
use crate::database::ProjectRef;
use crate::secret::SecretString;
use crate::tenant::{TenantInfrastructure, TenantStatus};

/// Tenant record store backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresTenantStore {
    pool: PgPool,
}

impl PostgresTenantStore {
    /// Create a store over an existing pool. Run [`crate::migrations::run`] first.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct TenantRow {
    tenant_id: String,
    resource_id: i64,
    resource_name: String,
    public_gateway_url: String,
    internal_gateway_url: String,
    gateway_token: String,
    remote_secret: String,
    public_ip: String,
    subdomain: Option<String>,
    created_at: DateTime<Utc>,
    status: String,
    tls_enabled: bool,
    database_project_ref: String,
    database_service_key: String,
    tools: Vec<String>,
}

impl TryFrom<TenantRow> for TenantInfrastructure {
    type Error = StoreError;

    fn try_from(row: TenantRow) -> Result<Self> {
        let corrupt = |message: String| StoreError::Corrupt {
            tenant_id: row.tenant_id.clone(),
            message,
        };
        let resource_id = u64::try_from(row.resource_id)
            .map_err(|_| corrupt(format!("negative resource id {}", row.resource_id)))?;
        let public_ip = row
            .public_ip
            .parse()
            .map_err(|_| corrupt(format!("invalid public ip {}", row.public_ip)))?;
        let status: TenantStatus = row.status.parse().map_err(corrupt)?;

        Ok(Self {
            tenant_id: row.tenant_id,
            resource_id,
            resource_name: row.resource_name,
            public_gateway_url: row.public_gateway_url,
            internal_gateway_url: row.internal_gateway_url,
            gateway_token: SecretString::new(row.gateway_token),
            remote_secret: SecretString::new(row.remote_secret),
            public_ip,
            subdomain: row.subdomain,
            created_at: row.created_at,
            status,
            tls_enabled: row.tls_enabled,
            database_project_ref: ProjectRef(row.database_project_ref),
            database_service_key: SecretString::new(row.database_service_key),
            tools: row.tools,
        })
    }
}

#[async_trait]
impl TenantRecordStore for PostgresTenantStore {
    async fn save(&self, record: &TenantInfrastructure) -> Result<()> {
        let resource_id = i64::try_from(record.resource_id).map_err(|_| StoreError::Corrupt {
            tenant_id: record.tenant_id.clone(),
            message: format!("resource id {} out of range", record.resource_id),
        })?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tenant_infrastructure (
                tenant_id, resource_id, resource_name, public_gateway_url,
                internal_gateway_url, gateway_token, remote_secret, public_ip,
                subdomain, created_at, status, tls_enabled, database_project_ref,
                database_service_key, tools
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (tenant_id) DO UPDATE SET
                resource_id = EXCLUDED.resource_id,
                resource_name = EXCLUDED.resource_name,
                public_gateway_url = EXCLUDED.public_gateway_url,
                internal_gateway_url = EXCLUDED.internal_gateway_url,
                gateway_token = EXCLUDED.gateway_token,
                remote_secret = EXCLUDED.remote_secret,
                public_ip = EXCLUDED.public_ip,
                subdomain = EXCLUDED.subdomain,
                created_at = EXCLUDED.created_at,
                status = EXCLUDED.status,
                tls_enabled = EXCLUDED.tls_enabled,
                database_project_ref = EXCLUDED.database_project_ref,
                database_service_key = EXCLUDED.database_service_key,
                tools = EXCLUDED.tools
            "#,
        )
        .bind(&record.tenant_id)
        .bind(resource_id)
        .bind(&record.resource_name)
        .bind(&record.public_gateway_url)
        .bind(&record.internal_gateway_url)
        .bind(record.gateway_token.expose())
        .bind(record.remote_secret.expose())
        .bind(record.public_ip.to_string())
        .bind(&record.subdomain)
        .bind(record.created_at)
        .bind(record.status.as_str())
        .bind(record.tls_enabled)
        .bind(record.database_project_ref.as_str())
        .bind(record.database_service_key.expose())
        .bind(&record.tools)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO tenant_project_index (project_ref, tenant_id)
            VALUES ($1, $2)
            ON CONFLICT (project_ref) DO UPDATE SET tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(record.database_project_ref.as_str())
        .bind(&record.tenant_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, tenant_id: &str) -> Result<Option<TenantInfrastructure>> {
        let row: Option<TenantRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, resource_id, resource_name, public_gateway_url,
                   internal_gateway_url, gateway_token, remote_secret, public_ip,
                   subdomain, created_at, status, tls_enabled, database_project_ref,
                   database_service_key, tools
            FROM tenant_infrastructure
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TenantInfrastructure::try_from).transpose()
    }

    async fn delete(&self, tenant_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tenant_infrastructure WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_project_index(&self, project: &ProjectRef) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tenant_project_index WHERE project_ref = $1")
            .bind(project.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_tenant_by_project(&self, project: &ProjectRef) -> Result<Option<String>> {
        let tenant_id: Option<String> =
            sqlx::query_scalar("SELECT tenant_id FROM tenant_project_index WHERE project_ref = $1")
                .bind(project.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(tenant_id)
    }
}
