// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant teardown.
//!
//! Deletes every resource a tenant record points at. Each step is attempted
//! even when an earlier one failed; failures are collected in the report.

use std::fmt;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::orchestrator::Provisioner;

/// One teardown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStep {
    /// Delete the compute resource.
    Compute,
    /// Delete the database project.
    DatabaseProject,
    /// Delete the DNS record.
    Dns,
    /// Delete the tenant record.
    Record,
    /// Delete the project-to-tenant index entry.
    ProjectIndex,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Compute => "compute",
            Self::DatabaseProject => "database_project",
            Self::Dns => "dns",
            Self::Record => "record",
            Self::ProjectIndex => "project_index",
        };
        f.write_str(name)
    }
}

/// A teardown step that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    /// Which step.
    pub step: TeardownStep,
    /// Error message.
    pub error: String,
}

/// Outcome of [`Provisioner::teardown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Tenant that was torn down.
    pub tenant_id: String,
    /// Steps that failed, in execution order.
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// Whether every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record<E: fmt::Display>(&mut self, step: TeardownStep, result: std::result::Result<(), E>) {
        if let Err(e) = result {
            warn!(tenant_id = %self.tenant_id, step = %step, error = %e, "Teardown step failed");
            self.failures.push(TeardownFailure {
                step,
                error: e.to_string(),
            });
        }
    }
}

impl Provisioner {
    /// Delete all infrastructure of a tenant.
    ///
    /// Returns [`Error::TenantNotFound`] when the tenant has no record.
    /// Individual step failures do not abort; see [`TeardownReport`].
    #[instrument(skip(self))]
    pub async fn teardown(&self, tenant_id: &str) -> Result<TeardownReport> {
        let record = self
            .store
            .get(tenant_id)
            .await?
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;

        let mut report = TeardownReport {
            tenant_id: tenant_id.to_string(),
            failures: Vec::new(),
        };

        report.record(
            TeardownStep::Compute,
            self.compute().delete(record.resource_id).await,
        );
        report.record(
            TeardownStep::DatabaseProject,
            self.databases.delete(&record.database_project_ref).await,
        );
        if let (Some(dns), Some(subdomain)) = (self.dns(), &record.subdomain) {
            report.record(TeardownStep::Dns, dns.delete_record(subdomain).await);
        }
        report.record(
            TeardownStep::Record,
            self.store.delete(tenant_id).await.map(drop),
        );
        report.record(
            TeardownStep::ProjectIndex,
            self.store
                .delete_project_index(&record.database_project_ref)
                .await
                .map(drop),
        );

        self.registry.remove(record.resource_id);

        if report.is_clean() {
            info!(tenant_id, resource_id = record.resource_id, "Tenant torn down");
        } else {
            warn!(
                tenant_id,
                failures = report.failures.len(),
                "Tenant teardown finished with failures"
            );
        }

        Ok(report)
    }
}
