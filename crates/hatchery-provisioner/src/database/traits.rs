// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database project provider trait definitions.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::http::ApiFailure;
use crate::poll::{DeadlineExceeded, PollPolicy, poll_until};
use crate::secret::SecretString;

/// Reference of a database project, as assigned by the management API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectRef(pub String);

impl ProjectRef {
    /// Returns the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Health of a database project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectHealth {
    /// Accepting connections and queries.
    Active,
    /// Still coming up.
    Coming,
    /// In a state it will not leave on its own, with the status as reported.
    Broken(String),
}

/// Errors from database project operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DatabaseProjectError {
    /// Transport-level failure talking to the management API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The management API rejected the request.
    #[error("Database management API error: {0}")]
    Api(#[from] ApiFailure),

    /// The project never became healthy.
    #[error(transparent)]
    NotActive(#[from] DeadlineExceeded),

    /// The project reported a terminal failure state.
    #[error("Database project {project} failed: {status}")]
    Failed {
        /// Project reference.
        project: ProjectRef,
        /// Status reported by the API.
        status: String,
    },

    /// The project has no service credential.
    #[error("Database project {0} has no service credential")]
    MissingCredential(ProjectRef),

    /// The project does not exist (anymore).
    #[error("Database project not found: {0}")]
    NotFound(ProjectRef),
}

/// Result type for database project operations.
pub type Result<T> = std::result::Result<T, DatabaseProjectError>;

/// Trait for managed-database control planes.
#[async_trait]
pub trait DatabaseProjectProvider: Send + Sync {
    /// Provider identifier (e.g., "supabase").
    fn provider_name(&self) -> &'static str;

    /// Poll policy for [`wait_until_active`](Self::wait_until_active).
    fn activation_policy(&self) -> PollPolicy {
        PollPolicy::from_secs(5, 300)
    }

    /// Create a project.
    async fn create(&self, name: &str) -> Result<ProjectRef>;

    /// One health query.
    async fn health(&self, project: &ProjectRef) -> Result<ProjectHealth>;

    /// Poll until the project is healthy.
    ///
    /// Query errors count as not-yet-healthy; a [`ProjectHealth::Broken`]
    /// project fails immediately.
    async fn wait_until_active(&self, project: &ProjectRef) -> Result<()> {
        let outcome = poll_until(self.activation_policy(), "database project", move || async move {
            match self.health(project).await {
                Ok(ProjectHealth::Active) => Some(Ok(())),
                Ok(ProjectHealth::Broken(status)) => Some(Err(DatabaseProjectError::Failed {
                    project: project.clone(),
                    status,
                })),
                Ok(ProjectHealth::Coming) => None,
                Err(e) => {
                    debug!(project = %project, error = %e, "Database health query failed");
                    None
                }
            }
        })
        .await?;
        outcome
    }

    /// Fetch the project's service-role credential.
    async fn get_service_credential(&self, project: &ProjectRef) -> Result<SecretString>;

    /// Execute SQL against the project's database.
    async fn run_sql(&self, project: &ProjectRef, sql: &str) -> Result<()>;

    /// Delete a project.
    async fn delete(&self, project: &ProjectRef) -> Result<()>;
}
