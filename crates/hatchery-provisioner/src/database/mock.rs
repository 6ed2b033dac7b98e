// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock database project provider for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::traits::*;
use crate::poll::PollPolicy;
use crate::secret::SecretString;

/// Mock database project provider for testing.
pub struct MockDatabaseProjects {
    next: AtomicU32,
    projects: Arc<Mutex<HashMap<ProjectRef, Instant>>>,
    deleted: Arc<Mutex<Vec<ProjectRef>>>,
    sql: Arc<Mutex<Vec<(ProjectRef, String)>>>,
    /// Time after creation at which a project reports healthy; `None` never does.
    pub healthy_after: Option<Duration>,
    /// If true, `create` fails.
    pub fail_create: bool,
    /// Poll policy returned by `activation_policy`.
    pub activation: PollPolicy,
}

impl Default for MockDatabaseProjects {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDatabaseProjects {
    /// Create a mock whose projects are healthy immediately.
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
            projects: Arc::new(Mutex::new(HashMap::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            sql: Arc::new(Mutex::new(Vec::new())),
            healthy_after: Some(Duration::ZERO),
            fail_create: false,
            activation: PollPolicy::from_secs(5, 300),
        }
    }

    /// Create a mock whose projects become healthy after `delay`.
    pub fn healthy_after(delay: Duration) -> Self {
        Self {
            healthy_after: Some(delay),
            ..Self::new()
        }
    }

    /// Create a mock whose projects never become healthy.
    pub fn never_healthy() -> Self {
        Self {
            healthy_after: None,
            ..Self::new()
        }
    }

    /// Create a mock whose `create` always fails.
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::new()
        }
    }

    /// References passed to `delete`, in call order.
    pub async fn deleted(&self) -> Vec<ProjectRef> {
        self.deleted.lock().await.clone()
    }

    /// Whether a project still exists.
    pub async fn exists(&self, project: &ProjectRef) -> bool {
        self.projects.lock().await.contains_key(project)
    }

    /// SQL statements run, in call order.
    pub async fn executed_sql(&self) -> Vec<(ProjectRef, String)> {
        self.sql.lock().await.clone()
    }
}

#[async_trait]
impl DatabaseProjectProvider for MockDatabaseProjects {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    fn activation_policy(&self) -> PollPolicy {
        self.activation
    }

    async fn create(&self, _name: &str) -> Result<ProjectRef> {
        if self.fail_create {
            return Err(DatabaseProjectError::Failed {
                project: ProjectRef::from("none"),
                status: "Mock create failure".to_string(),
            });
        }
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let project = ProjectRef(format!("proj{n:04}"));
        self.projects
            .lock()
            .await
            .insert(project.clone(), Instant::now());
        Ok(project)
    }

    async fn health(&self, project: &ProjectRef) -> Result<ProjectHealth> {
        let projects = self.projects.lock().await;
        let created_at = projects
            .get(project)
            .ok_or_else(|| DatabaseProjectError::NotFound(project.clone()))?;

        match self.healthy_after {
            Some(delay) if created_at.elapsed() >= delay => Ok(ProjectHealth::Active),
            _ => Ok(ProjectHealth::Coming),
        }
    }

    async fn get_service_credential(&self, project: &ProjectRef) -> Result<SecretString> {
        if !self.exists(project).await {
            return Err(DatabaseProjectError::NotFound(project.clone()));
        }
        Ok(SecretString::new(format!("service-key-{project}")))
    }

    async fn run_sql(&self, project: &ProjectRef, sql: &str) -> Result<()> {
        if !self.exists(project).await {
            return Err(DatabaseProjectError::NotFound(project.clone()));
        }
        self.sql
            .lock()
            .await
            .push((project.clone(), sql.to_string()));
        Ok(())
    }

    async fn delete(&self, project: &ProjectRef) -> Result<()> {
        self.deleted.lock().await.push(project.clone());
        self.projects
            .lock()
            .await
            .remove(project)
            .map(|_| ())
            .ok_or_else(|| DatabaseProjectError::NotFound(project.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_never_healthy_hits_deadline() {
        let db = MockDatabaseProjects::never_healthy();
        let project = db.create("alice").await.unwrap();
        let started = Instant::now();

        let err = db.wait_until_active(&project).await.unwrap_err();

        assert!(matches!(err, DatabaseProjectError::NotActive(_)));
        assert!(started.elapsed() >= Duration::from_secs(300));
        assert!(started.elapsed() < Duration::from_secs(301));
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_after_delay() {
        let db = MockDatabaseProjects::healthy_after(Duration::from_secs(12));
        let project = db.create("alice").await.unwrap();

        db.wait_until_active(&project).await.unwrap();

        assert_eq!(
            db.get_service_credential(&project).await.unwrap().expose(),
            "service-key-proj0001"
        );
    }
}
