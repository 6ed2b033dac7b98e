// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Supabase management API backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::traits::*;
use crate::http::{check_status, join_url};
use crate::poll::PollPolicy;
use crate::secret::SecretString;

/// Default management API base URL.
pub const DEFAULT_API_URL: &str = "https://api.supabase.com/v1";

/// Settings for the Supabase backend.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Management API access token.
    pub access_token: SecretString,
    /// API base URL.
    pub api_url: String,
    /// Organization that owns tenant projects.
    pub organization_id: String,
    /// Region for new projects (e.g., "eu-central-1").
    pub region: String,
    /// Poll policy while waiting for a project to become healthy.
    pub activation: PollPolicy,
}

/// Supabase implementation of [`DatabaseProjectProvider`].
pub struct SupabaseProjects {
    client: reqwest::Client,
    config: SupabaseConfig,
}

#[derive(Serialize)]
struct CreateProjectRequest<'a> {
    name: &'a str,
    organization_id: &'a str,
    region: &'a str,
    db_pass: &'a str,
}

#[derive(Deserialize)]
struct Project {
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct ApiKey {
    name: String,
    api_key: SecretString,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

/// Map a project status string onto [`ProjectHealth`].
pub fn normalize_health(status: &str) -> ProjectHealth {
    match status {
        "ACTIVE_HEALTHY" => ProjectHealth::Active,
        "INIT_FAILED" | "REMOVED" | "GOING_DOWN" | "INACTIVE" => {
            ProjectHealth::Broken(status.to_string())
        }
        _ => ProjectHealth::Coming,
    }
}

impl SupabaseProjects {
    /// Create a Supabase backend.
    pub fn new(client: reqwest::Client, config: SupabaseConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.config.api_url, path)
    }
}

#[async_trait]
impl DatabaseProjectProvider for SupabaseProjects {
    fn provider_name(&self) -> &'static str {
        "supabase"
    }

    fn activation_policy(&self) -> PollPolicy {
        self.config.activation
    }

    async fn create(&self, name: &str) -> Result<ProjectRef> {
        // The database password is never used afterwards: the service credential grants access.
        let db_pass = SecretString::generate_password();
        let request = CreateProjectRequest {
            name,
            organization_id: &self.config.organization_id,
            region: &self.config.region,
            db_pass: db_pass.expose(),
        };

        let response = self
            .client
            .post(self.url("projects"))
            .bearer_auth(self.config.access_token.expose())
            .json(&request)
            .send()
            .await?;
        let project: Project = check_status(response).await?.json().await?;

        info!(project = %project.id, name, "Database project created");
        Ok(ProjectRef(project.id))
    }

    async fn health(&self, project: &ProjectRef) -> Result<ProjectHealth> {
        let response = self
            .client
            .get(self.url(&format!("projects/{project}")))
            .bearer_auth(self.config.access_token.expose())
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DatabaseProjectError::NotFound(project.clone()));
        }
        let body: Project = check_status(response).await?.json().await?;

        debug!(project = %project, status = %body.status, "Fetched database project status");
        Ok(normalize_health(&body.status))
    }

    async fn get_service_credential(&self, project: &ProjectRef) -> Result<SecretString> {
        let response = self
            .client
            .get(self.url(&format!("projects/{project}/api-keys")))
            .bearer_auth(self.config.access_token.expose())
            .send()
            .await?;
        let keys: Vec<ApiKey> = check_status(response).await?.json().await?;

        keys.into_iter()
            .find(|k| k.name == "service_role")
            .map(|k| k.api_key)
            .ok_or_else(|| DatabaseProjectError::MissingCredential(project.clone()))
    }

    async fn run_sql(&self, project: &ProjectRef, sql: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("projects/{project}/database/query")))
            .bearer_auth(self.config.access_token.expose())
            .json(&QueryRequest { query: sql })
            .send()
            .await?;
        check_status(response).await?;

        debug!(project = %project, bytes = sql.len(), "SQL executed");
        Ok(())
    }

    async fn delete(&self, project: &ProjectRef) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("projects/{project}")))
            .bearer_auth(self.config.access_token.expose())
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DatabaseProjectError::NotFound(project.clone()));
        }
        check_status(response).await?;

        info!(project = %project, "Database project deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn projects(server: &MockServer) -> SupabaseProjects {
        SupabaseProjects::new(
            reqwest::Client::new(),
            SupabaseConfig {
                access_token: SecretString::new("sb-token"),
                api_url: server.uri(),
                organization_id: "org1".to_string(),
                region: "eu-central-1".to_string(),
                activation: PollPolicy::new(Duration::from_millis(20), Duration::from_millis(500)),
            },
        )
    }

    #[test]
    fn test_normalize_health() {
        assert_eq!(normalize_health("ACTIVE_HEALTHY"), ProjectHealth::Active);
        assert_eq!(normalize_health("COMING_UP"), ProjectHealth::Coming);
        assert_eq!(
            normalize_health("INIT_FAILED"),
            ProjectHealth::Broken("INIT_FAILED".to_string())
        );
    }

    #[tokio::test]
    async fn test_create_project() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects"))
            .and(header("Authorization", "Bearer sb-token"))
            .and(body_partial_json(serde_json::json!({
                "name": "alice",
                "organization_id": "org1",
                "region": "eu-central-1"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "abcd1234", "status": "COMING_UP"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let project = projects(&server).create("alice").await.unwrap();

        assert_eq!(project, ProjectRef::from("abcd1234"));
    }

    #[tokio::test]
    async fn test_wait_until_active_polls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/abcd1234"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "abcd1234", "status": "COMING_UP"
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/abcd1234"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "abcd1234", "status": "ACTIVE_HEALTHY"
            })))
            .mount(&server)
            .await;

        projects(&server)
            .wait_until_active(&ProjectRef::from("abcd1234"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_until_active_reports_failed_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/abcd1234"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "abcd1234", "status": "INIT_FAILED"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = projects(&server)
            .wait_until_active(&ProjectRef::from("abcd1234"))
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            DatabaseProjectError::Failed { status, .. } if status == "INIT_FAILED"
        ));
        assert!(err.to_string().contains("INIT_FAILED"));
    }

    #[tokio::test]
    async fn test_wait_until_active_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/abcd1234"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "abcd1234", "status": "COMING_UP"
            })))
            .mount(&server)
            .await;

        let err = projects(&server)
            .wait_until_active(&ProjectRef::from("abcd1234"))
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseProjectError::NotActive(_)));
    }

    #[tokio::test]
    async fn test_service_credential_picks_service_role() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/abcd1234/api-keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "anon", "api_key": "anon-key"},
                {"name": "service_role", "api_key": "service-key"}
            ])))
            .mount(&server)
            .await;

        let key = projects(&server)
            .get_service_credential(&ProjectRef::from("abcd1234"))
            .await
            .unwrap();

        assert_eq!(key.expose(), "service-key");
    }

    #[tokio::test]
    async fn test_run_sql_posts_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/abcd1234/database/query"))
            .and(body_json(serde_json::json!({"query": "select 1"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        projects(&server)
            .run_sql(&ProjectRef::from("abcd1234"), "select 1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_sql_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/abcd1234/database/query"))
            .respond_with(ResponseTemplate::new(400).set_body_string("syntax error at or near"))
            .mount(&server)
            .await;

        let err = projects(&server)
            .run_sql(&ProjectRef::from("abcd1234"), "selec 1")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("syntax error"));
    }
}
