// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for provisioner integration tests.
//!
//! Provides a Harness wiring a Provisioner to mock collaborators, keeping a
//! handle on each mock for assertions.

#![allow(dead_code)]

use std::sync::Arc;

use hatchery_provisioner::compute::MockCompute;
use hatchery_provisioner::database::MockDatabaseProjects;
use hatchery_provisioner::dns::MockDns;
use hatchery_provisioner::error::Result;
use hatchery_provisioner::nginx::TlsFiles;
use hatchery_provisioner::orchestrator::{CreatedResource, ProvisionSettings, Provisioner};
use hatchery_provisioner::pairing::MockPairing;
use hatchery_provisioner::remote::MockRemote;
use hatchery_provisioner::store::InMemoryTenantStore;
use hatchery_provisioner::tenant::TenantInfrastructureView;
use hatchery_provisioner::tools::ToolSecrets;

pub const TENANT: &str = "tenant-1";

/// Provisioner plus the mocks behind it.
pub struct Harness {
    pub compute: Arc<MockCompute>,
    pub dns: Option<Arc<MockDns>>,
    pub remote: Arc<MockRemote>,
    pub databases: Arc<MockDatabaseProjects>,
    pub pairing: Arc<MockPairing>,
    pub store: Arc<InMemoryTenantStore>,
    pub provisioner: Arc<Provisioner>,
}

/// Builder for [`Harness`]. Defaults to mocks that succeed immediately.
pub struct HarnessBuilder {
    compute: MockCompute,
    dns: Option<MockDns>,
    remote: MockRemote,
    databases: MockDatabaseProjects,
    pairing: MockPairing,
    tls: Option<TlsFiles>,
    tools: Vec<String>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            compute: MockCompute::new(),
            dns: Some(MockDns::new()),
            remote: MockRemote::new(),
            databases: MockDatabaseProjects::new(),
            pairing: MockPairing::connected(),
            tls: None,
            tools: vec!["github".to_string()],
        }
    }
}

impl HarnessBuilder {
    pub fn compute(mut self, compute: MockCompute) -> Self {
        self.compute = compute;
        self
    }

    pub fn dns(mut self, dns: MockDns) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn without_dns(mut self) -> Self {
        self.dns = None;
        self
    }

    pub fn remote(mut self, remote: MockRemote) -> Self {
        self.remote = remote;
        self
    }

    pub fn databases(mut self, databases: MockDatabaseProjects) -> Self {
        self.databases = databases;
        self
    }

    pub fn pairing(mut self, pairing: MockPairing) -> Self {
        self.pairing = pairing;
        self
    }

    pub fn tls(mut self, tls: TlsFiles) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn build(self) -> Harness {
        let compute = Arc::new(self.compute);
        let dns = self.dns.map(Arc::new);
        let remote = Arc::new(self.remote);
        let databases = Arc::new(self.databases);
        let pairing = Arc::new(self.pairing);
        let store = Arc::new(InMemoryTenantStore::new());

        let mut builder = Provisioner::builder()
            .compute(compute.clone())
            .remote(remote.clone())
            .database_projects(databases.clone())
            .pairing(pairing.clone())
            .store(store.clone())
            .tool_secrets(test_secrets())
            .settings(ProvisionSettings {
                tls: self.tls,
                default_tools: self.tools,
                ..ProvisionSettings::default()
            });
        if let Some(dns) = &dns {
            builder = builder.dns(dns.clone());
        }

        Harness {
            compute,
            dns,
            remote,
            databases,
            pairing,
            store,
            provisioner: Arc::new(builder.build().expect("harness provisioner")),
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Create a resource and run every phase for it.
    pub async fn provision(&self, name: &str) -> (CreatedResource, Result<TenantInfrastructureView>) {
        let created = self
            .provisioner
            .create_and_provision(name)
            .await
            .expect("create_and_provision");
        let result = self
            .provisioner
            .provision_resource(created.id, created.secret.clone(), TENANT)
            .await;
        (created, result)
    }

    pub fn dns(&self) -> &MockDns {
        self.dns.as_deref().expect("harness built without DNS")
    }
}

pub fn test_secrets() -> ToolSecrets {
    ToolSecrets::from_pairs([
        ("GITHUB_TOKEN", "ghp_test_token"),
        ("LINEAR_API_KEY", "lin_test_key"),
    ])
}
