// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for the provisioner.
//!
//! [`ProvisionerRuntime`] owns a [`Provisioner`] and the background
//! [`ProvisionWorker`](crate::queue::ProvisionWorker), so a request handler only calls
//! [`launch`](ProvisionerRuntime::launch) and polls
//! [`status`](ProvisionerRuntime::status).
//!
//! # Example
//!
//! ```rust,ignore
//! use hatchery_provisioner::config::Config;
//! use hatchery_provisioner::runtime::ProvisionerRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!
//!     let runtime = ProvisionerRuntime::builder()
//!         .from_config(&config)
//!         .await?
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     let status = runtime.launch("alice", "tenant-1").await?;
//!     println!("{} is {}", status.resource_id, status.phase);
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::compute::{ComputeProvider, DigitalOceanProvider, HetznerProvider, ResourceId};
use crate::config::{ComputeBackend, Config};
use crate::database::{DatabaseProjectProvider, SupabaseProjects};
use crate::dns::{CloudflareDns, DnsProvider};
use crate::http;
use crate::migrations;
use crate::orchestrator::{ProvisionSettings, Provisioner};
use crate::pairing::{GatewayPairing, WsPairing};
use crate::queue::{ProvisionJob, ProvisionQueue, QueueConfig};
use crate::remote::{RemoteExecutor, SshConfig, SshExecutor};
use crate::status::ProvisioningStatus;
use crate::store::{InMemoryTenantStore, PostgresTenantStore, TenantRecordStore};
use crate::teardown::TeardownReport;
use crate::tools::ToolSecrets;

/// Builder for creating a [`ProvisionerRuntime`].
#[derive(Default)]
pub struct ProvisionerRuntimeBuilder {
    compute: Option<Arc<dyn ComputeProvider>>,
    dns: Option<Arc<dyn DnsProvider>>,
    remote: Option<Arc<dyn RemoteExecutor>>,
    databases: Option<Arc<dyn DatabaseProjectProvider>>,
    pairing: Option<Arc<dyn GatewayPairing>>,
    store: Option<Arc<dyn TenantRecordStore>>,
    tool_secrets: ToolSecrets,
    settings: ProvisionSettings,
    queue: QueueConfig,
}

impl ProvisionerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the production collaborators described by `config`.
    ///
    /// Connects to the record store database and applies migrations when a
    /// database URL is configured; otherwise records are kept in memory.
    pub async fn from_config(mut self, config: &Config) -> Result<Self> {
        let client = http::build_client()?;

        let compute: Arc<dyn ComputeProvider> = match &config.compute {
            ComputeBackend::Hetzner(cfg) => {
                Arc::new(HetznerProvider::new(client.clone(), cfg.clone()))
            }
            ComputeBackend::DigitalOcean(cfg) => {
                Arc::new(DigitalOceanProvider::new(client.clone(), cfg.clone()))
            }
        };
        info!(provider = compute.provider_name(), "Compute provider selected");
        self.compute = Some(compute);

        match &config.dns {
            Some(cfg) => {
                info!(base_domain = %cfg.base_domain, "DNS provider configured");
                self.dns = Some(Arc::new(CloudflareDns::new(client.clone(), cfg.clone())));
            }
            None => warn!("No DNS provider configured; tenants get no subdomain"),
        }

        self.databases = Some(Arc::new(SupabaseProjects::new(
            client,
            config.database_projects.clone(),
        )));

        self.remote = Some(Arc::new(SshExecutor::new(SshConfig {
            readiness: config.timings.readiness,
            retry: config.timings.command_retry,
            ..SshConfig::default()
        })));
        self.pairing = Some(Arc::new(WsPairing::new(config.timings.pairing_retry)));

        let store: Arc<dyn TenantRecordStore> = match &config.database_url {
            Some(url) => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(5)
                    .connect(url)
                    .await?;
                info!("Connected to record store database");
                migrations::run(&pool).await?;
                info!("Record store migrations applied");
                Arc::new(PostgresTenantStore::new(pool))
            }
            None => {
                warn!("HATCHERY_DATABASE_URL not set; tenant records are kept in memory");
                Arc::new(InMemoryTenantStore::new())
            }
        };
        self.store = Some(store);

        self.tool_secrets = ToolSecrets::from_env();
        self.settings = ProvisionSettings {
            gateway_port: config.gateway_port,
            relay_port: config.relay_port,
            tls: config.tls.clone(),
            default_tools: config.default_tools.clone(),
            timings: config.timings.run(),
        };
        self.queue = QueueConfig {
            capacity: config.queue_capacity,
            max_concurrent: config.max_concurrent_runs,
        };

        Ok(self)
    }

    /// Set the compute provider.
    pub fn compute(mut self, compute: Arc<dyn ComputeProvider>) -> Self {
        self.compute = Some(compute);
        self
    }

    /// Set the DNS provider.
    pub fn dns(mut self, dns: Arc<dyn DnsProvider>) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Set the remote executor.
    pub fn remote(mut self, remote: Arc<dyn RemoteExecutor>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Set the database project provider.
    pub fn database_projects(mut self, databases: Arc<dyn DatabaseProjectProvider>) -> Self {
        self.databases = Some(databases);
        self
    }

    /// Set the gateway pairing client.
    pub fn pairing(mut self, pairing: Arc<dyn GatewayPairing>) -> Self {
        self.pairing = Some(pairing);
        self
    }

    /// Set the tenant record store.
    pub fn store(mut self, store: Arc<dyn TenantRecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the secrets available to tool bundles.
    pub fn tool_secrets(mut self, secrets: ToolSecrets) -> Self {
        self.tool_secrets = secrets;
        self
    }

    /// Set deployment-wide provisioning settings.
    pub fn settings(mut self, settings: ProvisionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set queue sizing.
    ///
    /// Default: 64 queued jobs, 8 concurrent runs.
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required collaborators are missing.
    pub fn build(self) -> Result<ProvisionerRuntimeConfig> {
        let compute = self
            .compute
            .ok_or_else(|| anyhow::anyhow!("compute is required"))?;
        let remote = self
            .remote
            .ok_or_else(|| anyhow::anyhow!("remote is required"))?;
        let databases = self
            .databases
            .ok_or_else(|| anyhow::anyhow!("database_projects is required"))?;
        let pairing = self
            .pairing
            .ok_or_else(|| anyhow::anyhow!("pairing is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;

        let mut builder = Provisioner::builder()
            .compute(compute)
            .remote(remote)
            .database_projects(databases)
            .pairing(pairing)
            .store(store)
            .tool_secrets(self.tool_secrets)
            .settings(self.settings);
        if let Some(dns) = self.dns {
            builder = builder.dns(dns);
        }

        Ok(ProvisionerRuntimeConfig {
            provisioner: builder.build()?,
            queue: self.queue,
        })
    }
}

/// Configuration for a [`ProvisionerRuntime`].
pub struct ProvisionerRuntimeConfig {
    provisioner: Provisioner,
    queue: QueueConfig,
}

impl ProvisionerRuntimeConfig {
    /// Start the runtime, spawning the provisioning worker.
    pub async fn start(self) -> Result<ProvisionerRuntime> {
        let provisioner = Arc::new(self.provisioner);
        let (queue, worker) = ProvisionQueue::new(provisioner.clone(), self.queue);
        let worker_shutdown = worker.shutdown_handle();
        let worker_handle = tokio::spawn(worker.run());

        info!(
            capacity = self.queue.capacity,
            max_concurrent = self.queue.max_concurrent,
            "ProvisionerRuntime started"
        );

        Ok(ProvisionerRuntime {
            provisioner,
            queue,
            worker_handle,
            worker_shutdown,
        })
    }
}

/// A running provisioner with its background worker.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ProvisionerRuntime {
    provisioner: Arc<Provisioner>,
    queue: ProvisionQueue,
    worker_handle: JoinHandle<()>,
    worker_shutdown: Arc<Notify>,
}

impl ProvisionerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ProvisionerRuntimeBuilder {
        ProvisionerRuntimeBuilder::new()
    }

    /// The shared provisioner.
    pub fn provisioner(&self) -> &Arc<Provisioner> {
        &self.provisioner
    }

    /// Create a compute resource and queue its provisioning.
    ///
    /// Returns the initial status. If the queue rejects the job, the resource
    /// is deleted again and the error returned.
    pub async fn launch(
        &self,
        name: &str,
        tenant_id: &str,
    ) -> crate::error::Result<ProvisioningStatus> {
        let created = self.provisioner.create_and_provision(name).await?;
        let job = ProvisionJob {
            resource_id: created.id,
            secret: created.secret,
            tenant_id: tenant_id.to_string(),
        };

        if let Err(e) = self.queue.submit(job) {
            self.provisioner.abandon(created.id, &e).await;
            return Err(e);
        }

        info!(resource_id = created.id, tenant_id, "Provisioning queued");
        Ok(created.status)
    }

    /// Current status of a resource.
    pub fn status(&self, id: ResourceId) -> Option<ProvisioningStatus> {
        self.provisioner.get_status(id)
    }

    /// Delete all infrastructure of a tenant.
    pub async fn teardown(&self, tenant_id: &str) -> crate::error::Result<TeardownReport> {
        self.provisioner.teardown(tenant_id).await
    }

    /// Replace a tenant's tool set.
    pub async fn configure_tools(
        &self,
        tenant_id: &str,
        tools: &[String],
    ) -> crate::error::Result<Vec<String>> {
        self.provisioner.configure_tools(tenant_id, tools).await
    }

    /// Check if the worker is still running.
    pub fn is_running(&self) -> bool {
        !self.worker_handle.is_finished()
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops taking new jobs and waits for every accepted job to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("ProvisionerRuntime shutting down...");

        self.worker_shutdown.notify_one();
        drop(self.queue);

        if let Err(e) = self.worker_handle.await {
            error!("Provision worker task panicked: {}", e);
            return Err(anyhow::anyhow!("provision worker task panicked: {}", e));
        }

        info!("ProvisionerRuntime shutdown complete");
        Ok(())
    }
}
