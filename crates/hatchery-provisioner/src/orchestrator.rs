// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provisioning orchestrator.
//!
//! Drives one compute resource through a fixed phase sequence:
//!
//! ```text
//! CREATING -> WAITING_ACTIVE -> WAITING_SSH -> CONFIGURING -> DNS -> VERIFYING
//!          -> [NGINX] -> COMPLETE
//! ```
//!
//! `WAITING_ACTIVE` waits for the compute resource while the database project
//! is created and activated on the side. Any failure deletes what the run
//! created, records `FAILED` once, and returns the original error.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::compute::{ComputeError, ComputeProvider, ResourceId};
use crate::config::RunTimings;
use crate::configurator::{self, BringUp, ToolConfigurator};
use crate::database::{DatabaseProjectProvider, ProjectRef, sql};
use crate::dns::{DnsProvider, sanitize_label};
use crate::error::{Error, Result};
use crate::nginx::{self, TlsFiles};
use crate::pairing::{GatewayPairing, HandshakeOutcome};
use crate::poll::poll_until;
use crate::remote::RemoteExecutor;
use crate::remote::shell::quote;
use crate::runtime_config::{self, GatewayTokens, RuntimeConfig};
use crate::secret::SecretString;
use crate::status::{Phase, ProvisioningStatus, StatusRegistry};
use crate::store::TenantRecordStore;
use crate::tenant::{TenantInfrastructure, TenantInfrastructureView, TenantStatus};
use crate::tools::ToolSecrets;

/// Service unit the runtime's installer creates for the gateway.
const GATEWAY_UNIT: &str = "agentd-gateway.service";

const WAITING_ACTIVE_MESSAGE: &str = "Waiting for server and database";

/// Result of [`Provisioner::create_and_provision`].
#[derive(Debug, Clone)]
pub struct CreatedResource {
    /// Compute resource id.
    pub id: ResourceId,
    /// Initial status snapshot.
    pub status: ProvisioningStatus,
    /// Remote-access secret. Only for the immediate caller.
    pub secret: SecretString,
}

/// Deployment-wide settings of a [`Provisioner`].
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Runtime gateway port on tenant hosts.
    pub gateway_port: u16,
    /// Tool relay port on tenant hosts.
    pub relay_port: u16,
    /// Wildcard certificate pair; TLS is disabled when absent.
    pub tls: Option<TlsFiles>,
    /// Tools configured for every new tenant.
    pub default_tools: Vec<String>,
    /// Waits the run applies itself. Readiness, command retry, database
    /// activation and pairing retry are set on the collaborators.
    pub timings: RunTimings,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            gateway_port: 18789,
            relay_port: 18790,
            tls: None,
            default_tools: Vec::new(),
            timings: RunTimings::default(),
        }
    }
}

/// What a run has created so far and must undo on failure.
#[derive(Debug, Default)]
struct Compensations {
    project: Option<ProjectRef>,
    subdomain: Option<String>,
}

/// Builder for [`Provisioner`].
#[derive(Default)]
pub struct ProvisionerBuilder {
    compute: Option<Arc<dyn ComputeProvider>>,
    dns: Option<Arc<dyn DnsProvider>>,
    remote: Option<Arc<dyn RemoteExecutor>>,
    databases: Option<Arc<dyn DatabaseProjectProvider>>,
    pairing: Option<Arc<dyn GatewayPairing>>,
    store: Option<Arc<dyn TenantRecordStore>>,
    tool_secrets: ToolSecrets,
    registry: Option<Arc<StatusRegistry>>,
    settings: ProvisionSettings,
}

impl ProvisionerBuilder {
    /// Set the compute provider (required).
    pub fn compute(mut self, compute: Arc<dyn ComputeProvider>) -> Self {
        self.compute = Some(compute);
        self
    }

    /// Set the DNS provider. Without one the DNS phase is skipped.
    pub fn dns(mut self, dns: Arc<dyn DnsProvider>) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Set the remote executor (required).
    pub fn remote(mut self, remote: Arc<dyn RemoteExecutor>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Set the database project provider (required).
    pub fn database_projects(mut self, databases: Arc<dyn DatabaseProjectProvider>) -> Self {
        self.databases = Some(databases);
        self
    }

    /// Set the gateway pairing client (required).
    pub fn pairing(mut self, pairing: Arc<dyn GatewayPairing>) -> Self {
        self.pairing = Some(pairing);
        self
    }

    /// Set the tenant record store (required).
    pub fn store(mut self, store: Arc<dyn TenantRecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the secrets available to tool bundles.
    pub fn tool_secrets(mut self, secrets: ToolSecrets) -> Self {
        self.tool_secrets = secrets;
        self
    }

    /// Share an existing status registry.
    pub fn registry(mut self, registry: Arc<StatusRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set deployment-wide settings.
    pub fn settings(mut self, settings: ProvisionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the provisioner.
    ///
    /// Returns an error if a required collaborator is missing or TLS is
    /// enabled without a DNS provider.
    pub fn build(self) -> Result<Provisioner> {
        let missing = |what: &str| Error::InvalidRequest(format!("{what} is required"));

        let compute = self.compute.ok_or_else(|| missing("compute provider"))?;
        let remote = self.remote.ok_or_else(|| missing("remote executor"))?;
        let databases = self.databases.ok_or_else(|| missing("database project provider"))?;
        let pairing = self.pairing.ok_or_else(|| missing("gateway pairing"))?;
        let store = self.store.ok_or_else(|| missing("tenant record store"))?;

        if self.settings.tls.is_some() && self.dns.is_none() {
            return Err(Error::InvalidRequest(
                "TLS requires a DNS provider".to_string(),
            ));
        }
        ToolConfigurator::resolve(&self.settings.default_tools)?;

        let configurator =
            ToolConfigurator::new(remote.clone(), self.tool_secrets, self.settings.relay_port);

        Ok(Provisioner {
            compute,
            dns: self.dns,
            remote,
            databases,
            pairing,
            store,
            configurator,
            registry: self.registry.unwrap_or_default(),
            settings: self.settings,
        })
    }
}

/// The provisioning orchestrator.
pub struct Provisioner {
    compute: Arc<dyn ComputeProvider>,
    dns: Option<Arc<dyn DnsProvider>>,
    pub(crate) remote: Arc<dyn RemoteExecutor>,
    pub(crate) databases: Arc<dyn DatabaseProjectProvider>,
    pairing: Arc<dyn GatewayPairing>,
    pub(crate) store: Arc<dyn TenantRecordStore>,
    pub(crate) configurator: ToolConfigurator,
    pub(crate) registry: Arc<StatusRegistry>,
    settings: ProvisionSettings,
}

impl Provisioner {
    /// Create a new builder.
    pub fn builder() -> ProvisionerBuilder {
        ProvisionerBuilder::default()
    }

    /// The status registry this provisioner writes to.
    pub fn registry(&self) -> &Arc<StatusRegistry> {
        &self.registry
    }

    /// Deployment-wide settings.
    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    pub(crate) fn compute(&self) -> &dyn ComputeProvider {
        self.compute.as_ref()
    }

    pub(crate) fn dns(&self) -> Option<&dyn DnsProvider> {
        self.dns.as_deref()
    }

    /// Current status of a resource.
    pub fn get_status(&self, id: ResourceId) -> Option<ProvisioningStatus> {
        self.registry.get(id)
    }

    /// Create the compute resource and return without waiting for it.
    ///
    /// Follow up with [`provision_resource`](Self::provision_resource), usually
    /// from a background worker.
    pub async fn create_and_provision(&self, name: &str) -> Result<CreatedResource> {
        if name.trim().is_empty() {
            return Err(Error::InvalidRequest("name must not be empty".to_string()));
        }

        let secret = SecretString::generate_password();
        let id = self.compute.create(name, &secret).await?;
        let status = self.registry.begin(id, name);

        info!(
            resource_id = id,
            name,
            provider = self.compute.provider_name(),
            "Compute resource created"
        );

        Ok(CreatedResource { id, status, secret })
    }

    /// Run every provisioning phase for a resource created by
    /// [`create_and_provision`](Self::create_and_provision).
    ///
    /// On failure everything the run created is deleted, the status ends in
    /// `FAILED`, and the original error is returned. A resource is provisioned
    /// at most once: later calls fail with [`Error::AlreadyStarted`] and leave
    /// the resource alone.
    #[instrument(skip(self, secret))]
    pub async fn provision_resource(
        &self,
        id: ResourceId,
        secret: SecretString,
        tenant_id: &str,
    ) -> Result<TenantInfrastructureView> {
        let name = self.registry.claim(id, WAITING_ACTIVE_MESSAGE)?;
        info!(resource_id = id, phase = %Phase::WaitingActive, "Entering phase");

        let mut created = Compensations::default();
        match self
            .run_phases(id, &name, &secret, tenant_id, &mut created)
            .await
        {
            Ok(record) => Ok(record.to_client_projection()),
            Err(e) => {
                error!(resource_id = id, error = %e, "Provisioning failed, rolling back");
                self.rollback(id, &created).await;
                self.registry
                    .fail(id, format!("Provisioning {name} failed"), e.to_string());
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        id: ResourceId,
        name: &str,
        secret: &SecretString,
        tenant_id: &str,
        created: &mut Compensations,
    ) -> Result<TenantInfrastructure> {
        let (ip, database) = tokio::join!(
            self.wait_for_compute(id),
            self.bring_up_database(name, &mut created.project)
        );
        let ip = ip?;
        let (project, service_key) = database?;
        self.registry.set_ip(id, ip);

        self.enter(id, Phase::WaitingSsh, "Waiting for SSH");
        self.remote.wait_for_port_ready(ip).await?;
        self.remote.wait_for_auth_ready(ip, secret).await?;

        self.enter(id, Phase::Configuring, "Configuring agent runtime");
        let tokens = GatewayTokens::generate();
        self.write_runtime_config(ip, secret, &tokens).await?;
        let tools = self.install_services(ip, secret).await?;

        self.enter(id, Phase::Dns, "Creating DNS record");
        let fqdn = match self.dns.as_deref() {
            Some(dns) => {
                let label = sanitize_label(name);
                let fqdn = dns.create_record(&label, ip).await?;
                created.subdomain = Some(label.clone());
                self.registry.set_subdomain(id, &label);
                info!(resource_id = id, fqdn = %fqdn, "DNS record created");
                Some(fqdn)
            }
            None => {
                debug!(resource_id = id, "No DNS provider configured, skipping DNS");
                None
            }
        };

        let tls = match (&self.settings.tls, &fqdn) {
            (Some(files), Some(fqdn)) => Some((files, fqdn.as_str())),
            _ => None,
        };
        let (public_url, internal_url) = match tls {
            Some((_, fqdn)) => (format!("https://{fqdn}"), format!("wss://{fqdn}")),
            None => (
                format!("http://{ip}:{}", self.settings.gateway_port),
                format!("ws://{ip}:{}", self.settings.gateway_port),
            ),
        };

        self.enter(id, Phase::Verifying, "Verifying agent runtime");
        self.verify_runtime(ip, secret).await?;
        let hook_url = format!("{public_url}/hooks/agent");
        self.databases
            .run_sql(
                &project,
                &sql::hook_trigger_sql(&hook_url, tokens.hooks_token.expose()),
            )
            .await?;

        if let Some((files, fqdn)) = tls {
            self.enter(id, Phase::Nginx, "Configuring TLS proxy");
            nginx::install(
                self.remote.as_ref(),
                ip,
                secret,
                fqdn,
                self.settings.gateway_port,
                files,
            )
            .await?;
        }

        self.pair(ip, secret, &internal_url, &tokens.auth_token).await;

        let record = TenantInfrastructure {
            tenant_id: tenant_id.to_string(),
            resource_id: id,
            resource_name: name.to_string(),
            public_gateway_url: public_url.clone(),
            internal_gateway_url: internal_url,
            gateway_token: tokens.auth_token.clone(),
            remote_secret: secret.clone(),
            public_ip: ip,
            subdomain: created.subdomain.clone(),
            created_at: Utc::now(),
            status: TenantStatus::Active,
            tls_enabled: tls.is_some(),
            database_project_ref: project,
            database_service_key: service_key,
            tools,
        };
        self.store.save(&record).await?;

        self.registry
            .complete(id, format!("Agent gateway ready at {public_url}"));
        info!(resource_id = id, tenant_id, url = %public_url, "Provisioning complete");

        Ok(record)
    }

    fn enter(&self, id: ResourceId, phase: Phase, message: &str) {
        info!(resource_id = id, phase = %phase, "Entering phase");
        self.registry.transition(id, phase, message);
    }

    async fn wait_for_compute(&self, id: ResourceId) -> Result<Ipv4Addr> {
        let compute = self.compute.as_ref();
        let outcome = poll_until(
            self.settings.timings.compute_active,
            "compute resource",
            move || async move {
                match compute.get_state(id).await {
                    Ok(state) => state.ready_ip().map(Ok),
                    Err(ComputeError::NotFound(id)) => Some(Err(ComputeError::NotFound(id))),
                    Err(e) => {
                        debug!(resource_id = id, error = %e, "Compute state query failed");
                        None
                    }
                }
            },
        )
        .await?;

        let ip = outcome?;
        info!(resource_id = id, ip = %ip, "Compute resource active");
        Ok(ip)
    }

    /// Create the project, wait for it, fetch its credential and install the schema.
    ///
    /// `slot` is filled as soon as the project exists so rollback can find it.
    async fn bring_up_database(
        &self,
        name: &str,
        slot: &mut Option<ProjectRef>,
    ) -> Result<(ProjectRef, SecretString)> {
        let project = self.databases.create(name).await?;
        *slot = Some(project.clone());

        self.databases.wait_until_active(&project).await?;
        let service_key = self.databases.get_service_credential(&project).await?;
        self.databases
            .run_sql(&project, sql::BOOTSTRAP_SCHEMA)
            .await?;

        info!(project = %project, "Database project ready");
        Ok((project, service_key))
    }

    async fn write_runtime_config(
        &self,
        ip: Ipv4Addr,
        secret: &SecretString,
        tokens: &GatewayTokens,
    ) -> Result<()> {
        let config = RuntimeConfig::new(self.settings.gateway_port, tokens);
        let path = quote(runtime_config::CONFIG_PATH);

        self.remote
            .run(
                ip,
                secret,
                &format!("mkdir -p {}", quote(runtime_config::CONFIG_DIR)),
            )
            .await?;
        self.remote
            .upload(ip, secret, runtime_config::CONFIG_PATH, &config.to_bytes()?, 0o600)
            .await?;
        self.remote
            .run(ip, secret, &format!("chmod 600 {path}"))
            .await?;

        let read_back = self.remote.run(ip, secret, &format!("cat {path}")).await?;
        config.verify_round_trip(&read_back)?;

        debug!(ip = %ip, "Runtime config written and verified");
        Ok(())
    }

    /// Persist user services, install the tool bundle and start both services.
    async fn install_services(&self, ip: Ipv4Addr, secret: &SecretString) -> Result<Vec<String>> {
        self.remote
            .run(ip, secret, "loginctl enable-linger root")
            .await?;

        self.remote
            .run(
                ip,
                secret,
                &format!("mkdir -p {}", quote(configurator::USER_UNIT_DIR)),
            )
            .await?;
        let unit_path = format!("{}/{}", configurator::USER_UNIT_DIR, configurator::RELAY_UNIT);
        self.remote
            .upload(
                ip,
                secret,
                &unit_path,
                configurator::relay_unit(self.settings.relay_port).as_bytes(),
                0o644,
            )
            .await?;

        let bundle = self
            .configurator
            .configure(ip, secret, &self.settings.default_tools, BringUp::Initial)
            .await?;

        self.remote
            .run(ip, secret, "agentd gateway install --force")
            .await?;
        self.remote
            .run(ip, secret, "systemctl --user daemon-reload")
            .await?;
        self.remote
            .run(
                ip,
                secret,
                &format!(
                    "systemctl --user enable --now {} {GATEWAY_UNIT}",
                    configurator::RELAY_UNIT
                ),
            )
            .await?;

        Ok(bundle.tools)
    }

    async fn verify_runtime(&self, ip: Ipv4Addr, secret: &SecretString) -> Result<()> {
        let remote = self.remote.as_ref();
        poll_until(
            self.settings.timings.verify,
            "agent runtime health",
            move || async move {
                match remote.run(ip, secret, "agentd health").await {
                    Ok(_) => Some(()),
                    Err(e) => {
                        debug!(ip = %ip, error = %e, "Runtime not healthy yet");
                        None
                    }
                }
            },
        )
        .await?;
        Ok(())
    }

    /// Pair with the gateway as an operator. Never fails the run.
    async fn pair(&self, ip: Ipv4Addr, secret: &SecretString, url: &str, token: &SecretString) {
        let budget = self.settings.timings.pairing_timeout;
        let outcome = match tokio::time::timeout(budget, self.pairing.handshake(url, token)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(ip = %ip, error = %e, "Gateway pairing failed");
                return;
            }
            Err(_) => {
                warn!(ip = %ip, timeout_secs = budget.as_secs(), "Gateway pairing timed out");
                return;
            }
        };

        match outcome {
            HandshakeOutcome::Connected => info!(ip = %ip, "Gateway paired"),
            HandshakeOutcome::PairingRequired { request_id } => {
                let command = format!("agentd devices approve {}", quote(&request_id));
                match self.remote.run(ip, secret, &command).await {
                    Ok(_) => info!(ip = %ip, request_id = %request_id, "Pairing request approved"),
                    Err(e) => warn!(ip = %ip, error = %e, "Pairing approval failed"),
                }
            }
        }
    }

    /// Delete a created resource that will never be provisioned.
    pub(crate) async fn abandon(&self, id: ResourceId, reason: &Error) {
        warn!(resource_id = id, error = %reason, "Abandoning created resource");
        self.rollback(id, &Compensations::default()).await;
        self.registry
            .fail(id, "Provisioning was not started", reason.to_string());
    }

    /// Delete everything a failed run created. Every step is attempted.
    async fn rollback(&self, id: ResourceId, created: &Compensations) {
        let mut failures = 0u32;

        if let Err(e) = self.compute.delete(id).await {
            failures += 1;
            error!(resource_id = id, error = %e, "Rollback: compute delete failed");
        }

        if let Some(project) = &created.project {
            if let Err(e) = self.databases.delete(project).await {
                failures += 1;
                error!(project = %project, error = %e, "Rollback: database project delete failed");
            }
        }

        if let (Some(dns), Some(subdomain)) = (self.dns.as_deref(), &created.subdomain) {
            if let Err(e) = dns.delete_record(subdomain).await {
                failures += 1;
                error!(subdomain = %subdomain, error = %e, "Rollback: DNS delete failed");
            }
        }

        if failures == 0 {
            info!(resource_id = id, "Rollback complete");
        } else {
            warn!(resource_id = id, failures, "Rollback incomplete");
        }
    }

    /// Replace a provisioned tenant's tool set.
    pub async fn configure_tools(&self, tenant_id: &str, tools: &[String]) -> Result<Vec<String>> {
        let mut record = self
            .store
            .get(tenant_id)
            .await?
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;

        let bundle = self
            .configurator
            .configure(
                record.public_ip,
                &record.remote_secret,
                tools,
                BringUp::Reconfigure,
            )
            .await?;

        record.tools = bundle.tools.clone();
        self.store.save(&record).await?;

        info!(tenant_id, tools = ?bundle.tools, "Tenant tools reconfigured");
        Ok(bundle.tools)
    }
}
