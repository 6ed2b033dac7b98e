// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hatchery Provisioner - Tenant Infrastructure Service
//!
//! Runs the provisioning worker, or drives a single provisioning or teardown
//! from the command line.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use hatchery_provisioner::config::Config;
use hatchery_provisioner::runtime::ProvisionerRuntime;
use hatchery_provisioner::status::ProvisioningStatus;

#[derive(Parser)]
#[command(name = "hatchery-provisioner", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the provisioning worker until interrupted (default).
    Serve,
    /// Provision one tenant and wait for the run to finish.
    Provision {
        /// Display name of the compute resource.
        name: String,
        /// Tenant the infrastructure belongs to.
        #[arg(long)]
        tenant: String,
    },
    /// Delete all infrastructure of a tenant.
    Teardown {
        /// Tenant id.
        tenant: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hatchery_provisioner=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();
    let config = Config::from_env()?;

    info!(
        tls = config.tls_enabled(),
        dns = config.dns.is_some(),
        gateway_port = config.gateway_port,
        "Starting Hatchery Provisioner"
    );

    let runtime = ProvisionerRuntime::builder()
        .from_config(&config)
        .await?
        .build()?
        .start()
        .await?;

    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Provision { name, tenant } => provision(&runtime, &name, &tenant).await,
        Command::Teardown { tenant } => teardown(&runtime, &tenant).await,
    };

    runtime.shutdown().await?;
    info!("Hatchery Provisioner shut down");

    outcome
}

async fn serve() -> anyhow::Result<()> {
    info!("Provisioner ready");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    Ok(())
}

async fn provision(runtime: &ProvisionerRuntime, name: &str, tenant: &str) -> anyhow::Result<()> {
    let mut updates = runtime.provisioner().registry().subscribe();
    let created = runtime.launch(name, tenant).await?;
    let id = created.resource_id;

    let last = loop {
        match updates.recv().await {
            Ok(status) if status.resource_id == id && status.phase.is_terminal() => break status,
            Ok(status) if status.resource_id == id => {
                info!(resource_id = id, phase = %status.phase, progress = status.progress, "{}", status.message);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {
                if let Some(status) = runtime.status(id).filter(|s| s.phase.is_terminal()) {
                    break status;
                }
            }
            Err(RecvError::Closed) => bail!("status updates closed before resource {id} finished"),
        }
    };

    print_json(&last)?;
    if last.error.is_some() {
        bail!("provisioning {name} failed");
    }
    Ok(())
}

async fn teardown(runtime: &ProvisionerRuntime, tenant: &str) -> anyhow::Result<()> {
    let report = runtime.teardown(tenant).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serializing teardown report")?
    );
    if !report.is_clean() {
        bail!("teardown of {tenant} finished with {} failures", report.failures.len());
    }
    Ok(())
}

fn print_json(status: &ProvisioningStatus) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(status).context("serializing status")?
    );
    Ok(())
}
