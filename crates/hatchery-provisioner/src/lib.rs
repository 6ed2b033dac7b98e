// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hatchery Provisioner - Per-Tenant Infrastructure Bring-Up
//!
//! This crate provisions the infrastructure behind one tenant: a compute
//! resource running the agent runtime, an optional DNS record and TLS proxy,
//! and a managed database project, then persists a tenant record. A failed
//! run deletes what it created.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  ProvisionerRuntime (launch / status)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ ProvisionQueue
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Provisioner (phase state machine)                    │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐            │
//! │  │  Compute  │  │    DNS    │  │  Remote   │  │ Database  │            │
//! │  │ Provider  │  │ Provider  │  │ Executor  │  │ Projects  │            │
//! │  └───────────┘  └───────────┘  └───────────┘  └───────────┘            │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                 │              │                 │
//!           ▼                 ▼              ▼                 ▼
//!   Hetzner / DigitalOcean  Cloudflare   SSH to host   Supabase management
//!                                            │
//!                                            ▼
//!                          agent runtime, tool relay, nginx
//! ```
//!
//! # Phases
//!
//! ```text
//! CREATING → WAITING_ACTIVE → WAITING_SSH → CONFIGURING → DNS → VERIFYING
//!          → [NGINX] → COMPLETE
//!
//! any phase → FAILED (after rollback)
//! ```
//!
//! | Phase | Progress | Work |
//! |-------|----------|------|
//! | `CREATING` | 0.0 | Compute resource created with a generated secret |
//! | `WAITING_ACTIVE` | 0.1 | Compute active with an IPv4; database project healthy (concurrently) |
//! | `WAITING_SSH` | 0.25 | Port reachable, then credential accepted |
//! | `CONFIGURING` | 0.45 | Runtime config, tool bundle, user services |
//! | `DNS` | 0.65 | A record for the sanitized name |
//! | `VERIFYING` | 0.8 | Runtime health, database hook trigger |
//! | `NGINX` | 0.9 | TLS proxy and firewall (TLS deployments only) |
//! | `COMPLETE` | 1.0 | Tenant record saved |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `HATCHERY_COMPUTE_PROVIDER` | No | `hetzner` | `hetzner` or `digitalocean` |
//! | `HETZNER_API_TOKEN` / `DIGITALOCEAN_API_TOKEN` | Yes | - | Compute API token |
//! | `CLOUDFLARE_API_TOKEN`, `CLOUDFLARE_ZONE_ID`, `HATCHERY_BASE_DOMAIN` | No | - | DNS, all or none |
//! | `SUPABASE_ACCESS_TOKEN`, `SUPABASE_ORGANIZATION_ID` | Yes | - | Database projects |
//! | `HATCHERY_DATABASE_URL` | No | - | Record store; in-memory when unset |
//! | `HATCHERY_TLS_ENABLED` | No | `false` | Needs DNS and both certificate paths |
//! | `HATCHERY_DEFAULT_TOOLS` | No | - | Comma-separated tool names |
//!
//! # Modules
//!
//! - [`orchestrator`]: The provisioning state machine
//! - [`teardown`]: Tenant teardown
//! - [`queue`]: Bounded work queue and worker
//! - [`runtime`]: Embeddable runtime
//! - [`compute`], [`dns`], [`database`], [`remote`], [`pairing`]: Collaborators
//! - [`configurator`], [`tools`]: Tool bundle rendering and upload
//! - [`status`]: In-memory status registry
//! - [`store`]: Tenant record persistence

#![deny(missing_docs)]

/// Database migrations for the tenant record store.
pub mod migrations;

/// Configuration loaded from environment variables.
pub mod config;

/// Error types for provisioner operations.
pub mod error;

/// Redacted, zeroizing secret strings.
pub mod secret;

/// Deadline-bounded polling and bounded retry.
pub mod poll;

/// Shared HTTP client helpers for provider APIs.
pub mod http;

/// Compute providers (Hetzner, DigitalOcean).
pub mod compute;

/// DNS providers (Cloudflare).
pub mod dns;

/// Managed database projects (Supabase).
pub mod database;

/// Remote command execution on provisioned hosts.
pub mod remote;

/// Operator pairing with a freshly provisioned gateway.
pub mod pairing;

/// Tool registry and tool secrets.
pub mod tools;

/// Tool bundle rendering and upload.
pub mod configurator;

/// Agent runtime configuration file.
pub mod runtime_config;

/// Reverse proxy and firewall setup for TLS deployments.
pub mod nginx;

/// Provisioning status registry.
pub mod status;

/// Tenant infrastructure records.
pub mod tenant;

/// Tenant record stores.
pub mod store;

/// The provisioning orchestrator.
pub mod orchestrator;

/// Tenant teardown.
pub mod teardown;

/// Provisioning work queue.
pub mod queue;

/// Embeddable runtime.
pub mod runtime;

pub use config::Config;
pub use error::Error;
pub use orchestrator::Provisioner;
pub use runtime::ProvisionerRuntime;
