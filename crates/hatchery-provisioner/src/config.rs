// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the provisioner, loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::compute::{digitalocean, hetzner};
use crate::database::supabase::{self, SupabaseConfig};
use crate::dns::cloudflare::{self, CloudflareConfig};
use crate::nginx::TlsFiles;
use crate::poll::{PollPolicy, RetryPolicy};
use crate::remote::ReadinessPolicies;
use crate::secret::SecretString;

/// Compute backend selection.
#[derive(Debug, Clone)]
pub enum ComputeBackend {
    /// Hetzner Cloud.
    Hetzner(hetzner::HetznerConfig),
    /// DigitalOcean.
    DigitalOcean(digitalocean::DigitalOceanConfig),
}

/// Poll intervals, deadlines and retry policies of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionTimings {
    /// Waiting for the compute resource to report active with an address.
    pub compute_active: PollPolicy,
    /// Waiting for the database project to become healthy.
    pub database_active: PollPolicy,
    /// Remote port and credential readiness.
    pub readiness: ReadinessPolicies,
    /// Retry policy for remote connection failures.
    pub command_retry: RetryPolicy,
    /// Runtime health gate.
    pub verify: PollPolicy,
    /// Budget for the whole pairing handshake.
    pub pairing_timeout: Duration,
    /// Delay between pairing connection attempts.
    pub pairing_retry: Duration,
}

impl Default for ProvisionTimings {
    fn default() -> Self {
        Self {
            compute_active: PollPolicy::from_secs(5, 300),
            database_active: PollPolicy::from_secs(5, 300),
            readiness: ReadinessPolicies::default(),
            command_retry: RetryPolicy::default(),
            verify: PollPolicy::from_secs(2, 30),
            pairing_timeout: Duration::from_secs(25),
            pairing_retry: Duration::from_secs(2),
        }
    }
}

impl ProvisionTimings {
    /// The timings the orchestrator applies itself. The others belong to the
    /// collaborators built from this config.
    pub fn run(&self) -> RunTimings {
        RunTimings {
            compute_active: self.compute_active,
            verify: self.verify,
            pairing_timeout: self.pairing_timeout,
        }
    }
}

/// Waits driven by the orchestrator run rather than by a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTimings {
    /// Waiting for the compute resource to report active with an address.
    pub compute_active: PollPolicy,
    /// Runtime health gate.
    pub verify: PollPolicy,
    /// Budget for the whole pairing handshake.
    pub pairing_timeout: Duration,
}

impl Default for RunTimings {
    fn default() -> Self {
        ProvisionTimings::default().run()
    }
}

/// Provisioner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Tenant record store database. In-memory store when absent.
    pub database_url: Option<String>,
    /// Compute backend.
    pub compute: ComputeBackend,
    /// DNS backend. The DNS phase is skipped when absent.
    pub dns: Option<CloudflareConfig>,
    /// Database project backend.
    pub database_projects: SupabaseConfig,
    /// Wildcard certificate pair. TLS is disabled when absent.
    pub tls: Option<TlsFiles>,
    /// Runtime gateway port on tenant hosts.
    pub gateway_port: u16,
    /// Tool relay port on tenant hosts.
    pub relay_port: u16,
    /// Tools configured for every new tenant.
    pub default_tools: Vec<String>,
    /// Pending provisioning jobs accepted before `submit` fails.
    pub queue_capacity: usize,
    /// Provisioning runs executing at once.
    pub max_concurrent_runs: usize,
    /// Poll and retry timings.
    pub timings: ProvisionTimings,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = optional("HATCHERY_DATABASE_URL");

        let compute = match optional("HATCHERY_COMPUTE_PROVIDER").as_deref() {
            None | Some("hetzner") => ComputeBackend::Hetzner(hetzner::HetznerConfig {
                api_token: secret("HETZNER_API_TOKEN")?,
                api_url: or_default("HATCHERY_HETZNER_API_URL", hetzner::DEFAULT_API_URL),
                server_type: or_default("HATCHERY_HETZNER_SERVER_TYPE", "cx22"),
                location: or_default("HATCHERY_HETZNER_LOCATION", "fsn1"),
                image: or_default("HATCHERY_HETZNER_IMAGE", "ubuntu-24.04"),
            }),
            Some("digitalocean") => ComputeBackend::DigitalOcean(digitalocean::DigitalOceanConfig {
                api_token: secret("DIGITALOCEAN_API_TOKEN")?,
                api_url: or_default("HATCHERY_DIGITALOCEAN_API_URL", digitalocean::DEFAULT_API_URL),
                region: or_default("HATCHERY_DIGITALOCEAN_REGION", "fra1"),
                size: or_default("HATCHERY_DIGITALOCEAN_SIZE", "s-2vcpu-4gb"),
                image: or_default("HATCHERY_DIGITALOCEAN_IMAGE", "ubuntu-24-04-x64"),
            }),
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "HATCHERY_COMPUTE_PROVIDER",
                    "expected hetzner or digitalocean",
                ));
            }
        };

        let dns = match (
            optional("CLOUDFLARE_API_TOKEN"),
            optional("CLOUDFLARE_ZONE_ID"),
            optional("HATCHERY_BASE_DOMAIN"),
        ) {
            (Some(token), Some(zone_id), Some(base_domain)) => Some(CloudflareConfig {
                api_token: SecretString::new(token),
                api_url: or_default("HATCHERY_CLOUDFLARE_API_URL", cloudflare::DEFAULT_API_URL),
                zone_id,
                base_domain,
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "CLOUDFLARE_API_TOKEN",
                    "CLOUDFLARE_API_TOKEN, CLOUDFLARE_ZONE_ID and HATCHERY_BASE_DOMAIN must be set together",
                ));
            }
        };

        let timings = ProvisionTimings::default();

        let database_projects = SupabaseConfig {
            access_token: secret("SUPABASE_ACCESS_TOKEN")?,
            api_url: or_default("HATCHERY_SUPABASE_API_URL", supabase::DEFAULT_API_URL),
            organization_id: required("SUPABASE_ORGANIZATION_ID")?,
            region: or_default("HATCHERY_SUPABASE_REGION", "eu-central-1"),
            activation: timings.database_active,
        };

        let tls = if flag("HATCHERY_TLS_ENABLED") {
            if dns.is_none() {
                return Err(ConfigError::Invalid(
                    "HATCHERY_TLS_ENABLED",
                    "TLS requires DNS configuration",
                ));
            }
            Some(TlsFiles {
                cert_path: PathBuf::from(required("HATCHERY_TLS_CERT_PATH")?),
                key_path: PathBuf::from(required("HATCHERY_TLS_KEY_PATH")?),
            })
        } else {
            None
        };

        let default_tools = optional("HATCHERY_DEFAULT_TOOLS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let queue_capacity = parse_or("HATCHERY_QUEUE_CAPACITY", 64usize, "expected a positive integer")?;
        let max_concurrent_runs =
            parse_or("HATCHERY_MAX_CONCURRENT_RUNS", 8usize, "expected a positive integer")?;
        if queue_capacity == 0 {
            return Err(ConfigError::Invalid("HATCHERY_QUEUE_CAPACITY", "must be at least 1"));
        }
        if max_concurrent_runs == 0 {
            return Err(ConfigError::Invalid("HATCHERY_MAX_CONCURRENT_RUNS", "must be at least 1"));
        }

        Ok(Self {
            database_url,
            compute,
            dns,
            database_projects,
            tls,
            gateway_port: parse_or("HATCHERY_GATEWAY_PORT", 18789u16, "expected a port number")?,
            relay_port: parse_or("HATCHERY_RELAY_PORT", 18790u16, "expected a port number")?,
            default_tools,
            queue_capacity,
            max_concurrent_runs,
            timings,
        })
    }

    /// Whether tenant gateways are put behind TLS.
    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::MissingEnvVar(var))
}

fn secret(var: &'static str) -> Result<SecretString, ConfigError> {
    required(var).map(SecretString::new)
}

fn or_default(var: &str, default: &str) -> String {
    optional(var).unwrap_or_else(|| default.to_string())
}

fn flag(var: &str) -> bool {
    optional(var).is_some_and(|v| v == "true" || v == "1")
}

fn parse_or<T: FromStr>(var: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError> {
    match optional(var) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid(var, expected)),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// An environment variable has an unusable value.
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "HATCHERY_DATABASE_URL",
        "HATCHERY_COMPUTE_PROVIDER",
        "HETZNER_API_TOKEN",
        "DIGITALOCEAN_API_TOKEN",
        "CLOUDFLARE_API_TOKEN",
        "CLOUDFLARE_ZONE_ID",
        "HATCHERY_BASE_DOMAIN",
        "SUPABASE_ACCESS_TOKEN",
        "SUPABASE_ORGANIZATION_ID",
        "HATCHERY_TLS_ENABLED",
        "HATCHERY_TLS_CERT_PATH",
        "HATCHERY_TLS_KEY_PATH",
        "HATCHERY_DEFAULT_TOOLS",
        "HATCHERY_QUEUE_CAPACITY",
        "HATCHERY_GATEWAY_PORT",
    ];

    /// Sets env vars for a test and restores them after.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        /// Start from a clean slate with the minimal required variables.
        fn minimal() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for var in VARS {
                guard.remove(var);
            }
            guard.set("HETZNER_API_TOKEN", "hz");
            guard.set("SUPABASE_ACCESS_TOKEN", "sb");
            guard.set("SUPABASE_ORGANIZATION_ID", "org1");
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_run_timings_keep_orchestrator_waits() {
        let timings = ProvisionTimings {
            compute_active: PollPolicy::from_secs(1, 10),
            verify: PollPolicy::from_secs(1, 3),
            pairing_timeout: Duration::from_secs(4),
            ..ProvisionTimings::default()
        };

        let run = timings.run();

        assert_eq!(run.compute_active, PollPolicy::from_secs(1, 10));
        assert_eq!(run.verify, PollPolicy::from_secs(1, 3));
        assert_eq!(run.pairing_timeout, Duration::from_secs(4));
        assert_eq!(RunTimings::default(), ProvisionTimings::default().run());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::minimal();

        let config = Config::from_env().unwrap();

        assert!(matches!(config.compute, ComputeBackend::Hetzner(_)));
        assert!(config.dns.is_none());
        assert!(!config.tls_enabled());
        assert!(config.database_url.is_none());
        assert_eq!(config.gateway_port, 18789);
        assert_eq!(config.relay_port, 18790);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.timings.verify, PollPolicy::from_secs(2, 30));
    }

    #[test]
    fn test_missing_compute_token() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::minimal();
        guard.set("HATCHERY_COMPUTE_PROVIDER", "digitalocean");

        let err = Config::from_env().unwrap_err();

        assert!(matches!(err, ConfigError::MissingEnvVar("DIGITALOCEAN_API_TOKEN")));
    }

    #[test]
    fn test_unknown_compute_provider() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::minimal();
        guard.set("HATCHERY_COMPUTE_PROVIDER", "linode");

        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("HATCHERY_COMPUTE_PROVIDER", _)
        ));
    }

    #[test]
    fn test_partial_dns_config_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::minimal();
        guard.set("CLOUDFLARE_API_TOKEN", "cf");

        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("CLOUDFLARE_API_TOKEN", _)
        ));
    }

    #[test]
    fn test_tls_requires_dns() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::minimal();
        guard.set("HATCHERY_TLS_ENABLED", "true");
        guard.set("HATCHERY_TLS_CERT_PATH", "/etc/ssl/cert.pem");
        guard.set("HATCHERY_TLS_KEY_PATH", "/etc/ssl/key.pem");

        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("HATCHERY_TLS_ENABLED", _)
        ));
    }

    #[test]
    fn test_tls_requires_certificate_paths() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::minimal();
        guard.set("CLOUDFLARE_API_TOKEN", "cf");
        guard.set("CLOUDFLARE_ZONE_ID", "zone1");
        guard.set("HATCHERY_BASE_DOMAIN", "agents.example.com");
        guard.set("HATCHERY_TLS_ENABLED", "1");
        guard.set("HATCHERY_TLS_CERT_PATH", "/etc/ssl/cert.pem");

        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::MissingEnvVar("HATCHERY_TLS_KEY_PATH")
        ));
    }

    #[test]
    fn test_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::minimal();
        guard.set("CLOUDFLARE_API_TOKEN", "cf");
        guard.set("CLOUDFLARE_ZONE_ID", "zone1");
        guard.set("HATCHERY_BASE_DOMAIN", "agents.example.com");
        guard.set("HATCHERY_TLS_ENABLED", "true");
        guard.set("HATCHERY_TLS_CERT_PATH", "/etc/ssl/cert.pem");
        guard.set("HATCHERY_TLS_KEY_PATH", "/etc/ssl/key.pem");
        guard.set("HATCHERY_DEFAULT_TOOLS", "github, linear,,");
        guard.set("HATCHERY_DATABASE_URL", "postgres://localhost/hatchery");

        let config = Config::from_env().unwrap();

        assert!(config.tls_enabled());
        assert_eq!(config.dns.unwrap().base_domain, "agents.example.com");
        assert_eq!(config.default_tools, vec!["github", "linear"]);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/hatchery"));
    }

    #[test]
    fn test_invalid_numbers() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::minimal();
        guard.set("HATCHERY_GATEWAY_PORT", "99999");

        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("HATCHERY_GATEWAY_PORT", _)
        ));

        guard.set("HATCHERY_GATEWAY_PORT", "18789");
        guard.set("HATCHERY_QUEUE_CAPACITY", "0");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("HATCHERY_QUEUE_CAPACITY", _)
        ));
    }
}
