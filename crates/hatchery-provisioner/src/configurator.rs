// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Credential and tooling bundle for the tenant host's tool relay.
//!
//! The bundle is three files, each uploaded in one write:
//! - `tools.env`: `KEY=VALUE` secret lines, mode 0600
//! - `routes.json`: `{ "<tool>": { "upstream": url, "auth": { "type": ... } } }`
//! - `mcporter.json`: `{ "tools": { "<tool>": { "url": relay_url } } }`
//!
//! [`ToolConfigurator::configure`] always takes the full desired tool set, so
//! running it twice with the same set leaves byte-identical files behind.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::remote::RemoteExecutor;
use crate::remote::shell::quote;
use crate::secret::SecretString;
use crate::tools::{AuthStrategy, ToolDefinition, ToolError, ToolSecrets, lookup};

/// Directory holding the relay's env file and routing table.
pub const RELAY_CONFIG_DIR: &str = "/root/.config/hatchery";
/// Relay environment file.
pub const ENV_FILE_PATH: &str = "/root/.config/hatchery/tools.env";
/// Relay routing table.
pub const ROUTES_PATH: &str = "/root/.config/hatchery/routes.json";
/// Directory holding the client catalog.
pub const CLIENT_CONFIG_DIR: &str = "/root/.mcporter";
/// Client catalog read by the agent runtime.
pub const CLIENT_CONFIG_PATH: &str = "/root/.mcporter/mcporter.json";
/// User unit directory for the relay service.
pub const USER_UNIT_DIR: &str = "/root/.config/systemd/user";
/// Relay service unit name.
pub const RELAY_UNIT: &str = "tool-relay.service";

/// When the configurator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUp {
    /// First configuration of a fresh host; the relay unit may not exist yet.
    Initial,
    /// Reconfiguring a running host.
    Reconfigure,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum RouteAuth<'a> {
    Bearer { env: &'a str },
    PathPrefix { env: &'a str, template: &'a str },
}

#[derive(Debug, Serialize)]
struct Route<'a> {
    upstream: &'a str,
    auth: RouteAuth<'a>,
}

#[derive(Debug, Serialize)]
struct ClientEntry {
    url: String,
}

#[derive(Debug, Serialize)]
struct ClientCatalog {
    tools: BTreeMap<&'static str, ClientEntry>,
}

/// Rendered bundle contents.
#[derive(Clone, PartialEq, Eq)]
pub struct ToolBundle {
    /// Canonical (sorted, deduplicated) tool names.
    pub tools: Vec<String>,
    /// `tools.env` contents.
    pub env_file: Vec<u8>,
    /// `routes.json` contents.
    pub routes_json: Vec<u8>,
    /// `mcporter.json` contents.
    pub client_json: Vec<u8>,
}

impl std::fmt::Debug for ToolBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBundle")
            .field("tools", &self.tools)
            .field("env_file", &"[redacted]")
            .field("routes_json", &String::from_utf8_lossy(&self.routes_json))
            .field("client_json", &String::from_utf8_lossy(&self.client_json))
            .finish()
    }
}

/// Renders and installs tool bundles.
pub struct ToolConfigurator {
    remote: Arc<dyn RemoteExecutor>,
    secrets: ToolSecrets,
    relay_port: u16,
}

impl ToolConfigurator {
    /// Create a configurator.
    pub fn new(remote: Arc<dyn RemoteExecutor>, secrets: ToolSecrets, relay_port: u16) -> Self {
        Self {
            remote,
            secrets,
            relay_port,
        }
    }

    /// Resolve names against the registry, sorted and deduplicated.
    ///
    /// Any unknown name rejects the whole set.
    pub fn resolve(names: &[String]) -> Result<Vec<&'static ToolDefinition>, ToolError> {
        let mut tools = names
            .iter()
            .map(|name| lookup(name).ok_or_else(|| ToolError::UnknownTool(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        tools.sort_by_key(|t| t.name);
        tools.dedup_by_key(|t| t.name);
        Ok(tools)
    }

    /// Render the bundle for the full desired tool set.
    pub fn render(&self, names: &[String]) -> Result<ToolBundle, ToolError> {
        let tools = Self::resolve(names)?;

        let mut env_file = String::new();
        let mut routes = BTreeMap::new();
        let mut catalog = ClientCatalog {
            tools: BTreeMap::new(),
        };

        for tool in &tools {
            let secret = self.secrets.resolve(tool)?;
            env_file.push_str(tool.secret_env);
            env_file.push('=');
            env_file.push_str(secret.expose());
            env_file.push('\n');

            let auth = match (tool.auth, tool.path_template) {
                (AuthStrategy::PathPrefix, Some(template)) => RouteAuth::PathPrefix {
                    env: tool.secret_env,
                    template,
                },
                _ => RouteAuth::Bearer {
                    env: tool.secret_env,
                },
            };
            routes.insert(
                tool.name,
                Route {
                    upstream: tool.upstream,
                    auth,
                },
            );
            catalog.tools.insert(
                tool.name,
                ClientEntry {
                    url: format!("http://127.0.0.1:{}/{}", self.relay_port, tool.name),
                },
            );
        }

        let mut routes_json = serde_json::to_vec_pretty(&routes)?;
        routes_json.push(b'\n');
        let mut client_json = serde_json::to_vec_pretty(&catalog)?;
        client_json.push(b'\n');

        Ok(ToolBundle {
            tools: tools.iter().map(|t| t.name.to_string()).collect(),
            env_file: env_file.into_bytes(),
            routes_json,
            client_json,
        })
    }

    /// Upload the bundle for `names` to the host and restart the relay.
    ///
    /// During [`BringUp::Initial`] a relay unit that does not exist yet is
    /// not an error.
    pub async fn configure(
        &self,
        ip: Ipv4Addr,
        secret: &SecretString,
        names: &[String],
        bring_up: BringUp,
    ) -> Result<ToolBundle, ToolError> {
        let bundle = self.render(names)?;

        self.remote
            .run(
                ip,
                secret,
                &format!(
                    "mkdir -p {} {}",
                    quote(RELAY_CONFIG_DIR),
                    quote(CLIENT_CONFIG_DIR)
                ),
            )
            .await?;
        self.remote
            .upload(ip, secret, ENV_FILE_PATH, &bundle.env_file, 0o600)
            .await?;
        self.remote
            .upload(ip, secret, ROUTES_PATH, &bundle.routes_json, 0o644)
            .await?;
        self.remote
            .upload(ip, secret, CLIENT_CONFIG_PATH, &bundle.client_json, 0o644)
            .await?;

        match self
            .remote
            .run(ip, secret, &format!("systemctl --user restart {RELAY_UNIT}"))
            .await
        {
            Ok(_) => {}
            Err(e) if bring_up == BringUp::Initial && e.is_not_found() => {
                debug!(ip = %ip, "Relay unit not installed yet, skipping restart");
            }
            Err(e) => return Err(e.into()),
        }

        info!(ip = %ip, tools = ?bundle.tools, "Tool bundle installed");
        Ok(bundle)
    }
}

/// User unit for the tool relay.
pub fn relay_unit(relay_port: u16) -> String {
    format!(
        "[Unit]
Description=Hatchery tool relay
After=network-online.target

[Service]
EnvironmentFile={ENV_FILE_PATH}
ExecStart=/usr/local/bin/tool-relay --listen 127.0.0.1:{relay_port} --routes {ROUTES_PATH}
Restart=always
RestartSec=2

[Install]
WantedBy=default.target
"
    )
}
