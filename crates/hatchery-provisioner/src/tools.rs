// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registry of tools a tenant runtime can be given access to.
//!
//! Each [`ToolDefinition`] says where the tool's upstream API lives, how the
//! relay on the tenant host authenticates to it, and which environment
//! variable carries the secret. Nothing outside this table knows about
//! individual tools.

use std::collections::HashMap;

use thiserror::Error;

use crate::remote::RemoteError;
use crate::secret::SecretString;

/// How the relay attaches a tool's secret to upstream requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// `Authorization: Bearer <secret>`.
    Bearer,
    /// The secret is spliced into the request path via a template.
    PathPrefix,
}

impl AuthStrategy {
    /// Returns the wire tag of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bearer => "bearer",
            Self::PathPrefix => "path-prefix",
        }
    }
}

/// Declarative description of a configurable tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolDefinition {
    /// Tool name, as requested by callers.
    pub name: &'static str,
    /// Upstream API base URL.
    pub upstream: &'static str,
    /// Authentication strategy.
    pub auth: AuthStrategy,
    /// Environment variable holding the secret.
    pub secret_env: &'static str,
    /// Path template for [`AuthStrategy::PathPrefix`]; `{secret}` is substituted by the relay.
    pub path_template: Option<&'static str>,
}

/// All known tools, sorted by name.
pub static REGISTRY: &[ToolDefinition] = &[
    ToolDefinition {
        name: "brave-search",
        upstream: "https://api.search.brave.com/res/v1",
        auth: AuthStrategy::Bearer,
        secret_env: "BRAVE_API_KEY",
        path_template: None,
    },
    ToolDefinition {
        name: "github",
        upstream: "https://api.github.com",
        auth: AuthStrategy::Bearer,
        secret_env: "GITHUB_TOKEN",
        path_template: None,
    },
    ToolDefinition {
        name: "linear",
        upstream: "https://api.linear.app",
        auth: AuthStrategy::Bearer,
        secret_env: "LINEAR_API_KEY",
        path_template: None,
    },
    ToolDefinition {
        name: "openai",
        upstream: "https://api.openai.com/v1",
        auth: AuthStrategy::Bearer,
        secret_env: "OPENAI_API_KEY",
        path_template: None,
    },
    ToolDefinition {
        name: "telegram",
        upstream: "https://api.telegram.org",
        auth: AuthStrategy::PathPrefix,
        secret_env: "TELEGRAM_BOT_TOKEN",
        path_template: Some("/bot{secret}"),
    },
];

/// Look up a tool by name.
pub fn lookup(name: &str) -> Option<&'static ToolDefinition> {
    REGISTRY.iter().find(|t| t.name == name)
}

/// Errors from tool configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// The name is not in [`REGISTRY`].
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The tool's secret is not available.
    #[error("Secret {env} for tool {tool} is not set")]
    MissingSecret {
        /// Tool name.
        tool: &'static str,
        /// Environment variable that should carry the secret.
        env: &'static str,
    },

    /// A bundle file could not be serialized.
    #[error("Failed to render tool bundle: {0}")]
    Render(#[from] serde_json::Error),

    /// Uploading the bundle or restarting the relay failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Tool secrets available to the provisioner, keyed by environment variable.
#[derive(Clone, Default)]
pub struct ToolSecrets {
    values: HashMap<&'static str, SecretString>,
}

impl std::fmt::Debug for ToolSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("ToolSecrets").field("set", &keys).finish()
    }
}

impl ToolSecrets {
    /// Read every registry secret present in the process environment.
    pub fn from_env() -> Self {
        let values = REGISTRY
            .iter()
            .filter_map(|tool| {
                std::env::var(tool.secret_env)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(|v| (tool.secret_env, SecretString::new(v)))
            })
            .collect();
        Self { values }
    }

    /// Build from explicit `(env, value)` pairs; names outside the registry are ignored.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = pairs
            .into_iter()
            .filter_map(|(env, value)| {
                REGISTRY
                    .iter()
                    .find(|t| t.secret_env == env)
                    .map(|t| (t.secret_env, SecretString::new(value)))
            })
            .collect();
        Self { values }
    }

    /// Secret for a tool.
    pub fn resolve(&self, tool: &ToolDefinition) -> Result<&SecretString, ToolError> {
        self.values
            .get(tool.secret_env)
            .ok_or(ToolError::MissingSecret {
                tool: tool.name,
                env: tool.secret_env,
            })
    }
}
