// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Agent runtime configuration file written to each tenant host.
//!
//! The file is written byte-for-byte over the remote channel and read back,
//! because the runtime's own `config set` command rewrites values it is given.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::secret::SecretString;

/// Runtime configuration directory.
pub const CONFIG_DIR: &str = "/root/.agentd";
/// Runtime configuration file.
pub const CONFIG_PATH: &str = "/root/.agentd/agentd.json";

/// Tokens generated for one tenant runtime.
#[derive(Debug, Clone)]
pub struct GatewayTokens {
    /// Authenticates operator and client connections to the gateway.
    pub auth_token: SecretString,
    /// Authenticates calls to the hook endpoint.
    pub hooks_token: SecretString,
}

impl GatewayTokens {
    /// Generate two independent random tokens.
    pub fn generate() -> Self {
        Self {
            auth_token: SecretString::generate_token(),
            hooks_token: SecretString::generate_token(),
        }
    }
}

/// On-disk runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Gateway listener.
    pub gateway: GatewaySection,
    /// Inbound hooks.
    pub hooks: HooksSection,
}

/// Gateway section of [`RuntimeConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Listen port.
    pub port: u16,
    /// Bind mode ("lan" listens on all interfaces).
    pub bind: String,
    /// Connection authentication.
    pub auth: GatewayAuth,
}

/// Token authentication for the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAuth {
    /// Always "token".
    pub mode: String,
    /// Shared token.
    pub token: SecretString,
}

/// Hooks section of [`RuntimeConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HooksSection {
    /// Whether the hook endpoint is served.
    pub enabled: bool,
    /// Hook URL path prefix.
    pub path: String,
    /// Bearer token hook callers present.
    pub token: SecretString,
}

impl RuntimeConfig {
    /// Configuration for a gateway on `port` using `tokens`.
    pub fn new(port: u16, tokens: &GatewayTokens) -> Self {
        Self {
            gateway: GatewaySection {
                port,
                bind: "lan".to_string(),
                auth: GatewayAuth {
                    mode: "token".to_string(),
                    token: tokens.auth_token.clone(),
                },
            },
            hooks: HooksSection {
                enabled: true,
                path: "/hooks".to_string(),
                token: tokens.hooks_token.clone(),
            },
        }
    }

    /// Serialized file contents.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Check that `read_back` carries exactly the tokens that were written.
    pub fn verify_round_trip(&self, read_back: &str) -> Result<()> {
        let parsed: RuntimeConfig = serde_json::from_str(read_back)?;
        if parsed.gateway.auth.token != self.gateway.auth.token
            || parsed.hooks.token != self.hooks.token
        {
            return Err(Error::TokenMismatch {
                path: CONFIG_PATH.to_string(),
            });
        }
        Ok(())
    }
}
