// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gateway pairing trait definitions.

use async_trait::async_trait;
use thiserror::Error;

use crate::secret::SecretString;

/// Result of one pairing handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The gateway accepted the connection as an operator.
    Connected,
    /// The gateway wants this device approved first.
    PairingRequired {
        /// Opaque pairing request id to approve.
        request_id: String,
    },
}

/// Errors from the pairing handshake.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PairingError {
    /// The control channel could not be opened.
    #[error("Failed to open gateway connection: {0}")]
    Connect(String),

    /// The gateway closed the channel before answering.
    #[error("Gateway closed the connection before the handshake finished")]
    Closed,

    /// The gateway answered with an error other than a pairing request.
    #[error("Gateway rejected the handshake: {code}: {message}")]
    Rejected {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
    },

    /// A frame could not be encoded or decoded.
    #[error("Invalid handshake frame: {0}")]
    Protocol(String),
}

/// Result type for pairing operations.
pub type Result<T> = std::result::Result<T, PairingError>;

/// Drives the operator handshake against a tenant gateway.
///
/// One call opens at most one successful connection. Callers bound the call
/// with a timeout.
#[async_trait]
pub trait GatewayPairing: Send + Sync {
    /// Perform the handshake against `url` with the gateway auth token.
    async fn handshake(&self, url: &str, token: &SecretString) -> Result<HandshakeOutcome>;
}
