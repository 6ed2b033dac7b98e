// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock gateway pairing for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::*;
use crate::secret::SecretString;

#[derive(Debug, Clone)]
enum Behavior {
    Reply(HandshakeOutcome),
    Hang,
    Refuse,
}

/// Mock gateway pairing for testing.
pub struct MockPairing {
    behavior: Behavior,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for MockPairing {
    fn default() -> Self {
        Self::connected()
    }
}

impl MockPairing {
    /// Handshakes succeed immediately.
    pub fn connected() -> Self {
        Self::with(Behavior::Reply(HandshakeOutcome::Connected))
    }

    /// Handshakes ask for approval of `request_id`.
    pub fn pairing_required(request_id: &str) -> Self {
        Self::with(Behavior::Reply(HandshakeOutcome::PairingRequired {
            request_id: request_id.to_string(),
        }))
    }

    /// Handshakes never answer.
    pub fn hanging() -> Self {
        Self::with(Behavior::Hang)
    }

    /// Handshakes fail to open a connection.
    pub fn refusing() -> Self {
        Self::with(Behavior::Refuse)
    }

    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// URLs handshakes were attempted against.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl GatewayPairing for MockPairing {
    async fn handshake(&self, url: &str, _token: &SecretString) -> Result<HandshakeOutcome> {
        self.calls.lock().await.push(url.to_string());
        match &self.behavior {
            Behavior::Reply(outcome) => Ok(outcome.clone()),
            Behavior::Hang => futures::future::pending().await,
            Behavior::Refuse => Err(PairingError::Connect("connection refused".to_string())),
        }
    }
}
