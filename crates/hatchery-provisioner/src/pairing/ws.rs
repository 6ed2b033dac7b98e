// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebSocket implementation of the gateway handshake.
//!
//! The gateway speaks JSON frames:
//! - `{"type":"event","event":"connect.challenge","payload":{"nonce":..}}` first
//! - the client answers with a `connect` request carrying the token
//! - the gateway replies with a `res` frame for that request id

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::traits::*;
use crate::secret::SecretString;

const CLIENT_ID: &str = "hatchery-provisioner";
const PAIRING_REQUIRED: &str = "PAIRING_REQUIRED";

/// WebSocket gateway pairing client.
pub struct WsPairing {
    connect_retry_interval: Duration,
}

impl Default for WsPairing {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl WsPairing {
    /// Create a client that retries a failed connection open every `connect_retry_interval`.
    pub fn new(connect_retry_interval: Duration) -> Self {
        Self {
            connect_retry_interval,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Inbound {
    Event {
        event: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    Res {
        id: String,
        ok: bool,
        #[serde(default)]
        error: Option<FrameError>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct FrameError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Option<ErrorDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetails {
    request_id: Option<String>,
}

#[derive(Serialize)]
struct ConnectRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    method: &'static str,
    params: ConnectParams<'a>,
}

#[derive(Serialize)]
struct ConnectParams<'a> {
    role: &'static str,
    client: ClientInfo,
    auth: ConnectAuth<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
}

#[derive(Serialize)]
struct ClientInfo {
    id: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ConnectAuth<'a> {
    token: &'a str,
}

fn outcome_for(ok: bool, error: Option<FrameError>) -> Result<HandshakeOutcome> {
    if ok {
        return Ok(HandshakeOutcome::Connected);
    }
    let error = error.unwrap_or(FrameError {
        code: "UNKNOWN".to_string(),
        message: String::new(),
        details: None,
    });
    let request_id = error.details.and_then(|d| d.request_id);
    match request_id {
        Some(request_id) if error.code == PAIRING_REQUIRED => {
            Ok(HandshakeOutcome::PairingRequired { request_id })
        }
        _ => Err(PairingError::Rejected {
            code: error.code,
            message: error.message,
        }),
    }
}

#[async_trait]
impl GatewayPairing for WsPairing {
    async fn handshake(&self, url: &str, token: &SecretString) -> Result<HandshakeOutcome> {
        let mut attempt = 0u32;
        let (mut socket, _) = loop {
            attempt += 1;
            match tokio_tungstenite::connect_async(url).await {
                Ok(opened) => break opened,
                Err(e) => {
                    warn!(url, attempt, error = %e, "Gateway connection failed, retrying");
                    tokio::time::sleep(self.connect_retry_interval).await;
                }
            }
        };
        debug!(url, attempt, "Gateway connection opened");

        let mut request_id = None;
        while let Some(frame) = socket.next().await {
            let frame = frame.map_err(|e| PairingError::Protocol(e.to_string()))?;
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let inbound: Inbound = match serde_json::from_str(&text) {
                Ok(inbound) => inbound,
                Err(e) => {
                    debug!(error = %e, "Ignoring undecodable gateway frame");
                    continue;
                }
            };

            match inbound {
                Inbound::Event { event, payload } if event == "connect.challenge" => {
                    if request_id.is_some() {
                        continue;
                    }
                    let id = uuid::Uuid::new_v4().to_string();
                    let request = ConnectRequest {
                        kind: "req",
                        id: id.clone(),
                        method: "connect",
                        params: ConnectParams {
                            role: "operator",
                            client: ClientInfo {
                                id: CLIENT_ID,
                                version: env!("CARGO_PKG_VERSION"),
                            },
                            auth: ConnectAuth {
                                token: token.expose(),
                            },
                            nonce: payload
                                .get("nonce")
                                .and_then(|n| n.as_str())
                                .map(str::to_string),
                        },
                    };
                    let body = serde_json::to_string(&request)
                        .map_err(|e| PairingError::Protocol(e.to_string()))?;
                    socket
                        .send(Message::Text(body))
                        .await
                        .map_err(|e| PairingError::Protocol(e.to_string()))?;
                    request_id = Some(id);
                }
                Inbound::Res { id, ok, error } if request_id.as_deref() == Some(id.as_str()) => {
                    let outcome = outcome_for(ok, error);
                    let _ = socket.close(None).await;
                    return outcome;
                }
                _ => {}
            }
        }

        Err(PairingError::Closed)
    }
}
