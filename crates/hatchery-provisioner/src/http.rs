// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared plumbing for the provider control-plane HTTP clients.

use std::time::Duration;

use thiserror::Error;

/// Default per-request timeout for control-plane calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A control-plane API answered with a non-success status.
#[derive(Debug, Clone, Error)]
#[error("HTTP {status}: {body}")]
pub struct ApiFailure {
    /// HTTP status code.
    pub status: u16,
    /// Response body (truncated).
    pub body: String,
}

/// Maximum number of response body bytes kept in an [`ApiFailure`].
const MAX_BODY_BYTES: usize = 2048;

/// Turn a non-2xx response into an [`ApiFailure`], keeping the body for the error detail.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_BODY_BYTES {
        let mut cut = MAX_BODY_BYTES;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    Err(ApiFailure {
        status: status.as_u16(),
        body,
    })
}

/// Build the shared reqwest client used by provider adapters.
pub fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("hatchery-provisioner/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
