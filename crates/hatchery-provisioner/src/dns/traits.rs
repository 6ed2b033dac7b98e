// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! DNS provider trait definitions.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::ApiFailure;

/// Errors from DNS provider operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DnsError {
    /// Transport-level failure talking to the provider API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider API rejected the request.
    #[error("DNS API error: {0}")]
    Api(#[from] ApiFailure),

    /// The provider reported failure inside a 2xx response.
    #[error("DNS provider rejected {operation}: {message}")]
    Rejected {
        /// Operation that was rejected.
        operation: &'static str,
        /// Provider error messages.
        message: String,
    },
}

/// Result type for DNS operations.
pub type Result<T> = std::result::Result<T, DnsError>;

/// Trait for DNS backends managing one A record per tenant subdomain.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Zone apex that subdomains are created under.
    fn base_domain(&self) -> &str;

    /// Fully qualified name of a subdomain in this zone.
    fn fqdn(&self, subdomain: &str) -> String {
        format!("{}.{}", subdomain, self.base_domain())
    }

    /// Point `subdomain` at `ip`, replacing any existing A records.
    ///
    /// Returns the fully qualified domain name.
    async fn create_record(&self, subdomain: &str, ip: Ipv4Addr) -> Result<String>;

    /// Remove every A record for `subdomain`.
    async fn delete_record(&self, subdomain: &str) -> Result<()>;
}
