// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock DNS provider for testing.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::*;

/// Mock DNS provider for testing.
pub struct MockDns {
    records: Arc<Mutex<HashMap<String, Ipv4Addr>>>,
    deletes: Arc<Mutex<Vec<String>>>,
    base_domain: String,
    /// If true, `create_record` fails.
    pub fail_create: bool,
}

impl Default for MockDns {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDns {
    /// Create a mock serving `agents.example.com`.
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            deletes: Arc::new(Mutex::new(Vec::new())),
            base_domain: "agents.example.com".to_string(),
            fail_create: false,
        }
    }

    /// Create a mock whose `create_record` always fails.
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::new()
        }
    }

    /// Current record for a subdomain.
    pub async fn record(&self, subdomain: &str) -> Option<Ipv4Addr> {
        self.records.lock().await.get(subdomain).copied()
    }

    /// Subdomains passed to `delete_record`, in call order.
    pub async fn deletes(&self) -> Vec<String> {
        self.deletes.lock().await.clone()
    }
}

#[async_trait]
impl DnsProvider for MockDns {
    fn base_domain(&self) -> &str {
        &self.base_domain
    }

    async fn create_record(&self, subdomain: &str, ip: Ipv4Addr) -> Result<String> {
        if self.fail_create {
            return Err(DnsError::Rejected {
                operation: "create",
                message: "Mock DNS failure".to_string(),
            });
        }
        self.records.lock().await.insert(subdomain.to_string(), ip);
        Ok(self.fqdn(subdomain))
    }

    async fn delete_record(&self, subdomain: &str) -> Result<()> {
        self.deletes.lock().await.push(subdomain.to_string());
        self.records.lock().await.remove(subdomain);
        Ok(())
    }
}
