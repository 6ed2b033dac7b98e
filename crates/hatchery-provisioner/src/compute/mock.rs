// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock compute provider for testing.
//!
//! Simulates a backend whose resources become active after a fixed delay,
//! measured on the tokio clock so tests can run with a paused clock.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::traits::*;
use crate::secret::SecretString;

#[derive(Debug, Clone)]
struct MockResource {
    name: String,
    created_at: Instant,
}

/// Mock compute provider for testing.
pub struct MockCompute {
    next_id: AtomicU64,
    resources: Arc<Mutex<HashMap<ResourceId, MockResource>>>,
    deleted: Arc<Mutex<Vec<ResourceId>>>,
    /// Time after creation at which a resource reports active.
    pub active_after: Duration,
    /// Address reported once active.
    pub ip: Ipv4Addr,
    /// If true, `create` fails.
    pub fail_create: bool,
    /// If true, `delete` fails.
    pub fail_delete: bool,
}

impl Default for MockCompute {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompute {
    /// Create a mock whose resources are active immediately at 203.0.113.5.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(42),
            resources: Arc::new(Mutex::new(HashMap::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            active_after: Duration::ZERO,
            ip: Ipv4Addr::new(203, 0, 113, 5),
            fail_create: false,
            fail_delete: false,
        }
    }

    /// Create a mock whose resources become active after `delay`.
    pub fn active_after(delay: Duration) -> Self {
        Self {
            active_after: delay,
            ..Self::new()
        }
    }

    /// Ids passed to `delete`, in call order.
    pub async fn deleted(&self) -> Vec<ResourceId> {
        self.deleted.lock().await.clone()
    }

    /// Names of resources that currently exist.
    pub async fn live_names(&self) -> Vec<String> {
        let resources = self.resources.lock().await;
        resources.values().map(|r| r.name.clone()).collect()
    }

    /// Whether a resource still exists.
    pub async fn exists(&self, id: ResourceId) -> bool {
        self.resources.lock().await.contains_key(&id)
    }
}

#[async_trait]
impl ComputeProvider for MockCompute {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    async fn create(&self, name: &str, _secret: &SecretString) -> Result<ResourceId> {
        if self.fail_create {
            return Err(ComputeError::InvalidResponse("Mock create failure".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.resources.lock().await.insert(
            id,
            MockResource {
                name: name.to_string(),
                created_at: Instant::now(),
            },
        );
        Ok(id)
    }

    async fn get_state(&self, id: ResourceId) -> Result<ComputeState> {
        let resources = self.resources.lock().await;
        let resource = resources.get(&id).ok_or(ComputeError::NotFound(id))?;

        if resource.created_at.elapsed() >= self.active_after {
            Ok(ComputeState {
                status: CanonicalStatus::Active,
                ipv4: Some(self.ip),
            })
        } else {
            Ok(ComputeState {
                status: CanonicalStatus::Provisioning,
                ipv4: None,
            })
        }
    }

    async fn delete(&self, id: ResourceId) -> Result<()> {
        self.deleted.lock().await.push(id);
        if self.fail_delete {
            return Err(ComputeError::InvalidResponse("Mock delete failure".to_string()));
        }
        self.resources
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(ComputeError::NotFound(id))
    }
}
