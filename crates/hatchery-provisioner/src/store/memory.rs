// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory tenant record store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::*;
use crate::database::ProjectRef;
use crate::tenant::TenantInfrastructure;

#[derive(Default)]
struct Tables {
    records: HashMap<String, TenantInfrastructure>,
    project_index: HashMap<ProjectRef, String>,
}

/// Tenant record store held in process memory.
#[derive(Default)]
pub struct InMemoryTenantStore {
    tables: Mutex<Tables>,
}

impl InMemoryTenantStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.tables.lock().await.records.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.tables.lock().await.records.is_empty()
    }
}

#[async_trait]
impl TenantRecordStore for InMemoryTenantStore {
    async fn save(&self, record: &TenantInfrastructure) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables
            .project_index
            .insert(record.database_project_ref.clone(), record.tenant_id.clone());
        tables
            .records
            .insert(record.tenant_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: &str) -> Result<Option<TenantInfrastructure>> {
        Ok(self.tables.lock().await.records.get(tenant_id).cloned())
    }

    async fn delete(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.tables.lock().await.records.remove(tenant_id).is_some())
    }

    async fn delete_project_index(&self, project: &ProjectRef) -> Result<bool> {
        Ok(self
            .tables
            .lock()
            .await
            .project_index
            .remove(project)
            .is_some())
    }

    async fn find_tenant_by_project(&self, project: &ProjectRef) -> Result<Option<String>> {
        Ok(self.tables.lock().await.project_index.get(project).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::fixtures::record;

    #[tokio::test]
    async fn test_save_writes_record_and_index() {
        let store = InMemoryTenantStore::new();
        let record = record("t1");

        store.save(&record).await.unwrap();

        assert_eq!(store.get("t1").await.unwrap(), Some(record.clone()));
        assert_eq!(
            store
                .find_tenant_by_project(&record.database_project_ref)
                .await
                .unwrap()
                .as_deref(),
            Some("t1")
        );
    }

    #[tokio::test]
    async fn test_delete_reports_absence() {
        let store = InMemoryTenantStore::new();
        assert!(!store.delete("missing").await.unwrap());
        assert!(
            !store
                .delete_project_index(&ProjectRef::from("none"))
                .await
                .unwrap()
        );
    }
}
