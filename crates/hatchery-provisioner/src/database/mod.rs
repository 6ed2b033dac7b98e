// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-tenant managed database projects.

pub mod mock;
pub mod sql;
pub mod supabase;
mod traits;

pub use mock::MockDatabaseProjects;
pub use supabase::{SupabaseConfig, SupabaseProjects};
pub use traits::*;
