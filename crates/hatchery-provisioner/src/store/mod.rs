// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable storage for tenant infrastructure records.

pub mod memory;
pub mod postgres;
mod traits;

pub use memory::InMemoryTenantStore;
pub use postgres::PostgresTenantStore;
pub use traits::*;
