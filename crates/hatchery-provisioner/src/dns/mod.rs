// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! DNS module - A record management for tenant subdomains.

pub mod cloudflare;
mod label;
pub mod mock;
mod traits;

pub use cloudflare::CloudflareDns;
pub use label::sanitize_label;
pub use mock::MockDns;
pub use traits::*;
