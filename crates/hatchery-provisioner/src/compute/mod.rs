// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute module - virtual machine backends.

pub mod cloud_init;
pub mod digitalocean;
pub mod hetzner;
pub mod mock;
mod traits;

pub use digitalocean::DigitalOceanProvider;
pub use hetzner::HetznerProvider;
pub use mock::MockCompute;
pub use traits::*;
