// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Remote command channel to provisioned hosts.

pub mod mock;
pub mod shell;
pub mod ssh;
mod traits;

pub use mock::{MockRemote, RecordedUpload};
pub use ssh::{SshConfig, SshExecutor};
pub use traits::*;
