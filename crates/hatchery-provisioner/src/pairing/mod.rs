// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operator pairing with a freshly configured tenant gateway.

pub mod mock;
mod traits;
pub mod ws;

pub use mock::MockPairing;
pub use traits::*;
pub use ws::WsPairing;
