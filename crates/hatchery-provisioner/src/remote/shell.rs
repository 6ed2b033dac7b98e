// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shell quoting for remote commands.

use std::borrow::Cow;

use shell_escape::unix::escape;

/// Quote a single argument for a POSIX shell.
pub fn quote(arg: &str) -> String {
    escape(Cow::Borrowed(arg)).into_owned()
}

/// Wrap `command` so it runs inside a bash login shell.
///
/// The login shell brings up the user's environment, including the
/// service manager user bus that `systemctl --user` talks to.
pub fn login_shell(command: &str) -> String {
    format!("bash -lc {}", quote(command))
}
