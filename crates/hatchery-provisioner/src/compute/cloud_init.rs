// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cloud-init user data sent with a create request.
//!
//! The document is serialized as JSON, which cloud-init accepts because JSON
//! is a subset of YAML.

use serde::Serialize;

use crate::secret::SecretString;

/// Packages the bring-up sequence relies on.
const PACKAGES: &[&str] = &["nginx", "ufw"];

#[derive(Serialize)]
struct CloudConfig<'a> {
    ssh_pwauth: bool,
    chpasswd: ChPasswd<'a>,
    package_update: bool,
    packages: &'a [&'a str],
}

#[derive(Serialize)]
struct ChPasswd<'a> {
    expire: bool,
    users: Vec<ChPasswdUser<'a>>,
}

#[derive(Serialize)]
struct ChPasswdUser<'a> {
    name: &'a str,
    password: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

/// Render `#cloud-config` user data that sets the root password to `secret`.
pub fn user_data(secret: &SecretString) -> Result<String, serde_json::Error> {
    let config = CloudConfig {
        ssh_pwauth: true,
        chpasswd: ChPasswd {
            expire: false,
            users: vec![ChPasswdUser {
                name: "root",
                password: secret.expose(),
                kind: "text",
            }],
        },
        package_update: true,
        packages: PACKAGES,
    };

    Ok(format!("#cloud-config\n{}\n", serde_json::to_string(&config)?))
}
