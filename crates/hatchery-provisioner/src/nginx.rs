// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! TLS-terminating reverse proxy and firewall on the tenant host.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use tracing::info;

use crate::error::Result;
use crate::remote::RemoteExecutor;
use crate::remote::shell::quote;
use crate::secret::SecretString;

/// Site file managed by the provisioner.
pub const SITE_PATH: &str = "/etc/nginx/sites-available/hatchery";
/// Remote directory for the wildcard certificate.
pub const CERT_DIR: &str = "/etc/ssl/hatchery";
/// Remote certificate chain path.
pub const CERT_PATH: &str = "/etc/ssl/hatchery/fullchain.pem";
/// Remote private key path.
pub const KEY_PATH: &str = "/etc/ssl/hatchery/privkey.pem";

/// Firewall rules, applied in order. SSH is allowed before the firewall is enabled.
pub const FIREWALL_COMMANDS: &[&str] = &[
    "ufw allow 22/tcp",
    "ufw allow 80/tcp",
    "ufw allow 443/tcp",
    "ufw --force enable",
];

/// Local paths of the pre-issued wildcard certificate pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM private key.
    pub key_path: PathBuf,
}

const PROXY_BLOCK: &str = "
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection \"upgrade\";
        proxy_set_header Host $host;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_read_timeout 3600s;";

/// Plain HTTP site proxying to the gateway.
pub fn http_site(fqdn: &str, gateway_port: u16) -> String {
    format!(
        "server {{
    listen 80;
    server_name {fqdn};

    location / {{
        proxy_pass http://127.0.0.1:{gateway_port};{PROXY_BLOCK}
    }}
}}
"
    )
}

/// HTTPS site proxying to the gateway, with port 80 redirecting to it.
pub fn https_site(fqdn: &str, gateway_port: u16) -> String {
    format!(
        "server {{
    listen 80;
    server_name {fqdn};
    return 301 https://$host$request_uri;
}}

server {{
    listen 443 ssl;
    server_name {fqdn};

    ssl_certificate {CERT_PATH};
    ssl_certificate_key {KEY_PATH};
    ssl_protocols TLSv1.2 TLSv1.3;

    location / {{
        proxy_pass http://127.0.0.1:{gateway_port};{PROXY_BLOCK}
    }}
}}
"
    )
}

async fn reload(remote: &dyn RemoteExecutor, ip: Ipv4Addr, secret: &SecretString) -> Result<()> {
    remote
        .run(ip, secret, "nginx -t && systemctl reload nginx")
        .await?;
    Ok(())
}

/// Put the reverse proxy with TLS in front of the gateway and lock down the firewall.
pub async fn install(
    remote: &dyn RemoteExecutor,
    ip: Ipv4Addr,
    secret: &SecretString,
    fqdn: &str,
    gateway_port: u16,
    tls: &TlsFiles,
) -> Result<()> {
    let cert = tokio::fs::read(&tls.cert_path).await?;
    let key = tokio::fs::read(&tls.key_path).await?;

    remote
        .upload(ip, secret, SITE_PATH, http_site(fqdn, gateway_port).as_bytes(), 0o644)
        .await?;
    remote
        .run(
            ip,
            secret,
            &format!(
                "ln -sf {} /etc/nginx/sites-enabled/hatchery && rm -f /etc/nginx/sites-enabled/default",
                quote(SITE_PATH)
            ),
        )
        .await?;
    reload(remote, ip, secret).await?;

    remote
        .run(ip, secret, &format!("mkdir -p {}", quote(CERT_DIR)))
        .await?;
    remote.upload(ip, secret, CERT_PATH, &cert, 0o644).await?;
    remote.upload(ip, secret, KEY_PATH, &key, 0o600).await?;

    remote
        .upload(ip, secret, SITE_PATH, https_site(fqdn, gateway_port).as_bytes(), 0o644)
        .await?;
    reload(remote, ip, secret).await?;

    for command in FIREWALL_COMMANDS {
        remote.run(ip, secret, command).await?;
    }

    info!(ip = %ip, fqdn, "Reverse proxy and firewall configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;

    const IP: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);

    fn tls_files(dir: &tempfile::TempDir) -> TlsFiles {
        let cert_path = dir.path().join("fullchain.pem");
        let key_path = dir.path().join("privkey.pem");
        std::fs::write(&cert_path, "CERT").unwrap();
        std::fs::write(&key_path, "KEY").unwrap();
        TlsFiles {
            cert_path,
            key_path,
        }
    }

    #[test]
    fn test_https_site_redirects_and_proxies_websockets() {
        let site = https_site("alice.agents.example.com", 18789);
        assert!(site.contains("return 301 https://$host$request_uri;"));
        assert!(site.contains("proxy_pass http://127.0.0.1:18789;"));
        assert!(site.contains("proxy_set_header Upgrade $http_upgrade;"));
        assert!(site.contains("ssl_certificate /etc/ssl/hatchery/fullchain.pem;"));
    }

    #[tokio::test]
    async fn test_install_allows_ssh_before_enabling_firewall() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MockRemote::new();

        install(
            &remote,
            IP,
            &SecretString::new("pw"),
            "alice.agents.example.com",
            18789,
            &tls_files(&dir),
        )
        .await
        .unwrap();

        let commands = remote.commands().await;
        let ssh = commands.iter().position(|c| c == "ufw allow 22/tcp").unwrap();
        let enable = commands.iter().position(|c| c == "ufw --force enable").unwrap();
        assert!(ssh < enable);
        assert_eq!(commands.last().map(String::as_str), Some("ufw --force enable"));
    }

    #[tokio::test]
    async fn test_install_copies_certificate_pair() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MockRemote::new();

        install(
            &remote,
            IP,
            &SecretString::new("pw"),
            "alice.agents.example.com",
            18789,
            &tls_files(&dir),
        )
        .await
        .unwrap();

        assert_eq!(remote.file(CERT_PATH).await.unwrap(), b"CERT");
        let key = remote
            .uploads()
            .await
            .into_iter()
            .find(|u| u.path == KEY_PATH)
            .unwrap();
        assert_eq!(key.mode, 0o600);
        let site = String::from_utf8(remote.file(SITE_PATH).await.unwrap()).unwrap();
        assert!(site.contains("listen 443 ssl;"));
    }

    #[tokio::test]
    async fn test_install_fails_without_local_certificate() {
        let remote = MockRemote::new();
        let tls = TlsFiles {
            cert_path: PathBuf::from("/nonexistent/fullchain.pem"),
            key_path: PathBuf::from("/nonexistent/privkey.pem"),
        };

        let result = install(&remote, IP, &SecretString::new("pw"), "a.example.com", 18789, &tls).await;

        assert!(result.is_err());
        assert!(remote.commands().await.is_empty());
    }
}
