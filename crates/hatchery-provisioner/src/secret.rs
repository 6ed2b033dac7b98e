// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Secret values carried through a provisioning run.
//!
//! [`SecretString`] wraps the remote-access secret, generated gateway tokens,
//! provider API tokens and database service credentials. Its `Debug` output is
//! redacted so a secret can never reach a log line through `?field` formatting,
//! and the buffer is zeroized when the value is dropped.

use std::fmt;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Length of generated remote-access passwords.
pub const PASSWORD_LEN: usize = 32;

/// Number of random bytes in a generated token (hex encoded to twice this).
pub const TOKEN_BYTES: usize = 32;

/// A string that must never be logged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap an existing secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a random alphanumeric password suitable for SSH password auth.
    pub fn generate_password() -> Self {
        let password: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LEN)
            .map(char::from)
            .collect();
        Self(password)
    }

    /// Generate a high-entropy hex token.
    pub fn generate_token() -> Self {
        let bytes: [u8; TOKEN_BYTES] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Borrow the secret value.
    ///
    /// Callers must only pass the result to the collaborator that needs it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([redacted])")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::new("hunter2");
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_generated_password_shape() {
        let password = SecretString::generate_password();
        assert_eq!(password.expose().len(), PASSWORD_LEN);
        assert!(password.expose().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_tokens_are_distinct_hex() {
        let a = SecretString::generate_token();
        let b = SecretString::generate_token();
        assert_ne!(a, b);
        assert_eq!(a.expose().len(), TOKEN_BYTES * 2);
        assert!(a.expose().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_serializes_transparently() {
        let secret = SecretString::new("abc");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"abc\"");
        let back: SecretString = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, secret);
    }
}
