// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! DNS-safe labels derived from display names.

/// Maximum length of a single DNS label.
const MAX_LABEL_LEN: usize = 63;

/// Label used when a display name has no usable characters.
const FALLBACK_LABEL: &str = "tenant";

/// Turn a display name into a DNS label.
///
/// Lowercases, replaces everything outside `[a-z0-9-]` with `-`, strips
/// leading and trailing hyphens and caps the result at 63 characters.
pub fn sanitize_label(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let mut label = replaced.trim_matches('-').to_string();
    label.truncate(MAX_LABEL_LEN);
    let label = label.trim_end_matches('-');

    if label.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        label.to_string()
    }
}
