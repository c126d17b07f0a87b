// WG Profile Manager - Status Parser
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Parser for the daemon's `show <interface>` text dump.
//!
//! ```text
//! interface: utun5
//!   public key: xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=
//!   listening port: 51820
//!
//! peer: HIgo9xNzJMWLKASShiTqIybxZ0U3wGLiUeJ1PKf8ykw=
//!   endpoint: 203.0.113.7:51820
//!   allowed ips: 0.0.0.0/0
//!   latest handshake: 1 minute, 5 seconds ago
//!   transfer: 1.21 KiB received, 3.40 MiB sent
//! ```
//!
//! An absent interface is not an error: it parses to an empty [`LiveStatus`].

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{time_ago, LiveStatus, PeerStatus, Transfer};

static HANDSHAKE_PART: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(\d+)\s+(year|week|day|hour|minute|second)s?").ok());

static TRANSFER: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^([\d.]+)\s*(B|KiB|MiB|GiB|TiB)\s+received,\s*([\d.]+)\s*(B|KiB|MiB|GiB|TiB)\s+sent$",
    )
    .ok()
});

/// Parse the output of a `show` invocation.
///
/// A non-zero or missing exit code means the interface is absent.
pub fn parse_show_output(exit_code: Option<i32>, stdout: &str) -> LiveStatus {
    if exit_code != Some(0) {
        return LiveStatus::default();
    }
    parse_show(stdout)
}

/// Parse a `show` dump relative to the current time.
pub fn parse_show(text: &str) -> LiveStatus {
    parse_show_at(text, Utc::now())
}

/// Parse a `show` dump, rendering epoch handshakes relative to `now`.
pub fn parse_show_at(text: &str, now: DateTime<Utc>) -> LiveStatus {
    let mut status = LiveStatus::default();

    for raw in text.lines() {
        let line = raw.trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        if key == "peer" {
            status.peers.push(PeerStatus {
                public_key: non_empty(value),
                ..Default::default()
            });
            continue;
        }

        match status.peers.last_mut() {
            None => match key.as_str() {
                "interface" => status.interface.name = non_empty(value),
                "public key" => status.interface.public_key = non_empty(value),
                "listening port" => status.interface.listening_port = value.parse().ok(),
                _ => {}
            },
            Some(peer) => match key.as_str() {
                // IPv6 endpoints contain colons of their own.
                "endpoint" => peer.endpoint = non_empty(value),
                "allowed ips" => {
                    peer.allowed_ips = value
                        .split(',')
                        .map(str::trim)
                        .filter(|v| !v.is_empty() && *v != "(none)")
                        .map(str::to_string)
                        .collect();
                }
                "latest handshake" => {
                    peer.handshake_age_secs = parse_handshake_age(value, now);
                    peer.latest_handshake = match peer.handshake_age_secs {
                        Some(age) => Some(time_ago(age)),
                        None => non_empty(value),
                    };
                }
                "transfer" => {
                    peer.transfer = parse_transfer(value);
                    peer.transfer_raw = non_empty(value);
                }
                _ => {}
            },
        }
    }

    status
}

/// Convert a handshake description into an age in seconds.
///
/// Accepts the daemon's human text ("1 minute, 5 seconds ago", "Now") and
/// raw unix timestamps.
pub fn parse_handshake_age(value: &str, now: DateTime<Utc>) -> Option<u64> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("now") {
        return Some(0);
    }
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        let epoch: i64 = value.parse().ok()?;
        if epoch == 0 {
            // Zero means no handshake yet.
            return None;
        }
        return Some(now.timestamp().saturating_sub(epoch).max(0) as u64);
    }

    let re = HANDSHAKE_PART.as_ref()?;
    let mut total: u64 = 0;
    let mut matched = false;
    for caps in re.captures_iter(value) {
        let n: u64 = caps[1].parse().ok()?;
        let unit = match &caps[2] {
            "year" => 365 * 86400,
            "week" => 7 * 86400,
            "day" => 86400,
            "hour" => 3600,
            "minute" => 60,
            _ => 1,
        };
        total = total.saturating_add(n.saturating_mul(unit));
        matched = true;
    }
    matched.then_some(total)
}

/// Parse "1.21 KiB received, 3.40 MiB sent" into byte counters.
pub fn parse_transfer(value: &str) -> Option<Transfer> {
    let caps = TRANSFER.as_ref()?.captures(value.trim())?;
    Some(Transfer {
        received: to_bytes(&caps[1], &caps[2])?,
        sent: to_bytes(&caps[3], &caps[4])?,
    })
}

fn to_bytes(amount: &str, unit: &str) -> Option<u64> {
    let amount: f64 = amount.parse().ok()?;
    let scale = match unit {
        "KiB" => 1024f64,
        "MiB" => 1024f64.powi(2),
        "GiB" => 1024f64.powi(3),
        "TiB" => 1024f64.powi(4),
        _ => 1f64,
    };
    Some((amount * scale).round() as u64)
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() || value == "(none)" {
        None
    } else {
        Some(value.to_string())
    }
}
