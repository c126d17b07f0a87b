// WG Profile Manager - Live Status Model
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Live tunnel status as reported by the daemon's `show` output.
//!
//! Status values are recomputed on every refresh and never cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::profile::SessionState;

/// Byte counters for one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub received: u64,
    pub sent: u64,
}

/// Interface-level fields of a status dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceStatus {
    pub name: Option<String>,
    pub public_key: Option<String>,
    pub listening_port: Option<u16>,
}

/// Per-peer fields of a status dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    pub public_key: Option<String>,
    pub endpoint: Option<String>,
    pub allowed_ips: Vec<String>,
    /// Seconds since the latest handshake, when one happened.
    pub handshake_age_secs: Option<u64>,
    /// Handshake rendered as "Ns ago" style text, or the daemon's own text
    /// when it could not be interpreted.
    pub latest_handshake: Option<String>,
    pub transfer: Option<Transfer>,
    /// Transfer line exactly as printed by the daemon.
    pub transfer_raw: Option<String>,
}

/// Live status for one interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStatus {
    pub interface: InterfaceStatus,
    pub peers: Vec<PeerStatus>,
}

impl LiveStatus {
    /// An absent interface parses to an empty status.
    pub fn is_down(&self) -> bool {
        self.interface == InterfaceStatus::default() && self.peers.is_empty()
    }

    pub fn first_peer(&self) -> Option<&PeerStatus> {
        self.peers.first()
    }
}

/// One row of a status refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileStatus {
    pub name: String,
    pub state: SessionState,
    pub interface: Option<String>,
    pub full_tunnel: bool,
    /// Interface falls in the OS-reserved range.
    pub reserved_interface: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveStatus>,
}

/// Result of one status refresh across all profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub taken_at: DateTime<Utc>,
    pub profiles: Vec<ProfileStatus>,
}

impl StatusSnapshot {
    /// Check if any profile has a live binding.
    pub fn any_active(&self) -> bool {
        self.profiles.iter().any(|p| p.interface.is_some())
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileStatus> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

/// Render an age in seconds as "Ns ago", "Nm ago", "Nh ago" or "Nd ago".
///
/// Units truncate, they never round.
pub fn time_ago(secs: u64) -> String {
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_ago_boundaries() {
        assert_eq!(time_ago(0), "0s ago");
        assert_eq!(time_ago(59), "59s ago");
        assert_eq!(time_ago(60), "1m ago");
        assert_eq!(time_ago(61), "1m ago");
        assert_eq!(time_ago(3599), "59m ago");
        assert_eq!(time_ago(3661), "1h ago");
        assert_eq!(time_ago(86399), "23h ago");
        assert_eq!(time_ago(90000), "1d ago");
    }

    #[test]
    fn test_empty_status_is_down() {
        assert!(LiveStatus::default().is_down());
        let status = LiveStatus {
            interface: InterfaceStatus {
                name: Some("utun5".into()),
                ..Default::default()
            },
            peers: Vec::new(),
        };
        assert!(!status.is_down());
    }
}
