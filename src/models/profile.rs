// WG Profile Manager - Profile Data Model
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Profile data model.
//!
//! A Profile is the structured form of one `<name>.conf` WireGuard config:
//! - Interface settings (addresses, DNS, listen port, private key, MTU)
//! - Zero or more peers (keys, allowed IPs, endpoint, keepalive)
//! - Diagnostic ping hints carried in `#ping` comment directives
//!
//! Profiles are read-only to the session orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use zeroize::Zeroizing;

use super::validation;

/// Session state of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No interface is bound to the profile.
    #[default]
    Inactive,
    /// An activation sequence is running.
    Activating,
    /// The profile has a live interface binding.
    Active,
    /// A deactivation sequence is running.
    Deactivating,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
        }
    }

    /// A sequence is currently in flight for the profile.
    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Activating | Self::Deactivating)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret key material, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Zeroizing<String>);

impl SecretKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Expose the raw key text.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A `[Peer]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peer {
    pub public_key: Option<String>,
    pub preshared_key: Option<SecretKey>,
    /// Allowed-IP ranges in CIDR notation, in file order.
    pub allowed_ips: Vec<String>,
    /// `host:port`
    pub endpoint: Option<String>,
    pub persistent_keepalive: Option<u16>,
    /// Diagnostic target from a `#ping <host>` directive.
    pub ping_target: Option<String>,
}

impl Peer {
    /// Check if this peer routes the catch-all range.
    pub fn routes_default(&self) -> bool {
        self.allowed_ips.iter().any(|cidr| is_default_route(cidr))
    }
}

/// A WireGuard profile parsed from `<name>.conf`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    /// Profile name (config file base name without `.conf`).
    pub name: String,
    pub addresses: Vec<String>,
    pub dns: Vec<String>,
    pub listen_port: Option<u16>,
    pub private_key: Option<SecretKey>,
    pub mtu: Option<u32>,
    pub peers: Vec<Peer>,
    /// `#ping` hints that appeared without any `[Peer]` section.
    pub ping_hints: Vec<String>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Derive a profile name from its config file path.
    pub fn name_from_path(path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        let name = file_name.strip_suffix(".conf").unwrap_or(file_name);
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// The config file name for this profile (`<name>.conf`).
    pub fn file_name(&self) -> String {
        config_file_name(&self.name)
    }

    /// A full-tunnel profile routes the default route through some peer.
    pub fn is_full_tunnel(&self) -> bool {
        self.peers.iter().any(Peer::routes_default)
    }

    /// Targets for post-connect diagnostics.
    ///
    /// Peer ping hints come first, followed by each interface address with
    /// its prefix length stripped when `include_addresses` is set.
    pub fn ping_targets(&self, include_addresses: bool) -> Vec<String> {
        let mut targets: Vec<String> = self
            .peers
            .iter()
            .filter_map(|p| p.ping_target.clone())
            .chain(self.ping_hints.iter().cloned())
            .collect();

        if include_addresses {
            targets.extend(
                self.addresses
                    .iter()
                    .map(|addr| addr.split('/').next().unwrap_or(addr).trim().to_string())
                    .filter(|addr| !addr.is_empty()),
            );
        }
        targets
    }

    /// Advisory validation. Returns a human-readable issue per problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        match &self.private_key {
            Some(key) => {
                if let Err(e) = validation::validate_key(key.expose()) {
                    issues.push(format!("PrivateKey: {}", e));
                }
            }
            None => issues.push("PrivateKey is missing".to_string()),
        }
        for addr in &self.addresses {
            if let Err(e) = validation::validate_cidr(addr) {
                issues.push(format!("Address: {}", e));
            }
        }
        if let Some(mtu) = self.mtu {
            if let Err(e) = validation::validate_mtu(mtu) {
                issues.push(format!("MTU: {}", e));
            }
        }
        for (idx, peer) in self.peers.iter().enumerate() {
            match &peer.public_key {
                Some(key) => {
                    if let Err(e) = validation::validate_key(key) {
                        issues.push(format!("Peer {} PublicKey: {}", idx + 1, e));
                    }
                }
                None => issues.push(format!("Peer {} has no PublicKey", idx + 1)),
            }
            for cidr in &peer.allowed_ips {
                if let Err(e) = validation::validate_cidr(cidr) {
                    issues.push(format!("Peer {} AllowedIPs: {}", idx + 1, e));
                }
            }
            if let Some(endpoint) = &peer.endpoint {
                if let Err(e) = validation::validate_endpoint(endpoint) {
                    issues.push(format!("Peer {} Endpoint: {}", idx + 1, e));
                }
            }
        }
        issues
    }
}

/// `<name>.conf`
pub fn config_file_name(profile_name: &str) -> String {
    format!("{}.conf", profile_name)
}

/// Check whether a CIDR string is the IPv4 or IPv6 catch-all range.
pub fn is_default_route(cidr: &str) -> bool {
    let Some((addr, prefix)) = cidr.trim().split_once('/') else {
        return false;
    };
    let Ok(addr) = addr.trim().parse::<IpAddr>() else {
        return false;
    };
    prefix.trim().parse::<u8>().map(|p| p == 0).unwrap_or(false) && addr.is_unspecified()
}
