// WG Profile Manager - Validation Utilities
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Input validation utilities for profiles.
//!
//! Validation is advisory: the orchestrator logs issues before activation
//! but leaves the final word to the tunnel daemon.

use base64::Engine;
use std::net::IpAddr;
use std::str::FromStr;

use super::error::{Error, Result};

/// Length of a decoded Curve25519 key.
const WG_KEY_LEN: usize = 32;

/// Validate an IP address string (v4 or v6).
pub fn validate_ip(s: &str) -> Result<IpAddr> {
    IpAddr::from_str(s).map_err(|_| Error::InvalidProfile(format!("Invalid IP address: {}", s)))
}

/// Validate a CIDR notation (e.g., "10.8.0.2/32").
pub fn validate_cidr(s: &str) -> Result<(IpAddr, u8)> {
    let parts: Vec<&str> = s.trim().split('/').collect();
    if parts.len() != 2 {
        return Err(Error::InvalidProfile(format!(
            "Invalid CIDR notation: {}",
            s
        )));
    }

    let ip = validate_ip(parts[0])?;
    let prefix: u8 = parts[1]
        .parse()
        .map_err(|_| Error::InvalidProfile(format!("Invalid prefix: {}", parts[1])))?;

    let max_prefix = if ip.is_ipv4() { 32 } else { 128 };
    if prefix > max_prefix {
        return Err(Error::InvalidProfile(format!(
            "Prefix {} exceeds maximum {} for address type",
            prefix, max_prefix
        )));
    }

    Ok((ip, prefix))
}

/// Validate a base64-encoded WireGuard key.
pub fn validate_key(s: &str) -> Result<()> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(s.trim())
        .map_err(|_| Error::InvalidProfile("Key is not valid base64".to_string()))?;
    if decoded.len() != WG_KEY_LEN {
        return Err(Error::InvalidProfile(format!(
            "Key must decode to {} bytes, got {}",
            WG_KEY_LEN,
            decoded.len()
        )));
    }
    Ok(())
}

/// Validate a peer endpoint (`host:port` or `[v6]:port`).
pub fn validate_endpoint(s: &str) -> Result<(String, u16)> {
    let s = s.trim();
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| Error::InvalidProfile(format!("Endpoint needs host:port: {}", s)))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::InvalidProfile(format!("Invalid endpoint port: {}", port)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(Error::InvalidProfile(format!("Endpoint host is empty: {}", s)));
    }
    if port == 0 {
        return Err(Error::InvalidProfile("Endpoint port cannot be 0".to_string()));
    }
    Ok((host.to_string(), port))
}

/// Validate an MTU value.
pub fn validate_mtu(mtu: u32) -> Result<u32> {
    if !(68..=65535).contains(&mtu) {
        return Err(Error::InvalidProfile(format!(
            "MTU must be between 68 and 65535: {}",
            mtu
        )));
    }
    Ok(mtu)
}

/// Validate a profile name.
///
/// Names become file names and helper arguments, so path separators are
/// rejected.
pub fn validate_profile_name(s: &str) -> Result<String> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidProfile(
            "Profile name cannot be empty".to_string(),
        ));
    }
    if s.len() > 100 {
        return Err(Error::InvalidProfile(
            "Profile name must be 100 characters or less".to_string(),
        ));
    }
    if s.contains('/') || s.contains('\\') || s.starts_with('.') {
        return Err(Error::InvalidProfile(format!(
            "Profile name contains invalid characters: {}",
            s
        )));
    }
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cidr() {
        assert!(validate_cidr("10.8.0.2/32").is_ok());
        assert!(validate_cidr("::/0").is_ok());
        assert!(validate_cidr("10.8.0.2").is_err());
        assert!(validate_cidr("10.8.0.2/33").is_err());
        assert!(validate_cidr("fd00::/129").is_err());
    }

    #[test]
    fn test_validate_key() {
        // 32 zero bytes
        assert!(validate_key("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=").is_ok());
        assert!(validate_key("AAAA").is_err());
        assert!(validate_key("not base64!").is_err());
    }

    #[test]
    fn test_validate_endpoint() {
        assert_eq!(
            validate_endpoint("vpn.example.com:51820").unwrap(),
            ("vpn.example.com".to_string(), 51820)
        );
        assert_eq!(
            validate_endpoint("[2001:db8::1]:51820").unwrap().0,
            "2001:db8::1"
        );
        assert!(validate_endpoint("vpn.example.com").is_err());
        assert!(validate_endpoint(":51820").is_err());
        assert!(validate_endpoint("host:0").is_err());
    }

    #[test]
    fn test_validate_profile_name() {
        assert_eq!(validate_profile_name(" home ").unwrap(), "home");
        assert!(validate_profile_name("").is_err());
        assert!(validate_profile_name("../etc/passwd").is_err());
        assert!(validate_profile_name(".hidden").is_err());
    }
}
