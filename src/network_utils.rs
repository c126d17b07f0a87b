// WG Profile Manager - Network Utilities
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Profile store listing and OS interface detection.
//!
//! Interfaces come from `ifconfig -l` on macOS and the BSDs and from the
//! Linux sysfs interface elsewhere.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::models::{config_file_name, Profile, Result};

/// List profile names for every `*.conf` file in `dir`, sorted.
///
/// A missing directory holds no profiles.
pub fn list_profiles(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Profile directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("conf"))
        .filter_map(|path| Profile::name_from_path(&path))
        .collect();

    names.sort_by(|a, b| natural_sort_key(a).cmp(&natural_sort_key(b)).then_with(|| a.cmp(b)));
    Ok(names)
}

/// Path of a profile's config file inside the profile store.
pub fn profile_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(config_file_name(name))
}

/// List the host's network interfaces.
pub fn list_interfaces() -> Vec<String> {
    let mut names = if Path::new("/sys/class/net").is_dir() {
        list_sysfs_interfaces()
    } else {
        list_ifconfig_interfaces()
    };
    names.sort_by(|a, b| natural_sort_key(a).cmp(&natural_sort_key(b)).then_with(|| a.cmp(b)));
    names
}

fn list_sysfs_interfaces() -> Vec<String> {
    match fs::read_dir("/sys/class/net") {
        Ok(entries) => entries
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect(),
        Err(e) => {
            debug!("Failed to read /sys/class/net: {}", e);
            Vec::new()
        }
    }
}

fn list_ifconfig_interfaces() -> Vec<String> {
    match Command::new("ifconfig").arg("-l").output() {
        Ok(output) if output.status.success() => {
            parse_ifconfig_list(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            debug!("ifconfig -l exited with {:?}", output.status.code());
            Vec::new()
        }
        Err(e) => {
            debug!("Failed to run ifconfig: {}", e);
            Vec::new()
        }
    }
}

/// Split `ifconfig -l` output into interface names.
pub fn parse_ifconfig_list(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Numeric suffix of an interface with the given prefix (`utun7` -> 7).
pub fn interface_number(name: &str, prefix: &str) -> Option<u32> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Check if an interface falls in the OS-reserved range (`utun0`..=`utun4`
/// with the default prefix and limit).
pub fn is_reserved_interface(name: &str, prefix: &str, max: u32) -> bool {
    interface_number(name, prefix).is_some_and(|n| n <= max)
}

/// Generate a sort key that sorts numbers naturally.
fn natural_sort_key(s: &str) -> (String, u32) {
    let mut prefix = String::new();
    let mut num_str = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            num_str.push(c);
        } else if num_str.is_empty() {
            prefix.push(c);
        }
    }

    let num: u32 = num_str.parse().unwrap_or(0);
    (prefix, num)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_sort_key() {
        assert_eq!(natural_sort_key("utun0"), ("utun".to_string(), 0));
        assert_eq!(natural_sort_key("utun10"), ("utun".to_string(), 10));
        assert!(natural_sort_key("vpn2") < natural_sort_key("vpn10"));
    }

    #[test]
    fn test_reserved_interfaces() {
        assert!(is_reserved_interface("utun0", "utun", 4));
        assert!(is_reserved_interface("utun4", "utun", 4));
        assert!(!is_reserved_interface("utun5", "utun", 4));
        assert!(!is_reserved_interface("utun", "utun", 4));
        assert!(!is_reserved_interface("utunx1", "utun", 4));
        assert!(!is_reserved_interface("wg0", "utun", 4));
    }

    #[test]
    fn test_list_profiles() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["vpn10.conf", "vpn2.conf", "home.conf", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("archive.conf")).unwrap();

        let names = list_profiles(dir.path()).unwrap();
        assert_eq!(names, vec!["home", "vpn2", "vpn10"]);
        assert_eq!(
            profile_path(dir.path(), "home"),
            dir.path().join("home.conf")
        );
    }

    #[test]
    fn test_missing_profile_dir() {
        assert!(list_profiles(Path::new("/nonexistent/profiles")).unwrap().is_empty());
    }

    #[test]
    fn test_parse_ifconfig_list() {
        assert_eq!(
            parse_ifconfig_list("lo0 gif0 en0 utun0 utun3\n"),
            vec!["lo0", "gif0", "en0", "utun0", "utun3"]
        );
    }
}
