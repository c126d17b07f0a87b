// WG Profile Manager - Application Configuration
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Application configuration model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which privilege escalation tool to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ElevationPreference {
    /// Probe doas and sudo, prefer whichever is passwordless.
    #[default]
    Auto,
    /// Run commands as-is (the process is already privileged).
    Direct,
    /// Always escalate with sudo.
    Sudo,
    /// Always escalate with doas.
    Doas,
}

impl ElevationPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Direct => "direct",
            Self::Sudo => "sudo",
            Self::Doas => "doas",
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding one `<profile>.conf` per profile.
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,

    /// Multi-profile helper script (`up`, `down`, `list`).
    #[serde(default = "default_helper_script")]
    pub helper_script: PathBuf,

    /// Interface map written by the helper (`iface|config_path` rows).
    #[serde(default = "default_interface_map")]
    pub interface_map: PathBuf,

    /// Tunnel daemon command-line tool.
    #[serde(default = "default_wg_binary")]
    pub wg_binary: String,

    /// Status refresh interval in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Pause after tearing down a full tunnel, in milliseconds.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Delay before post-connect diagnostics, in milliseconds.
    #[serde(default = "default_post_connect_delay")]
    pub post_connect_delay_ms: u64,

    /// Echo requests per diagnostic ping.
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,

    /// Also ping the interface's own addresses after connecting.
    #[serde(default = "default_true")]
    pub ping_addresses: bool,

    /// Privilege escalation preference.
    #[serde(default)]
    pub elevation: ElevationPreference,

    /// Askpass helper for sudo (auto-discovered when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub askpass: Option<PathBuf>,

    /// Kill a sequence step that runs longer than this. Unset blocks forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    /// Interface name prefix whose low numbers are reserved by the OS.
    #[serde(default = "default_reserved_prefix")]
    pub reserved_interface_prefix: String,

    /// Highest reserved interface number (inclusive).
    #[serde(default = "default_reserved_max")]
    pub reserved_interface_max: u32,

    /// Destroy orphaned tunnel interfaces on startup.
    #[serde(default = "default_true")]
    pub cleanup_orphans_on_startup: bool,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum log entries to keep.
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
}

fn default_profiles_dir() -> PathBuf {
    PathBuf::from("/usr/local/etc/wireguard/profiles")
}

fn default_helper_script() -> PathBuf {
    let script = if cfg!(target_os = "macos") {
        "wg-multi-macos.sh"
    } else {
        "wg-multi-freebsd.sh"
    };
    PathBuf::from("/usr/local/etc/wg-gui/scripts").join(script)
}

fn default_interface_map() -> PathBuf {
    PathBuf::from("/tmp/wg-multi/wg-utun.map")
}

fn default_wg_binary() -> String {
    "wg".to_string()
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_settle_delay() -> u64 {
    1000
}

fn default_post_connect_delay() -> u64 {
    2000
}

fn default_ping_count() -> u32 {
    3
}

fn default_reserved_prefix() -> String {
    "utun".to_string()
}

fn default_reserved_max() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_entries() -> usize {
    10000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profiles_dir: default_profiles_dir(),
            helper_script: default_helper_script(),
            interface_map: default_interface_map(),
            wg_binary: default_wg_binary(),
            refresh_interval_secs: default_refresh_interval(),
            settle_delay_ms: default_settle_delay(),
            post_connect_delay_ms: default_post_connect_delay(),
            ping_count: default_ping_count(),
            ping_addresses: true,
            elevation: ElevationPreference::Auto,
            askpass: None,
            command_timeout_secs: None,
            reserved_interface_prefix: default_reserved_prefix(),
            reserved_interface_max: default_reserved_max(),
            cleanup_orphans_on_startup: true,
            log_level: default_log_level(),
            max_log_entries: default_max_log_entries(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, super::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| super::Error::SettingsReadFailed(format!("{}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file with restrictive permissions (0600).
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), super::Error> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| super::Error::SettingsWriteFailed(format!("{}: {}", path.display(), e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn post_connect_delay(&self) -> Duration {
        Duration::from_millis(self.post_connect_delay_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.refresh_interval_secs, 5);
        assert_eq!(config.settle_delay_ms, 1000);
        assert_eq!(config.interface_map, PathBuf::from("/tmp/wg-multi/wg-utun.map"));
        assert_eq!(config.elevation, ElevationPreference::Auto);
        assert!(config.command_timeout().is_none());
    }

    #[test]
    fn test_partial_override() {
        let config: AppConfig = toml::from_str(
            "profiles_dir = \"/etc/wg\"\nelevation = \"doas\"\ncommand_timeout_secs = 30\n",
        )
        .unwrap();
        assert_eq!(config.profiles_dir, PathBuf::from("/etc/wg"));
        assert_eq!(config.elevation, ElevationPreference::Doas);
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.ping_count, 3);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut config = AppConfig::default();
        config.reserved_interface_max = 7;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.reserved_interface_max, 7);
        assert_eq!(loaded.helper_script, config.helper_script);
    }
}
