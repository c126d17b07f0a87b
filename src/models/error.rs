// WG Profile Manager - Error Types
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Shared error types for the WireGuard profile manager.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for profile manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for profile manager operations.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================
    // Profile Errors
    // ========================================
    #[error("Profile config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Profile config unreadable: {} ({reason})", .path.display())]
    ConfigUnreadable { path: PathBuf, reason: String },

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    // ========================================
    // Registry Errors
    // ========================================
    #[error("Interface map unreadable: {} ({reason})", .path.display())]
    RegistryUnreadable { path: PathBuf, reason: String },

    // ========================================
    // Command Errors
    // ========================================
    #[error("Step {step} failed ({command}): exit code {}", exit_code_label(.exit_code))]
    CommandFailed {
        step: usize,
        command: String,
        exit_code: Option<i32>,
    },

    #[error("Failed to launch {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Helper script not found: {}", .0.display())]
    HelperNotFound(PathBuf),

    // ========================================
    // Privilege Errors
    // ========================================
    #[error("No working privilege escalation mechanism found (tried doas, sudo)")]
    ElevationUnavailable,

    // ========================================
    // Advisory Warnings
    // ========================================
    #[error("Profile '{profile}' is using reserved interface {interface}")]
    InterfaceReserved { profile: String, interface: String },

    // ========================================
    // Storage Errors
    // ========================================
    #[error("Failed to read settings: {0}")]
    SettingsReadFailed(String),

    #[error("Failed to write settings: {0}")]
    SettingsWriteFailed(String),

    #[error("Failed to parse settings: {0}")]
    SettingsParseFailed(String),

    // ========================================
    // System Errors
    // ========================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated)".to_string(),
    }
}

impl Error {
    /// Create a new command failed error.
    pub fn command_failed(step: usize, command: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::CommandFailed {
            step,
            command: command.into(),
            exit_code,
        }
    }

    /// Create a new config unreadable error.
    pub fn config_unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ConfigUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Advisory errors are reported but never block an operation.
    pub fn is_advisory(&self) -> bool {
        matches!(self, Self::InterfaceReserved { .. })
    }

    /// Check if this error points at a broken installation rather than a
    /// runtime condition.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::HelperNotFound(_) | Self::ElevationUnavailable | Self::SpawnFailed { .. }
        )
    }
}

// Convert from toml parse errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::SettingsParseFailed(err.to_string())
    }
}

// Convert from toml serialize errors
impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::SettingsWriteFailed(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SettingsParseFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display() {
        let err = Error::command_failed(1, "helper up vpn1.conf", Some(1));
        assert_eq!(err.to_string(), "Step 1 failed (helper up vpn1.conf): exit code 1");

        let err = Error::command_failed(0, "wg show utun5", None);
        assert!(err.to_string().contains("none (terminated)"));
    }

    #[test]
    fn test_classification() {
        let reserved = Error::InterfaceReserved {
            profile: "home".into(),
            interface: "utun2".into(),
        };
        assert!(reserved.is_advisory());
        assert!(!reserved.is_configuration_error());
        assert!(Error::ElevationUnavailable.is_configuration_error());
    }
}
