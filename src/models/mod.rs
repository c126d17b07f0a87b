// WG Profile Manager - Shared Models
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # Shared Models
//!
//! Typed records used across the profile manager:
//!
//! - **Profile**: WireGuard profile parsed from `<name>.conf`
//! - **Status**: Live tunnel status parsed from the daemon
//! - **Result**: Command sequence reports
//! - **Config**: Application settings
//! - **Error**: Shared error types

pub mod config;
pub mod error;
pub mod profile;
pub mod result;
pub mod status;
pub mod validation;

// Re-export main types for convenience
pub use config::{AppConfig, ElevationPreference};
pub use error::{Error, Result};
pub use profile::{config_file_name, is_default_route, Peer, Profile, SecretKey, SessionState};
pub use result::{SequenceOutcome, SequenceReport, StepResult, StepStatus};
pub use status::{
    time_ago, InterfaceStatus, LiveStatus, PeerStatus, ProfileStatus,
    StatusSnapshot, Transfer,
};

/// Configuration directory name (under XDG_CONFIG_HOME).
pub const CONFIG_DIR_NAME: &str = "wg-profile-manager";
