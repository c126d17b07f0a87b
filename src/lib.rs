// WG Profile Manager - Library Root
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # WG Profile Manager
//!
//! Activates and deactivates WireGuard profiles through a multi-profile
//! helper script, keeps at most one full-tunnel profile up at a time and
//! reports live tunnel status.

pub mod models;
pub mod network_utils;
pub mod services;
pub mod storage;
pub mod wireguard;

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
