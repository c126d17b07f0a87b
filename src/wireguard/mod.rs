// WG Profile Manager - WireGuard Text Formats
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Parsers for the two WireGuard text formats the manager consumes:
//! profile config files and the daemon's `show` status dump.

pub mod conf;
pub mod show;

pub use conf::{parse_profile_file, parse_profile_str};
pub use show::{parse_handshake_age, parse_show, parse_show_at, parse_show_output, parse_transfer};
