// WG Profile Manager - Interface Registry
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Read-only view of the interface map written by the helper script.
//!
//! Each row is `<interface>|<config path>`. The helper rewrites the file while
//! it brings interfaces up and down, so it is re-read on every call and a
//! malformed or half-written row is skipped rather than treated as an error.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::models::{config_file_name, Error, Profile, Result};

/// A live interface bound to a profile config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceBinding {
    pub interface: String,
    pub profile_name: String,
    pub config_path: PathBuf,
}

/// Interface registry backed by the helper's map file.
#[derive(Debug, Clone)]
pub struct InterfaceRegistry {
    map_path: PathBuf,
}

impl InterfaceRegistry {
    pub fn new(map_path: impl Into<PathBuf>) -> Self {
        Self {
            map_path: map_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.map_path
    }

    /// Read every binding. A missing map file means nothing is bound.
    pub fn read_bindings(&self) -> Result<Vec<InterfaceBinding>> {
        match fs::read_to_string(&self.map_path) {
            Ok(text) => Ok(parse_map(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::RegistryUnreadable {
                path: self.map_path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Current bindings in file order. An unreadable map counts as empty.
    pub fn list_bindings(&self) -> Vec<InterfaceBinding> {
        self.read_bindings().unwrap_or_else(|e| {
            warn!("{}", e);
            Vec::new()
        })
    }

    /// Find the interface bound to a profile, matching on the config's file name.
    pub fn lookup_interface(&self, profile_name: &str) -> Option<String> {
        let wanted = config_file_name(profile_name);
        self.list_bindings()
            .into_iter()
            .find(|b| b.config_path.file_name().and_then(|f| f.to_str()) == Some(wanted.as_str()))
            .map(|b| b.interface)
    }
}

/// Parse the map file text, skipping anything that is not a complete row.
pub fn parse_map(text: &str) -> Vec<InterfaceBinding> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let Some((interface, config)) = line.split_once('|') else {
                debug!("Skipping malformed map row: {}", line);
                return None;
            };
            let interface = interface.trim();
            let config = config.trim();
            if interface.is_empty() || !config.ends_with(".conf") {
                debug!("Skipping incomplete map row: {}", line);
                return None;
            }
            let config_path = PathBuf::from(config);
            let profile_name = Profile::name_from_path(&config_path)?;
            Some(InterfaceBinding {
                interface: interface.to_string(),
                profile_name,
                config_path,
            })
        })
        .collect()
}
