// WG Profile Manager - Local Storage
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Local data storage.
//!
//! Handles:
//! - Application settings (`settings.toml`)
//! - Session log history (`logs.json`, capped at `max_log_entries`)
//!
//! This module uses RwLock for thread-safe access. Lock poisoning is handled
//! by recovering the inner value.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{error, info, warn};

use crate::models::{AppConfig, Result, CONFIG_DIR_NAME};

/// A log entry with timestamp, level, and message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

/// Settings and log history on disk.
#[derive(Debug)]
pub struct DataStore {
    config_dir: PathBuf,
    settings_file: PathBuf,
    logs_file: PathBuf,

    settings: RwLock<AppConfig>,
    /// In-memory log entries (also persisted to disk).
    logs: RwLock<Vec<LogEntry>>,
}

/// Default settings directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

impl DataStore {
    /// Create a data store in the default config directory.
    pub fn new() -> Self {
        Self::with_config_dir(default_config_dir())
    }

    /// Create a data store in a specific config directory.
    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        let settings_file = config_dir.join("settings.toml");
        Self::open(config_dir, settings_file)
    }

    /// Create a data store whose settings come from `settings_file`.
    ///
    /// Log history still lives in the default config directory.
    pub fn with_settings_file(settings_file: PathBuf) -> Self {
        Self::open(default_config_dir(), settings_file)
    }

    fn open(config_dir: PathBuf, settings_file: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&config_dir) {
            error!("Failed to create config directory: {}", e);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&config_dir, fs::Permissions::from_mode(0o700));
        }

        let store = Self {
            logs_file: config_dir.join("logs.json"),
            settings_file,
            config_dir,
            settings: RwLock::new(AppConfig::default()),
            logs: RwLock::new(Vec::new()),
        };

        store.load_settings();
        store.load_logs();
        store
    }

    // ========================================================================
    // RwLock Helper Methods (handle poisoning gracefully)
    // ========================================================================

    fn read_lock<T, F, R>(&self, lock: &RwLock<T>, context: &str, reader: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        match lock.read() {
            Ok(guard) => reader(&*guard),
            Err(poisoned) => {
                warn!("RwLock poisoned reading {}, recovering", context);
                reader(&*poisoned.into_inner())
            }
        }
    }

    fn write_lock<T, F>(&self, lock: &RwLock<T>, context: &str, writer: F)
    where
        F: FnOnce(&mut T),
    {
        match lock.write() {
            Ok(mut guard) => writer(&mut *guard),
            Err(poisoned) => {
                warn!("RwLock poisoned writing {}, recovering", context);
                writer(&mut *poisoned.into_inner())
            }
        }
    }

    // ========================================================================
    // Settings
    // ========================================================================

    fn load_settings(&self) {
        if !self.settings_file.exists() {
            return;
        }
        match AppConfig::load_from_file(&self.settings_file) {
            Ok(config) => {
                self.write_lock(&self.settings, "settings", |s| *s = config);
                info!("Loaded settings from {:?}", self.settings_file);
            }
            Err(e) => error!("Failed to load settings: {}", e),
        }
    }

    /// Get the current settings.
    pub fn settings(&self) -> AppConfig {
        self.read_lock(&self.settings, "settings", |s| s.clone())
    }

    /// Replace the settings and write them to disk.
    pub fn update_settings(&self, settings: AppConfig) -> Result<()> {
        settings.save_to_file(&self.settings_file)?;
        self.write_lock(&self.settings, "settings", |s| *s = settings);
        Ok(())
    }

    pub fn settings_file(&self) -> &Path {
        &self.settings_file
    }

    // ========================================================================
    // Logs
    // ========================================================================

    fn load_logs(&self) {
        if !self.logs_file.exists() {
            return;
        }
        match File::open(&self.logs_file) {
            Ok(file) => {
                let reader = BufReader::new(file);
                match serde_json::from_reader::<_, Vec<LogEntry>>(reader) {
                    Ok(entries) => {
                        let entry_count = entries.len();
                        self.write_lock(&self.logs, "logs", |logs| *logs = entries);
                        info!("Loaded {} log entries from disk", entry_count);
                    }
                    Err(e) => error!("Failed to parse logs file: {}", e),
                }
            }
            Err(e) => error!("Failed to open logs file: {}", e),
        }
    }

    fn save_logs(&self) {
        let logs = self.logs();
        match File::create(&self.logs_file) {
            Ok(file) => {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(&self.logs_file, fs::Permissions::from_mode(0o600));
                }
                let writer = BufWriter::new(file);
                if let Err(e) = serde_json::to_writer_pretty(writer, &logs) {
                    error!("Failed to write logs file: {}", e);
                }
            }
            Err(e) => error!("Failed to create logs file: {}", e),
        }
    }

    /// Get all log entries, oldest first.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.read_lock(&self.logs, "logs", |l| l.clone())
    }

    /// Append a log entry and save to disk.
    pub fn append_log(&self, level: &str, message: &str) {
        let entry = LogEntry {
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            level: level.to_uppercase(),
            message: message.to_string(),
        };
        let max_entries = self.settings().max_log_entries;

        self.write_lock(&self.logs, "logs", |logs| {
            logs.push(entry);
            if logs.len() > max_entries {
                let drain_count = logs.len() - max_entries;
                logs.drain(0..drain_count);
            }
        });

        self.save_logs();
    }

    /// Clear all logs and save to disk.
    pub fn clear_logs(&self) {
        self.write_lock(&self.logs, "logs", |logs| logs.clear());
        self.save_logs();
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
