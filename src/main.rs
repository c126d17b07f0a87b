// WG Profile Manager - Main Entry Point
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # WG Profile Manager
//!
//! Headless front-end: runs one command against the profile store and
//! exits. `watch` keeps the status monitor running until Ctrl-C.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use wg_profile_manager::models::{time_ago, AppConfig, ProfileStatus, StatusSnapshot, StepStatus};
use wg_profile_manager::network_utils::list_profiles;
use wg_profile_manager::services::{
    event_channel, spawn_status_monitor, InterfaceRegistry, OutputStream, PrivilegeAdapter,
    SequenceEvent, SessionEvent, SessionOrchestrator,
};
use wg_profile_manager::storage::DataStore;
use wg_profile_manager::VERSION;

/// Human-readable application name.
pub const APP_NAME: &str = "WG Profile Manager";

/// Upper bound on waiting for background output (diagnostics) before exit.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Print version information and exit.
fn print_version() {
    println!("{} {}", APP_NAME, VERSION);
    println!("Copyright (C) 2026 Christos A. Daggas");
    println!("License: MIT");
}

/// Print help information and exit.
fn print_help() {
    println!(
        "Usage: {} [OPTIONS] <COMMAND>",
        env::args().next().unwrap_or_else(|| "wg-profile-manager".to_string())
    );
    println!();
    println!("Manage WireGuard profiles through the multi-profile helper.");
    println!();
    println!("Commands:");
    println!("  list               List profiles and their interfaces");
    println!("  status [PROFILE]   Show live status");
    println!("  up <PROFILE>       Activate a profile");
    println!("  down <PROFILE>     Deactivate a profile");
    println!("  toggle <PROFILE>   Activate or deactivate a profile");
    println!("  down-all           Deactivate every active profile");
    println!("  helper-list        Show the helper's own listing");
    println!("  watch              Refresh status until Ctrl-C, then deactivate all");
    println!();
    println!("Options:");
    println!("  -c, --config FILE  Read settings from FILE");
    println!("  -d, --debug        Enable debug logging");
    println!("  -h, --help         Show this help message and exit");
    println!("  -v, --version      Show version information and exit");
    println!();
    println!("Environment variables:");
    println!("  RUST_LOG           Set log level (trace, debug, info, warn, error)");
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    List,
    Status(Option<String>),
    Up(String),
    Down(String),
    Toggle(String),
    DownAll,
    HelperList,
    Watch,
}

impl Command {
    fn parse(words: &[String]) -> Result<Self, String> {
        let (name, rest) = words
            .split_first()
            .ok_or_else(|| "Missing command".to_string())?;
        let profile = || {
            rest.first()
                .cloned()
                .ok_or_else(|| format!("'{}' needs a profile name", name))
        };
        let command = match name.as_str() {
            "list" => Self::List,
            "status" => Self::Status(rest.first().cloned()),
            "up" => Self::Up(profile()?),
            "down" => Self::Down(profile()?),
            "toggle" => Self::Toggle(profile()?),
            "down-all" => Self::DownAll,
            "helper-list" => Self::HelperList,
            "watch" => Self::Watch,
            other => return Err(format!("Unknown command: {}", other)),
        };
        let expected = match command {
            Self::Up(_) | Self::Down(_) | Self::Toggle(_) | Self::Status(_) => 1,
            _ => 0,
        };
        if rest.len() > expected {
            return Err(format!("Unexpected argument: {}", rest[expected]));
        }
        Ok(command)
    }

    /// Commands that change interfaces also tidy up leftovers first.
    fn cleans_orphans(&self) -> bool {
        matches!(self, Self::Up(_) | Self::Toggle(_) | Self::Watch)
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mut debug_mode = false;
    let mut config_file: Option<PathBuf> = None;
    let mut words = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "-v" | "--version" => {
                print_version();
                return ExitCode::SUCCESS;
            }
            "-d" | "--debug" => {
                debug_mode = true;
            }
            "-c" | "--config" => match iter.next() {
                Some(path) => config_file = Some(PathBuf::from(path)),
                None => {
                    eprintln!("Option {} needs a file", arg);
                    return ExitCode::FAILURE;
                }
            },
            _ => {
                if arg.starts_with('-') {
                    eprintln!("Unknown option: {}", arg);
                    eprintln!("Try '--help' for more information.");
                    return ExitCode::FAILURE;
                }
                words.push(arg.clone());
            }
        }
    }

    let command = match Command::parse(&words) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Try '--help' for more information.");
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(match config_file {
        Some(path) => DataStore::with_settings_file(path),
        None => DataStore::new(),
    });
    let config = store.settings();

    let log_level = if debug_mode {
        tracing::Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(tracing::Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let ok = runtime.block_on(run(command, config, store));
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run(command: Command, config: AppConfig, store: Arc<DataStore>) -> bool {
    if command == Command::List {
        return print_profile_list(&config);
    }

    let privilege = match PrivilegeAdapter::detect(&config) {
        Ok(privilege) => privilege,
        Err(e) => {
            eprintln!("{}", e);
            return false;
        }
    };
    tracing::info!("Privilege escalation: {}", privilege.strategy());

    let (events, rx) = event_channel();
    let printer = spawn_event_printer(rx, store, matches!(command, Command::Watch));
    let orchestrator = Arc::new(SessionOrchestrator::new(config, privilege, events));

    if command.cleans_orphans() && orchestrator.config().cleanup_orphans_on_startup {
        let destroyed = orchestrator.cleanup_orphaned_interfaces().await;
        if !destroyed.is_empty() {
            tracing::info!("Removed {} orphaned interface(s)", destroyed.len());
        }
    }

    let ok = match command {
        Command::List => true,
        Command::Status(profile) => {
            let snapshot = orchestrator.refresh_status().await;
            print_snapshot(&snapshot, profile.as_deref())
        }
        Command::Up(name) => report(orchestrator.activate(&name).await),
        Command::Down(name) => report(orchestrator.deactivate(&name).await),
        Command::Toggle(name) => report(orchestrator.toggle(&name).await),
        Command::DownAll => deactivate_all(&orchestrator).await,
        Command::HelperList => match orchestrator.helper_listing().await {
            Ok(listing) => {
                print!("{}", listing);
                true
            }
            Err(e) => {
                eprintln!("{}", e);
                false
            }
        },
        Command::Watch => watch(&orchestrator).await,
    };

    // The printer ends once every sender is gone, diagnostics included.
    drop(orchestrator);
    if tokio::time::timeout(DRAIN_TIMEOUT, printer).await.is_err() {
        tracing::warn!("Gave up waiting for background output");
    }
    ok
}

fn report<T: std::fmt::Display>(result: wg_profile_manager::models::Result<T>) -> bool {
    match result {
        Ok(state) => {
            tracing::debug!("Final state: {}", state);
            true
        }
        Err(e) => {
            eprintln!("{}", e);
            if e.is_configuration_error() {
                eprintln!("Check helper_script and elevation in the settings file.");
            }
            false
        }
    }
}

async fn deactivate_all(orchestrator: &SessionOrchestrator) -> bool {
    let summary = orchestrator.deactivate_all().await;
    for (profile, reason) in &summary.failures {
        eprintln!("{}: {}", profile, reason);
    }
    println!(
        "Deactivated {} of {} profile(s)",
        summary.attempted.len() - summary.failures.len(),
        summary.attempted.len()
    );
    summary.is_success()
}

async fn watch(orchestrator: &Arc<SessionOrchestrator>) -> bool {
    let monitor = spawn_status_monitor(Arc::clone(orchestrator), orchestrator.config().refresh_interval());
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
    }
    monitor.abort();
    println!();
    deactivate_all(orchestrator).await
}

fn print_profile_list(config: &AppConfig) -> bool {
    let names = match list_profiles(&config.profiles_dir) {
        Ok(names) => names,
        Err(e) => {
            eprintln!("{}", e);
            return false;
        }
    };
    let registry = InterfaceRegistry::new(config.interface_map.clone());
    for name in names {
        match registry.lookup_interface(&name) {
            Some(iface) => println!("{:<24} {}", name, iface),
            None => println!("{:<24} -", name),
        }
    }
    true
}

fn print_snapshot(snapshot: &StatusSnapshot, only: Option<&str>) -> bool {
    let rows: Vec<&ProfileStatus> = snapshot
        .profiles
        .iter()
        .filter(|p| only.map_or(true, |name| p.name == name))
        .collect();
    if let Some(name) = only {
        if rows.is_empty() {
            eprintln!("Profile not found: {}", name);
            return false;
        }
    }
    for row in rows {
        print_status_row(row);
    }
    true
}

fn print_status_row(row: &ProfileStatus) {
    let mut line = format!(
        "{:<24} {:<12} {:<8}",
        row.name,
        row.state.as_str(),
        row.interface.as_deref().unwrap_or("-")
    );
    if row.full_tunnel {
        line.push_str(" full-tunnel");
    }
    if row.reserved_interface {
        line.push_str(" (reserved interface)");
    }
    println!("{}", line);

    let Some(live) = &row.live else { return };
    for peer in &live.peers {
        let endpoint = peer.endpoint.as_deref().unwrap_or("-");
        let handshake = match (peer.handshake_age_secs, &peer.latest_handshake) {
            (Some(age), _) => time_ago(age),
            (None, Some(text)) => text.clone(),
            (None, None) => "never".to_string(),
        };
        let transfer = peer.transfer_raw.as_deref().unwrap_or("-");
        println!("    peer {}  handshake {}  {}", endpoint, handshake, transfer);
    }
}

fn spawn_event_printer(
    mut rx: UnboundedReceiver<SessionEvent>,
    store: Arc<DataStore>,
    show_status: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                SessionEvent::Log { level, message } => {
                    println!("[{}] {}", level, message);
                    store.append_log(level.as_str(), &message);
                }
                SessionEvent::StateChanged { profile, state } => {
                    tracing::debug!("{} is now {}", profile, state);
                }
                SessionEvent::Sequence(event) => print_sequence_event(&event, &store),
                SessionEvent::Warning(e) => {
                    println!("[warn] {}", e);
                    store.append_log("warn", &e.to_string());
                }
                SessionEvent::Status(snapshot) => {
                    if show_status {
                        println!("--- {} ---", snapshot.taken_at.format("%H:%M:%S"));
                        print_snapshot(&snapshot, None);
                    }
                }
            }
        }
    })
}

fn print_sequence_event(event: &SequenceEvent, store: &DataStore) {
    match event {
        SequenceEvent::StepStarted { command, .. } => {
            println!("$ {}", command);
            store.append_log("info", &format!("$ {}", command));
        }
        SequenceEvent::Output { stream, line, .. } => {
            let level = match stream {
                OutputStream::Stdout => "info",
                OutputStream::Stderr => "warn",
            };
            println!("  {}", line);
            store.append_log(level, line);
        }
        SequenceEvent::StepCompleted {
            index,
            status,
            exit_code,
            ..
        } => {
            if *status != StepStatus::Success {
                let code = exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
                let message = format!("Step {} {} (exit code {})", index + 1, status.as_str(), code);
                println!("[error] {}", message);
                store.append_log("error", &message);
            }
        }
        SequenceEvent::Finished { generation, outcome } => {
            tracing::debug!("Sequence {} finished: {:?}", generation, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(&words("list")), Ok(Command::List));
        assert_eq!(Command::parse(&words("status")), Ok(Command::Status(None)));
        assert_eq!(
            Command::parse(&words("status vpn1")),
            Ok(Command::Status(Some("vpn1".into())))
        );
        assert_eq!(Command::parse(&words("up vpn1")), Ok(Command::Up("vpn1".into())));
        assert_eq!(Command::parse(&words("down-all")), Ok(Command::DownAll));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse(&[]).is_err());
        assert!(Command::parse(&words("up")).is_err());
        assert!(Command::parse(&words("down-all now")).is_err());
        assert!(Command::parse(&words("launch vpn1")).is_err());
    }

    #[test]
    fn test_orphan_cleanup_commands() {
        assert!(Command::Watch.cleans_orphans());
        assert!(Command::Up("a".into()).cleans_orphans());
        assert!(!Command::DownAll.cleans_orphans());
    }
}
