// WG Profile Manager - Post-Connect Diagnostics
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Best-effort pings after a profile comes up.
//!
//! Targets are re-read from the profile config once the connect delay has
//! passed. Output goes to the session log; exit codes never affect the
//! session state.

use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use super::events::EventSender;
use super::privilege::CommandSpec;
use super::process::{spawn_piped, OutputPump, OutputStream, OUTPUT_DRAIN};
use crate::wireguard::parse_profile_file;

/// Settings for one round of diagnostics.
#[derive(Debug, Clone)]
pub struct DiagnosticsPlan {
    pub config_path: PathBuf,
    pub delay: Duration,
    pub ping_count: u32,
    pub include_addresses: bool,
}

/// Program and arguments for pinging `target`.
pub fn ping_command(target: &str, count: u32) -> (&'static str, Vec<String>) {
    let v6 = target.parse::<Ipv6Addr>().is_ok();
    // macOS and the BSDs keep IPv6 echo in a separate tool.
    let program = if v6 && cfg!(any(target_os = "macos", target_os = "freebsd")) {
        "ping6"
    } else {
        "ping"
    };
    (
        program,
        vec!["-c".to_string(), count.to_string(), target.to_string()],
    )
}

/// Launch diagnostics in the background.
pub fn spawn_post_connect(plan: DiagnosticsPlan, events: EventSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(plan.delay).await;
        let profile = match parse_profile_file(&plan.config_path) {
            Ok(profile) => profile,
            Err(e) => {
                events.warn(format!("Diagnostics skipped: {}", e));
                return;
            }
        };
        let targets = profile.ping_targets(plan.include_addresses);
        if targets.is_empty() {
            debug!("No ping targets for {}", profile.name);
            return;
        }
        run_pings(&targets, plan.ping_count, &events).await;
    })
}

/// Ping each target in turn, streaming output to the session log.
pub async fn run_pings(targets: &[String], count: u32, events: &EventSender) {
    for target in targets {
        let (program, args) = ping_command(target, count);
        events.info(format!("Pinging {}...", target));

        let mut child = match spawn_piped(&CommandSpec::new(program, args)) {
            Ok(child) => child,
            Err(e) => {
                events.warn(format!("Could not run {}: {}", program, e));
                continue;
            }
        };

        let log = |stream: OutputStream, line: String| match stream {
            OutputStream::Stdout => events.info(line),
            OutputStream::Stderr => events.warn(line),
        };
        let mut pump = OutputPump::take(&mut child);
        let status = loop {
            tokio::select! {
                item = pump.next(), if pump.is_open() => {
                    if let Some((stream, line)) = item {
                        log(stream, line);
                    }
                }
                status = child.wait() => break status,
            }
        };
        pump.drain(OUTPUT_DRAIN, log).await;

        match status {
            Ok(status) => debug!("{} {} exited with {:?}", program, target, status.code()),
            Err(e) => debug!("{} {} wait failed: {}", program, target, e),
        }
    }
}
