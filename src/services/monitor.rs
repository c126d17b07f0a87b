// WG Profile Manager - Status Monitor
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Periodic status refresh.
//!
//! Runs on the Tokio runtime and never blocks the caller. Each tick
//! publishes a [`SessionEvent::Status`] snapshot.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::events::SessionEvent;
use super::orchestrator::SessionOrchestrator;

/// Start refreshing status every `interval`.
///
/// The first refresh happens immediately. The task ends once the event
/// receiver is dropped, or when the handle is aborted.
pub fn spawn_status_monitor(
    orchestrator: Arc<SessionOrchestrator>,
    interval: Duration,
) -> JoinHandle<()> {
    info!("Starting status monitor (interval: {:?})", interval);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // A slow refresh delays the next one instead of bunching them up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if orchestrator.events().is_closed() {
                debug!("Status monitor stopping, no listeners");
                break;
            }
            let snapshot = orchestrator.refresh_status().await;
            debug!(
                "Status refresh: {} profile(s), any active: {}",
                snapshot.profiles.len(),
                snapshot.any_active()
            );
            orchestrator.events().send(SessionEvent::Status(snapshot));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppConfig;
    use crate::services::events::event_channel;
    use crate::services::privilege::PrivilegeAdapter;

    #[tokio::test]
    async fn test_monitor_publishes_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vpn1.conf"), "[Peer]\nAllowedIPs = 10.0.0.0/8\n").unwrap();
        let config = AppConfig {
            profiles_dir: dir.path().to_path_buf(),
            interface_map: dir.path().join("wg-utun.map"),
            ..AppConfig::default()
        };

        let (events, mut rx) = event_channel();
        let orchestrator = Arc::new(SessionOrchestrator::new(
            config,
            PrivilegeAdapter::direct(),
            events,
        ));
        let handle = spawn_status_monitor(orchestrator, Duration::from_millis(50));

        let mut snapshots = 0;
        while snapshots < 2 {
            match rx.recv().await {
                Some(SessionEvent::Status(snapshot)) => {
                    assert_eq!(snapshot.profiles.len(), 1);
                    assert!(!snapshot.any_active());
                    snapshots += 1;
                }
                Some(_) => {}
                None => panic!("channel closed"),
            }
        }
        handle.abort();
    }

    #[tokio::test]
    async fn test_monitor_stops_without_listeners() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            profiles_dir: dir.path().to_path_buf(),
            interface_map: dir.path().join("wg-utun.map"),
            ..AppConfig::default()
        };
        let (events, rx) = event_channel();
        drop(rx);
        let orchestrator = Arc::new(SessionOrchestrator::new(
            config,
            PrivilegeAdapter::direct(),
            events,
        ));
        tokio::time::timeout(
            Duration::from_secs(2),
            spawn_status_monitor(orchestrator, Duration::from_millis(10)),
        )
        .await
        .unwrap()
        .unwrap();
    }
}
