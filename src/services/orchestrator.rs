// WG Profile Manager - Session Orchestrator
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Session orchestrator.
//!
//! Ties the registry, parsers, privilege adapter and sequencer together:
//! - Builds the command sequence for activating or deactivating a profile
//! - Keeps at most one full-tunnel profile bound
//! - Reconciles in-memory session state with the interface map after every
//!   state-changing operation
//!
//! The interface map is authoritative. In-memory state only adds the
//! transitional `Activating` and `Deactivating` states on top of it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::diagnostics::{spawn_post_connect, DiagnosticsPlan};
use super::events::{EventSender, SessionEvent};
use super::exclusivity::{helper_args, helper_step, plan_activation, HelperVerb};
use super::privilege::{helper_exists, CommandOutput, PrivilegeAdapter};
use super::process::run_captured;
use super::registry::{InterfaceBinding, InterfaceRegistry};
use super::sequencer::{CommandSequencer, CommandStep, SequenceHandle};
use crate::models::validation::validate_profile_name;
use crate::models::{
    AppConfig, Error, Profile, ProfileStatus, Result, SequenceOutcome, SequenceReport,
    SessionState, StatusSnapshot,
};
use crate::network_utils::{is_reserved_interface, list_interfaces, list_profiles, profile_path};
use crate::wireguard::{parse_profile_file, parse_show_output};

/// Result of a best-effort deactivate-all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeactivateAllSummary {
    /// Profiles that were bound and got a `down`.
    pub attempted: Vec<String>,
    /// Profiles whose `down` failed, with the reason.
    pub failures: Vec<(String, String)>,
}

impl DeactivateAllSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owner of all session state for one running application.
pub struct SessionOrchestrator {
    config: AppConfig,
    registry: InterfaceRegistry,
    privilege: PrivilegeAdapter,
    sequencer: CommandSequencer,
    states: Mutex<HashMap<String, SessionState>>,
    events: EventSender,
}

impl SessionOrchestrator {
    pub fn new(config: AppConfig, privilege: PrivilegeAdapter, events: EventSender) -> Self {
        let registry = InterfaceRegistry::new(config.interface_map.clone());
        let sequencer = CommandSequencer::new(config.command_timeout());
        Self {
            config,
            registry,
            privilege,
            sequencer,
            states: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &InterfaceRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    // ========================================
    // State
    // ========================================

    fn lock_states(&self) -> MutexGuard<'_, HashMap<String, SessionState>> {
        self.states.lock().unwrap_or_else(|e| {
            warn!("Session state lock was poisoned, recovering");
            e.into_inner()
        })
    }

    /// Current state of a profile.
    pub fn state(&self, profile: &str) -> SessionState {
        if let Some(state) = self.lock_states().get(profile).copied() {
            if state.is_transitional() {
                return state;
            }
        }
        if self.registry.lookup_interface(profile).is_some() {
            SessionState::Active
        } else {
            SessionState::Inactive
        }
    }

    fn set_state(&self, profile: &str, state: SessionState) {
        let previous = self.lock_states().insert(profile.to_string(), state);
        if previous != Some(state) {
            debug!("{}: {:?} -> {}", profile, previous, state);
            self.events.send(SessionEvent::StateChanged {
                profile: profile.to_string(),
                state,
            });
        }
    }

    /// Re-read the interface map and set the profile's settled state.
    fn reconcile(&self, profile: &str) -> SessionState {
        let state = match self.registry.lookup_interface(profile) {
            Some(_) => SessionState::Active,
            None => SessionState::Inactive,
        };
        self.set_state(profile, state);
        state
    }

    // ========================================
    // Profiles
    // ========================================

    /// Parse a profile from the profile store.
    pub fn load_profile(&self, name: &str) -> Result<Profile> {
        let name = validate_profile_name(name)?;
        parse_profile_file(&profile_path(&self.config.profiles_dir, &name))
    }

    /// Parse the config behind a binding, preferring the profile store copy.
    fn load_bound(&self, binding: &InterfaceBinding) -> Result<Profile> {
        let stored = profile_path(&self.config.profiles_dir, &binding.profile_name);
        if stored.is_file() {
            parse_profile_file(&stored)
        } else {
            parse_profile_file(&binding.config_path)
        }
    }

    /// Every profile in the store plus anything bound that is not in it.
    fn known_profiles(&self, bindings: &[InterfaceBinding]) -> Vec<String> {
        let mut names = list_profiles(&self.config.profiles_dir).unwrap_or_else(|e| {
            warn!("Failed to list {}: {}", self.config.profiles_dir.display(), e);
            Vec::new()
        });
        for binding in bindings {
            if !names.contains(&binding.profile_name) {
                names.push(binding.profile_name.clone());
            }
        }
        names
    }

    fn is_reserved(&self, interface: &str) -> bool {
        is_reserved_interface(
            interface,
            &self.config.reserved_interface_prefix,
            self.config.reserved_interface_max,
        )
    }

    fn warn_if_reserved(&self, profile: &str, interface: &str) -> bool {
        if !self.is_reserved(interface) {
            return false;
        }
        let warning = Error::InterfaceReserved {
            profile: profile.to_string(),
            interface: interface.to_string(),
        };
        warn!("{}", warning);
        self.events.send(SessionEvent::Warning(warning));
        true
    }

    fn ensure_helper(&self) -> Result<()> {
        if helper_exists(&self.config.helper_script) {
            Ok(())
        } else {
            let err = Error::HelperNotFound(self.config.helper_script.clone());
            self.events.error(err.to_string());
            Err(err)
        }
    }

    // ========================================
    // Operations
    // ========================================

    /// Bring a profile up.
    ///
    /// A full-tunnel profile first tears down every other bound full-tunnel
    /// profile. Returns the profile's settled state.
    pub async fn activate(&self, name: &str) -> Result<SessionState> {
        let profile = self.load_profile(name).map_err(|e| {
            self.events.error(format!("Cannot activate {}: {}", name, e));
            e
        })?;
        let name = profile.name.as_str();

        for issue in profile.validate() {
            self.events.warn(format!("{}: {}", name, issue));
        }

        // Bindings are only read once nothing else can still change them.
        self.supersede_in_flight().await;

        if let Some(interface) = self.registry.lookup_interface(name) {
            self.events
                .info(format!("{} is already active (interface {})", name, interface));
            self.warn_if_reserved(name, &interface);
            self.set_state(name, SessionState::Active);
            return Ok(SessionState::Active);
        }

        self.ensure_helper()?;

        let bindings = self.registry.list_bindings();
        let plan = plan_activation(&profile, &bindings, |b| self.load_bound(b));
        let steps = plan.steps(
            &self.config.helper_script,
            &self.privilege,
            self.config.settle_delay(),
        )?;

        for binding in &plan.teardown {
            self.events.info(format!(
                "Deactivating full-tunnel profile {} on {}",
                binding.profile_name, binding.interface
            ));
            self.set_state(&binding.profile_name, SessionState::Deactivating);
        }
        self.set_state(name, SessionState::Activating);
        self.events.info(format!("Activating {}...", name));

        let report = self.start_sequence(steps).await.wait().await;
        for binding in &plan.teardown {
            self.reconcile(&binding.profile_name);
        }
        let state = self.reconcile(name);

        match &report.outcome {
            SequenceOutcome::Completed => {
                match self.registry.lookup_interface(name) {
                    Some(interface) => {
                        self.events
                            .info(format!("{} is active on {}", name, interface));
                        self.warn_if_reserved(name, &interface);
                    }
                    None => self.events.warn(format!(
                        "Helper finished but no interface is bound to {}",
                        name
                    )),
                }
                spawn_post_connect(
                    DiagnosticsPlan {
                        config_path: profile_path(&self.config.profiles_dir, name),
                        delay: self.config.post_connect_delay(),
                        ping_count: self.config.ping_count,
                        include_addresses: self.config.ping_addresses,
                    },
                    self.events.clone(),
                );
                Ok(state)
            }
            SequenceOutcome::Superseded => {
                info!("Activation of {} was superseded", name);
                Ok(state)
            }
            SequenceOutcome::Failed { .. } | SequenceOutcome::LaunchFailed { .. } => {
                Err(self.report_failure(name, "Activation", report))
            }
        }
    }

    /// Bring a profile down.
    pub async fn deactivate(&self, name: &str) -> Result<SessionState> {
        let name = validate_profile_name(name)?;
        // A pending `up` for this profile must not complete after this.
        self.supersede_in_flight().await;

        let Some(interface) = self.registry.lookup_interface(&name) else {
            self.events.info(format!("{} is not active", name));
            self.set_state(&name, SessionState::Inactive);
            return Ok(SessionState::Inactive);
        };

        self.ensure_helper()?;
        let step = helper_step(
            &self.config.helper_script,
            HelperVerb::Down,
            &name,
            &self.privilege,
        )?;

        self.set_state(&name, SessionState::Deactivating);
        self.events
            .info(format!("Deactivating {} on {}...", name, interface));

        let report = self.start_sequence(vec![step]).await.wait().await;
        let state = self.reconcile(&name);

        match &report.outcome {
            SequenceOutcome::Completed => {
                if state == SessionState::Active {
                    self.events
                        .warn(format!("{} is still bound after deactivation", name));
                } else {
                    self.events.info(format!("{} is inactive", name));
                }
                Ok(state)
            }
            SequenceOutcome::Superseded => {
                info!("Deactivation of {} was superseded", name);
                Ok(state)
            }
            SequenceOutcome::Failed { .. } | SequenceOutcome::LaunchFailed { .. } => {
                Err(self.report_failure(&name, "Deactivation", report))
            }
        }
    }

    /// Activate an inactive profile or deactivate an active one.
    pub async fn toggle(&self, name: &str) -> Result<SessionState> {
        self.supersede_in_flight().await;
        if self.registry.lookup_interface(name).is_some() {
            self.deactivate(name).await
        } else {
            self.activate(name).await
        }
    }

    /// Bring every bound profile down, one at a time.
    ///
    /// Failures are logged and the batch carries on.
    pub async fn deactivate_all(&self) -> DeactivateAllSummary {
        self.supersede_in_flight().await;

        let mut summary = DeactivateAllSummary::default();
        let bindings = self.registry.list_bindings();

        for name in self.known_profiles(&bindings) {
            if self.registry.lookup_interface(&name).is_none() {
                continue;
            }
            summary.attempted.push(name.clone());
            self.set_state(&name, SessionState::Deactivating);
            self.events.info(format!("Deactivating {}...", name));

            let args = helper_args(&self.config.helper_script, HelperVerb::Down, Some(&name));
            let privilege = self.privilege.clone();
            let timeout = self.config.command_timeout();
            let result = tokio::task::spawn_blocking(move || privilege.run_blocking(&args, timeout))
                .await
                .unwrap_or_else(|e| Err(Error::Internal(format!("Deactivation task failed: {}", e))));

            match result {
                Ok(output) => {
                    self.log_output(&output);
                    if !output.success() {
                        let reason = Error::command_failed(
                            0,
                            format!("down {}", name),
                            output.exit_code,
                        )
                        .to_string();
                        self.events.error(format!("{}: {}", name, reason));
                        summary.failures.push((name.clone(), reason));
                    }
                }
                Err(e) => {
                    self.events.error(format!("{}: {}", name, e));
                    summary.failures.push((name.clone(), e.to_string()));
                }
            }
            self.reconcile(&name);
        }

        if summary.attempted.is_empty() {
            self.events.info("No active profiles");
        }
        summary
    }

    /// Recompute the status of every known profile.
    pub async fn refresh_status(&self) -> StatusSnapshot {
        let bindings = self.registry.list_bindings();
        let mut profiles = Vec::new();

        for name in self.known_profiles(&bindings) {
            let interface = bindings
                .iter()
                .find(|b| b.profile_name == name)
                .map(|b| b.interface.clone());

            let full_tunnel = match self.load_profile(&name) {
                Ok(profile) => profile.is_full_tunnel(),
                Err(e) => {
                    debug!("Status: cannot parse {}: {}", name, e);
                    false
                }
            };

            let mut reserved_interface = false;
            let mut live = None;
            if let Some(iface) = &interface {
                reserved_interface = self.warn_if_reserved(&name, iface);
                let args = vec![
                    self.config.wg_binary.clone(),
                    "show".to_string(),
                    iface.clone(),
                ];
                match self.capture_elevated(&args).await {
                    Ok(output) => live = Some(parse_show_output(output.exit_code, &output.stdout)),
                    Err(e) => debug!("Status: {} show {} failed: {}", self.config.wg_binary, iface, e),
                }
            }

            let current = self.lock_states().get(&name).copied();
            let state = match current {
                Some(state) if state.is_transitional() => state,
                _ => {
                    let settled = if interface.is_some() {
                        SessionState::Active
                    } else {
                        SessionState::Inactive
                    };
                    self.set_state(&name, settled);
                    settled
                }
            };

            profiles.push(ProfileStatus {
                name,
                state,
                interface,
                full_tunnel,
                reserved_interface,
                live,
            });
        }

        StatusSnapshot {
            taken_at: chrono::Utc::now(),
            profiles,
        }
    }

    /// Run the helper's `list` verb and return its output.
    pub async fn helper_listing(&self) -> Result<String> {
        self.ensure_helper()?;
        let args = helper_args(&self.config.helper_script, HelperVerb::List, None);
        let output = self.capture_elevated(&args).await?;
        if !output.success() {
            self.events.warn(format!(
                "Helper list exited with {:?}",
                output.exit_code
            ));
        }
        let mut text = output.stdout;
        text.push_str(&output.stderr);
        Ok(text)
    }

    /// Destroy tunnel interfaces the daemon no longer knows about.
    ///
    /// Only interfaces with the reserved-range prefix above the reserved
    /// numbers that are not bound to any profile are considered. Returns the
    /// interfaces destroyed.
    pub async fn cleanup_orphaned_interfaces(&self) -> Vec<String> {
        let bindings = self.registry.list_bindings();
        let candidates = orphan_candidates(
            &list_interfaces(),
            &bindings,
            &self.config.reserved_interface_prefix,
            self.config.reserved_interface_max,
        );

        let mut destroyed = Vec::new();
        for iface in candidates {
            let show = vec![
                self.config.wg_binary.clone(),
                "show".to_string(),
                iface.clone(),
            ];
            match self.capture_elevated(&show).await {
                Ok(output) if output.success() => continue,
                Ok(_) => {}
                Err(e) => {
                    debug!("Orphan check for {} failed: {}", iface, e);
                    continue;
                }
            }

            self.events
                .info(format!("Destroying orphaned interface {}", iface));
            let destroy = vec!["ifconfig".to_string(), iface.clone(), "destroy".to_string()];
            match self.capture_elevated(&destroy).await {
                Ok(output) if output.success() => destroyed.push(iface),
                Ok(output) => self.events.warn(format!(
                    "Failed to destroy {}: {}",
                    iface,
                    output.stderr.trim()
                )),
                Err(e) => self.events.warn(format!("Failed to destroy {}: {}", iface, e)),
            }
        }
        destroyed
    }

    // ========================================
    // Helpers
    // ========================================

    /// Stop whatever sequence is still running.
    async fn supersede_in_flight(&self) {
        if self.sequencer.cancel().await {
            self.events.info("Stopped the running command sequence");
        }
    }

    async fn start_sequence(&self, steps: Vec<CommandStep>) -> SequenceHandle {
        let events = self.events.clone();
        self.sequencer
            .start(steps, move |event| events.send(SessionEvent::Sequence(event)))
            .await
    }

    fn report_failure(&self, name: &str, what: &str, report: SequenceReport) -> Error {
        let err = match report.into_result() {
            Err(e) => e,
            Ok(_) => Error::Internal(format!("{} of {} did not complete", what, name)),
        };
        self.events
            .error(format!("{} of {} failed: {}", what, name, err));
        err
    }

    fn log_output(&self, output: &CommandOutput) {
        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            self.events.info(line);
        }
        for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
            self.events.warn(line);
        }
    }

    /// Run an elevated command asynchronously and capture its output.
    async fn capture_elevated(&self, args: &[String]) -> Result<CommandOutput> {
        let spec = self.privilege.build_async_spec(args)?;
        run_captured(&spec, self.config.command_timeout()).await
    }
}

/// Unbound interfaces with the tunnel prefix outside the reserved range.
pub fn orphan_candidates(
    interfaces: &[String],
    bindings: &[InterfaceBinding],
    prefix: &str,
    reserved_max: u32,
) -> Vec<String> {
    interfaces
        .iter()
        .filter(|iface| {
            crate::network_utils::interface_number(iface, prefix).is_some()
                && !is_reserved_interface(iface, prefix, reserved_max)
                && !bindings.iter().any(|b| &b.interface == *iface)
        })
        .cloned()
        .collect()
}
