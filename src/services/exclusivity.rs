// WG Profile Manager - Full-Tunnel Exclusivity
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Activation planning.
//!
//! At most one full-tunnel profile may be bound at a time. Activating a
//! full-tunnel profile first tears down every other bound full-tunnel
//! profile, each followed by a settle delay, then brings the requested
//! profile up.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::privilege::PrivilegeAdapter;
use super::registry::InterfaceBinding;
use super::sequencer::CommandStep;
use crate::models::{config_file_name, Profile, Result};

/// Helper script verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperVerb {
    Up,
    Down,
    List,
}

impl HelperVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::List => "list",
        }
    }
}

/// Argument vector for one helper invocation.
pub fn helper_args(helper: &Path, verb: HelperVerb, profile_name: Option<&str>) -> Vec<String> {
    let mut args = vec![
        helper.to_string_lossy().into_owned(),
        verb.as_str().to_string(),
    ];
    if let Some(name) = profile_name {
        args.push(config_file_name(name));
    }
    args
}

/// Elevated helper step acting on one profile.
pub fn helper_step(
    helper: &Path,
    verb: HelperVerb,
    profile_name: &str,
    privilege: &PrivilegeAdapter,
) -> Result<CommandStep> {
    let spec = privilege.build_async_spec(&helper_args(helper, verb, Some(profile_name)))?;
    Ok(CommandStep::new(
        format!("{} {}", verb.as_str(), config_file_name(profile_name)),
        spec,
    ))
}

/// Commands needed to activate one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationPlan {
    pub profile_name: String,
    /// Full-tunnel bindings to tear down first, in registry order.
    pub teardown: Vec<InterfaceBinding>,
}

impl ActivationPlan {
    /// Build the sequence: each teardown with its settle delay, then `up`.
    pub fn steps(
        &self,
        helper: &Path,
        privilege: &PrivilegeAdapter,
        settle: Duration,
    ) -> Result<Vec<CommandStep>> {
        let mut steps = Vec::with_capacity(self.teardown.len() + 1);
        for binding in &self.teardown {
            steps.push(
                helper_step(helper, HelperVerb::Down, &binding.profile_name, privilege)?
                    .with_settle(settle),
            );
        }
        steps.push(helper_step(helper, HelperVerb::Up, &self.profile_name, privilege)?);
        Ok(steps)
    }
}

/// Plan the activation of `profile`.
///
/// `load` parses a bound profile's config. A bound profile that cannot be
/// parsed is logged and left alone.
pub fn plan_activation<F>(profile: &Profile, bindings: &[InterfaceBinding], load: F) -> ActivationPlan
where
    F: FnMut(&InterfaceBinding) -> Result<Profile>,
{
    let teardown = if profile.is_full_tunnel() {
        full_tunnel_conflicts(&profile.name, bindings, load)
    } else {
        Vec::new()
    };
    ActivationPlan {
        profile_name: profile.name.clone(),
        teardown,
    }
}

/// Every bound full-tunnel profile other than `requested`.
///
/// Exhaustive: if a registry race left several full tunnels bound, all of
/// them are returned.
pub fn full_tunnel_conflicts<F>(
    requested: &str,
    bindings: &[InterfaceBinding],
    mut load: F,
) -> Vec<InterfaceBinding>
where
    F: FnMut(&InterfaceBinding) -> Result<Profile>,
{
    let mut seen = HashSet::new();
    bindings
        .iter()
        .filter(|b| b.profile_name != requested)
        .filter(|b| seen.insert(b.profile_name.clone()))
        .filter(|b| match load(b) {
            Ok(bound) => {
                let full = bound.is_full_tunnel();
                debug!(
                    "Bound profile {} on {} is {}",
                    b.profile_name,
                    b.interface,
                    if full { "full-tunnel" } else { "split" }
                );
                full
            }
            Err(e) => {
                warn!("Skipping bound profile {}: {}", b.profile_name, e);
                false
            }
        })
        .cloned()
        .collect()
}
