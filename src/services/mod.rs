// WG Profile Manager - Session Services
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Services behind profile activation and status.
//!
//! - Registry: read-only view of the helper's interface map
//! - Privilege: elevated command execution
//! - Process: child process spawning, output and termination
//! - Sequencer: ordered command execution with live output
//! - Exclusivity: full-tunnel activation planning
//! - Orchestrator: per-profile session state machine
//! - Diagnostics: post-connect pings
//! - Monitor: periodic status refresh

pub mod diagnostics;
pub mod events;
pub mod exclusivity;
pub mod monitor;
pub mod orchestrator;
pub mod privilege;
pub mod process;
pub mod registry;
pub mod sequencer;

pub use events::{event_channel, EventSender, LogLevel, SessionEvent};
pub use monitor::spawn_status_monitor;
pub use orchestrator::{DeactivateAllSummary, SessionOrchestrator};
pub use privilege::{CommandOutput, CommandSpec, ElevationStrategy, PrivilegeAdapter};
pub use registry::{InterfaceBinding, InterfaceRegistry};
pub use sequencer::{CommandSequencer, CommandStep, OutputStream, SequenceEvent};
