// WG Profile Manager - Sequence Results
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Result types for command sequences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Status of a single sequence step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step exited with code zero.
    Success,
    /// Step exited non-zero or was killed.
    Failed,
    /// Step exceeded the configured command timeout.
    TimedOut,
    /// Step could not be launched.
    LaunchFailed,
    /// Step was terminated because a newer sequence took over.
    Cancelled,
    /// Step never ran because an earlier step failed.
    Skipped,
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::LaunchFailed => "launch_failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }
}

/// Result of one executed (or skipped) step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Zero-based position in the sequence.
    pub index: usize,
    /// Command line as displayed in the log.
    pub command: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Captured stdout and stderr lines, in arrival order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl StepResult {
    /// A step that never ran.
    pub fn skipped(index: usize, command: impl Into<String>) -> Self {
        Self {
            index,
            command: command.into(),
            status: StepStatus::Skipped,
            exit_code: None,
            output: Vec::new(),
            duration_ms: 0,
            started_at: Utc::now(),
        }
    }
}

/// How a sequence ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SequenceOutcome {
    /// Every step exited with code zero.
    Completed,
    /// A step failed; later steps never ran.
    Failed { step: usize, exit_code: Option<i32> },
    /// A step could not be launched at all.
    LaunchFailed { step: usize, reason: String },
    /// A newer sequence terminated this one.
    Superseded,
}

impl SequenceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Overall result of a command sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceReport {
    /// Sequence generation (increments on every start).
    pub generation: u64,
    pub outcome: SequenceOutcome,
    pub steps: Vec<StepResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_duration_ms: u64,
}

impl SequenceReport {
    /// Create an empty report for a sequence that is about to start.
    pub fn new(generation: u64) -> Self {
        let now = Utc::now();
        Self {
            generation,
            outcome: SequenceOutcome::Completed,
            steps: Vec::new(),
            started_at: now,
            completed_at: now,
            total_duration_ms: 0,
        }
    }

    /// Finalize the report with its outcome.
    pub fn finalize(&mut self, outcome: SequenceOutcome) {
        self.completed_at = Utc::now();
        self.total_duration_ms = (self.completed_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self.outcome = outcome;
    }

    /// The step that ended the sequence, if it did not complete.
    pub fn failed_step(&self) -> Option<&StepResult> {
        match &self.outcome {
            SequenceOutcome::Failed { step, .. } | SequenceOutcome::LaunchFailed { step, .. } => {
                self.steps.iter().find(|s| s.index == *step)
            }
            _ => None,
        }
    }

    /// Count steps that ran to a zero exit.
    pub fn success_count(&self) -> usize {
        self.steps.iter().filter(|s| s.status.is_success()).count()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Convert a failed outcome into the matching error.
    ///
    /// Superseded sequences are not errors.
    pub fn into_result(self) -> Result<Self> {
        match &self.outcome {
            SequenceOutcome::Failed { step, exit_code } => {
                let command = self
                    .failed_step()
                    .map(|s| s.command.clone())
                    .unwrap_or_default();
                Err(Error::command_failed(*step, command, *exit_code))
            }
            SequenceOutcome::LaunchFailed { step, reason } => {
                let program = self
                    .steps
                    .iter()
                    .find(|s| s.index == *step)
                    .map(|s| s.command.clone())
                    .unwrap_or_default();
                Err(Error::SpawnFailed {
                    program,
                    reason: reason.clone(),
                })
            }
            SequenceOutcome::Completed | SequenceOutcome::Superseded => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(index: usize, status: StepStatus, exit_code: Option<i32>) -> StepResult {
        StepResult {
            index,
            command: format!("cmd{}", index),
            status,
            exit_code,
            output: Vec::new(),
            duration_ms: 1,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_failed_report_maps_to_command_failed() {
        let mut report = SequenceReport::new(3);
        report.steps.push(step(0, StepStatus::Success, Some(0)));
        report.steps.push(step(1, StepStatus::Failed, Some(1)));
        report.steps.push(StepResult::skipped(2, "cmd2"));
        report.finalize(SequenceOutcome::Failed {
            step: 1,
            exit_code: Some(1),
        });

        assert_eq!(report.success_count(), 1);
        assert_eq!(report.failed_step().map(|s| s.command.as_str()), Some("cmd1"));
        match report.into_result() {
            Err(Error::CommandFailed {
                step,
                command,
                exit_code,
            }) => {
                assert_eq!(step, 1);
                assert_eq!(command, "cmd1");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_superseded_is_not_an_error() {
        let mut report = SequenceReport::new(1);
        report.finalize(SequenceOutcome::Superseded);
        assert!(!report.is_success());
        assert!(report.into_result().is_ok());
    }
}
