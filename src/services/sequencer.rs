// WG Profile Manager - Command Sequencer
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Runs an ordered list of commands one at a time.
//!
//! Output is streamed line by line to a caller-supplied sink while each
//! command runs. The first non-zero exit halts the sequence; steps that
//! already ran keep their side effects.
//!
//! Only one sequence is in flight per sequencer. Starting a new one stops
//! the running command's process group and waits for the old driver to end
//! before the new sequence emits anything, so output from two sequences
//! never interleaves.
//!
//! Step advancement is a plain state machine ([`SequenceMachine`]) fed with
//! [`StepCompleted`] events. The async driver only does process I/O.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::privilege::CommandSpec;
use super::process::{deadline, spawn_piped, terminate, OutputPump, OUTPUT_DRAIN};
use crate::models::{SequenceOutcome, SequenceReport, StepResult, StepStatus};

/// Receives sequence events as they happen.
pub type EventSink = Arc<dyn Fn(SequenceEvent) + Send + Sync>;

/// One command of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    /// Short description for the log, e.g. "up vpn1.conf".
    pub label: String,
    pub spec: CommandSpec,
    /// Pause after the step succeeds, before the next one starts.
    pub settle_after: Option<Duration>,
}

impl CommandStep {
    pub fn new(label: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            label: label.into(),
            spec,
            settle_after: None,
        }
    }

    pub fn with_settle(mut self, delay: Duration) -> Self {
        self.settle_after = Some(delay);
        self
    }
}

pub use super::process::OutputStream;

/// Progress of a running sequence. Every event carries the sequence
/// generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEvent {
    StepStarted {
        generation: u64,
        index: usize,
        label: String,
        command: String,
    },
    Output {
        generation: u64,
        index: usize,
        stream: OutputStream,
        line: String,
    },
    StepCompleted {
        generation: u64,
        index: usize,
        status: StepStatus,
        exit_code: Option<i32>,
    },
    Finished {
        generation: u64,
        outcome: SequenceOutcome,
    },
}

impl SequenceEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::StepStarted { generation, .. }
            | Self::Output { generation, .. }
            | Self::StepCompleted { generation, .. }
            | Self::Finished { generation, .. } => *generation,
        }
    }
}

// ============================================================================
// Step state machine
// ============================================================================

/// Completion of one step, as reported to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCompleted {
    pub index: usize,
    /// None when the process was killed or never exited normally.
    pub exit_code: Option<i32>,
    pub output: Vec<String>,
}

/// What the sequence should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Launch(usize),
    Finished(SequenceOutcome),
}

/// Pure step sequencing logic, independent of any process I/O.
#[derive(Debug, Clone)]
pub struct SequenceMachine {
    len: usize,
    current: Option<usize>,
    finished: bool,
}

impl SequenceMachine {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            current: None,
            finished: false,
        }
    }

    /// First action of the sequence.
    pub fn start(&mut self) -> Advance {
        if self.len == 0 {
            self.finished = true;
            Advance::Finished(SequenceOutcome::Completed)
        } else {
            self.current = Some(0);
            Advance::Launch(0)
        }
    }

    /// Feed a step completion. Returns None for an event that does not
    /// belong to the running step.
    pub fn on_step_completed(&mut self, event: &StepCompleted) -> Option<Advance> {
        if self.finished || self.current != Some(event.index) {
            return None;
        }
        if event.exit_code != Some(0) {
            self.finish();
            return Some(Advance::Finished(SequenceOutcome::Failed {
                step: event.index,
                exit_code: event.exit_code,
            }));
        }
        let next = event.index + 1;
        if next >= self.len {
            self.finish();
            Some(Advance::Finished(SequenceOutcome::Completed))
        } else {
            self.current = Some(next);
            Some(Advance::Launch(next))
        }
    }

    /// The running step could not be launched.
    pub fn on_launch_failed(&mut self, index: usize, reason: impl Into<String>) -> Option<Advance> {
        if self.finished || self.current != Some(index) {
            return None;
        }
        self.finish();
        Some(Advance::Finished(SequenceOutcome::LaunchFailed {
            step: index,
            reason: reason.into(),
        }))
    }

    /// A newer sequence took over.
    pub fn supersede(&mut self) -> Advance {
        self.finish();
        Advance::Finished(SequenceOutcome::Superseded)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.current = None;
    }
}

// ============================================================================
// Async driver
// ============================================================================

struct InFlight {
    generation: u64,
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Handle to a started sequence.
#[derive(Debug)]
pub struct SequenceHandle {
    generation: u64,
    report: oneshot::Receiver<SequenceReport>,
}

impl SequenceHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the sequence to end.
    pub async fn wait(self) -> SequenceReport {
        match self.report.await {
            Ok(report) => report,
            Err(_) => {
                // Driver went away without reporting.
                let mut report = SequenceReport::new(self.generation);
                report.finalize(SequenceOutcome::Superseded);
                report
            }
        }
    }
}

/// Runs one command sequence at a time.
pub struct CommandSequencer {
    generation: AtomicU64,
    in_flight: Mutex<Option<InFlight>>,
    step_timeout: Option<Duration>,
}

impl Default for CommandSequencer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CommandSequencer {
    /// Create a sequencer. Steps running longer than `step_timeout` are stopped.
    pub fn new(step_timeout: Option<Duration>) -> Self {
        Self {
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            step_timeout,
        }
    }

    /// Start a sequence, superseding any sequence still in flight.
    pub async fn start<F>(&self, steps: Vec<CommandStep>, sink: F) -> SequenceHandle
    where
        F: Fn(SequenceEvent) + Send + Sync + 'static,
    {
        let mut slot = self.in_flight.lock().await;
        if let Some(previous) = slot.take() {
            stop_in_flight(previous).await;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (report_tx, report_rx) = oneshot::channel();
        let sink: EventSink = Arc::new(sink);
        let timeout = self.step_timeout;

        debug!("Starting sequence {} with {} step(s)", generation, steps.len());
        let task = tokio::spawn(async move {
            let report = drive(generation, steps, sink, cancel_rx, timeout).await;
            let _ = report_tx.send(report);
        });

        *slot = Some(InFlight {
            generation,
            cancel: cancel_tx,
            task,
        });

        SequenceHandle {
            generation,
            report: report_rx,
        }
    }

    /// Stop the in-flight sequence, if any. Returns whether one was running.
    pub async fn cancel(&self) -> bool {
        let previous = self.in_flight.lock().await.take();
        match previous {
            Some(previous) if !previous.task.is_finished() => {
                stop_in_flight(previous).await;
                true
            }
            _ => false,
        }
    }
}

async fn stop_in_flight(previous: InFlight) {
    if !previous.task.is_finished() {
        info!("Superseding sequence {}", previous.generation);
    }
    // The receiver is gone once the driver has finished.
    let _ = previous.cancel.send(());
    if let Err(e) = previous.task.await {
        warn!("Sequence {} task ended abnormally: {}", previous.generation, e);
    }
}

enum StepRun {
    Exited(StepResult),
    LaunchFailed(StepResult, String),
    Cancelled(StepResult),
}

async fn drive(
    generation: u64,
    steps: Vec<CommandStep>,
    sink: EventSink,
    mut cancel: oneshot::Receiver<()>,
    timeout: Option<Duration>,
) -> SequenceReport {
    let mut report = SequenceReport::new(generation);
    let mut machine = SequenceMachine::new(steps.len());
    let mut advance = machine.start();

    loop {
        let index = match advance {
            Advance::Launch(index) => index,
            Advance::Finished(outcome) => {
                for (index, step) in steps.iter().enumerate().skip(report.steps.len()) {
                    report.steps.push(StepResult::skipped(index, step.spec.display()));
                }
                debug!("Sequence {} finished: {:?}", generation, outcome);
                report.finalize(outcome.clone());
                sink(SequenceEvent::Finished {
                    generation,
                    outcome,
                });
                return report;
            }
        };

        let step = &steps[index];
        sink(SequenceEvent::StepStarted {
            generation,
            index,
            label: step.label.clone(),
            command: step.spec.display(),
        });

        let next = match run_step(generation, index, step, &sink, &mut cancel, timeout).await {
            StepRun::Exited(result) => {
                sink(SequenceEvent::StepCompleted {
                    generation,
                    index,
                    status: result.status,
                    exit_code: result.exit_code,
                });
                let completed = StepCompleted {
                    index,
                    exit_code: result.exit_code,
                    output: result.output.clone(),
                };
                let succeeded = result.status.is_success();
                report.steps.push(result);

                if succeeded {
                    if let Some(delay) = step.settle_after {
                        debug!("Settling {:?} after step {}", delay, index);
                        tokio::select! {
                            _ = &mut cancel => {
                                advance = machine.supersede();
                                continue;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                machine.on_step_completed(&completed)
            }
            StepRun::LaunchFailed(result, reason) => {
                sink(SequenceEvent::StepCompleted {
                    generation,
                    index,
                    status: result.status,
                    exit_code: None,
                });
                report.steps.push(result);
                machine.on_launch_failed(index, reason)
            }
            StepRun::Cancelled(result) => {
                report.steps.push(result);
                Some(machine.supersede())
            }
        };

        advance = next.unwrap_or_else(|| machine.supersede());
    }
}

async fn run_step(
    generation: u64,
    index: usize,
    step: &CommandStep,
    sink: &EventSink,
    cancel: &mut oneshot::Receiver<()>,
    timeout: Option<Duration>,
) -> StepRun {
    let started_at = Utc::now();
    let started = Instant::now();
    let command = step.spec.display();
    let result = |status: StepStatus, exit_code: Option<i32>, output: Vec<String>| StepResult {
        index,
        command: command.clone(),
        status,
        exit_code,
        output,
        duration_ms: started.elapsed().as_millis() as u64,
        started_at,
    };

    let mut child = match spawn_piped(&step.spec) {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to launch {}: {}", step.spec.program, e);
            return StepRun::LaunchFailed(
                result(StepStatus::LaunchFailed, None, Vec::new()),
                e.to_string(),
            );
        }
    };

    let mut pump = OutputPump::take(&mut child);
    let mut output = Vec::new();

    let limit = deadline(timeout);
    tokio::pin!(limit);

    // The step ends when the process exits, even if something it started
    // in the background still holds the pipes.
    let wait = loop {
        tokio::select! {
            _ = &mut *cancel => {
                terminate(&mut child).await;
                return StepRun::Cancelled(result(StepStatus::Cancelled, None, output));
            }
            _ = &mut limit => {
                warn!("Step {} exceeded its timeout, stopping {}", index, step.spec.program);
                terminate(&mut child).await;
                return StepRun::Exited(result(StepStatus::TimedOut, None, output));
            }
            item = pump.next(), if pump.is_open() => {
                if let Some((stream, line)) = item {
                    emit_line(generation, index, stream, line, sink, &mut output);
                }
            }
            status = child.wait() => break status,
        }
    };

    pump.drain(OUTPUT_DRAIN, |stream, line| {
        emit_line(generation, index, stream, line, sink, &mut output)
    })
    .await;

    match wait {
        Ok(status) => {
            let code = status.code();
            let step_status = if code == Some(0) {
                StepStatus::Success
            } else {
                StepStatus::Failed
            };
            StepRun::Exited(result(step_status, code, output))
        }
        Err(e) => {
            warn!("Failed to wait for {}: {}", step.spec.program, e);
            StepRun::Exited(result(StepStatus::Failed, None, output))
        }
    }
}

fn emit_line(
    generation: u64,
    index: usize,
    stream: OutputStream,
    line: String,
    sink: &EventSink,
    output: &mut Vec<String>,
) {
    output.push(line.clone());
    sink(SequenceEvent::Output {
        generation,
        index,
        stream,
        line,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn sh(script: &str) -> CommandStep {
        CommandStep::new(
            script,
            CommandSpec::new("sh", vec!["-c".to_string(), script.to_string()]),
        )
    }

    fn collector() -> (Arc<StdMutex<Vec<SequenceEvent>>>, impl Fn(SequenceEvent) + Send + Sync + 'static) {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink_events = events.clone();
        (events, move |event| sink_events.lock().unwrap().push(event))
    }

    fn done(index: usize, exit_code: Option<i32>) -> StepCompleted {
        StepCompleted {
            index,
            exit_code,
            output: Vec::new(),
        }
    }

    #[test]
    fn test_machine_halts_on_failure() {
        let mut machine = SequenceMachine::new(3);
        assert_eq!(machine.start(), Advance::Launch(0));
        assert_eq!(machine.on_step_completed(&done(0, Some(0))), Some(Advance::Launch(1)));
        assert_eq!(
            machine.on_step_completed(&done(1, Some(1))),
            Some(Advance::Finished(SequenceOutcome::Failed {
                step: 1,
                exit_code: Some(1),
            }))
        );
        assert!(machine.is_finished());
        // Nothing launches after the failure.
        assert_eq!(machine.on_step_completed(&done(2, Some(0))), None);
    }

    #[test]
    fn test_machine_ignores_stale_events() {
        let mut machine = SequenceMachine::new(2);
        machine.start();
        assert_eq!(machine.on_step_completed(&done(1, Some(0))), None);
        assert_eq!(machine.on_step_completed(&done(0, Some(0))), Some(Advance::Launch(1)));
        assert_eq!(
            machine.on_step_completed(&done(1, Some(0))),
            Some(Advance::Finished(SequenceOutcome::Completed))
        );
    }

    #[test]
    fn test_machine_empty_and_killed() {
        let mut machine = SequenceMachine::new(0);
        assert_eq!(machine.start(), Advance::Finished(SequenceOutcome::Completed));

        let mut machine = SequenceMachine::new(1);
        machine.start();
        assert_eq!(
            machine.on_step_completed(&done(0, None)),
            Some(Advance::Finished(SequenceOutcome::Failed {
                step: 0,
                exit_code: None,
            }))
        );
    }

    #[tokio::test]
    async fn test_failure_stops_later_steps() {
        let dir = tempfile::tempdir().unwrap();
        let marker_a = dir.path().join("a");
        let marker_c = dir.path().join("c");
        let steps = vec![
            sh(&format!("touch {}; exit 0", marker_a.display())),
            sh("echo failing; exit 1"),
            sh(&format!("touch {}; exit 0", marker_c.display())),
        ];

        let (events, sink) = collector();
        let sequencer = CommandSequencer::default();
        let report = sequencer.start(steps, sink).await.wait().await;

        assert_eq!(
            report.outcome,
            SequenceOutcome::Failed {
                step: 1,
                exit_code: Some(1),
            }
        );
        assert!(marker_a.exists());
        assert!(!marker_c.exists());
        assert_eq!(report.steps.len(), 3);
        assert_eq!(report.steps[2].status, StepStatus::Skipped);
        assert_eq!(report.failed_step().unwrap().output, vec!["failing"]);
        assert!(matches!(
            report.into_result(),
            Err(crate::models::Error::CommandFailed { step: 1, .. })
        ));

        let started: Vec<usize> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SequenceEvent::StepStarted { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_output_is_streamed_in_order() {
        let (events, sink) = collector();
        let sequencer = CommandSequencer::default();
        let report = sequencer
            .start(vec![sh("echo one; echo two; echo three >&2")], sink)
            .await
            .wait()
            .await;
        assert!(report.is_success());

        let events = events.lock().unwrap();
        let stdout: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                SequenceEvent::Output {
                    stream: OutputStream::Stdout,
                    line,
                    ..
                } => Some(line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stdout, vec!["one", "two"]);
        assert!(events.iter().any(|e| matches!(
            e,
            SequenceEvent::Output { stream: OutputStream::Stderr, line, .. } if line == "three"
        )));
        assert!(matches!(
            events.last(),
            Some(SequenceEvent::Finished {
                outcome: SequenceOutcome::Completed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_new_start_supersedes_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("stale");
        let fresh = dir.path().join("fresh");

        let (events, sink) = collector();
        let sink = Arc::new(sink);
        let sequencer = CommandSequencer::default();

        let first_sink = sink.clone();
        let first = sequencer
            .start(
                vec![
                    sh("echo first; sleep 5"),
                    sh(&format!("touch {}", stale.display())),
                ],
                move |e| first_sink(e),
            )
            .await;

        // Let the first command get going.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let second_sink = sink.clone();
        let second = sequencer
            .start(
                vec![sh(&format!("echo second; touch {}", fresh.display()))],
                move |e| second_sink(e),
            )
            .await;

        let first_report = first.wait().await;
        let second_report = second.wait().await;

        assert_eq!(first_report.outcome, SequenceOutcome::Superseded);
        assert_eq!(second_report.outcome, SequenceOutcome::Completed);
        assert!(fresh.exists());
        assert!(!stale.exists());

        // Once the second sequence speaks, the first never does again.
        let events = events.lock().unwrap();
        let handover = events
            .iter()
            .position(|e| e.generation() == second_report.generation)
            .unwrap();
        assert!(events[handover..]
            .iter()
            .all(|e| e.generation() == second_report.generation));
    }

    #[tokio::test]
    async fn test_step_timeout() {
        let (_events, sink) = collector();
        let sequencer = CommandSequencer::new(Some(Duration::from_millis(200)));
        let report = sequencer
            .start(vec![sh("sleep 5"), sh("true")], sink)
            .await
            .wait()
            .await;
        assert_eq!(
            report.outcome,
            SequenceOutcome::Failed {
                step: 0,
                exit_code: None,
            }
        );
        assert_eq!(report.steps[0].status, StepStatus::TimedOut);
        assert_eq!(report.steps[1].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let (_events, sink) = collector();
        let sequencer = CommandSequencer::default();
        let step = CommandStep::new("missing", CommandSpec::new("/nonexistent/helper", Vec::new()));
        let report = sequencer.start(vec![step], sink).await.wait().await;
        assert!(matches!(
            report.outcome,
            SequenceOutcome::LaunchFailed { step: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_settle_delay_between_steps() {
        let (_events, sink) = collector();
        let sequencer = CommandSequencer::default();
        let steps = vec![
            sh("true").with_settle(Duration::from_millis(300)),
            sh("true"),
        ];
        let started = Instant::now();
        let report = sequencer.start(steps, sink).await.wait().await;
        assert!(report.is_success());
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_superseded_step_stops_wrapped_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let (_events, sink) = collector();
        let sink = Arc::new(sink);
        let sequencer = CommandSequencer::default();

        // The outer shell waits on its child the way sudo and doas do.
        let first_sink = sink.clone();
        let first = sequencer
            .start(
                vec![sh(&format!(
                    "sh -c 'sleep 1; touch {}'; echo wrapper-done",
                    marker.display()
                ))],
                move |e| first_sink(e),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let second_sink = sink.clone();
        let second = sequencer.start(vec![sh("true")], move |e| second_sink(e)).await;

        assert_eq!(first.wait().await.outcome, SequenceOutcome::Superseded);
        assert_eq!(second.wait().await.outcome, SequenceOutcome::Completed);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_does_not_break_step() {
        let (events, sink) = collector();
        let sequencer = CommandSequencer::default();
        let script = r"printf 'ok\n\377\376bad\n'; sleep 0.3; i=0; while [ $i -lt 2000 ]; do echo line $i; i=$((i+1)); done; exit 0";
        let report = sequencer.start(vec![sh(script)], sink).await.wait().await;

        assert_eq!(report.outcome, SequenceOutcome::Completed);
        let lines = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SequenceEvent::Output { .. }))
            .count();
        assert_eq!(lines, 2002);
        assert_eq!(report.steps[0].output[1], "\u{fffd}\u{fffd}bad");
    }

    #[tokio::test]
    async fn test_step_ends_when_process_exits() {
        let (_events, sink) = collector();
        let sequencer = CommandSequencer::default();
        let started = Instant::now();
        let report = sequencer
            .start(vec![sh("sleep 4 & echo launched; exit 0")], sink)
            .await
            .wait()
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(report.outcome, SequenceOutcome::Completed);
        assert_eq!(report.steps[0].output, vec!["launched"]);
    }
}
