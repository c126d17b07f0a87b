// WG Profile Manager - Privilege Escalation
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Privilege escalation for helper and daemon commands.
//!
//! The adapter only decides how a command is invoked. It never interprets
//! exit codes or output; those are passed through to the caller verbatim.
//!
//! Strategy precedence:
//! 1. `doas` or `sudo -n` when either is configured for passwordless use
//! 2. `osascript ... with administrator privileges` on macOS
//! 3. `sudo -A` with an askpass helper when one is discoverable
//! 4. the bare tool, which may block waiting for a terminal password

use once_cell::sync::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

use super::process::run_captured_blocking;
use crate::models::{AppConfig, ElevationPreference, Error, Result};

/// Askpass helpers probed when none is configured.
const ASKPASS_CANDIDATES: &[&str] = &["ssh-askpass", "ssh-askpass-gui"];

/// Environment variable sudo reads the askpass helper from.
const ASKPASS_ENV: &str = "SUDO_ASKPASS";

static SYSTEM_PROBE: OnceCell<ElevationProbe> = OnceCell::new();

/// Privilege escalation tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationTool {
    Doas,
    Sudo,
}

impl ElevationTool {
    pub fn program(&self) -> &'static str {
        match self {
            Self::Doas => "doas",
            Self::Sudo => "sudo",
        }
    }
}

/// How privileged commands are invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevationStrategy {
    /// Run as-is; the process already has the rights it needs.
    Direct,
    /// The tool runs without asking for a password.
    Passwordless(ElevationTool),
    /// macOS administrator prompt through AppleScript.
    AdminPrompt,
    /// `sudo -A` with a graphical askpass helper.
    Askpass(PathBuf),
    /// Bare tool. May block on a terminal password prompt.
    Interactive(ElevationTool),
}

impl fmt::Display for ElevationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Passwordless(tool) => write!(f, "{} (passwordless)", tool.program()),
            Self::AdminPrompt => write!(f, "osascript administrator prompt"),
            Self::Askpass(helper) => write!(f, "sudo -A ({})", helper.display()),
            Self::Interactive(tool) => write!(f, "{} (interactive)", tool.program()),
        }
    }
}

/// What the host offers for escalation. Probed once per process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElevationProbe {
    pub doas_installed: bool,
    pub sudo_installed: bool,
    pub doas_passwordless: bool,
    pub sudo_passwordless: bool,
    /// macOS with `osascript` available.
    pub admin_prompt: bool,
    /// First askpass helper found in PATH.
    pub askpass: Option<PathBuf>,
}

impl ElevationProbe {
    /// Probe the host, caching the result for the process lifetime.
    pub fn system() -> &'static ElevationProbe {
        SYSTEM_PROBE.get_or_init(Self::run)
    }

    fn run() -> Self {
        let doas_installed = command_exists("doas");
        let sudo_installed = command_exists("sudo");
        // A non-zero exit only means a password is required.
        let doas_passwordless = doas_installed && probe_noop("doas");
        let sudo_passwordless = sudo_installed && probe_noop("sudo");
        let admin_prompt = cfg!(target_os = "macos") && command_exists("osascript");
        let askpass = ASKPASS_CANDIDATES.iter().find_map(|c| which(c));

        let probe = Self {
            doas_installed,
            sudo_installed,
            doas_passwordless,
            sudo_passwordless,
            admin_prompt,
            askpass,
        };
        debug!("Elevation probe: {:?}", probe);
        probe
    }
}

/// A process launch description for callers that stream output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    /// Command line for log output.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit code and captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// None when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs commands with elevated rights.
#[derive(Debug, Clone)]
pub struct PrivilegeAdapter {
    strategy: ElevationStrategy,
}

impl PrivilegeAdapter {
    /// Pick a strategy from configuration and the cached host probe.
    pub fn detect(config: &AppConfig) -> Result<Self> {
        let mut probe = ElevationProbe::system().clone();
        if let Some(askpass) = &config.askpass {
            probe.askpass = Some(askpass.clone());
        }
        let strategy = choose_strategy(config.elevation, &probe)?;
        info!("Privilege escalation: {}", strategy);
        Ok(Self { strategy })
    }

    pub fn with_strategy(strategy: ElevationStrategy) -> Self {
        Self { strategy }
    }

    /// Adapter for a process that is already privileged.
    pub fn direct() -> Self {
        Self::with_strategy(ElevationStrategy::Direct)
    }

    pub fn strategy(&self) -> &ElevationStrategy {
        &self.strategy
    }

    /// Describe how to launch `args` elevated, for asynchronous callers.
    pub fn build_async_spec(&self, args: &[String]) -> Result<CommandSpec> {
        let (first, rest) = args
            .split_first()
            .ok_or_else(|| Error::Internal("Empty command".to_string()))?;

        let spec = match &self.strategy {
            ElevationStrategy::Direct => CommandSpec::new(first.clone(), rest.to_vec()),
            ElevationStrategy::Passwordless(ElevationTool::Doas) => {
                CommandSpec::new("doas", args.to_vec())
            }
            ElevationStrategy::Passwordless(ElevationTool::Sudo) => {
                CommandSpec::new("sudo", prepend("-n", args))
            }
            ElevationStrategy::AdminPrompt => CommandSpec::new(
                "osascript",
                vec!["-e".to_string(), admin_prompt_script(args)],
            ),
            ElevationStrategy::Askpass(helper) => {
                let mut spec = CommandSpec::new("sudo", prepend("-A", args));
                spec.env
                    .push((ASKPASS_ENV.to_string(), helper.to_string_lossy().into_owned()));
                spec
            }
            ElevationStrategy::Interactive(tool) => CommandSpec::new(tool.program(), args.to_vec()),
        };
        Ok(spec)
    }

    /// Run `args` elevated and wait for it to exit.
    ///
    /// A run longer than `timeout` is stopped and reported as a failed
    /// command with no exit code. Without a timeout this waits indefinitely.
    pub fn run_blocking(&self, args: &[String], timeout: Option<Duration>) -> Result<CommandOutput> {
        let spec = self.build_async_spec(args)?;
        debug!("Running elevated: {}", spec.display());
        run_captured_blocking(&spec, timeout)
    }
}

/// Choose an escalation strategy in precedence order.
pub fn choose_strategy(
    preference: ElevationPreference,
    probe: &ElevationProbe,
) -> Result<ElevationStrategy> {
    let candidates: &[ElevationTool] = match preference {
        ElevationPreference::Direct => return Ok(ElevationStrategy::Direct),
        ElevationPreference::Auto => &[ElevationTool::Doas, ElevationTool::Sudo],
        ElevationPreference::Doas => &[ElevationTool::Doas],
        ElevationPreference::Sudo => &[ElevationTool::Sudo],
    };

    let installed = |tool: &ElevationTool| match tool {
        ElevationTool::Doas => probe.doas_installed,
        ElevationTool::Sudo => probe.sudo_installed,
    };
    let passwordless = |tool: &ElevationTool| match tool {
        ElevationTool::Doas => probe.doas_passwordless,
        ElevationTool::Sudo => probe.sudo_passwordless,
    };

    if let Some(tool) = candidates.iter().find(|t| installed(t) && passwordless(t)) {
        return Ok(ElevationStrategy::Passwordless(*tool));
    }
    if probe.admin_prompt {
        return Ok(ElevationStrategy::AdminPrompt);
    }

    // Prompting falls back to sudo first; only sudo understands askpass.
    let fallback = candidates
        .iter()
        .rev()
        .find(|t| installed(t))
        .copied()
        .ok_or(Error::ElevationUnavailable)?;

    match (fallback, &probe.askpass) {
        (ElevationTool::Sudo, Some(helper)) => Ok(ElevationStrategy::Askpass(helper.clone())),
        (tool, _) => Ok(ElevationStrategy::Interactive(tool)),
    }
}

fn prepend(flag: &str, args: &[String]) -> Vec<String> {
    std::iter::once(flag.to_string())
        .chain(args.iter().cloned())
        .collect()
}

/// AppleScript running `args` as a shell command with an admin prompt.
fn admin_prompt_script(args: &[String]) -> String {
    let command = args
        .iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ");
    let escaped = command.replace('\\', "\\\\").replace('"', "\\\"");
    format!("do shell script \"{}\" with administrator privileges", escaped)
}

/// Quote a word for `/bin/sh`.
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Check if a command exists in PATH.
pub fn command_exists(cmd: &str) -> bool {
    which(cmd).is_some()
}

fn which(cmd: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(cmd).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// Run `<tool> -n true` and report whether it succeeded.
fn probe_noop(tool: &str) -> bool {
    Command::new(tool)
        .args(["-n", "true"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check that an executable helper exists at `path`.
pub fn helper_exists(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn probe() -> ElevationProbe {
        ElevationProbe {
            doas_installed: true,
            sudo_installed: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_passwordless_doas_wins() {
        let mut p = probe();
        p.doas_passwordless = true;
        p.sudo_passwordless = true;
        p.admin_prompt = true;
        assert_eq!(
            choose_strategy(ElevationPreference::Auto, &p).unwrap(),
            ElevationStrategy::Passwordless(ElevationTool::Doas)
        );
        assert_eq!(
            choose_strategy(ElevationPreference::Sudo, &p).unwrap(),
            ElevationStrategy::Passwordless(ElevationTool::Sudo)
        );
    }

    #[test]
    fn test_admin_prompt_before_askpass() {
        let mut p = probe();
        p.admin_prompt = true;
        p.askpass = Some(PathBuf::from("/usr/bin/ssh-askpass"));
        assert_eq!(
            choose_strategy(ElevationPreference::Auto, &p).unwrap(),
            ElevationStrategy::AdminPrompt
        );
    }

    #[test]
    fn test_askpass_then_interactive() {
        let mut p = probe();
        p.askpass = Some(PathBuf::from("/usr/bin/ssh-askpass"));
        assert_eq!(
            choose_strategy(ElevationPreference::Auto, &p).unwrap(),
            ElevationStrategy::Askpass(PathBuf::from("/usr/bin/ssh-askpass"))
        );
        // doas has no askpass support.
        assert_eq!(
            choose_strategy(ElevationPreference::Doas, &p).unwrap(),
            ElevationStrategy::Interactive(ElevationTool::Doas)
        );
        p.askpass = None;
        assert_eq!(
            choose_strategy(ElevationPreference::Auto, &p).unwrap(),
            ElevationStrategy::Interactive(ElevationTool::Sudo)
        );
    }

    #[test]
    fn test_nothing_installed() {
        let p = ElevationProbe::default();
        assert!(matches!(
            choose_strategy(ElevationPreference::Auto, &p),
            Err(Error::ElevationUnavailable)
        ));
        assert_eq!(
            choose_strategy(ElevationPreference::Direct, &p).unwrap(),
            ElevationStrategy::Direct
        );
    }

    #[test]
    fn test_async_specs() {
        let cmd = args(&["/opt/helper.sh", "up", "vpn1.conf"]);

        let spec = PrivilegeAdapter::direct().build_async_spec(&cmd).unwrap();
        assert_eq!(spec.program, "/opt/helper.sh");
        assert_eq!(spec.args, args(&["up", "vpn1.conf"]));

        let spec = PrivilegeAdapter::with_strategy(ElevationStrategy::Passwordless(ElevationTool::Sudo))
            .build_async_spec(&cmd)
            .unwrap();
        assert_eq!(spec.program, "sudo");
        assert_eq!(spec.args, args(&["-n", "/opt/helper.sh", "up", "vpn1.conf"]));

        let spec = PrivilegeAdapter::with_strategy(ElevationStrategy::Askpass(PathBuf::from("/bin/ap")))
            .build_async_spec(&cmd)
            .unwrap();
        assert_eq!(spec.args[0], "-A");
        assert_eq!(spec.env, vec![("SUDO_ASKPASS".to_string(), "/bin/ap".to_string())]);

        assert!(PrivilegeAdapter::direct().build_async_spec(&[]).is_err());
    }

    #[test]
    fn test_admin_prompt_quoting() {
        let spec = PrivilegeAdapter::with_strategy(ElevationStrategy::AdminPrompt)
            .build_async_spec(&args(&["/opt/helper.sh", "up", "my vpn.conf"]))
            .unwrap();
        assert_eq!(spec.program, "osascript");
        assert_eq!(
            spec.args[1],
            "do shell script \"/opt/helper.sh up 'my vpn.conf'\" with administrator privileges"
        );
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_run_blocking_passes_output_through() {
        let out = PrivilegeAdapter::direct()
            .run_blocking(&args(&["sh", "-c", "echo hello; echo oops >&2; exit 3"]), None)
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.success());
    }

    #[test]
    fn test_run_blocking_missing_program() {
        let result = PrivilegeAdapter::direct()
            .run_blocking(&args(&["/nonexistent/wg-helper"]), None);
        assert!(matches!(result, Err(Error::SpawnFailed { .. })));
    }

    #[test]
    fn test_run_blocking_timeout() {
        let result = PrivilegeAdapter::direct()
            .run_blocking(&args(&["sleep", "10"]), Some(Duration::from_millis(100)));
        assert!(matches!(
            result,
            Err(Error::CommandFailed { exit_code: None, .. })
        ));
    }
}
