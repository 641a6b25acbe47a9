//! Process Supervisor
//!
//! Spawns the external commands under test and tracks every live one so an
//! operator abort can take them down. Each command runs through `sh -c` in
//! its own process group; package-manager launchers fork deep trees and the
//! group signal reaches all of them.
//!
//! `terminate_all` also closes the supervisor: any later `run` fails with
//! `SupervisorError::Closed` instead of spawning. The check and the
//! registration happen under the registry lock, so a spawn racing an abort is
//! either refused or tracked and killed.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Why a supervised command did not succeed
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The process could not be started or waited on
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[from] io::Error),

    /// The process exited with a nonzero code
    #[error("Process exited with code {0}")]
    ExitCode(i32),

    /// The process was killed by a signal
    #[error("Process terminated by signal {0}")]
    Signaled(i32),

    /// `terminate_all` already ran; nothing new is spawned
    #[error("Supervisor is shut down")]
    Closed,
}

impl SupervisorError {
    /// Exit code for `ExitCode`, `None` otherwise
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SupervisorError::ExitCode(code) => Some(*code),
            _ => None,
        }
    }
}

/// What happens to the child's stdout/stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Stream to the harness's own stdout/stderr
    #[default]
    Inherit,
    /// Collect into the returned `CommandOutput`
    Capture,
}

/// Options for one supervised command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Variables added to the inherited environment
    pub env: Vec<(String, String)>,
    /// Variables removed from the inherited environment
    pub env_remove: Vec<String>,
    /// Output handling
    pub output: OutputMode,
}

impl RunOptions {
    /// Run in `cwd`
    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Self::default()
        }
    }

    /// Add one environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add several environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Remove an inherited environment variable
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Capture output instead of inheriting it
    pub fn captured(mut self) -> Self {
        self.output = OutputMode::Capture;
        self
    }
}

/// Output of a successful command (empty unless captured)
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

#[derive(Debug, Clone)]
struct TrackedProcess {
    command: String,
}

#[derive(Debug, Default)]
struct Registry {
    processes: HashMap<u32, TrackedProcess>,
    closed: bool,
}

/// Registry of live child processes with graceful-then-forceful shutdown
#[derive(Debug)]
pub struct ProcessSupervisor {
    registry: Mutex<Registry>,
    grace: Duration,
}

/// Removes a pid from the registry when the wait ends, however it ends
struct Tracked<'a> {
    supervisor: &'a ProcessSupervisor,
    pid: u32,
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        self.supervisor.registry().processes.remove(&self.pid);
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ProcessSupervisor {
    /// Supervisor that waits `grace` between SIGTERM and SIGKILL
    pub fn new(grace: Duration) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            grace,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of processes currently tracked
    pub fn active_count(&self) -> usize {
        self.registry().processes.len()
    }

    /// Whether `terminate_all` has run
    pub fn is_closed(&self) -> bool {
        self.registry().closed
    }

    /// Run `command_line` to completion.
    ///
    /// Ok only on exit code 0. The process is tracked from spawn until it has
    /// been reaped. Fails with `Closed` without spawning once `terminate_all`
    /// has run.
    pub fn run(
        &self,
        command_line: &str,
        options: &RunOptions,
    ) -> Result<CommandOutput, SupervisorError> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(command_line).stdin(Stdio::null());
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }
        for key in &options.env_remove {
            command.env_remove(key);
        }
        for (key, value) in &options.env {
            command.env(key, value);
        }
        match options.output {
            OutputMode::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Capture => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = {
            let mut registry = self.registry();
            if registry.closed {
                tracing::debug!(command = command_line, "refusing to spawn after shutdown");
                return Err(SupervisorError::Closed);
            }
            let child = command.spawn()?;
            registry.processes.insert(
                child.id(),
                TrackedProcess {
                    command: command_line.to_string(),
                },
            );
            child
        };
        let pid = child.id();
        let _tracked = Tracked {
            supervisor: self,
            pid,
        };
        tracing::debug!(pid, command = command_line, "spawned");

        let output = child.wait_with_output()?;
        check_status(output.status)?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Close the supervisor and terminate every tracked process.
    ///
    /// SIGTERM to each process and its group, wait the grace window, SIGKILL
    /// whatever is still tracked, then forget them all. Delivery failures are
    /// ignored: the process is usually already gone.
    pub fn terminate_all(&self) {
        let snapshot: Vec<(u32, TrackedProcess)> = {
            let mut registry = self.registry();
            registry.closed = true;
            registry
                .processes
                .iter()
                .map(|(pid, p)| (*pid, p.clone()))
                .collect()
        };
        if snapshot.is_empty() {
            return;
        }

        tracing::warn!("Killing {} active child process(es)...", snapshot.len());
        for (pid, process) in &snapshot {
            tracing::debug!(pid, command = %process.command, "SIGTERM");
            signal_tree(*pid, Signal::Term);
        }

        std::thread::sleep(self.grace);

        let survivors: Vec<u32> = self.registry().processes.keys().copied().collect();
        for pid in survivors {
            tracing::debug!(pid, "SIGKILL");
            signal_tree(pid, Signal::Kill);
        }
        self.registry().processes.clear();
    }
}

fn check_status(status: ExitStatus) -> Result<(), SupervisorError> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(SupervisorError::ExitCode(code));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(SupervisorError::Signaled(signal));
        }
    }
    Err(SupervisorError::ExitCode(-1))
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

/// Signal the process group led by `pid`, then `pid` itself
#[cfg(unix)]
fn signal_tree(pid: u32, signal: Signal) {
    let sig = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a stale pid only yields ESRCH.
    unsafe {
        libc::kill(-pid, sig);
        libc::kill(pid, sig);
    }
}

#[cfg(not(unix))]
fn signal_tree(pid: u32, _signal: Signal) {
    tracing::warn!(pid, "process termination is not supported on this platform");
}
