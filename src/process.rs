//! Operating-system process control behind a trait, so the job table and the engine can
//! be driven by a scripted fake in tests.

use crate::command::ExitCode;
use crate::error::{Result, ShellError};
use crate::plan::ExecutionPlan;
use crate::{signals, spawn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::fmt;

/// Raw termination status of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Exited(i32),
    Signaled(Signal),
}

impl Completion {
    pub fn success(self) -> bool {
        self == Completion::Exited(0)
    }

    /// Shell-style status: the exit code, or 128 plus the signal number.
    pub fn code(self) -> ExitCode {
        match self {
            Completion::Exited(code) => code,
            Completion::Signaled(signal) => 128 + signal as i32,
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Exited(code) => write!(f, "exit {code}"),
            Completion::Signaled(signal) => write!(f, "killed by {}", signal.as_str()),
        }
    }
}

/// What a single wait on a child observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Finished(Completion),
    Stopped,
    /// The wait was interrupted by a signal delivered to the interpreter. Carries the signal
    /// the caller should forward to the awaited processes, if any.
    Interrupted(Option<Signal>),
}

/// Process-creation and process-status primitives used by the engine.
pub trait ProcessControl {
    /// Create every process of `plan`, in pipeline order, and return their ids.
    fn spawn(&mut self, plan: &ExecutionPlan) -> Result<Vec<Pid>>;

    /// Block until `pid` terminates, stops, or the wait is interrupted by a signal.
    fn wait(&mut self, pid: Pid) -> Result<WaitOutcome>;

    /// Collect one terminated or stopped child without blocking.
    fn try_reap(&mut self) -> Result<Option<(Pid, WaitOutcome)>>;

    fn signal(&mut self, pid: Pid, signal: Signal) -> Result<()>;
}

/// [`ProcessControl`] backed by `fork`/`exec`/`waitpid`/`kill`.
#[derive(Debug, Default)]
pub struct OsProcesses;

impl OsProcesses {
    pub fn new() -> Self {
        Self
    }
}

fn finished(status: WaitStatus) -> Option<(Pid, WaitOutcome)> {
    match status {
        WaitStatus::Exited(pid, code) => {
            Some((pid, WaitOutcome::Finished(Completion::Exited(code))))
        }
        WaitStatus::Signaled(pid, signal, _) => {
            Some((pid, WaitOutcome::Finished(Completion::Signaled(signal))))
        }
        WaitStatus::Stopped(pid, _) => Some((pid, WaitOutcome::Stopped)),
        _ => None,
    }
}

impl ProcessControl for OsProcesses {
    fn spawn(&mut self, plan: &ExecutionPlan) -> Result<Vec<Pid>> {
        spawn::spawn(plan)
    }

    fn wait(&mut self, pid: Pid) -> Result<WaitOutcome> {
        loop {
            match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
                Ok(status) => {
                    if let Some((_, outcome)) = finished(status) {
                        return Ok(outcome);
                    }
                }
                Err(Errno::EINTR) => {
                    return Ok(WaitOutcome::Interrupted(signals::take().forwardable()));
                }
                Err(source) => return Err(ShellError::WaitFailed { pid, source }),
            }
        }
    }

    fn try_reap(&mut self) -> Result<Option<(Pid, WaitOutcome)>> {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED;
        loop {
            match waitpid(None, Some(flags)) {
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => return Ok(None),
                Ok(status) => {
                    if let Some(reaped) = finished(status) {
                        return Ok(Some(reaped));
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(source) => {
                    return Err(ShellError::WaitFailed {
                        pid: Pid::from_raw(-1),
                        source,
                    });
                }
            }
        }
    }

    fn signal(&mut self, pid: Pid, signal: Signal) -> Result<()> {
        kill(pid, signal).map_err(|source| ShellError::SignalFailed { pid, source })
    }
}
