use crate::command::ExitCode;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable, user-level state of the interpreter process.
///
/// The environment contains:
/// - `current_dir`: the working directory inherited by spawned commands.
/// - `should_exit`: set by `exit`; the read loop checks it after every line.
/// - `last_status`: exit status of the most recent command.
#[derive(Debug, Clone)]
pub struct Environment {
    pub current_dir: PathBuf,
    pub should_exit: bool,
    pub last_status: ExitCode,
}

impl Environment {
    /// Capture the current working directory of the process.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            current_dir,
            should_exit: false,
            last_status: 0,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes tests that change the working directory of the test process.
#[cfg(test)]
pub(crate) fn lock_current_dir() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
