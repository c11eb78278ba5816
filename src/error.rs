//! Error type shared by the execution engine and its collaborators.

use crate::lexer::LexError;
use crate::plan::PlanError;
use nix::errno::Errno;
use nix::unistd::Pid;
use std::io;
use std::path::PathBuf;

/// Broad category of a [`ShellError`].
///
/// The category decides who is affected: system failures abort the current command,
/// child failures only ever surface as a non-zero exit status, and the rest are reported
/// to the user before any process is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A process, pipe, wait or signal primitive failed.
    FatalSystem,
    /// The target program is missing or not executable (reported by the child).
    ChildLaunch,
    /// A redirection file could not be opened (reported by the child).
    ResourceOpen,
    /// Malformed command line, bad builtin argument or unknown job.
    UserInput,
    /// The job table has no free slot.
    Capacity,
}

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("failed to create process: {0}")]
    SpawnFailed(#[source] Errno),

    #[error("failed to create pipe: {0}")]
    PipeCreateFailed(#[source] Errno),

    #[error("{program}: {source}")]
    ExecFailed {
        program: String,
        #[source]
        source: Errno,
    },

    #[error("{program}: command not found")]
    CommandNotFound { program: String },

    #[error("{}: {source}", path.display())]
    RedirectOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to redirect descriptor: {0}")]
    DescriptorFailed(#[source] Errno),

    #[error("failed to wait for process {pid}: {source}")]
    WaitFailed {
        pid: Pid,
        #[source]
        source: Errno,
    },

    #[error("failed to signal process {pid}: {source}")]
    SignalFailed {
        pid: Pid,
        #[source]
        source: Errno,
    },

    #[error("failed to install signal handler: {0}")]
    SignalSetup(#[source] Errno),

    #[error(transparent)]
    Syntax(#[from] LexError),

    #[error(transparent)]
    InvalidCommand(#[from] PlanError),

    #[error("argument contains a NUL byte: {0:?}")]
    NulByte(String),

    #[error("job table is full ({capacity} jobs)")]
    JobTableFull { capacity: usize },

    #[error("no such job: {0}")]
    NoSuchJob(usize),

    #[error("no active jobs")]
    NoActiveJobs,

    #[error("no such command in history: {0}")]
    HistoryNotFound(String),
}

impl ShellError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShellError::SpawnFailed(_)
            | ShellError::PipeCreateFailed(_)
            | ShellError::DescriptorFailed(_)
            | ShellError::WaitFailed { .. }
            | ShellError::SignalFailed { .. }
            | ShellError::SignalSetup(_) => ErrorKind::FatalSystem,
            ShellError::ExecFailed { .. } | ShellError::CommandNotFound { .. } => {
                ErrorKind::ChildLaunch
            }
            ShellError::RedirectOpenFailed { .. } => ErrorKind::ResourceOpen,
            ShellError::Syntax(_)
            | ShellError::InvalidCommand(_)
            | ShellError::NulByte(_)
            | ShellError::NoSuchJob(_)
            | ShellError::NoActiveJobs
            | ShellError::HistoryNotFound(_) => ErrorKind::UserInput,
            ShellError::JobTableFull { .. } => ErrorKind::Capacity,
        }
    }
}

pub type Result<T, E = ShellError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_error_is_reported_with_capacity() {
        let err = ShellError::JobTableFull { capacity: 50 };
        assert_eq!(err.kind(), ErrorKind::Capacity);
        assert_eq!(err.to_string(), "job table is full (50 jobs)");
    }

    #[test]
    fn test_child_errors_are_classified() {
        let not_found = ShellError::CommandNotFound {
            program: "nope".to_string(),
        };
        assert_eq!(not_found.kind(), ErrorKind::ChildLaunch);
        assert_eq!(not_found.to_string(), "nope: command not found");

        let open = ShellError::RedirectOpenFailed {
            path: PathBuf::from("missing.txt"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(open.kind(), ErrorKind::ResourceOpen);
        assert!(open.to_string().starts_with("missing.txt: "));
    }

    #[test]
    fn test_plan_errors_are_user_input() {
        let err: ShellError = PlanError::MultiplePipes.into();
        assert_eq!(err.kind(), ErrorKind::UserInput);
    }
}
