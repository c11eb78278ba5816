//! Realizes an [`ExecutionPlan`] as live OS processes with their standard streams wired up.
//!
//! Everything that can fail in the parent (argument conversion, PATH lookup) happens before
//! `fork`. Failures inside a child are printed to stderr and end the child with status 1;
//! they never reach the interpreter.

use crate::error::{Result, ShellError};
use crate::plan::{ExecutionPlan, PlanError, Topology};
use nix::unistd::{ForkResult, Pid, close, dup2, execv, fork, pipe, setsid};
use std::borrow::Cow;
use std::convert::Infallible;
use std::ffi::{CString, OsStr};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Mode for files created by output redirection (before the umask).
const CREATE_MODE: u32 = 0o644;

/// A command converted to the C strings `execv` needs.
struct Prepared {
    program: String,
    /// Resolved executable, `None` when nothing on PATH matched.
    path: Option<CString>,
    argv: Vec<CString>,
}

impl Prepared {
    fn new(words: &[String]) -> Result<Self> {
        let program = words.first().cloned().ok_or(PlanError::EmptyCommand)?;
        let argv = words
            .iter()
            .map(|w| CString::new(w.as_str()).map_err(|_| ShellError::NulByte(w.clone())))
            .collect::<Result<Vec<_>>>()?;
        let search_paths = std::env::var_os("PATH").unwrap_or_default();
        let path = find_command_path(&search_paths, Path::new(&program))
            .map(|p| CString::new(p.as_os_str().as_bytes()))
            .transpose()
            .map_err(|_| ShellError::NulByte(program.clone()))?;
        Ok(Self {
            program,
            path,
            argv,
        })
    }

    fn exec(&self) -> Result<Infallible> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| ShellError::CommandNotFound {
                program: self.program.clone(),
            })?;
        execv(path, &self.argv).map_err(|source| ShellError::ExecFailed {
            program: self.program.clone(),
            source,
        })
    }
}

/// Fork and run `body` in the child. The child never returns from this function.
fn fork_child<F>(body: F) -> Result<Pid>
where
    F: FnOnce() -> Result<Infallible>,
{
    // SAFETY: the interpreter is single-threaded, and the child only calls
    // descriptor primitives and exec before it exits.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok(child),
        Ok(ForkResult::Child) => {
            let err = match body() {
                Ok(never) => match never {},
                Err(err) => err,
            };
            eprintln!("jobsh: {err}");
            // SAFETY: skips atexit handlers and stdio flushing that belong to the parent.
            unsafe { libc::_exit(1) }
        }
        Err(errno) => Err(ShellError::SpawnFailed(errno)),
    }
}

/// Start a new session so terminal-generated signals no longer reach the child.
fn detach(background: bool) -> Result<()> {
    if background {
        setsid().map_err(ShellError::SpawnFailed)?;
    }
    Ok(())
}

fn redirect(path: &Path, target: RawFd, options: &OpenOptions) -> Result<()> {
    let file = options
        .open(path)
        .map_err(|source| ShellError::RedirectOpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
    dup2(file.as_raw_fd(), target).map_err(ShellError::DescriptorFailed)?;
    // Dropping `file` closes the original descriptor.
    Ok(())
}

fn spawn_simple(command: &Prepared, background: bool) -> Result<Pid> {
    fork_child(|| {
        detach(background)?;
        command.exec()
    })
}

fn spawn_redirected(
    command: &Prepared,
    input: Option<&Path>,
    output: Option<&Path>,
    background: bool,
) -> Result<Pid> {
    fork_child(|| {
        detach(background)?;
        if let Some(path) = input {
            redirect(path, libc::STDIN_FILENO, OpenOptions::new().read(true))?;
        }
        if let Some(path) = output {
            redirect(
                path,
                libc::STDOUT_FILENO,
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(CREATE_MODE),
            )?;
        }
        command.exec()
    })
}

fn spawn_piped(left: &Prepared, right: &Prepared, background: bool) -> Result<(Pid, Pid)> {
    let (read_end, write_end) = pipe().map_err(ShellError::PipeCreateFailed)?;
    let read_fd = read_end.as_raw_fd();
    let write_fd = write_end.as_raw_fd();

    let left_pid = fork_child(|| {
        detach(background)?;
        dup2(write_fd, libc::STDOUT_FILENO).map_err(ShellError::DescriptorFailed)?;
        let _ = close(read_fd);
        let _ = close(write_fd);
        left.exec()
    })?;

    let right_pid = fork_child(|| {
        detach(background)?;
        dup2(read_fd, libc::STDIN_FILENO).map_err(ShellError::DescriptorFailed)?;
        let _ = close(write_fd);
        let _ = close(read_fd);
        right.exec()
    });

    // Both ends must be closed here, or the right stage never sees end-of-stream.
    drop(read_end);
    drop(write_end);

    match right_pid {
        Ok(right_pid) => Ok((left_pid, right_pid)),
        Err(err) => {
            let _ = nix::sys::wait::waitpid(left_pid, None);
            Err(err)
        }
    }
}

/// Push out what the interpreter printed so it reaches the terminal before the child's output.
/// Failures are logged.
fn flush_pending_output(out: &mut impl Write) {
    if let Err(err) = out.flush() {
        warn!(%err, "could not flush stdout before spawning");
    }
}

/// Create every process of `plan` and return their ids in pipeline order.
pub fn spawn(plan: &ExecutionPlan) -> Result<Vec<Pid>> {
    flush_pending_output(&mut io::stdout());

    let pids = match &plan.topology {
        Topology::Simple { argv } => vec![spawn_simple(&Prepared::new(argv)?, plan.background)?],
        Topology::Redirected {
            argv,
            input,
            output,
        } => vec![spawn_redirected(
            &Prepared::new(argv)?,
            input.as_deref(),
            output.as_deref(),
            plan.background,
        )?],
        Topology::Piped { left, right } => {
            let (l, r) = spawn_piped(
                &Prepared::new(left)?,
                &Prepared::new(right)?,
                plan.background,
            )?;
            vec![l, r]
        }
    };
    debug!(command = %plan.display, background = plan.background, ?pids, "spawned");
    Ok(pids)
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it exists.
/// - `./foo`: returns it if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    if path.starts_with("./") && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::lock_current_dir;
    use std::fs::{self, File};

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), path).expect("Expected to find /bin/sh");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        assert!(find_command_path(osstr("/bin"), path).is_none());
    }

    #[test]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nonexistent-dir:/bin"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert!(found.as_ref().starts_with("/bin"));
        assert!(found.as_ref().ends_with("sh"));
    }

    #[test]
    fn single_component_not_found_in_path() {
        assert!(find_command_path(osstr("/bin"), Path::new("nonexisting")).is_none());
    }

    #[test]
    fn directories_on_path_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("tool")).unwrap();
        let search = dir.path().as_os_str().to_owned();
        assert!(find_command_path(&search, Path::new("tool")).is_none());
    }

    #[test]
    fn multiple_components_relative_existing() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().expect("cwd");
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        File::create(dir.path().join("bin").join("sh")).unwrap();

        std::env::set_current_dir(dir.path()).expect("set cwd");
        let res = find_command_path(osstr("/does/not/matter"), Path::new("bin/sh"))
            .map(|p| p.into_owned());
        std::env::set_current_dir(&cwd_before).ok();

        assert!(res.expect("Expected to find bin/sh").ends_with("bin/sh"));
    }

    #[test]
    fn empty_path_is_none() {
        assert!(find_command_path(osstr("/bin"), Path::new("")).is_none());
    }

    #[test]
    fn prepared_rejects_nul_bytes() {
        let words = vec!["echo".to_string(), "a\0b".to_string()];
        assert!(matches!(
            Prepared::new(&words),
            Err(ShellError::NulByte(w)) if w == "a\0b"
        ));
    }

    #[test]
    fn prepared_keeps_program_when_not_found() {
        let prepared = Prepared::new(&["no-such-program-jobsh".to_string()]).unwrap();
        assert!(prepared.path.is_none());
        assert!(matches!(
            prepared.exec(),
            Err(ShellError::CommandNotFound { program }) if program == "no-such-program-jobsh"
        ));
    }

    struct FullDisk {
        flushes: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::StorageFull))
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Err(io::Error::from(io::ErrorKind::StorageFull))
        }
    }

    #[test]
    fn flush_failure_does_not_stop_spawning() {
        let mut out = FullDisk { flushes: 0 };
        flush_pending_output(&mut out);
        assert_eq!(out.flushes, 1);
    }
}
