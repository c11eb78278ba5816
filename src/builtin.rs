use crate::command::{BuiltinFactory, ExecutableBuiltin, ExitCode};
use crate::interpreter::{Factory, Session};
use crate::jobs::JobState;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "jobs" or "cd".
    fn name() -> &'static str;

    /// Executes the command against the interpreter session.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableBuiltin for T {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        match T::execute(*self, stdout, session) {
            Ok(x) => Ok(x),
            Err(e) => {
                stdout.flush()?;
                eprintln!("jobsh: {e:#}");
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableBuiltin for InvalidArgs {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, _session: &mut Session) -> Result<ExitCode> {
        if self.is_error {
            eprintln!("{}", self.output);
            Ok(1)
        } else {
            writeln!(stdout, "{}", self.output)?;
            Ok(0)
        }
    }
}

impl<T: BuiltinCommand + 'static> BuiltinFactory for Factory<T> {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableBuiltin>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => bail!("cd: missing argument"),
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            session.env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        session.env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        writeln!(stdout, "Exiting shell...")?;
        session.env.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List the built-in commands.
pub struct Help {}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn execute(self, stdout: &mut dyn Write, _session: &mut Session) -> Result<ExitCode> {
        writeln!(stdout, "Built-in commands:")?;
        for usage in [
            "cd <directory>",
            "exit",
            "help",
            "jobs",
            "history",
            "fg [job]",
            "bg [job]",
        ] {
            writeln!(stdout, "  {usage}")?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List background and stopped jobs.
pub struct Jobs {}

impl BuiltinCommand for Jobs {
    fn name() -> &'static str {
        "jobs"
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        for (slot, job) in session.engine.jobs().list() {
            let suffix = match job.state() {
                JobState::Stopped => "  (stopped)",
                _ => "",
            };
            writeln!(
                stdout,
                "[{slot}] PID: {}  CMD: {}{suffix}",
                job.pid(),
                job.command()
            )?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Show the recently entered command lines.
pub struct History {}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        for (n, line) in session.history.entries() {
            writeln!(stdout, "{n} {line}")?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Continue a job and wait for it.
pub struct Fg {
    #[argh(positional)]
    /// job number as shown by `jobs`; defaults to the most recent job.
    pub job: Option<usize>,
}

impl BuiltinCommand for Fg {
    fn name() -> &'static str {
        "fg"
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        stdout.flush()?;
        let outcome = session.engine.foreground(self.job)?;
        if let Some(notice) = outcome.notice() {
            writeln!(stdout, "{notice}")?;
        }
        Ok(outcome.code())
    }
}

#[derive(FromArgs)]
/// Continue a stopped job in the background.
pub struct Bg {
    #[argh(positional)]
    /// job number as shown by `jobs`; defaults to the most recent job.
    pub job: Option<usize>,
}

impl BuiltinCommand for Bg {
    fn name() -> &'static str {
        "bg"
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        let (slot, pid) = session.engine.background(self.job)?;
        writeln!(stdout, "[+] Continued job [{slot}] PID {pid}")?;
        Ok(0)
    }
}
