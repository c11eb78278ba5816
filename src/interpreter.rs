use crate::command::{ArgVector, BuiltinFactory, ExitCode};
use crate::config::ShellConfig;
use crate::engine::Engine;
use crate::env::Environment;
use crate::error::ShellError;
use crate::history::History;
use crate::input::{EditorInput, Line, LineSource, PlainInput};
use crate::lexer;
use crate::signals;
use anyhow::Result;
use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use tracing::debug;

/// Factory allows creating instances of ExecutableBuiltin.
///
/// Only supports the builtins defined in this crate.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Everything a builtin may inspect or change.
pub struct Session {
    pub env: Environment,
    pub engine: Engine,
    pub history: History,
}

/// An interactive command interpreter with job control.
///
/// The interpreter reads lines, recalls `!` history references, runs builtins in-process
/// and hands every other command to the [`Engine`].
///
/// Example
/// ```no_run
/// use jobshell::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run_command("echo hello world").unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    prompt: String,
    session: Session,
    builtins: Vec<Box<dyn BuiltinFactory>>,
}

impl Interpreter {
    pub fn new(config: ShellConfig) -> Self {
        let engine = Engine::new(config.job_capacity);
        Self::with_engine(config, engine)
    }

    /// Create an interpreter around an existing engine, e.g. one with custom process control.
    pub fn with_engine(config: ShellConfig, engine: Engine) -> Self {
        use crate::builtin::{Bg, Cd, Exit, Fg, Help, Jobs};
        Self {
            session: Session {
                env: Environment::new(),
                engine,
                history: History::new(config.history_size),
            },
            prompt: config.prompt,
            builtins: vec![
                Box::new(Factory::<Exit>::default()),
                Box::new(Factory::<Cd>::default()),
                Box::new(Factory::<Help>::default()),
                Box::new(Factory::<Jobs>::default()),
                Box::new(Factory::<crate::builtin::History>::default()),
                Box::new(Factory::<Fg>::default()),
                Box::new(Factory::<Bg>::default()),
            ],
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn should_exit(&self) -> bool {
        self.session.env.should_exit
    }

    fn report(&self, out: &mut dyn Write, err: impl Display) -> io::Result<()> {
        out.flush()?;
        eprintln!("jobsh: {err}");
        Ok(())
    }

    fn report_shell_error(&self, out: &mut dyn Write, err: ShellError) -> io::Result<()> {
        debug!(kind = ?err.kind(), "command rejected");
        self.report(out, err)
    }

    /// Process one input line and return its exit status.
    ///
    /// Background jobs are reaped first, so their notices precede the line's own output.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<ExitCode> {
        match self.session.engine.reap() {
            Ok(events) => {
                for event in events {
                    writeln!(out, "{event}")?;
                }
            }
            Err(err) => self.report_shell_error(out, err)?,
        }

        if line.trim().is_empty() {
            return Ok(self.session.env.last_status);
        }

        let line = match self.session.history.expand(line) {
            Ok(Some(expanded)) => {
                writeln!(out, "{expanded}")?;
                expanded
            }
            Ok(None) => line.to_string(),
            Err(err) => {
                self.report_shell_error(out, err)?;
                return Ok(self.finish(1));
            }
        };
        self.session.history.add(&line);

        let args = match lexer::split_into_tokens(&line) {
            Ok(args) if args.is_empty() => return Ok(self.session.env.last_status),
            Ok(args) => args,
            Err(err) => {
                self.report_shell_error(out, err.into())?;
                return Ok(self.finish(1));
            }
        };
        debug!(%args, "executing");

        let code = match self.run_builtin(&args, out)? {
            Some(code) => code,
            None => {
                out.flush()?;
                match self.session.engine.execute(&args) {
                    Ok(outcome) => {
                        if let Some(notice) = outcome.notice() {
                            writeln!(out, "{notice}")?;
                        }
                        outcome.code()
                    }
                    Err(err) => {
                        self.report_shell_error(out, err)?;
                        1
                    }
                }
            }
        };
        Ok(self.finish(code))
    }

    fn finish(&mut self, code: ExitCode) -> ExitCode {
        self.session.env.last_status = code;
        code
    }

    /// Run `args` as a builtin if its first word names one.
    fn run_builtin(&mut self, args: &ArgVector, out: &mut dyn Write) -> Result<Option<ExitCode>> {
        let Some(name) = args.program() else {
            return Ok(None);
        };
        let words = args.to_strings();
        let rest: Vec<&str> = words.iter().skip(1).map(String::as_str).collect();

        for factory in &self.builtins {
            let Some(cmd) = factory.try_create(name, &rest) else {
                continue;
            };
            if args.has_operators() {
                self.report(out, format!("{name}: builtins cannot be combined with operators"))?;
                return Ok(Some(1));
            }
            let code = cmd.execute(out, &mut self.session)?;
            out.flush()?;
            return Ok(Some(code));
        }
        Ok(None)
    }

    /// Read and execute lines from `source` until end of input or `exit`.
    pub fn run(&mut self, source: &mut dyn LineSource, out: &mut dyn Write) -> Result<ExitCode> {
        loop {
            if source.is_interactive() {
                if let Some(notice) = signals::take().notice() {
                    writeln!(out, "{notice}")?;
                }
            }
            out.flush()?;

            match source.read_line(&self.prompt)? {
                Line::Text(line) => {
                    self.execute_line(&line, out)?;
                    if self.should_exit() {
                        return Ok(0);
                    }
                }
                Line::Interrupted => writeln!(out, "{}", signals::INTERRUPT_NOTICE)?,
                Line::Eof => {
                    if source.is_interactive() {
                        writeln!(out)?;
                    }
                    writeln!(out, "Shell exited.")?;
                    out.flush()?;
                    return Ok(0);
                }
            }
        }
    }

    /// Run one line and return its status, as `jobsh -c` does.
    pub fn run_command(&mut self, line: &str) -> Result<ExitCode> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let code = self.execute_line(line, &mut out)?;
        out.flush()?;
        Ok(code)
    }

    /// Interactive loop on the process's standard streams.
    ///
    /// A terminal gets the line editor; anything else is read line by line without a prompt.
    pub fn repl(&mut self) -> Result<ExitCode> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if io::stdin().is_terminal() {
            let mut source = EditorInput::new()?;
            self.run(&mut source, &mut out)
        } else {
            let mut source = PlainInput::new(io::stdin().lock());
            self.run(&mut source, &mut out)
        }
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default configuration and every builtin:
    /// `exit`, `cd`, `help`, `jobs`, `history`, `fg` and `bg`.
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}
