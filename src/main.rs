use argh::FromArgs;
use jobshell::{Interpreter, ShellConfig, config::DEFAULT_PROMPT, signals};
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// An interactive command interpreter with background jobs, pipes and redirection.
struct Options {
    /// prompt shown before each line.
    #[argh(option, default = "DEFAULT_PROMPT.to_string()")]
    prompt: String,

    /// number of job slots.
    #[argh(option, default = "jobshell::jobs::DEFAULT_CAPACITY")]
    max_jobs: usize,

    /// number of lines kept by `history`.
    #[argh(option, default = "jobshell::history::DEFAULT_HISTORY_SIZE")]
    history_size: usize,

    /// run a single command line and exit with its status.
    #[argh(option, short = 'c')]
    command: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let options: Options = argh::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("JOBSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ShellConfig {
        prompt: options.prompt,
        job_capacity: options.max_jobs,
        history_size: options.history_size,
    };
    config.validate()?;

    signals::install()?;
    let mut interpreter = Interpreter::new(config);
    let code = match options.command {
        Some(line) => interpreter.run_command(&line)?,
        None => interpreter.repl()?,
    };
    std::process::exit(code);
}
