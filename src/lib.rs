//! An interactive command interpreter with job control.
//!
//! A command line is split into words and operators by [`lexer`], classified into an
//! [`plan::ExecutionPlan`] (plain, piped or redirected, optionally in the background), and
//! run by the [`engine::Engine`], which owns the table of background and stopped jobs.
//!
//! The main entry point is [`Interpreter`], which adds builtins (`cd`, `jobs`, `fg`, ...),
//! `!` history recall and the read loop on top of the engine.

mod builtin;
pub mod command;
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod history;
pub mod input;
mod interpreter;
pub mod jobs;
pub mod lexer;
pub mod plan;
pub mod process;
pub mod signals;
mod spawn;

pub use config::ShellConfig;
pub use error::{ErrorKind, ShellError};
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::{Interpreter, Session};
