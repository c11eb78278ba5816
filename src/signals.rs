//! Interactive signal handling for the interpreter process.
//!
//! The handlers only bump atomic counters. Whoever observes them afterwards, on the main
//! thread, decides what the signal means: a blocking wait forwards it to the awaited
//! processes, an idle prompt turns it into a notice.

use crate::error::{Result, ShellError};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const INTERRUPT_NOTICE: &str = "[!] Interrupt ignored; type `exit` to leave the shell.";

static INTERRUPTS: AtomicUsize = AtomicUsize::new(0);
static STOPS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn record(signal: libc::c_int) {
    match signal {
        libc::SIGINT => {
            INTERRUPTS.fetch_add(1, Ordering::SeqCst);
        }
        libc::SIGTSTP => {
            STOPS.fetch_add(1, Ordering::SeqCst);
        }
        _ => {}
    }
}

/// Install the SIGINT and SIGTSTP handlers.
///
/// `SA_RESTART` is deliberately not set, so a blocking `waitpid` returns `EINTR` and the
/// caller gets a chance to forward the signal. Handled signals revert to their default
/// disposition in children on `exec`.
pub fn install() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(record),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTSTP] {
        // SAFETY: `record` is async-signal-safe, it only touches atomics.
        unsafe { sigaction(signal, &action) }.map_err(ShellError::SignalSetup)?;
    }
    Ok(())
}

/// Signals received since the previous [`take`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub interrupts: usize,
    pub stops: usize,
}

impl Received {
    pub fn is_empty(&self) -> bool {
        self.interrupts == 0 && self.stops == 0
    }

    /// The signal to pass on to a foreground command. A terminal stop is passed on as
    /// `SIGSTOP`.
    pub fn forwardable(&self) -> Option<Signal> {
        if self.interrupts > 0 {
            Some(Signal::SIGINT)
        } else if self.stops > 0 {
            Some(Signal::SIGSTOP)
        } else {
            None
        }
    }

    /// Short message for signals that arrived while nothing was running.
    pub fn notice(&self) -> Option<&'static str> {
        if self.interrupts > 0 {
            Some(INTERRUPT_NOTICE)
        } else if self.stops > 0 {
            Some("[!] The shell cannot be suspended.")
        } else {
            None
        }
    }
}

/// Drain the counters.
pub fn take() -> Received {
    Received {
        interrupts: INTERRUPTS.swap(0, Ordering::SeqCst),
        stops: STOPS.swap(0, Ordering::SeqCst),
    }
}
