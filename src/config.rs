use crate::history::DEFAULT_HISTORY_SIZE;
use crate::jobs::DEFAULT_CAPACITY;
use anyhow::{Result, ensure};

pub const DEFAULT_PROMPT: &str = "FCIT> ";

/// Settings of one interpreter session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub prompt: String,
    /// Number of slots in the job table.
    pub job_capacity: usize,
    pub history_size: usize,
}

impl ShellConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.job_capacity > 0, "--max-jobs must be greater than zero");
        ensure!(self.history_size > 0, "--history-size must be greater than zero");
        Ok(())
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            job_capacity: DEFAULT_CAPACITY,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}
