//! Bounded list of previously entered command lines and `!` recall.

use crate::error::{Result, ShellError};
use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

pub const DEFAULT_HISTORY_SIZE: usize = 20;

static RECALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*!(?:(?<last>!)|(?<index>\d+)|(?<prefix>[^\s!]+))(?<rest>.*)$")
        .expect("history recall pattern is valid")
});

#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a line. Blank lines are skipped; the oldest entry is dropped when full.
    pub fn add(&mut self, line: &str) {
        if line.trim().is_empty() || self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
    }

    /// Entries with their 1-based numbers, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, line)| (i + 1, line.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a leading `!!`, `!N` or `!prefix` against the recorded lines.
    ///
    /// Returns `None` when the line does not start with a recall. Anything after the recall
    /// is appended to the recalled line.
    pub fn expand(&self, line: &str) -> Result<Option<String>> {
        let Some(caps) = RECALL.captures(line) else {
            return Ok(None);
        };
        let event = ["last", "index", "prefix"]
            .iter()
            .find_map(|name| caps.name(name))
            .map_or_else(String::new, |m| format!("!{}", m.as_str()));
        let not_found = || ShellError::HistoryNotFound(event.clone());

        let recalled = if caps.name("last").is_some() {
            self.entries.back()
        } else if let Some(index) = caps.name("index") {
            index
                .as_str()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| self.entries.get(i))
        } else if let Some(prefix) = caps.name("prefix") {
            self.entries
                .iter()
                .rev()
                .find(|entry| entry.starts_with(prefix.as_str()))
        } else {
            None
        }
        .ok_or_else(not_found)?;

        let rest = caps.name("rest").map_or("", |m| m.as_str());
        Ok(Some(format!("{recalled}{rest}")))
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
