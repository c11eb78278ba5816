//! Bounded registry of background and stopped jobs.
//!
//! Slots are numbered from 1, the way `jobs` shows them. A finished job stays in its slot,
//! marked [`JobState::Done`], until the next [`JobTable::add`] reuses the slot.

use crate::error::{Result, ShellError};
use crate::process::{Completion, ProcessControl, WaitOutcome};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::fmt;
use tracing::debug;

/// Default number of slots in the table.
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

#[derive(Debug, Clone)]
struct Member {
    pid: Pid,
    completion: Option<Completion>,
}

/// One tracked command: every process it spawned plus the text it was started from.
#[derive(Debug, Clone)]
pub struct Job {
    members: Vec<Member>,
    command: String,
    state: JobState,
    detached: bool,
    seq: u64,
}

impl Job {
    /// The id reported to the user: the last process of the pipeline.
    pub fn pid(&self) -> Pid {
        self.members.last().map(|m| m.pid).unwrap_or(Pid::from_raw(0))
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Whether the job runs in its own session, out of reach of terminal signals.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn is_active(&self) -> bool {
        self.state != JobState::Done
    }

    /// Processes that have not been collected yet.
    pub fn live_pids(&self) -> Vec<Pid> {
        self.members
            .iter()
            .filter(|m| m.completion.is_none())
            .map(|m| m.pid)
            .collect()
    }

    /// Status of the last process, once it has terminated.
    pub fn completion(&self) -> Option<Completion> {
        self.members.last().and_then(|m| m.completion)
    }

    /// Whether `pid` is a process of this job that has not been collected yet.
    fn contains(&self, pid: Pid) -> bool {
        self.members
            .iter()
            .any(|m| m.pid == pid && m.completion.is_none())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEventKind {
    Finished(Completion),
    Stopped,
}

/// A state change of a background job, observed by the reaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub slot: usize,
    pub pid: Pid,
    pub command: String,
    pub kind: JobEventKind,
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            JobEventKind::Finished(_) => "finished",
            JobEventKind::Stopped => "stopped",
        };
        write!(f, "[+] Background job {} ({}) {}.", self.pid, self.command, what)
    }
}

#[derive(Debug)]
pub struct JobTable {
    slots: Vec<Option<Job>>,
    next_seq: u64,
}

impl JobTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn free_index(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_none_or(|job| !job.is_active()))
    }

    pub fn has_free_slot(&self) -> bool {
        self.free_index().is_some()
    }

    /// Register a job in the first inactive slot and return its slot number.
    ///
    /// `detached` marks a job started with `&`, whose processes got their own session.
    pub fn add(
        &mut self,
        pids: &[Pid],
        command: impl Into<String>,
        state: JobState,
        detached: bool,
    ) -> Result<usize> {
        let index = self.free_index().ok_or(ShellError::JobTableFull {
            capacity: self.capacity(),
        })?;
        debug_assert!(
            pids.iter().all(|&pid| self.active_index_of(pid).is_none()),
            "pid already tracked by an active job"
        );

        self.next_seq += 1;
        let job = Job {
            members: pids
                .iter()
                .map(|&pid| Member {
                    pid,
                    completion: None,
                })
                .collect(),
            command: command.into(),
            state,
            detached,
            seq: self.next_seq,
        };
        debug!(slot = index + 1, pid = %job.pid(), command = %job.command, "job added");
        self.slots[index] = Some(job);
        Ok(index + 1)
    }

    pub fn get(&self, slot: usize) -> Option<&Job> {
        slot.checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    fn get_mut(&mut self, slot: usize) -> Option<&mut Job> {
        slot.checked_sub(1)
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::as_mut)
    }

    /// Active jobs in slot order. Call again to restart the listing.
    pub fn list(&self) -> impl Iterator<Item = (usize, &Job)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().filter(|job| job.is_active()).map(|job| (i + 1, job)))
    }

    fn active_index_of(&self, pid: Pid) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.as_ref()
                .is_some_and(|job| job.is_active() && job.contains(pid))
        })
    }

    /// Apply one wait result to the job owning `pid`.
    ///
    /// Returns an event when the job as a whole finished or went from running to stopped.
    /// Pids that belong to no active job are ignored.
    pub fn record(&mut self, pid: Pid, outcome: WaitOutcome) -> Option<JobEvent> {
        let index = self.active_index_of(pid)?;
        let job = self.slots[index].as_mut()?;
        let kind = match outcome {
            WaitOutcome::Finished(completion) => {
                if let Some(member) = job
                    .members
                    .iter_mut()
                    .find(|m| m.pid == pid && m.completion.is_none())
                {
                    member.completion = Some(completion);
                }
                if job.members.iter().any(|m| m.completion.is_none()) {
                    return None;
                }
                job.state = JobState::Done;
                JobEventKind::Finished(job.completion().unwrap_or(completion))
            }
            WaitOutcome::Stopped => {
                if job.state == JobState::Stopped {
                    return None;
                }
                job.state = JobState::Stopped;
                JobEventKind::Stopped
            }
            WaitOutcome::Interrupted(_) => return None,
        };
        Some(JobEvent {
            slot: index + 1,
            pid: job.pid(),
            command: job.command.clone(),
            kind,
        })
    }

    /// Collect every terminated or stopped child without blocking.
    pub fn reap(&mut self, procs: &mut dyn ProcessControl) -> Result<Vec<JobEvent>> {
        let mut events = Vec::new();
        while let Some((pid, outcome)) = procs.try_reap()? {
            match self.record(pid, outcome) {
                Some(event) => events.push(event),
                None => debug!(%pid, ?outcome, "reaped process without job event"),
            }
        }
        Ok(events)
    }

    /// Pick `slot` if given, otherwise the most recently added active job.
    pub fn select(&self, slot: Option<usize>) -> Result<usize> {
        match slot {
            Some(slot) => match self.get(slot) {
                Some(job) if job.is_active() => Ok(slot),
                _ => Err(ShellError::NoSuchJob(slot)),
            },
            None => self
                .list()
                .max_by_key(|(_, job)| job.seq)
                .map(|(slot, _)| slot)
                .ok_or(ShellError::NoActiveJobs),
        }
    }

    /// Send `SIGCONT` to every live process of the selected job and mark it running.
    pub fn resume_last(&mut self, procs: &mut dyn ProcessControl, slot: Option<usize>) -> Result<usize> {
        let slot = self.select(slot)?;
        let Some(job) = self.get_mut(slot) else {
            return Err(ShellError::NoSuchJob(slot));
        };
        for pid in job.live_pids() {
            procs.signal(pid, Signal::SIGCONT)?;
        }
        job.state = JobState::Running;
        debug!(slot, pid = %job.pid(), "job resumed");
        Ok(slot)
    }

    /// Mark a job finished without emitting a notice (the caller waited for it).
    pub fn mark_done(&mut self, slot: usize) {
        if let Some(job) = self.get_mut(slot) {
            job.state = JobState::Done;
        }
    }

    pub fn mark_stopped(&mut self, slot: usize) {
        if let Some(job) = self.get_mut(slot) {
            job.state = JobState::Stopped;
        }
    }

    /// Record the final status of one process of a job the caller is waiting on.
    pub fn complete_member(&mut self, slot: usize, pid: Pid, completion: Completion) {
        if let Some(member) = self
            .get_mut(slot)
            .and_then(|job| job.members.iter_mut().find(|m| m.pid == pid))
        {
            member.completion = Some(completion);
        }
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
