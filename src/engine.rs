//! The command execution and job-control engine.
//!
//! [`Engine`] owns the job table and a [`ProcessControl`] implementation. It classifies a
//! command, spawns it, and either waits for it in the foreground or records it as a job.

use crate::command::{ArgVector, ExitCode};
use crate::error::{Result, ShellError};
use crate::jobs::{JobEvent, JobState, JobTable};
use crate::plan::{ExecutionPlan, build_plan};
use crate::process::{Completion, OsProcesses, ProcessControl, WaitOutcome};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Result of running one command through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A foreground command ran to completion.
    Completed(Completion),
    /// A background command was started and registered in `slot`.
    Background { slot: usize, pid: Pid },
    /// A foreground command was stopped and parked in `slot`.
    Stopped { slot: usize, pid: Pid },
}

impl Outcome {
    pub fn code(&self) -> ExitCode {
        match self {
            Outcome::Completed(completion) => completion.code(),
            Outcome::Background { .. } => 0,
            Outcome::Stopped { .. } => 128 + Signal::SIGTSTP as i32,
        }
    }

    /// The line printed for the user, if any.
    pub fn notice(&self) -> Option<String> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Background { pid, .. } => Some(format!("[+] Started background job PID {pid}")),
            Outcome::Stopped { slot, pid } => Some(format!("[+] Stopped job [{slot}] PID {pid}")),
        }
    }
}

/// A foreground process and its status, once collected.
type Member = (Pid, Option<Completion>);

enum Waited {
    Finished(Completion),
    Stopped,
}

pub struct Engine {
    jobs: JobTable,
    procs: Box<dyn ProcessControl>,
}

impl Engine {
    pub fn new(job_capacity: usize) -> Self {
        Self::with_processes(job_capacity, Box::new(OsProcesses::new()))
    }

    pub fn with_processes(job_capacity: usize, procs: Box<dyn ProcessControl>) -> Self {
        Self {
            jobs: JobTable::new(job_capacity),
            procs,
        }
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Classify and run one command.
    pub fn execute(&mut self, args: &ArgVector) -> Result<Outcome> {
        let plan = build_plan(args)?;
        self.run_plan(&plan)
    }

    pub fn run_plan(&mut self, plan: &ExecutionPlan) -> Result<Outcome> {
        if plan.background {
            if !self.jobs.has_free_slot() {
                return Err(ShellError::JobTableFull {
                    capacity: self.jobs.capacity(),
                });
            }
            let pids = self.procs.spawn(plan)?;
            let slot = self.jobs.add(&pids, plan.display.as_str(), JobState::Running, true)?;
            let pid = self.job_pid(slot)?;
            return Ok(Outcome::Background { slot, pid });
        }

        let pids = self.procs.spawn(plan)?;
        self.run_foreground(pids, &plan.display)
    }

    fn run_foreground(&mut self, pids: Vec<Pid>, command: &str) -> Result<Outcome> {
        let mut members: Vec<Member> = pids.iter().map(|&pid| (pid, None)).collect();
        loop {
            match self.wait_group(&mut members, false)? {
                Waited::Finished(completion) => return Ok(Outcome::Completed(completion)),
                Waited::Stopped if self.jobs.has_free_slot() => {
                    let slot = self.jobs.add(&pids, command, JobState::Stopped, false)?;
                    for &(pid, completion) in &members {
                        if let Some(completion) = completion {
                            self.jobs.complete_member(slot, pid, completion);
                        }
                    }
                    let pid = self.job_pid(slot)?;
                    debug!(slot, %pid, command = %command, "foreground command stopped");
                    return Ok(Outcome::Stopped { slot, pid });
                }
                Waited::Stopped => {
                    warn!(
                        command = %command,
                        capacity = self.jobs.capacity(),
                        "job table is full, continuing the stopped command"
                    );
                    self.signal_live(&members, Signal::SIGCONT, None);
                }
            }
        }
    }

    /// Wait for every member in order.
    ///
    /// A stop of any member stops the rest and ends the wait. Members of a `detached` group
    /// live in their own session, so signals the interpreter receives meanwhile are forwarded
    /// to the ones still alive. Other groups already got the signal from the terminal.
    fn wait_group(&mut self, members: &mut [Member], detached: bool) -> Result<Waited> {
        let mut last = Completion::Exited(0);
        for i in 0..members.len() {
            let pid = members[i].0;
            if let Some(completion) = members[i].1 {
                last = completion;
                continue;
            }
            loop {
                match self.procs.wait(pid)? {
                    WaitOutcome::Finished(completion) => {
                        members[i].1 = Some(completion);
                        last = completion;
                        break;
                    }
                    WaitOutcome::Stopped => {
                        self.signal_live(members, Signal::SIGSTOP, Some(pid));
                        return Ok(Waited::Stopped);
                    }
                    WaitOutcome::Interrupted(Some(signal)) if detached => {
                        debug!(?signal, "forwarding signal to resumed job");
                        self.signal_live(members, signal, None);
                    }
                    WaitOutcome::Interrupted(_) => {}
                }
            }
        }
        Ok(Waited::Finished(last))
    }

    fn signal_live(&mut self, members: &[Member], signal: Signal, skip: Option<Pid>) {
        for &(pid, _) in members
            .iter()
            .filter(|(pid, completion)| completion.is_none() && Some(*pid) != skip)
        {
            if let Err(err) = self.procs.signal(pid, signal) {
                warn!(%err, "could not forward signal");
            }
        }
    }

    /// Collect finished and stopped background jobs without blocking.
    pub fn reap(&mut self) -> Result<Vec<JobEvent>> {
        self.jobs.reap(self.procs.as_mut())
    }

    /// `fg`: continue a job and wait for it in the foreground.
    pub fn foreground(&mut self, slot: Option<usize>) -> Result<Outcome> {
        let slot = self.jobs.resume_last(self.procs.as_mut(), slot)?;
        let Some(job) = self.jobs.get(slot) else {
            return Err(ShellError::NoSuchJob(slot));
        };
        let pid = job.pid();
        let detached = job.is_detached();
        let mut members: Vec<Member> = job.live_pids().into_iter().map(|pid| (pid, None)).collect();

        let waited = self.wait_group(&mut members, detached)?;
        for &(member, completion) in &members {
            if let Some(completion) = completion {
                self.jobs.complete_member(slot, member, completion);
            }
        }
        match waited {
            Waited::Finished(completion) => {
                let completion = self
                    .jobs
                    .get(slot)
                    .and_then(|job| job.completion())
                    .unwrap_or(completion);
                self.jobs.mark_done(slot);
                Ok(Outcome::Completed(completion))
            }
            Waited::Stopped => {
                self.jobs.mark_stopped(slot);
                Ok(Outcome::Stopped { slot, pid })
            }
        }
    }

    /// `bg`: continue a job and leave it running. Returns the job's slot and pid.
    pub fn background(&mut self, slot: Option<usize>) -> Result<(usize, Pid)> {
        let slot = self.jobs.resume_last(self.procs.as_mut(), slot)?;
        Ok((slot, self.job_pid(slot)?))
    }

    fn job_pid(&self, slot: usize) -> Result<Pid> {
        self.jobs
            .get(slot)
            .map(|job| job.pid())
            .ok_or(ShellError::NoSuchJob(slot))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(crate::jobs::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobEventKind;
    use crate::process::testing::{Script, ScriptedProcesses};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    fn engine(capacity: usize) -> (Engine, Rc<RefCell<Script>>) {
        let (procs, script) = ScriptedProcesses::with_handle();
        (Engine::with_processes(capacity, Box::new(procs)), script)
    }

    fn run(engine: &mut Engine, words: &[&str]) -> Result<Outcome> {
        engine.execute(&ArgVector::from_words(words))
    }

    fn queue(script: &Rc<RefCell<Script>>, pid: i32, outcomes: &[WaitOutcome]) {
        script
            .borrow_mut()
            .waits
            .insert(Pid::from_raw(pid), outcomes.iter().copied().collect::<VecDeque<_>>());
    }

    #[test]
    fn test_foreground_returns_right_stage_status() {
        let (mut engine, script) = engine(4);
        queue(&script, 1001, &[WaitOutcome::Finished(Completion::Exited(0))]);
        queue(&script, 1002, &[WaitOutcome::Finished(Completion::Exited(2))]);

        let outcome = run(&mut engine, &["cat", "f", "|", "grep", "x"]).unwrap();
        assert_eq!(outcome, Outcome::Completed(Completion::Exited(2)));
        assert_eq!(outcome.code(), 2);
        assert_eq!(outcome.notice(), None);
        assert_eq!(engine.jobs().list().count(), 0);
    }

    #[test]
    fn test_background_then_reap() {
        let (mut engine, script) = engine(4);
        let outcome = run(&mut engine, &["sleep", "1", "&"]).unwrap();
        let pid = Pid::from_raw(1001);
        assert_eq!(outcome, Outcome::Background { slot: 1, pid });
        assert_eq!(outcome.notice().unwrap(), "[+] Started background job PID 1001");

        let listed: Vec<_> = engine
            .jobs()
            .list()
            .map(|(slot, job)| (slot, job.pid(), job.command().to_string()))
            .collect();
        assert_eq!(listed, vec![(1, pid, "sleep 1".to_string())]);

        script
            .borrow_mut()
            .reapable
            .push_back((pid, WaitOutcome::Finished(Completion::Exited(0))));
        let events = engine.reap().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to_string(), "[+] Background job 1001 (sleep 1) finished.");
        assert_eq!(engine.jobs().list().count(), 0);
    }

    #[test]
    fn test_capacity_is_checked_before_spawning() {
        let (mut engine, script) = engine(1);
        run(&mut engine, &["sleep", "5", "&"]).unwrap();
        let err = run(&mut engine, &["sleep", "6", "&"]).unwrap_err();
        assert!(matches!(err, ShellError::JobTableFull { capacity: 1 }));
        assert_eq!(script.borrow().spawned.len(), 1);
    }

    #[test]
    fn test_plan_errors_spawn_nothing() {
        let (mut engine, script) = engine(1);
        let err = run(&mut engine, &["ls", "|"]).unwrap_err();
        assert!(matches!(err, ShellError::InvalidCommand(_)));
        assert!(script.borrow().spawned.is_empty());
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let (mut engine, script) = engine(1);
        script.borrow_mut().fail_spawn = true;
        let err = run(&mut engine, &["true", "&"]).unwrap_err();
        assert!(matches!(err, ShellError::SpawnFailed(_)));
        assert_eq!(engine.jobs().list().count(), 0);
    }

    #[test]
    fn test_interrupt_is_not_repeated_for_foreground_stages() {
        let (mut engine, script) = engine(1);
        queue(
            &script,
            1001,
            &[
                WaitOutcome::Interrupted(Some(Signal::SIGINT)),
                WaitOutcome::Finished(Completion::Signaled(Signal::SIGINT)),
            ],
        );
        queue(&script, 1002, &[WaitOutcome::Finished(Completion::Signaled(Signal::SIGINT))]);

        let outcome = run(&mut engine, &["yes", "|", "head"]).unwrap();
        assert_eq!(outcome, Outcome::Completed(Completion::Signaled(Signal::SIGINT)));
        assert_eq!(outcome.code(), 130);
        // Both stages share the terminal's process group and were interrupted by it.
        assert!(script.borrow().signals.is_empty());
    }

    #[test]
    fn test_interrupt_is_forwarded_to_resumed_background_job() {
        let (mut engine, script) = engine(1);
        run(&mut engine, &["yes", "|", "head", "&"]).unwrap();
        queue(
            &script,
            1001,
            &[
                WaitOutcome::Interrupted(Some(Signal::SIGINT)),
                WaitOutcome::Finished(Completion::Signaled(Signal::SIGINT)),
            ],
        );
        queue(&script, 1002, &[WaitOutcome::Finished(Completion::Signaled(Signal::SIGINT))]);

        let outcome = engine.foreground(None).unwrap();
        assert_eq!(outcome, Outcome::Completed(Completion::Signaled(Signal::SIGINT)));
        let (first, second) = (Pid::from_raw(1001), Pid::from_raw(1002));
        assert_eq!(
            script.borrow().signals,
            vec![
                (first, Signal::SIGCONT),
                (second, Signal::SIGCONT),
                (first, Signal::SIGINT),
                (second, Signal::SIGINT),
            ]
        );
    }

    #[test]
    fn test_interrupt_is_not_repeated_for_resumed_stopped_command() {
        let (mut engine, script) = engine(1);
        queue(
            &script,
            1001,
            &[
                WaitOutcome::Stopped,
                WaitOutcome::Interrupted(Some(Signal::SIGINT)),
                WaitOutcome::Finished(Completion::Signaled(Signal::SIGINT)),
            ],
        );
        run(&mut engine, &["cat"]).unwrap();

        engine.foreground(None).unwrap();
        assert_eq!(script.borrow().signals, vec![(Pid::from_raw(1001), Signal::SIGCONT)]);
    }

    #[test]
    fn test_stopped_foreground_becomes_job_and_fg_resumes_it() {
        let (mut engine, script) = engine(2);
        queue(&script, 1001, &[WaitOutcome::Stopped, WaitOutcome::Finished(Completion::Exited(4))]);

        let outcome = run(&mut engine, &["sleep", "30"]).unwrap();
        let pid = Pid::from_raw(1001);
        assert_eq!(outcome, Outcome::Stopped { slot: 1, pid });
        assert_eq!(outcome.notice().unwrap(), "[+] Stopped job [1] PID 1001");
        assert_eq!(engine.jobs().get(1).unwrap().state(), JobState::Stopped);

        let resumed = engine.foreground(None).unwrap();
        assert_eq!(resumed, Outcome::Completed(Completion::Exited(4)));
        assert_eq!(script.borrow().signals, vec![(pid, Signal::SIGCONT)]);
        // Waited to completion: no finished notice, and the slot is free again.
        assert_eq!(engine.jobs().list().count(), 0);
        assert!(engine.reap().unwrap().is_empty());
    }

    #[test]
    fn test_stopped_pipeline_stops_the_other_stage() {
        let (mut engine, script) = engine(2);
        queue(&script, 1001, &[WaitOutcome::Stopped]);

        let outcome = run(&mut engine, &["cat", "|", "wc"]).unwrap();
        assert_eq!(
            outcome,
            Outcome::Stopped {
                slot: 1,
                pid: Pid::from_raw(1002)
            }
        );
        assert_eq!(script.borrow().signals, vec![(Pid::from_raw(1002), Signal::SIGSTOP)]);
    }

    #[test]
    fn test_stop_with_full_table_continues_the_command() {
        let (mut engine, script) = engine(1);
        run(&mut engine, &["sleep", "100", "&"]).unwrap();
        queue(&script, 1002, &[WaitOutcome::Stopped, WaitOutcome::Finished(Completion::Exited(0))]);

        let outcome = run(&mut engine, &["vi"]).unwrap();
        assert_eq!(outcome, Outcome::Completed(Completion::Exited(0)));
        assert_eq!(script.borrow().signals, vec![(Pid::from_raw(1002), Signal::SIGCONT)]);
    }

    #[test]
    fn test_bg_continues_most_recent_job() {
        let (mut engine, script) = engine(3);
        queue(&script, 1001, &[WaitOutcome::Stopped]);
        queue(&script, 1002, &[WaitOutcome::Stopped]);
        run(&mut engine, &["first"]).unwrap();
        run(&mut engine, &["second"]).unwrap();

        let (slot, pid) = engine.background(None).unwrap();
        assert_eq!((slot, pid), (2, Pid::from_raw(1002)));
        assert_eq!(engine.jobs().get(2).unwrap().state(), JobState::Running);
        assert_eq!(engine.jobs().get(1).unwrap().state(), JobState::Stopped);

        let (slot, _) = engine.background(Some(1)).unwrap();
        assert_eq!(slot, 1);
        assert_eq!(script.borrow().signals.len(), 2);
    }

    #[test]
    fn test_fg_and_bg_without_jobs() {
        let (mut engine, _script) = engine(3);
        assert!(matches!(engine.foreground(None), Err(ShellError::NoActiveJobs)));
        assert!(matches!(engine.background(Some(2)), Err(ShellError::NoSuchJob(2))));
    }

    #[test]
    fn test_mixed_scenario() {
        let (mut engine, script) = engine(4);
        run(&mut engine, &["sleep", "10", "&"]).unwrap();
        queue(&script, 1002, &[WaitOutcome::Finished(Completion::Exited(0))]);
        assert_eq!(
            run(&mut engine, &["echo", "hi"]).unwrap(),
            Outcome::Completed(Completion::Exited(0))
        );
        assert_eq!(engine.jobs().list().count(), 1);

        script
            .borrow_mut()
            .reapable
            .push_back((Pid::from_raw(1001), WaitOutcome::Finished(Completion::Exited(0))));
        let events = engine.reap().unwrap();
        assert!(matches!(events[0].kind, JobEventKind::Finished(_)));
        assert_eq!(engine.jobs().list().count(), 0);
    }
}
