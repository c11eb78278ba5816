//! End-to-end tests driving the `jobsh` binary through piped stdin.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn jobsh(script: &str) -> assert_cmd::assert::Assert {
    Command::cargo_bin("jobsh")
        .unwrap()
        .env("JOBSH_LOG", "off")
        .write_stdin(script)
        .assert()
}

#[test]
fn simple_command_output_reaches_stdout() {
    jobsh("echo hello world\n")
        .success()
        .stdout(predicate::str::contains("hello world\n"))
        .stdout(predicate::str::ends_with("Shell exited.\n"));
}

#[test]
fn pipe_connects_two_commands() {
    jobsh("printf 'foo\\nbar\\n' | tr o 0\n")
        .success()
        .stdout(predicate::str::contains("f00\nbar\n"));
}

#[test]
fn redirection_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("f.txt");
    let copy = dir.path().join("g.txt");
    let script = format!(
        "echo hi > {f}\nsort < {f} > {g}\ncat {g}\n",
        f = file.display(),
        g = copy.display()
    );
    jobsh(&script)
        .success()
        .stdout(predicate::str::contains("hi\n"));
    assert_eq!(fs::read_to_string(&copy).unwrap(), "hi\n");
}

#[test]
fn background_job_is_listed() {
    jobsh("sleep 1 &\njobs\n")
        .success()
        .stdout(predicate::str::contains("[+] Started background job PID "))
        .stdout(predicate::str::is_match(r"\[1\] PID: \d+  CMD: sleep 1\n").unwrap());
}

#[test]
fn finished_background_job_is_reported_before_next_command() {
    jobsh("sleep 0.1 &\nsleep 0.5\necho next\n")
        .success()
        .stdout(
            predicate::str::is_match(r"\[\+\] Background job \d+ \(sleep 0\.1\) finished\.\nnext\n")
                .unwrap(),
        );
}

#[test]
fn fg_waits_for_the_job() {
    jobsh("sleep 0.2 &\nfg\njobs\necho done\n")
        .success()
        .stdout(predicate::str::contains("finished").not())
        .stdout(predicate::str::contains("CMD:").not())
        .stdout(predicate::str::contains("done\n"));
}

#[test]
fn bg_without_jobs_is_an_error() {
    jobsh("bg\n")
        .success()
        .stderr(predicate::str::contains("jobsh: no active jobs"));
}

#[test]
fn job_table_capacity_is_enforced() {
    Command::cargo_bin("jobsh")
        .unwrap()
        .args(["--max-jobs", "1"])
        .write_stdin("sleep 1 &\nsleep 1 &\njobs\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("job table is full (1 jobs)"))
        .stdout(predicate::str::contains("[2]").not());
}

#[test]
fn cd_changes_directory_of_later_commands() {
    let dir = tempfile::tempdir().unwrap();
    let canonical = fs::canonicalize(dir.path()).unwrap();
    jobsh(&format!("cd {}\npwd\ncd\n", canonical.display()))
        .success()
        .stdout(predicate::str::contains(format!("{}\n", canonical.display())))
        .stderr(predicate::str::contains("cd: missing argument"));
}

#[test]
fn history_recall_is_echoed() {
    jobsh("echo one\n!1\nhistory\n!42\n")
        .success()
        .stdout(predicate::str::contains("one\necho one\none\n1 echo one\n2 echo one\n3 history\n"))
        .stderr(predicate::str::contains("no such command in history: !42"));
}

#[test]
fn unknown_command_does_not_end_the_session() {
    jobsh("no-such-command-for-jobsh\necho still here\n")
        .success()
        .stderr(predicate::str::contains("no-such-command-for-jobsh: command not found"))
        .stdout(predicate::str::contains("still here\n"));
}

#[test]
fn malformed_commands_are_rejected() {
    jobsh("cat <\nls | | wc\necho 'open\njobs | wc\n")
        .success()
        .stderr(predicate::str::contains("missing file name after `<`"))
        .stderr(predicate::str::contains("jobs: builtins cannot be combined with operators"));
}

#[test]
fn exit_stops_reading_input() {
    jobsh("exit\necho unreachable\n")
        .success()
        .stdout(predicate::str::contains("Exiting shell...\n"))
        .stdout(predicate::str::contains("unreachable").not())
        .stdout(predicate::str::contains("Shell exited.").not());
}

#[test]
fn single_command_mode_returns_its_status() {
    Command::cargo_bin("jobsh")
        .unwrap()
        .args(["-c", "sh -c 'exit 3'"])
        .assert()
        .code(3);
    Command::cargo_bin("jobsh")
        .unwrap()
        .args(["-c", "echo via flag"])
        .assert()
        .success()
        .stdout("via flag\n");
}

#[test]
fn zero_history_size_is_rejected() {
    Command::cargo_bin("jobsh")
        .unwrap()
        .args(["--history-size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--history-size"));
}
