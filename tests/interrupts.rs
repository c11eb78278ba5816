//! Interrupt delivery to foreground commands, with `jobsh` leading its own process group the
//! way it does under a terminal.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::os::unix::process::CommandExt;
use std::process::Command;

fn have_perl() -> bool {
    Command::new("perl")
        .args(["-e", "1"])
        .output()
        .is_ok_and(|out| out.status.success())
}

/// Counts SIGINTs while the whole group is interrupted once, like a Ctrl-C at the terminal.
const COUNT_INTERRUPTS: &str = r#"perl -e '$n = 0; $SIG{INT} = sub { $n++ }; kill "INT", -getpgrp(); for (1..5) { select(undef, undef, undef, 0.1) } print "got $n\n"'"#;

#[test]
fn group_interrupt_reaches_foreground_command_once() {
    if !have_perl() {
        eprintln!("perl not found, skipping");
        return;
    }
    for _ in 0..5 {
        Command::cargo_bin("jobsh")
            .unwrap()
            .env("JOBSH_LOG", "off")
            .args(["-c", COUNT_INTERRUPTS])
            .process_group(0)
            .assert()
            .success()
            .stdout(predicate::eq("got 1\n"));
    }
}
