#![cfg(unix)]

use std::ffi::OsString;
use std::time::{Duration, Instant};

use insights_host_runner::{run_process, Invocation, TempDir};

fn sh(script: &str) -> Invocation {
    Invocation::new("/bin/sh", vec![OsString::from("-c"), OsString::from(script)])
}

#[test]
fn captures_stdout_stderr_and_exit_code() {
    let out = run_process(&sh("printf 'hello\\n'; printf 'oops\\n' >&2; exit 3")).expect("run");
    assert_eq!(out.stdout, "hello\n");
    assert_eq!(out.stderr, "oops\n");
    assert_eq!(out.exit_status, 3);
    assert!(!out.timed_out);
    assert!(!out.success());
}

#[test]
fn pipes_stdin() {
    let inv = sh("cat").with_stdin(b"int main() {}\n".to_vec());
    let out = run_process(&inv).expect("run");
    assert!(out.success());
    assert_eq!(out.stdout, "int main() {}\n");
}

#[test]
fn timeout_kills_the_process_group() {
    let started = Instant::now();
    let inv = sh("sleep 30 & sleep 30; echo never")
        .with_timeout(Some(Duration::from_millis(200)));
    let out = run_process(&inv).expect("run");
    assert!(out.timed_out);
    assert!(!out.success());
    assert!(!out.stdout.contains("never"));
    assert!(
        started.elapsed() < Duration::from_secs(20),
        "background sleep kept the pipes open: {:?}",
        started.elapsed()
    );
}

#[test]
fn runs_in_requested_directory() {
    let tmp = TempDir::new("insights_cwd").expect("tempdir");
    let out = run_process(&sh("touch made.o").with_cwd(tmp.path())).expect("run");
    assert!(out.success());
    assert!(tmp.path().join("made.o").is_file());
}

#[test]
fn signal_exit_maps_to_128_plus_signal() {
    let out = run_process(&sh("kill -9 $$")).expect("run");
    assert_eq!(out.exit_signal, Some(9));
    assert_eq!(out.exit_status, 137);
}

#[test]
fn missing_program_is_an_error() {
    let inv = Invocation::new("/definitely/not/here/insights", Vec::new());
    assert!(run_process(&inv).is_err());
}

#[test]
fn output_past_the_cap_is_flagged_and_drained() {
    let inv = sh("head -c 100000 /dev/zero; printf 'e%.0s' 1 2 3 4 5 >&2").with_output_caps(1000, 2);
    let out = run_process(&inv).expect("run");
    assert!(out.success(), "exit={}", out.exit_status);
    assert_eq!(out.stdout.len(), 1000);
    assert_eq!(out.stdout_total_bytes, 100_000);
    assert!(out.stdout_truncated);
    assert_eq!(out.stderr, "ee");
    assert_eq!(out.stderr_total_bytes, 5);
    assert!(out.stderr_truncated);
    assert!(out.truncated());
}

#[test]
fn output_within_the_cap_is_complete() {
    let out = run_process(&sh("printf 'abc'").with_output_caps(3, 3)).expect("run");
    assert_eq!(out.stdout, "abc");
    assert!(!out.truncated());
}
