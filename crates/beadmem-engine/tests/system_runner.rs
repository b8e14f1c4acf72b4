//! Real process execution against small shell-script engines.

#![cfg(unix)]

use beadmem_engine::args::create_args;
use beadmem_engine::{
    EngineClient, EngineConfig, EngineError, NewIssue, Operation, Timeouts,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

// Writing an executable while another test thread forks can fail the exec
// with ETXTBSY, so script tests run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-bd");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod");
    path
}

fn client_for(program: PathBuf, dir: &Path) -> EngineClient {
    EngineClient::new(EngineConfig::with_program(program).in_dir(dir))
}

#[test]
fn parses_stdout_of_successful_process() {
    let _guard = serial();
    let dir = tempfile::tempdir().expect("tempdir");
    let program = script(
        dir.path(),
        r#"printf '%s' '[{"id":"bd-1","title":"hello","status":"open","priority":2}]'"#,
    );
    let client = client_for(program, dir.path());

    let issue = client.show_issue("bd-1").expect("show");
    assert_eq!(issue.title, "hello");
}

#[test]
fn nonzero_exit_surfaces_code_and_stderr() {
    let _guard = serial();
    let dir = tempfile::tempdir().expect("tempdir");
    let program = script(dir.path(), "echo 'Error: issue bd-9 not found' >&2\nexit 3");
    let client = client_for(program, dir.path());

    match client.show_issue("bd-9").expect_err("failure") {
        EngineError::Process { code, stderr, .. } => {
            assert_eq!(code, Some(3));
            assert_eq!(stderr, "Error: issue bd-9 not found");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn hung_process_is_killed_at_timeout() {
    let _guard = serial();
    let dir = tempfile::tempdir().expect("tempdir");
    let program = script(dir.path(), "exec sleep 30");
    let mut config = EngineConfig::with_program(program).in_dir(dir.path());
    config.timeouts = Timeouts {
        single_record_secs: 1,
        ..Timeouts::default()
    };
    let client = EngineClient::new(config);

    let started = Instant::now();
    let err = client.show_issue("bd-1").expect_err("timeout");
    assert!(err.is_timeout(), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn large_output_on_both_pipes_does_not_stall() {
    let _guard = serial();
    let dir = tempfile::tempdir().expect("tempdir");
    let program = script(
        dir.path(),
        r#"i=0
while [ $i -lt 4000 ]; do echo "warning line $i padding padding padding" >&2; i=$((i+1)); done
printf '%s' '{"version":"0.20.1"}'"#,
    );
    let client = client_for(program, dir.path());

    assert_eq!(client.version().expect("version"), "0.20.1");
}

#[test]
fn hostile_text_arrives_as_single_arguments() {
    let _guard = serial();
    let dir = tempfile::tempdir().expect("tempdir");
    let program = script(dir.path(), r#"printf '{"argc":%d,"title":"%s"}' "$#" "$2""#);
    let client = client_for(program, dir.path());

    let args = create_args(&NewIssue::new("x; touch pwned $(id)")).expect("args");
    let argc = args.len();
    let value = client.execute(Operation::Create, args).expect("execute");

    assert_eq!(value["argc"], argc);
    assert_eq!(value["title"], "--title=x; touch pwned $(id)");
    assert!(!dir.path().join("pwned").exists());
}

#[test]
fn uninitialized_stderr_maps_to_not_initialized() {
    let _guard = serial();
    let dir = tempfile::tempdir().expect("tempdir");
    let program = script(
        dir.path(),
        "echo 'Error: no beads database found' >&2\nexit 1",
    );
    let client = client_for(program, dir.path());

    assert!(!client.is_initialized().expect("initialized check"));
    assert!(client.is_available());
}

#[test]
fn missing_executable_is_not_installed() {
    let _guard = serial();
    let dir = tempfile::tempdir().expect("tempdir");
    let client = client_for(dir.path().join("no-such-bd"), dir.path());

    assert!(matches!(
        client.version(),
        Err(EngineError::NotInstalled { .. })
    ));
    assert!(!client.is_available());
}
