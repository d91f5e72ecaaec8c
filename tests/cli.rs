//! Drive the spanline binary against hand-written trace files.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const HEADER: &str =
    r#"{"format_version":1,"run_id":"42_1700000000000","timestamp_ms":1700000000000}"#;

fn write_trace(dir: &Path, name: &str, events: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut text = String::from(HEADER);
    text.push('\n');
    for event in events {
        text.push_str(event);
        text.push('\n');
    }
    fs::write(&path, text).unwrap();
    path
}

fn spanline(args: &[&str], trace: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_spanline"))
        .args(args)
        .arg(trace)
        .output()
        .unwrap()
}

fn well_formed(dir: &Path) -> PathBuf {
    write_trace(
        dir,
        "good.trace",
        &[
            r#"{"kind":"thread_name","tid":1,"name":"main"}"#,
            r#"{"kind":"scope_start","tid":1,"name":"load","ts_ns":0}"#,
            r#"{"kind":"scope_start","tid":1,"name":"parse","ts_ns":250000000}"#,
            r#"{"kind":"instant","tid":1,"name":"eof","ts_ns":500000000}"#,
            r#"{"kind":"scope_end","tid":1,"ts_ns":750000000}"#,
            r#"{"kind":"scope_end","tid":1,"ts_ns":1500000000}"#,
        ],
    )
}

fn malformed(dir: &Path) -> PathBuf {
    write_trace(
        dir,
        "bad.trace",
        &[
            r#"{"kind":"thread_name","tid":1,"name":"main"}"#,
            r#"{"kind":"scope_start","tid":1,"name":"load","ts_ns":0}"#,
            r#"{"kind":"scope_end","tid":1,"ts_ns":1000}"#,
            r#"{"kind":"thread_name","tid":2,"name":"worker"}"#,
            r#"{"kind":"scope_end","tid":2,"ts_ns":500}"#,
            r#"{"kind":"scope_start","tid":2,"name":"job","ts_ns":600}"#,
            r#"{"kind":"scope_end","tid":2,"ts_ns":900}"#,
            r#"{"kind":"scope_start","tid":2,"name":"dangling","ts_ns":950}"#,
        ],
    )
}

#[test]
fn report_prints_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let trace = well_formed(tmp.path());
    let output = spanline(&["report"], &trace);
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("main [1]"), "{stdout}");
    let load = stdout.lines().find(|l| l.starts_with("load")).unwrap();
    assert!(load.contains("1.50s"), "{load}");
    let parse = stdout.lines().find(|l| l.starts_with("  parse")).unwrap();
    assert!(parse.contains("500ms"), "{parse}");
    assert!(parse.ends_with("@ 250ms"), "{parse}");
    assert!(!stdout.contains("eof"), "{stdout}");

    let output = spanline(&["report", "--instants"], &trace);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("* eof"), "{stdout}");
}

#[test]
fn check_passes_well_formed_trace() {
    let tmp = tempfile::tempdir().unwrap();
    let output = spanline(&["check"], &well_formed(tmp.path()));
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("ok: 1 threads, 3 records"), "{stdout}");
}

#[test]
fn check_fails_on_structural_issues() {
    let tmp = tempfile::tempdir().unwrap();
    let output = spanline(&["check"], &malformed(tmp.path()));
    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("no matching start"), "{stdout}");
    assert!(stdout.contains("'dangling'"), "{stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: 2 structural issue(s)"), "{stderr}");
}

#[test]
fn report_keeps_healthy_threads_of_malformed_trace() {
    let tmp = tempfile::tempdir().unwrap();
    let trace = malformed(tmp.path());

    let output = spanline(&["report"], &trace);
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("main [1]"), "{stdout}");
    assert!(stdout.contains("worker [2]"), "{stdout}");
    assert!(stdout.contains("job"), "{stdout}");
    assert!(!stdout.contains("dangling"), "{stdout}");

    let output = spanline(&["report", "--policy", "drop-thread"], &trace);
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("main [1]"), "{stdout}");
    assert!(!stdout.contains("worker"), "{stdout}");

    let output = spanline(&["report", "--policy", "fail"], &trace);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: malformed trace"), "{stderr}");
}

#[test]
fn layout_reports_geometry() {
    let tmp = tempfile::tempdir().unwrap();
    let trace = well_formed(tmp.path());
    let output = spanline(&["layout", "--zoom", "2000", "--width", "400"], &trace);
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("256.000 px/s"), "{stdout}");
    assert!(stdout.contains("report 0.0..384.0 px"), "{stdout}");
    assert!(stdout.contains("load 1.50s"), "{stdout}");
    assert!(stdout.contains("parse 500ms"), "{stdout}");
}

#[test]
fn layout_rejects_oversized_viewport() {
    let tmp = tempfile::tempdir().unwrap();
    let trace = well_formed(tmp.path());
    let output = spanline(&["layout", "--width", "1e12"], &trace);
    assert_eq!(output.status.code(), Some(1), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: invalid viewport: width"), "{stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn unreadable_trace_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let output = spanline(&["report"], &tmp.path().join("missing.trace"));
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: failed to read trace file"), "{stderr}");

    let corrupt = write_trace(tmp.path(), "corrupt.trace", &["not json"]);
    let output = spanline(&["check"], &corrupt);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("line 2"), "{stderr}");
}
