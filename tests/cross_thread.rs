//! Concurrent producers: every thread's records survive, each under its own
//! thread id.

use std::thread;

use rayon::prelude::*;
use spanline::loader::{LoadOptions, load_trace};
use spanline_runtime::{Recorder, RecorderConfig, ZeroLengthPolicy};

fn allow_all() -> RecorderConfig {
    RecorderConfig {
        zero_length: ZeroLengthPolicy::Allow,
        ..RecorderConfig::default()
    }
}

#[test]
fn scoped_threads_each_get_a_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("threads.trace");
    let recorder = Recorder::new(allow_all());
    recorder.initialize(&path).unwrap();

    const WORKERS: usize = 4;
    const OUTER: usize = 25;
    thread::scope(|s| {
        for w in 0..WORKERS {
            let recorder = &recorder;
            thread::Builder::new()
                .name(format!("worker-{w}"))
                .spawn_scoped(s, move || {
                    for i in 0..OUTER {
                        let _outer = recorder.scope(format!("job {w}.{i}"));
                        let _inner = recorder.scope("step");
                        recorder.log_event("mark");
                    }
                })
                .unwrap();
        }
    });

    let stats = recorder.shutdown().unwrap();
    assert_eq!(stats.threads, WORKERS);

    let loaded = load_trace(&path, &LoadOptions::default()).unwrap();
    assert!(loaded.issues.is_empty(), "{:?}", loaded.issues);
    let report = loaded.report;
    assert_eq!(report.threads().len(), WORKERS);

    let mut names: Vec<&str> = report.threads().values().map(|t| t.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["worker-0", "worker-1", "worker-2", "worker-3"]);

    for thread in report.threads().values() {
        assert_eq!(thread.records.len(), OUTER, "{}", thread.name);
        let w = thread.name.trim_start_matches("worker-");
        for &id in &thread.records {
            let outer = report.record(id);
            assert!(outer.name.starts_with(&format!("job {w}.")), "{}", outer.name);
            assert_eq!(outer.enclosed.len(), 1);
            let inner = report.record(outer.enclosed[0]);
            assert_eq!(inner.name, "step");
            assert_eq!(inner.enclosed.len(), 1);
        }
    }
    // outer + inner + instant per iteration
    assert_eq!(report.record_count(), WORKERS * OUTER * 3);
}

#[test]
fn rayon_pool_records_every_task() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("rayon.trace");
    let recorder = Recorder::new(allow_all());
    recorder.initialize(&path).unwrap();

    const TASKS: u64 = 500;
    let sum: u64 = (0..TASKS)
        .into_par_iter()
        .map(|i| {
            let _task = recorder.scope("task");
            (0..=i).sum::<u64>()
        })
        .sum();
    assert_eq!(sum, (0..TASKS).map(|i| i * (i + 1) / 2).sum::<u64>());

    recorder.shutdown().unwrap();

    let report = load_trace(&path, &LoadOptions::default()).unwrap().report;
    assert_eq!(report.record_count(), TASKS as usize);
    for thread in report.threads().values() {
        for &id in &thread.records {
            assert_eq!(report.record(id).name, "task");
            assert!(report.record(id).enclosed.is_empty());
        }
    }
}

#[test]
fn flush_mid_run_keeps_stream_well_formed() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("flush.trace");
    let recorder = Recorder::new(allow_all());
    recorder.initialize(&path).unwrap();

    let outer = recorder.begin_scope("outer");
    for _ in 0..10 {
        let _g = recorder.scope("inner");
    }
    recorder.flush().unwrap();
    let worker_recorder = &recorder;
    thread::scope(|s| {
        s.spawn(move || {
            let _g = worker_recorder.scope("background");
        });
    });
    recorder.end_scope(outer).unwrap();
    recorder.shutdown().unwrap();

    let loaded = load_trace(&path, &LoadOptions::default()).unwrap();
    assert!(loaded.issues.is_empty(), "{:?}", loaded.issues);
    assert_eq!(loaded.report.threads().len(), 2);
    assert_eq!(loaded.report.record_count(), 12);
}
