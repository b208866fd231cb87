//! Concurrency tests: packet threads traversing while the controller
//! rewires and cuts over the running graph.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flexpipe_runtime::Switch;

const RUNNING_JSON: &str = r#"{
    "pipelines": [{
        "name": "p",
        "init_node": "a",
        "tables": [
            {"name": "a", "base_default_next": "b"},
            {"name": "b", "base_default_next": null}
        ]
    }]
}"#;

const STAGED_JSON: &str = r#"{
    "pipelines": [{
        "name": "p",
        "init_node": "c",
        "tables": [{"name": "c", "base_default_next": null}]
    }]
}"#;

/// Every traversal observed during a full cutover session must be one of the
/// legal pre/post states of some command; a torn intermediate would show up
/// as an unexpected path.
#[test]
fn walkers_only_observe_legal_paths_during_cutover() {
    let sw = Arc::new(Switch::new(1));
    sw.load_program(0, RUNNING_JSON).unwrap();

    let legal: HashSet<Vec<String>> = [
        vec!["a".to_string(), "b".to_string()],
        vec!["a".to_string(), "flex_0".to_string(), "b".to_string()],
        vec!["a".to_string(), "flex_0".to_string(), "c".to_string()],
        vec!["a".to_string(), "c".to_string()],
    ]
    .into_iter()
    .collect();

    let done = Arc::new(AtomicBool::new(false));
    let walkers: Vec<_> = (0..4)
        .map(|_| {
            let sw = Arc::clone(&sw);
            let done = Arc::clone(&done);
            let legal = legal.clone();
            thread::spawn(move || {
                let mut observations = 0usize;
                while !done.load(Ordering::Relaxed) {
                    let path = sw.walk_pipeline(0, "p").unwrap();
                    assert!(legal.contains(&path), "torn traversal observed: {path:?}");
                    observations += 1;
                }
                observations
            })
        })
        .collect();

    // Controller session: install, cut over, clean up.
    sw.init_staged(0, STAGED_JSON).unwrap();
    sw.insert_table(0, "p", "new_c").unwrap();
    sw.insert_flex(0, "p", "flx_f", "new_c", "old_b").unwrap();
    thread::sleep(Duration::from_millis(10));
    sw.change_table(0, "p", "old_a", "__default__", "flx_f").unwrap();
    thread::sleep(Duration::from_millis(10));
    sw.trigger(0, true, None).unwrap();
    thread::sleep(Duration::from_millis(10));
    sw.change_table(0, "p", "old_a", "__default__", "new_c").unwrap();
    thread::sleep(Duration::from_millis(10));
    sw.delete_flex(0, "p", "flx_f").unwrap();
    sw.delete_table(0, "p", "old_b").unwrap();
    thread::sleep(Duration::from_millis(10));

    done.store(true, Ordering::Relaxed);
    let total: usize = walkers.into_iter().map(|w| w.join().unwrap()).sum();
    assert!(total > 0);

    assert_eq!(sw.walk_pipeline(0, "p").unwrap(), vec!["a", "c"]);
}

/// Repeated triggering under reader load flips atomically between the two
/// paths; no reader sees a half-toggled graph.
#[test]
fn trigger_flips_atomically_under_reader_load() {
    let sw = Arc::new(Switch::new(1));
    sw.load_program(0, RUNNING_JSON).unwrap();
    sw.init_staged(0, STAGED_JSON).unwrap();
    sw.insert_table(0, "p", "new_c").unwrap();
    sw.insert_flex(0, "p", "flx_f", "new_c", "old_b").unwrap();
    sw.change_table(0, "p", "old_a", "__default__", "flx_f").unwrap();

    let armed_path = vec!["a".to_string(), "flex_0".to_string(), "c".to_string()];
    let disarmed_path = vec!["a".to_string(), "flex_0".to_string(), "b".to_string()];

    let done = Arc::new(AtomicBool::new(false));
    let walkers: Vec<_> = (0..4)
        .map(|_| {
            let sw = Arc::clone(&sw);
            let done = Arc::clone(&done);
            let armed_path = armed_path.clone();
            let disarmed_path = disarmed_path.clone();
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    let path = sw.walk_pipeline(0, "p").unwrap();
                    assert!(
                        path == armed_path || path == disarmed_path,
                        "unexpected path: {path:?}"
                    );
                }
            })
        })
        .collect();

    for round in 0..100 {
        sw.trigger(0, round % 2 == 0, None).unwrap();
    }

    done.store(true, Ordering::Relaxed);
    for walker in walkers {
        walker.join().unwrap();
    }
}
