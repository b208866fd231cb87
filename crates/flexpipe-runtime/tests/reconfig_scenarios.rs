//! End-to-end reconfiguration scenarios driven through plan text.

use std::path::Path;

use flexpipe_runtime::{ReconfigError, Switch};

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
        "tables": [
            {"name": "c", "base_default_next": null},
            {"name": "b_new", "base_default_next": null}
        ]
    }]
}"#;

fn loaded_switch() -> Switch {
    let sw = Switch::new(1);
    sw.load_program(0, RUNNING_JSON).unwrap();
    sw
}

fn flex_name(sw: &Switch, id: &str) -> String {
    sw.with_read(0, |ctx| ctx.registry().resolve(id).unwrap().unwrap())
        .unwrap()
}

#[test]
fn simple_insert_then_rewire() {
    let sw = loaded_switch();
    sw.runtime_reconfig(
        0,
        STAGED_JSON,
        "table_init   p new_c\n\
         table_change p old_a __default__ new_c\n\
         table_change p new_c __default__ old_b\n",
    )
    .unwrap();

    assert_eq!(sw.walk_pipeline(0, "p").unwrap(), vec!["a", "c", "b"]);
}

#[test]
fn flex_based_cutover() {
    let sw = loaded_switch();
    sw.runtime_reconfig(
        0,
        STAGED_JSON,
        "table_init   p new_b_new\n\
         flex_init    p flx_f new_b_new old_b\n\
         table_change p old_a __default__ flx_f\n\
         trigger      off\n",
    )
    .unwrap();

    let f = flex_name(&sw, "flx_f");
    assert_eq!(
        sw.walk_pipeline(0, "p").unwrap(),
        vec!["a".to_string(), f.clone(), "b".to_string()]
    );

    sw.trigger(0, true, None).unwrap();
    assert_eq!(
        sw.walk_pipeline(0, "p").unwrap(),
        vec!["a".to_string(), f, "b_new".to_string()]
    );
}

#[test]
fn duplicate_insert_is_rejected_without_mutation() {
    let sw = loaded_switch();
    sw.runtime_reconfig(0, STAGED_JSON, "table_init p new_c\n")
        .unwrap();

    let before = sw.snapshot(0).unwrap();
    let err = sw.insert_table(0, "p", "new_c").unwrap_err();
    assert!(matches!(err, ReconfigError::DuplicateId { .. }));
    assert_eq!(before, sw.snapshot(0).unwrap());
}

#[test]
fn bad_prefix_is_rejected_without_mutation() {
    let sw = loaded_switch();
    sw.init_staged(0, STAGED_JSON).unwrap();

    let before = sw.snapshot(0).unwrap();
    let err = sw
        .change_table(0, "p", "bad_a", "__default__", "old_b")
        .unwrap_err();
    assert!(matches!(err, ReconfigError::Prefix { .. }));
    assert_eq!(before, sw.snapshot(0).unwrap());
}

#[test]
fn register_array_lifecycle() {
    let sw = loaded_switch();
    sw.init_staged(0, STAGED_JSON).unwrap();

    sw.insert_register_array(0, "new_r", 16, 32).unwrap();
    sw.with_read(0, |ctx| {
        let r = ctx.running().register_array("r").unwrap();
        assert_eq!((r.size(), r.bitwidth()), (16, 32));
    })
    .unwrap();

    sw.change_register_array(0, "new_r", 0, 32).unwrap();
    sw.with_read(0, |ctx| {
        assert_eq!(ctx.running().register_array("r").unwrap().size(), 32);
    })
    .unwrap();

    sw.change_register_array(0, "new_r", 1, 16).unwrap();
    sw.with_read(0, |ctx| {
        assert_eq!(ctx.running().register_array("r").unwrap().bitwidth(), 16);
    })
    .unwrap();

    let err = sw.change_register_array(0, "new_r", 2, 1).unwrap_err();
    assert!(matches!(err, ReconfigError::InvalidCommand { .. }));

    sw.delete_register_array(0, "new_r").unwrap();
    sw.with_read(0, |ctx| {
        assert!(ctx.running().register_array("r").is_err());
    })
    .unwrap();
}

#[test]
fn batch_aborts_without_rolling_back_the_prefix() {
    let sw = loaded_switch();
    let err = sw
        .runtime_reconfig(
            0,
            STAGED_JSON,
            "table_init   p new_c\n\
             table_change p new_c __default__ new_missing\n",
        )
        .unwrap_err();
    assert!(matches!(err, ReconfigError::UnknownId { .. }));

    // The first command stays applied: the non-rollback policy.
    sw.with_read(0, |ctx| {
        assert!(ctx.running().pipeline("p").unwrap().contains_node("c"));
    })
    .unwrap();
}

#[test]
fn comments_and_blank_lines_are_ignored() {
    let sw = loaded_switch();
    sw.runtime_reconfig(
        0,
        STAGED_JSON,
        "# splice c between a and b\n\
         \n\
         table_init   p new_c\n\
         table_change p old_a __default__ new_c\n",
    )
    .unwrap();
    assert_eq!(sw.walk_pipeline(0, "p").unwrap(), vec!["a", "c"]);
}

#[test]
fn hit_and_miss_edges_steer_traversal() {
    use flexpipe_core::TableOutcome;

    let sw = loaded_switch();
    sw.runtime_reconfig(
        0,
        STAGED_JSON,
        "table_init   p new_c\n\
         table_change p old_a __hit__  new_c\n\
         table_change p old_a __miss__ old_b\n",
    )
    .unwrap();

    let on_hit = sw
        .walk_pipeline_with(0, "p", |_| TableOutcome::Hit, |_| false)
        .unwrap();
    assert_eq!(on_hit, vec!["a", "c"]);

    let on_miss = sw
        .walk_pipeline_with(0, "p", |_| TableOutcome::Miss, |_| false)
        .unwrap();
    assert_eq!(on_miss, vec!["a", "b"]);
}

#[test]
fn null_edge_targets_never_error() {
    let sw = loaded_switch();
    sw.runtime_reconfig(0, STAGED_JSON, "table_change p old_a __default__ null\n")
        .unwrap();
    assert_eq!(sw.walk_pipeline(0, "p").unwrap(), vec!["a"]);
}

#[test]
fn mutate_and_undo_restores_the_original_serialization() {
    let sw = loaded_switch();
    let original = sw.snapshot(0).unwrap();

    sw.runtime_reconfig(
        0,
        STAGED_JSON,
        "table_init   p new_c\n\
         reg_init     new_r 8 16\n\
         flex_init    p flx_f new_c old_b\n\
         table_change p old_a __default__ flx_f\n\
         trigger      on\n\
         init_change  p old_a\n",
    )
    .unwrap();
    assert_ne!(original, sw.snapshot(0).unwrap());

    sw.runtime_reconfig(
        0,
        STAGED_JSON,
        "table_change p old_a __default__ old_b\n\
         flex_delete  p old_flex_0\n\
         table_delete p old_c\n\
         reg_delete   old_r\n\
         init_change  p old_a\n",
    )
    .unwrap();

    assert_eq!(original, sw.snapshot(0).unwrap());
}

#[test]
fn snapshot_file_is_written_after_a_file_level_batch() {
    let dir = std::env::temp_dir().join("flexpipe_scenarios");
    std::fs::create_dir_all(&dir).unwrap();
    let json_path = dir.join("staged.json");
    let plan_path = dir.join("plan.txt");
    let output_path = dir.join("out.json");
    std::fs::write(&json_path, STAGED_JSON).unwrap();
    std::fs::write(&plan_path, "table_init p new_c\n").unwrap();

    let sw = loaded_switch();
    sw.runtime_reconfig_files(0, &json_path, &plan_path, Some(&output_path))
        .unwrap();

    let written = std::fs::read_to_string(Path::new(&format!("{}.new", output_path.display())))
        .unwrap();
    assert!(written.contains("\"c\""));
    assert_eq!(written, sw.snapshot(0).unwrap());
}
