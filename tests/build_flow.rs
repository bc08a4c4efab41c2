//! End-to-end runs of the `f4pga` binary against a shell-script flow.

mod common;

use common::Workspace;

#[test]
fn build_runs_every_stage_then_reuses_the_cache() {
    let ws = Workspace::new();
    let first = ws.f4pga(&["-v", "build", "-f", "flow.json"]);
    first.assert_success();
    assert!(first.stdout.contains("Executing stage `synth`:"));
    assert!(first.stdout.contains("Stage `route` has finished its work!"));
    assert!(first.stdout.contains("f4pga: DONE"));
    assert_eq!(ws.read("build/counter.eblif"), "module a;\nmodule b;\n");
    assert_eq!(ws.read("build/counter.route"), "MODULE A;\nMODULE B;\n");
    assert_eq!(ws.read("build/synth.log").trim(), "synthesized 2");
    assert!(ws.project_path(".f4cache").is_file());

    let second = ws.f4pga(&["-v", "build", "-f", "flow.json"]);
    second.assert_success();
    assert!(!second.stdout.contains("Executing stage"));
    assert!(second.stdout.contains("Skipping stage `synth` (cached)"));
    assert!(second.stdout.contains("Skipping stage `route` (cached)"));
}

#[test]
fn changed_source_triggers_a_rebuild() {
    let ws = Workspace::new();
    ws.f4pga(&["build", "-f", "flow.json"]).assert_success();

    ws.write("project/a.v", "module a2;\n");
    let rerun = ws.f4pga(&["-v", "build", "-f", "flow.json"]);
    rerun.assert_success();
    assert!(rerun.stdout.contains("Executing stage `synth`:"));
    assert!(rerun.stdout.contains("Executing stage `route`:"));
    assert_eq!(ws.read("build/counter.route"), "MODULE A2;\nMODULE B;\n");
}

#[test]
fn command_line_value_overrides_project_value() {
    let ws = Workspace::new();
    ws.f4pga(&["build", "-f", "flow.json", "-V", "top=blinky"])
        .assert_success();
    assert!(ws.project_path("build/blinky.route").is_file());
    assert!(!ws.project_path("build/counter.eblif").exists());
}

#[test]
fn explicit_dependency_replaces_producer_output_path() {
    let ws = Workspace::new();
    ws.f4pga(&[
        "build",
        "-f",
        "flow.json",
        "-t",
        "eblif",
        "--dep",
        "eblif=custom/top.eblif",
    ])
    .assert_success();
    // Missing parent directories are created for script outputs.
    assert_eq!(ws.read("custom/top.eblif"), "module a;\nmodule b;\n");
}

#[test]
fn pretend_prints_status_without_running() {
    let ws = Workspace::new();
    let run = ws.f4pga(&["build", "-f", "flow.json", "-P"]);
    run.assert_success();
    assert!(run.stdout.contains("Project status:"));
    assert!(run.stdout.contains("[S] route:"));
    assert!(run.stdout.contains("[S] eblif:"));
    assert!(!ws.project_path("build").exists());
}

#[test]
fn info_lists_products() {
    let ws = Workspace::new();
    let run = ws.f4pga(&["build", "-f", "flow.json", "--info"]);
    run.assert_success();
    assert!(run.stdout.contains("Platform dependencies/targets:"));
    assert!(run.stdout.contains("stage: `synth`, not guaranteed"));
    assert!(run.stdout.contains("stage: `mk_build_dir`, guaranteed"));
}

#[test]
fn stageinfo_groups_stage_io() {
    let ws = Workspace::new();
    let run = ws.f4pga(&["build", "-f", "flow.json", "-S", "synth"]);
    run.assert_success();
    assert!(run
        .stdout
        .contains("Stage `synth` (module `common:generic_script_wrapper`):"));
    assert!(run.stdout.contains("    required: build_dir, sources"));
    assert!(run.stdout.contains("    not guaranteed: synth_log"));
}

#[test]
fn nocache_leaves_no_cache_file() {
    let ws = Workspace::new();
    ws.f4pga(&["build", "-f", "flow.json", "-c"]).assert_success();
    assert!(ws.project_path("build/counter.route").is_file());
    assert!(!ws.project_path(".f4cache").exists());
}

#[test]
fn failing_tool_exit_code_is_propagated() {
    let ws = Workspace::new();
    let run = ws.f4pga(&["build", "-f", "flow.json", "-t", "wreck"]);
    assert_eq!(run.code, Some(3), "stderr:\n{}", run.stderr);
    assert!(run.stderr.contains("module `broken` failed in exec mode"));
    assert!(run.stderr.contains("going down"));
    assert!(run.stdout.contains("f4pga: FAILED"));

    let cache = ws.read(".f4cache");
    assert!(cache.contains("\"synth\""));
    assert!(!cache.contains("\"broken\""));
}

#[test]
fn missing_install_dir_is_fatal() {
    let ws = Workspace::new();
    let run = ws.f4pga_with_install(&["build", "-f", "flow.json"], None);
    assert_eq!(run.code, Some(1));
    assert!(run.stderr.contains("F4PGA_INSTALL_DIR is not set"));
}

#[test]
fn unknown_target_is_fatal_before_any_stage_runs() {
    let ws = Workspace::new();
    let run = ws.f4pga(&["build", "-f", "flow.json", "-t", "bitstream"]);
    assert_eq!(run.code, Some(1));
    assert!(run.stderr.contains("target `bitstream`"));
    assert!(!ws.project_path("build").exists());
}

#[test]
fn showd_prints_project_dependencies() {
    let ws = Workspace::new();
    ws.write(
        "project/flow.json",
        r#"{
            "default_part": "TESTPART-1",
            "dependencies": {"sources": ["a.v"]},
            "TESTPART-1": {
                "dependencies": {"xdc": "pins.xdc"},
                "synth": {"values": {"top": "blinky"}}
            }
        }"#,
    );
    let run = ws.f4pga(&["showd", "-f", "flow.json", "-s", "synth"]);
    run.assert_success();
    assert!(run.stdout.contains("sources = [a.v]\n"));
    assert!(run.stdout.contains("xdc = pins.xdc  [part `TESTPART-1`]\n"));
    assert!(run.stdout.contains("    top = blinky\n"));
}
