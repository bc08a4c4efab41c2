//! Shared test infrastructure for integration tests.
//!
//! Each test gets a throwaway install tree (part database plus one platform
//! flow built from shell scripts) and a project directory to run `f4pga` in.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub const PART: &str = "TESTPART-1";

/// Platform flow whose stages are small `sh` scripts.
pub const PLATFORM: &str = r##"
stages:
  mk_build_dir:
    module: common:mkdirs
    params:
      build_dir: ${build_root}
  synth:
    module: common:generic_script_wrapper
    params:
      stage_name: synth
      interpreter: sh -e
      script: -c
      cwd: ${:build_dir}
      inputs:
        "#1": 'cat "$@" > out.eblif; echo synthesized $#'
        "#2": synth
        "#3": ${:sources}
      outputs:
        eblif:
          mode: file
          file: out.eblif
          target: ${:build_dir}/${top}.eblif
        synth_log:
          mode: stdout
          target: ${:build_dir}/synth.log
          optional: true
  route:
    module: common:generic_script_wrapper
    params:
      stage_name: route
      interpreter: sh -e
      script: -c
      inputs:
        "#1": 'tr a-z A-Z < "$1" > "$2"'
        "#2": route
        "#3": ${:eblif}
        "#4": ${:eblif[noext]}.route
      outputs:
        route:
          mode: file
          file: ${:eblif[noext]}.route
          target: ${:eblif[noext]}.route
  broken:
    module: common:generic_script_wrapper
    params:
      stage_name: broken
      interpreter: sh
      script: -c
      inputs:
        "#1": 'echo going down >&2; exit 3'
        "#2": broken
        "#3": ${:route}
      outputs:
        wreck:
          mode: file
          file: wreck.txt
          target: ${:build_dir}/wreck.txt
"##;

pub const PROJECT: &str = r#"{
    "default_part": "TESTPART-1",
    "default_target": "route",
    "values": {"build_root": "build", "top": "counter"},
    "dependencies": {"sources": ["a.v", "b.v"]}
}"#;

/// Output of one `f4pga` invocation.
#[derive(Debug)]
pub struct Run {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Run {
    pub fn assert_success(&self) -> &Self {
        assert_eq!(
            self.code,
            Some(0),
            "f4pga failed\nstdout:\n{}\nstderr:\n{}",
            self.stdout,
            self.stderr
        );
        self
    }
}

/// Install tree plus project directory.
pub struct Workspace {
    root: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let root = TempDir::new().expect("tempdir");
        let workspace = Self { root };
        workspace.write(
            "install/ice40/share/f4pga/flows/part_db.yml",
            &format!("test:\n  - {PART}\n"),
        );
        workspace.write("install/ice40/share/f4pga/flows/platforms/test.yml", PLATFORM);
        workspace.write("project/flow.json", PROJECT);
        workspace.write("project/a.v", "module a;\n");
        workspace.write("project/b.v", "module b;\n");
        workspace
    }

    pub fn install_dir(&self) -> PathBuf {
        self.root.path().join("install")
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root.path().join("project")
    }

    /// Path inside the project directory.
    pub fn project_path(&self, rel: &str) -> PathBuf {
        self.project_dir().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root.path().join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        fs::write(&path, contents).expect("write file");
        path
    }

    pub fn read(&self, rel: &str) -> String {
        let path = self.project_path(rel);
        fs::read_to_string(&path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
    }

    /// Run `f4pga` from the project directory against the test install tree.
    pub fn f4pga(&self, args: &[&str]) -> Run {
        self.f4pga_with_install(args, Some(&self.install_dir()))
    }

    pub fn f4pga_with_install(&self, args: &[&str], install: Option<&Path>) -> Run {
        let mut command = Command::new(env!("CARGO_BIN_EXE_f4pga"));
        command
            .args(args)
            .current_dir(self.project_dir())
            .env("FPGA_FAM", "ice40")
            .env_remove("F4PGA_SHARE_DIR")
            .env_remove("F4PGA_LOG");
        match install {
            Some(dir) => command.env("F4PGA_INSTALL_DIR", dir),
            None => command.env_remove("F4PGA_INSTALL_DIR"),
        };
        let output = command.output().expect("spawn f4pga");
        Run {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}
