//! Synthesizes HDL sources with Yosys through the platform's TCL scripts.
//!
//! Parameters:
//! - `takes`, `produces`: extra dependencies for the TCL scripts to use;
//! - `prod_meta`: descriptions of products, overriding the built-in ones.
//!
//! The scripts are `synth.f4pga.tcl` and `conv.f4pga.tcl` in `tcl_scripts`.
//! They read their settings from the environment described by `yosys_tcl_env`.
use super::param;
use super::vpr::{build_dir_of, locate_tool};
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress, Qualifier};
use crate::process::Tool;
use crate::value::Value;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

struct Synth {
    io: ModuleIo,
    /// Script-specific products mapped next to the netlist.
    extra_products: Vec<String>,
}

fn param_io_names(params: &Value, key: &str) -> Result<Vec<IoName>> {
    match param(params, key) {
        None => Ok(Vec::new()),
        Some(Value::List(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| anyhow!("parameter `{key}` must list names, got {item}"))
                    .and_then(IoName::parse)
            })
            .collect(),
        Some(other) => Err(anyhow!("parameter `{key}` must be a list, got {other}")),
    }
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let mut io = ModuleIo::new(args.instance_name);
    io.no_of_phases = 3;
    io.takes = vec![IoName::required("sources"), IoName::maybe("build_dir")];
    io.takes.extend(param_io_names(args.params, "takes")?);
    io.produces = vec![
        IoName::required("eblif"),
        IoName::required("fasm_extra"),
        IoName::required("json"),
        IoName::required("synth_json"),
        IoName::demand("synth_log"),
    ];
    let mut extra_products = Vec::new();
    for extra in param_io_names(args.params, "produces")? {
        if extra.qualifier == Qualifier::Maybe {
            return Err(anyhow!(
                "synth extra products cannot be optional (`?`): `{extra}`"
            ));
        }
        if extra.is_required() {
            extra_products.push(extra.name.clone());
        }
        io.produces.push(extra);
    }
    io.values = vec![
        IoName::required("top"),
        IoName::required("device"),
        IoName::required("tcl_scripts"),
        IoName::maybe("yosys_tcl_env"),
        IoName::maybe("read_verilog_args"),
    ];
    for (name, meta) in [
        ("eblif", "Extended BLIF hierarchical sequential designs file\ngenerated by YOSYS"),
        ("json", "JSON file containing a design generated by YOSYS"),
        ("synth_log", "YOSYS synthesis log"),
        (
            "fasm_extra",
            "Extra FASM generated during sythesis stage. Needed in some designs.\nIn case it's not necessary, the file will be empty.",
        ),
    ] {
        io.prod_meta.insert(name.to_string(), meta.to_string());
    }
    if let Some(meta) = param(args.params, "prod_meta").and_then(Value::as_map) {
        for (name, text) in meta {
            io.prod_meta.insert(name.clone(), text.to_string());
        }
    }
    Ok(Box::new(Synth { io, extra_products }))
}

/// Environment for the TCL scripts: lists are joined with spaces, nulls dropped.
pub fn tcl_env(definition: &Value) -> BTreeMap<String, String> {
    let Some(map) = definition.as_map() else {
        return BTreeMap::new();
    };
    map.iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.to_args().join(" ")))
        .collect()
}

/// Path prefix every product is named after: `top`, under `build_dir` if bound.
fn output_base(ctx: &ModuleContext) -> Result<PathBuf> {
    let top = ctx.values.require("top")?.to_string();
    Ok(match ctx.takes.path("build_dir") {
        Some(dir) => dir.join(top),
        None => PathBuf::from(top),
    })
}

fn suffixed(base: &Path, suffix: &str) -> Value {
    let mut text = base.as_os_str().to_os_string();
    text.push(suffix);
    Value::from(PathBuf::from(text).to_string_lossy().into_owned())
}

impl Synth {
    fn yosys(&self, ctx: &ModuleContext, env: &BTreeMap<String, String>) -> Tool {
        env.iter().fold(
            Tool::new(locate_tool(&ctx.bin, "yosys")),
            |tool, (key, value)| tool.env(key.clone(), value.clone()),
        )
    }

    /// The TCL environment, with output paths available as `${:name}`.
    fn script_env(&self, ctx: &ModuleContext) -> BTreeMap<String, String> {
        let Some(definition) = ctx.values.get("yosys_tcl_env") else {
            return BTreeMap::new();
        };
        let mut r_env = ctx.r_env.clone();
        for (name, value) in ctx.outputs.bound() {
            r_env.bind_raw(format!(":{name}"), value.clone());
        }
        tcl_env(&r_env.resolve_final(definition))
    }

    fn synth_command(&self, ctx: &ModuleContext, env: &BTreeMap<String, String>) -> Result<Tool> {
        let scripts = ctx.values.require_path("tcl_scripts")?;
        let mut sources = ctx.takes.require("sources")?.to_args();
        let mut script = format!("tcl {}", scripts.join("synth.f4pga.tcl").display());
        // With explicit reader flags the sources are read by the script itself.
        if let Some(args) = ctx.values.get("read_verilog_args") {
            let args = args.to_args().join(" ");
            let reads: String = sources
                .drain(..)
                .map(|source| format!("read_verilog {args} {source}; "))
                .collect();
            script = format!("{reads}{script}");
        }
        let mut tool = self.yosys(ctx, env).arg("-p").arg(script);
        if let Some(log) = ctx.outputs.path("synth_log") {
            tool = tool.arg("-l").arg(log.to_string_lossy());
        }
        Ok(tool.args(sources))
    }
}

impl Module for Synth {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        let base = output_base(ctx)?;
        let mut out = BTreeMap::new();
        out.insert("eblif".to_string(), suffixed(&base, ".eblif"));
        out.insert("fasm_extra".to_string(), suffixed(&base, "_fasm_extra.fasm"));
        out.insert("json".to_string(), suffixed(&base, ".json"));
        out.insert("synth_json".to_string(), suffixed(&base, "_io.json"));
        out.insert("synth_log".to_string(), suffixed(&base, "_synth.log"));
        let device = ctx.values.require("device")?.to_string();
        let dir = build_dir_of(&base);
        for name in &self.extra_products {
            out.insert(
                name.clone(),
                Value::from(dir.join(format!("{device}_{name}.{name}")).to_string_lossy().into_owned()),
            );
        }
        Ok(out)
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        let env = self.script_env(ctx);
        let utils = env
            .get("UTILS_PATH")
            .ok_or_else(|| anyhow!("`yosys_tcl_env` of stage `{}` must set UTILS_PATH", ctx.stage_name))?;
        let split_inouts = Path::new(utils).join("split_inouts.py");

        let synth = self.synth_command(ctx, &env)?;
        if progress.verbose() {
            progress.phase(format!(
                "Synthesizing sources: {}...",
                ctx.takes.require("sources")?
            ));
        } else {
            progress.phase("Synthesizing sources...");
        }
        synth
            .run()
            .with_context(|| format!("yosys synthesis for stage `{}`", ctx.stage_name))?;

        progress.phase("Splitting in/outs...");
        let json = ctx.outputs.require_path("json")?;
        let synth_json = ctx.outputs.require_path("synth_json")?;
        let python = ctx
            .r_env
            .get("python3")
            .and_then(Value::as_str)
            .unwrap_or("python3");
        Tool::new(python)
            .arg(split_inouts.to_string_lossy())
            .args(["-i".to_string(), json.to_string_lossy().into_owned()])
            .args(["-o".to_string(), synth_json.to_string_lossy().into_owned()])
            .run()
            .with_context(|| format!("split in/outs for stage `{}`", ctx.stage_name))?;

        let fasm_extra = ctx.outputs.require_path("fasm_extra")?;
        if !fasm_extra.is_file() {
            fs::write(&fasm_extra, b"")
                .with_context(|| format!("write {}", fasm_extra.display()))?;
        }

        progress.phase("Converting...");
        let scripts = ctx.values.require_path("tcl_scripts")?;
        self.yosys(ctx, &env)
            .arg("-p")
            .arg(format!(
                "read_json {}; tcl {}",
                synth_json.display(),
                scripts.join("conv.f4pga.tcl").display()
            ))
            .run()
            .with_context(|| format!("yosys conversion for stage `{}`", ctx.stage_name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleRegistry, Roots, StageInputs};
    use crate::resolve::ResolutionEnv;

    fn env() -> ResolutionEnv {
        let mut env = ResolutionEnv::new();
        env.bind("top", &Value::from("counter"));
        env.bind("device", &Value::from("xc7a50t_test"));
        env.bind("tcl_scripts", &Value::from("/tcl"));
        env
    }

    fn context_in(env: &ResolutionEnv, params: &str, build_dir: &Path, demanded: &[&str]) -> ModuleContext {
        let params: Value = serde_json::from_str(params).expect("params");
        let module = ModuleRegistry::builtin()
            .instantiate("common:synth", &params, env, "synth")
            .expect("instantiate");
        let mut inputs = StageInputs::default();
        inputs
            .takes
            .insert("sources".to_string(), Value::from(vec!["a.v".to_string()]));
        inputs.takes.insert(
            "build_dir".to_string(),
            Value::from(build_dir.to_string_lossy().into_owned()),
        );
        inputs.demanded = demanded.iter().map(|name| name.to_string()).collect();
        ModuleContext::new(module.as_ref(), "synth", &inputs, env, &Roots::default())
            .expect("context")
    }

    fn context(params: &str, build_dir: &Path, demanded: &[&str]) -> ModuleContext {
        context_in(&env(), params, build_dir, demanded)
    }

    fn bare() -> Synth {
        Synth {
            io: ModuleIo::new("synth"),
            extra_products: Vec::new(),
        }
    }

    #[test]
    fn maps_products_under_build_dir() {
        let build = tempfile::tempdir().expect("tempdir");
        let ctx = context(r#"{"produces": ["bitstream_db", "report!"]}"#, build.path(), &[]);
        let output = |name: &str| ctx.outputs.require_path(name).expect(name);
        assert_eq!(output("eblif"), build.path().join("counter.eblif"));
        assert_eq!(output("fasm_extra"), build.path().join("counter_fasm_extra.fasm"));
        assert_eq!(output("json"), build.path().join("counter.json"));
        assert_eq!(output("synth_json"), build.path().join("counter_io.json"));
        assert_eq!(
            output("bitstream_db"),
            build.path().join("xc7a50t_test_bitstream_db.bitstream_db")
        );
        assert!(ctx.outputs.get("synth_log").is_none());
        assert!(ctx.outputs.get("report").is_none());
    }

    #[test]
    fn synth_log_is_mapped_when_demanded() {
        let build = tempfile::tempdir().expect("tempdir");
        let ctx = context("{}", build.path(), &["synth_log"]);
        assert_eq!(
            ctx.outputs.require_path("synth_log").expect("synth_log"),
            build.path().join("counter_synth.log")
        );
    }

    #[test]
    fn optional_extra_products_are_rejected() {
        let params: Value = serde_json::from_str(r#"{"produces": ["extra?"]}"#).expect("params");
        let err = ModuleRegistry::builtin()
            .instantiate("common:synth", &params, &env(), "synth")
            .err()
            .expect("optional extra product");
        assert!(format!("{err:#}").contains("`extra?`"));
    }

    #[test]
    fn tcl_env_joins_lists_and_drops_nulls() {
        let definition: Value = serde_json::from_str(
            r#"{"TOP": "counter", "INPUT_XDC_FILES": ["a.xdc", "b.xdc"], "PCF_FILE": null}"#,
        )
        .expect("definition");
        let env = tcl_env(&definition);
        assert_eq!(env["TOP"], "counter");
        assert_eq!(env["INPUT_XDC_FILES"], "a.xdc b.xdc");
        assert!(!env.contains_key("PCF_FILE"));
    }

    #[test]
    fn sources_follow_the_script_unless_reader_flags_are_set() {
        let build = tempfile::tempdir().expect("tempdir");
        let ctx = context("{}", build.path(), &[]);
        let plain = bare().synth_command(&ctx, &BTreeMap::new()).expect("command");
        assert!(plain.display().ends_with("-p 'tcl /tcl/synth.f4pga.tcl' a.v"));

        let mut env = env();
        env.bind("read_verilog_args", &Value::from("-sv"));
        let ctx = context_in(&env, "{}", build.path(), &["synth_log"]);
        let log = build.path().join("counter_synth.log");
        let with_flags = bare().synth_command(&ctx, &BTreeMap::new()).expect("command");
        assert!(with_flags.display().ends_with(&format!(
            "-p 'read_verilog -sv a.v; tcl /tcl/synth.f4pga.tcl' -l {}",
            shell_words::quote(&log.to_string_lossy())
        )));
    }
}
