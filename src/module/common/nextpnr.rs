//! Places and routes with nextpnr.
//!
//! Parameters:
//! - `variant`: architecture suffix of the binary, `nextpnr-<variant>`;
//! - `interchange`: read an FPGA interchange netlist instead of Yosys JSON;
//! - `extra_opts`: arguments appended to every invocation.
use super::vpr::{build_dir_of, locate_tool};
use super::{param, param_str};
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress};
use crate::process::Tool;
use crate::value::Value;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;

/// Optional hook scripts and the flag each one is passed with.
const HOOKS: [(&str, &str); 5] = [
    ("prepack_script", "--pre-pack"),
    ("preplace_script", "--pre-place"),
    ("preroute_script", "--pre-route"),
    ("postroute_script", "--post-route"),
    ("fail_script", "--on-fail"),
];

struct NextPnr {
    io: ModuleIo,
    variant: String,
    /// Take carrying the netlist, and the flag it is passed with.
    netlist: (&'static str, &'static str),
    extra_opts: Vec<String>,
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let variant = param_str(args.params, "variant")?.unwrap_or("generic").to_string();
    let netlist = if matches!(param(args.params, "interchange"), Some(Value::Bool(true))) {
        ("ic_logical_netlist", "--netlist")
    } else {
        ("json", "--json")
    };
    let extra_opts = param(args.params, "extra_opts")
        .map(Value::to_args)
        .unwrap_or_default();

    let mut io = ModuleIo::new(args.instance_name);
    io.no_of_phases = 2;
    io.takes = vec![IoName::required(netlist.0)];
    io.produces = vec![IoName::demand("nextpnr_log")];
    io.values = vec![IoName::required("top"), IoName::required("placer"), IoName::required("router")];
    io.values.extend(HOOKS.iter().map(|(name, _)| IoName::maybe(*name)));
    io.values.push(IoName::maybe("thread_count"));
    io.values.push(IoName::maybe("parallel"));
    io.prod_meta
        .insert("nextpnr_log".to_string(), "nextpnr output".to_string());
    Ok(Box::new(NextPnr {
        io,
        variant,
        netlist,
        extra_opts,
    }))
}

fn enabled(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Int(number) => *number != 0,
        Value::Str(text) => matches!(text.as_str(), "1" | "true" | "True"),
        _ => false,
    }
}

impl NextPnr {
    fn command(&self, ctx: &ModuleContext) -> Result<Tool> {
        let text = |name: &str| -> Result<String> { Ok(ctx.values.require(name)?.to_string()) };
        let (take, flag) = self.netlist;
        let mut tool = Tool::new(locate_tool(&ctx.bin, &format!("nextpnr-{}", self.variant)))
            .args(["--top".to_string(), text("top")?])
            .args(["--placer".to_string(), text("placer")?])
            .args(["--router".to_string(), text("router")?])
            .arg(flag)
            .arg(ctx.takes.require_path(take)?.to_string_lossy());
        for (name, hook_flag) in HOOKS {
            if let Some(script) = ctx.values.get(name) {
                tool = tool.arg(hook_flag).arg(script.to_string());
            }
        }
        if let Some(threads) = ctx.values.get("thread_count") {
            tool = tool.arg("--threads").arg(threads.to_string());
        }
        if ctx.values.get("parallel").is_some_and(enabled) {
            tool = tool.arg("--parallel-refine");
        }
        Ok(tool.args(self.extra_opts.iter().cloned()))
    }
}

impl Module for NextPnr {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        let netlist = ctx.takes.require_path(self.netlist.0)?;
        let mut out = BTreeMap::new();
        out.insert(
            "nextpnr_log".to_string(),
            Value::from(build_dir_of(&netlist).join("nextpnr.log").to_string_lossy().into_owned()),
        );
        Ok(out)
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        let tool = self.command(ctx)?;
        if progress.verbose() {
            progress.phase(format!("Place-and-routing with nextpnr...\n {}", tool.display()));
        } else {
            progress.phase("Place-and-routing with nextpnr...");
        }
        let stdout = tool
            .run()
            .with_context(|| format!("nextpnr for stage `{}`", ctx.stage_name))?;

        progress.phase("Saving log...");
        if let Some(log) = ctx.outputs.path("nextpnr_log") {
            fs::write(&log, stdout).with_context(|| format!("write {}", log.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleRegistry, Roots, StageInputs};
    use crate::resolve::ResolutionEnv;
    use std::path::PathBuf;

    fn env() -> ResolutionEnv {
        let mut env = ResolutionEnv::new();
        env.bind("top", &Value::from("counter"));
        env.bind("placer", &Value::from("heap"));
        env.bind("router", &Value::from("router2"));
        env
    }

    fn context(
        params: &str,
        env: &ResolutionEnv,
        takes: &[(&str, &str)],
        demanded: &[&str],
    ) -> (Box<dyn Module>, ModuleContext) {
        let params: Value = serde_json::from_str(params).expect("params");
        let module = ModuleRegistry::builtin()
            .instantiate("common:nextpnr", &params, env, "pnr")
            .expect("instantiate");
        let inputs = StageInputs {
            takes: takes
                .iter()
                .map(|(name, path)| (name.to_string(), Value::from(*path)))
                .collect(),
            demanded: demanded.iter().map(|name| name.to_string()).collect(),
            ..StageInputs::default()
        };
        let ctx = ModuleContext::new(module.as_ref(), "pnr", &inputs, env, &Roots::default())
            .expect("context");
        (module, ctx)
    }

    #[test]
    fn log_is_mapped_only_on_demand() {
        let takes = [("json", "/b/counter.json")];
        let (_, ctx) = context(r#"{"variant": "ice40"}"#, &env(), &takes, &[]);
        assert!(ctx.outputs.get("nextpnr_log").is_none());

        let (_, ctx) = context(r#"{"variant": "ice40"}"#, &env(), &takes, &["nextpnr_log"]);
        assert_eq!(
            ctx.outputs.require_path("nextpnr_log").expect("log"),
            PathBuf::from("/b/nextpnr.log")
        );
    }

    #[test]
    fn interchange_netlist_replaces_json() {
        let (module, _) = context(
            r#"{"interchange": true}"#,
            &env(),
            &[("ic_logical_netlist", "/b/counter.netlist")],
            &[],
        );
        assert_eq!(module.io().takes, vec![IoName::required("ic_logical_netlist")]);
    }

    #[test]
    fn command_carries_hooks_threads_and_extra_options() {
        let mut env = env();
        env.bind("postroute_script", &Value::from("/s/post.py"));
        env.bind("thread_count", &Value::Int(4));
        env.bind("parallel", &Value::Bool(true));
        let nextpnr = NextPnr {
            io: ModuleIo::new("pnr"),
            variant: "ice40".to_string(),
            netlist: ("json", "--json"),
            extra_opts: vec!["--hx8k".to_string()],
        };
        let (_, ctx) = context(r#"{"variant": "ice40"}"#, &env, &[("json", "/b/counter.json")], &[]);
        let command = nextpnr.command(&ctx).expect("command").display();
        assert!(command.ends_with(
            "--top counter --placer heap --router router2 --json /b/counter.json \
             --post-route /s/post.py --threads 4 --parallel-refine --hx8k"
        ));
        assert!(command.contains("nextpnr-ice40"));
    }
}
