//! Derives placement constraints for the packed design from the IO placement.
use super::vpr::options_to_args;
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress};
use crate::process::Tool;
use crate::value::Value;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

struct PlaceConstraints {
    io: ModuleIo,
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let mut io = ModuleIo::new(args.instance_name);
    io.no_of_phases = 2;
    io.takes = vec![
        IoName::required("eblif"),
        IoName::required("net"),
        IoName::required("io_place"),
    ];
    io.produces = vec![IoName::required("place_constraints")];
    io.values = vec![
        IoName::required("device"),
        IoName::required("part_name"),
        IoName::required("script"),
        IoName::maybe("extra_opts"),
    ];
    io.prod_meta.insert(
        "place_constraints".to_string(),
        "Placement constraints for VPR".to_string(),
    );
    Ok(Box::new(PlaceConstraints { io }))
}

/// `<net stem>.preplace` next to the packed netlist.
fn default_constraints(net: &Path) -> PathBuf {
    net.with_extension("preplace")
}

/// Database root: the configured `prjxray_db`, else what `prjxray-config` reports.
fn db_root(ctx: &ModuleContext) -> Result<String> {
    if let Some(db) = ctx.r_env.get("prjxray_db").and_then(Value::as_str) {
        return Ok(db.to_string());
    }
    let stdout = Tool::new("prjxray-config")
        .run()
        .context("locate the prjxray database")?;
    Ok(String::from_utf8_lossy(&stdout).trim().to_string())
}

impl PlaceConstraints {
    fn command(&self, ctx: &ModuleContext, db_root: &str) -> Result<Tool> {
        let text = |name: &str| -> Result<String> { Ok(ctx.values.require(name)?.to_string()) };
        let path = |name: &str| -> Result<String> {
            Ok(ctx.takes.require_path(name)?.to_string_lossy().into_owned())
        };
        let device = text("device")?;
        let arch = ctx.share.join("arch").join(&device).join("arch.timing.xml");
        let python = ctx
            .r_env
            .get("python3")
            .and_then(Value::as_str)
            .unwrap_or("python3");
        let mut tool = Tool::new(python).arg(text("script")?).args([
            "--net".to_string(),
            path("net")?,
            "--arch".to_string(),
            arch.to_string_lossy().into_owned(),
            "--blif".to_string(),
            path("eblif")?,
            "--input".to_string(),
            path("io_place")?,
            "--db_root".to_string(),
            db_root.to_string(),
            "--part".to_string(),
            text("part_name")?,
        ]);
        if let Some(extra) = ctx.values.get("extra_opts") {
            tool = tool.args(options_to_args(extra));
        }
        Ok(tool)
    }
}

impl Module for PlaceConstraints {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        let net = ctx.takes.require_path("net")?;
        let mut out = BTreeMap::new();
        out.insert(
            "place_constraints".to_string(),
            Value::from(default_constraints(&net).to_string_lossy().into_owned()),
        );
        Ok(out)
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        progress.phase("Locating the device database...");
        let db = db_root(ctx)?;

        progress.phase("Saving place constraint data...");
        let stdout = self
            .command(ctx, &db)?
            .run()
            .with_context(|| format!("place constraints for stage `{}`", ctx.stage_name))?;
        let dest = ctx.outputs.require_path("place_constraints")?;
        fs::write(&dest, stdout).with_context(|| format!("write {}", dest.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleRegistry, Roots, StageInputs};
    use crate::resolve::ResolutionEnv;

    fn context(env: &ResolutionEnv) -> ModuleContext {
        let module = ModuleRegistry::builtin()
            .instantiate("common:place_constraints", &Value::Null, env, "place_constraints")
            .expect("instantiate");
        let mut inputs = StageInputs::default();
        for (name, path) in [
            ("eblif", "/b/top.eblif"),
            ("net", "/b/top.net"),
            ("io_place", "/b/top.ioplace"),
        ] {
            inputs.takes.insert(name.to_string(), Value::from(path));
        }
        let roots = Roots {
            share: PathBuf::from("/share"),
            ..Roots::default()
        };
        ModuleContext::new(module.as_ref(), "place_constraints", &inputs, env, &roots)
            .expect("context")
    }

    fn env() -> ResolutionEnv {
        let mut env = ResolutionEnv::new();
        env.bind("device", &Value::from("xc7a50t_test"));
        env.bind("part_name", &Value::from("xc7a35tcpg236-1"));
        env.bind("script", &Value::from("/share/scripts/create_place_constraints.py"));
        env
    }

    #[test]
    fn constraints_land_next_to_the_netlist() {
        let ctx = context(&env());
        assert_eq!(
            ctx.outputs.require_path("place_constraints").expect("output"),
            PathBuf::from("/b/top.preplace")
        );
    }

    #[test]
    fn command_passes_inputs_database_and_extra_options() {
        let mut env = env();
        env.bind("python3", &Value::from("python3"));
        let extra: Value = serde_json::from_str(r#"{"blocks": "a b"}"#).expect("extra");
        env.bind("extra_opts", &extra);
        let ctx = context(&env);
        let module = PlaceConstraints {
            io: ModuleIo::new("place_constraints"),
        };
        let command = module.command(&ctx, "/db").expect("command").display();
        assert_eq!(
            command,
            "python3 /share/scripts/create_place_constraints.py --net /b/top.net \
             --arch /share/arch/xc7a50t_test/arch.timing.xml --blif /b/top.eblif \
             --input /b/top.ioplace --db_root /db --part xc7a35tcpg236-1 --blocks 'a b'"
        );
    }
}
