//! Routes a placed design with VPR.
use super::vpr::{build_dir_of, move_output, save_vpr_log, vpr, vpr_values, VprArgs};
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress};
use crate::value::Value;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

struct Route {
    io: ModuleIo,
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let mut io = ModuleIo::new(args.instance_name);
    io.no_of_phases = 2;
    io.takes = vec![
        IoName::required("eblif"),
        IoName::required("place"),
        IoName::maybe("sdc"),
    ];
    io.produces = vec![IoName::required("route")];
    io.values = vpr_values(&[])?;
    io.prod_meta
        .insert("route".to_string(), "Routing result".to_string());
    Ok(Box::new(Route { io }))
}

fn default_route(eblif: &Path) -> PathBuf {
    eblif.with_extension("route")
}

impl Module for Route {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        let eblif = ctx.takes.require_path("eblif")?;
        let mut out = BTreeMap::new();
        out.insert(
            "route".to_string(),
            Value::from(default_route(&eblif).to_string_lossy().into_owned()),
        );
        Ok(out)
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        let eblif = ctx.takes.require_path("eblif")?;
        let build_dir = build_dir_of(&eblif);

        progress.phase("Routing with VPR...");
        let args = VprArgs::from_context(ctx, ctx.takes.path("sdc"))?;
        vpr(ctx, "route", &args, &build_dir)?;

        if ctx.is_output_explicit("route") {
            let dest = ctx.outputs.require_path("route")?;
            move_output(&default_route(&eblif), &dest)?;
        }

        progress.phase("Saving log...");
        save_vpr_log(&build_dir, &build_dir.join("route.log"))
    }
}
