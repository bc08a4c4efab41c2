//! Packs a synthesized netlist with VPR.
use super::vpr::{build_dir_of, move_output, vpr, vpr_values, VprArgs, VPR_LOG};
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress};
use crate::value::Value;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;

const DEFAULT_TIMING_RPT: &str = "pre_pack.report_timing.setup.rpt";
const DEFAULT_UTIL_RPT: &str = "packing_pin_util.rpt";

struct Pack {
    io: ModuleIo,
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let mut io = ModuleIo::new(args.instance_name);
    io.no_of_phases = 2;
    io.takes = vec![IoName::required("eblif"), IoName::maybe("sdc")];
    io.produces = vec![
        IoName::required("net"),
        IoName::required("util_rpt"),
        IoName::required("timing_rpt"),
        IoName::demand("pack_log"),
    ];
    io.values = vpr_values(&[])?;
    for (name, meta) in [
        ("net", "Packed netlist"),
        ("util_rpt", "Pin utilization report"),
        ("timing_rpt", "Pre-pack timing report"),
        ("pack_log", "VPR log from packing"),
    ] {
        io.prod_meta.insert(name.to_string(), meta.to_string());
    }
    Ok(Box::new(Pack { io }))
}

impl Module for Pack {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        let eblif = ctx.takes.require_path("eblif")?;
        let build_dir = build_dir_of(&eblif);
        let mut out = BTreeMap::new();
        out.insert(
            "net".to_string(),
            Value::from(eblif.with_extension("net").to_string_lossy().into_owned()),
        );
        out.insert(
            "util_rpt".to_string(),
            Value::from(build_dir.join(DEFAULT_UTIL_RPT).to_string_lossy().into_owned()),
        );
        out.insert(
            "timing_rpt".to_string(),
            Value::from(build_dir.join(DEFAULT_TIMING_RPT).to_string_lossy().into_owned()),
        );
        out.insert(
            "pack_log".to_string(),
            Value::from(build_dir.join("pack.log").to_string_lossy().into_owned()),
        );
        Ok(out)
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        let net = ctx.outputs.require_path("net")?;
        let build_dir = build_dir_of(&net);

        progress.phase("Packing with VPR...");
        let args = VprArgs::from_context(ctx, ctx.takes.path("sdc"))?;
        vpr(ctx, "pack", &args, &build_dir)?;

        progress.phase("Moving/deleting files...");
        let log = build_dir.join(VPR_LOG);
        match ctx.outputs.path("pack_log") {
            Some(dest) => move_output(&log, &dest)?,
            None if log.exists() => {
                fs::remove_file(&log).with_context(|| format!("remove {}", log.display()))?
            }
            None => {}
        }
        if let Some(dest) = ctx.outputs.path("timing_rpt") {
            move_output(&build_dir.join(DEFAULT_TIMING_RPT), &dest)?;
        }
        if let Some(dest) = ctx.outputs.path("util_rpt") {
            move_output(&build_dir.join(DEFAULT_UTIL_RPT), &dest)?;
        }
        Ok(())
    }
}
