//! Generates the FPGA assembly (FASM) for a routed design.
use super::vpr::{build_dir_of, locate_tool, move_output, vpr_values, VprArgs};
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress};
use crate::process::Tool;
use crate::value::Value;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

struct Fasm {
    io: ModuleIo,
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let mut io = ModuleIo::new(args.instance_name);
    io.no_of_phases = 2;
    io.takes = vec![
        IoName::required("eblif"),
        IoName::required("net"),
        IoName::required("place"),
        IoName::required("route"),
        IoName::maybe("fasm_extra"),
        IoName::maybe("sdc"),
    ];
    io.produces = vec![IoName::required("fasm")];
    io.values = vpr_values(&["top", "pnr_corner?"])?;
    io.prod_meta
        .insert("fasm".to_string(), "FPGA assembly file".to_string());
    Ok(Box::new(Fasm { io }))
}

fn default_fasm(ctx: &ModuleContext) -> Result<PathBuf> {
    let eblif = ctx.takes.require_path("eblif")?;
    let top = ctx.values.require("top")?;
    Ok(build_dir_of(&eblif).join(format!("{top}.fasm")))
}

impl Module for Fasm {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        let mut out = BTreeMap::new();
        out.insert(
            "fasm".to_string(),
            Value::from(default_fasm(ctx)?.to_string_lossy().into_owned()),
        );
        Ok(out)
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        let eblif = ctx.takes.require_path("eblif")?;
        let build_dir = build_dir_of(&eblif);
        let args = VprArgs::from_context(ctx, None)?;

        let mut tool = Tool::new(locate_tool(&ctx.bin, "genfasm"))
            .arg(args.arch_def.clone())
            .arg(args.eblif.to_string_lossy())
            .args([
                "--device",
                args.device_name.as_str(),
                "--read_rr_graph",
                args.rr_graph.as_str(),
            ])
            .args(args.optional.iter().cloned());
        if let Some(corner) = ctx.values.get("pnr_corner") {
            tool = tool.arg("--pnr_corner").arg(corner.to_string());
        }
        if let Some(sdc) = ctx.takes.str("sdc") {
            tool = tool.arg("--sdc").arg(sdc);
        }

        if progress.verbose() {
            progress.phase(format!("Generating FASM...\n           {}", tool.display()));
        } else {
            progress.phase("Generating FASM...");
        }
        tool.cwd(&build_dir)
            .run()
            .with_context(|| format!("genfasm for stage `{}`", ctx.stage_name))?;

        let fasm = ctx.outputs.require_path("fasm")?;
        move_output(&default_fasm(ctx)?, &fasm)?;

        match ctx.takes.path("fasm_extra") {
            Some(extra) => {
                progress.phase("Appending extra FASM...");
                let text = fs::read_to_string(&extra)
                    .with_context(|| format!("read {}", extra.display()))?;
                let mut file = OpenOptions::new()
                    .append(true)
                    .open(&fasm)
                    .with_context(|| format!("open {}", fasm.display()))?;
                write!(file, "\n{text}").with_context(|| format!("append to {}", fasm.display()))?;
            }
            None => progress.phase("No extra FASM to append"),
        }
        Ok(())
    }
}
