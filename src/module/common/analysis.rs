//! Timing analysis of a routed design with VPR, producing post-implementation netlists.
use super::vpr::{build_dir_of, move_output, save_vpr_log, vpr, vpr_values, VprArgs};
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress};
use crate::value::Value;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

struct Analysis {
    io: ModuleIo,
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let mut io = ModuleIo::new(args.instance_name);
    io.no_of_phases = 2;
    io.takes = vec![
        IoName::required("eblif"),
        IoName::required("route"),
        IoName::maybe("sdc"),
    ];
    io.produces = vec![
        IoName::required("merged_post_implementation_v"),
        IoName::required("post_implementation_v"),
        IoName::required("analysis_log"),
    ];
    io.values = vpr_values(&[])?;
    for (name, meta) in [
        ("merged_post_implementation_v", "Post-implementation netlist with merged nets"),
        ("post_implementation_v", "Post-implementation netlist"),
        ("analysis_log", "VPR log from timing analysis"),
    ] {
        io.prod_meta.insert(name.to_string(), meta.to_string());
    }
    Ok(Box::new(Analysis { io }))
}

/// Where VPR writes a netlist: the eblif path without extension plus `suffix`.
fn vpr_netlist(eblif: &Path, suffix: &str) -> PathBuf {
    let mut text = eblif.with_extension("").into_os_string();
    text.push(suffix);
    PathBuf::from(text)
}

const MERGED_SUFFIX: &str = "_merged_post_implementation.v";
const POST_SYNTHESIS_SUFFIX: &str = "_post_synthesis.v";

impl Module for Analysis {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        let eblif = ctx.takes.require_path("eblif")?;
        let text = |path: PathBuf| Value::from(path.to_string_lossy().into_owned());
        let mut out = BTreeMap::new();
        out.insert(
            "merged_post_implementation_v".to_string(),
            text(vpr_netlist(&eblif, MERGED_SUFFIX)),
        );
        out.insert(
            "post_implementation_v".to_string(),
            text(vpr_netlist(&eblif, POST_SYNTHESIS_SUFFIX)),
        );
        out.insert(
            "analysis_log".to_string(),
            text(build_dir_of(&eblif).join("analysis.log")),
        );
        Ok(out)
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        let eblif = ctx.takes.require_path("eblif")?;
        let build_dir = build_dir_of(&eblif);

        progress.phase("Analysis with VPR...");
        let args = VprArgs::from_context(ctx, ctx.takes.path("sdc"))?;
        vpr(ctx, "analysis", &args, &build_dir)?;

        for (name, suffix) in [
            ("merged_post_implementation_v", MERGED_SUFFIX),
            ("post_implementation_v", POST_SYNTHESIS_SUFFIX),
        ] {
            if ctx.is_output_explicit(name) {
                move_output(&vpr_netlist(&eblif, suffix), &ctx.outputs.require_path(name)?)?;
            }
        }

        progress.phase("Saving log...");
        save_vpr_log(&build_dir, &ctx.outputs.require_path("analysis_log")?)
    }
}
