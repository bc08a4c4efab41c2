//! Places a packed design with VPR.
use super::vpr::{build_dir_of, move_output, save_vpr_log, vpr, vpr_values, VprArgs};
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress};
use crate::value::Value;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

struct Place {
    io: ModuleIo,
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let mut io = ModuleIo::new(args.instance_name);
    io.no_of_phases = 2;
    io.takes = vec![
        IoName::required("eblif"),
        IoName::maybe("sdc"),
        IoName::maybe("place_constraints"),
        IoName::maybe("io_place"),
    ];
    io.produces = vec![IoName::required("place")];
    io.values = vpr_values(&[])?;
    io.prod_meta
        .insert("place".to_string(), "Placement result".to_string());
    Ok(Box::new(Place { io }))
}

/// Constraints handed to `--fix_clusters`, and whether an empty one must be created.
fn constraints_file(ctx: &ModuleContext, eblif: &Path) -> (PathBuf, bool) {
    if let Some(path) = ctx
        .takes
        .path("place_constraints")
        .or_else(|| ctx.takes.path("io_place"))
    {
        return (path, false);
    }
    let stem = eblif
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    (build_dir_of(eblif).join(format!("{stem}_constraints.place")), true)
}

/// Where VPR writes the placement: next to the netlist, named after it.
fn default_place(eblif: &Path) -> PathBuf {
    eblif.with_extension("place")
}

impl Module for Place {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        let eblif = ctx.takes.require_path("eblif")?;
        let mut out = BTreeMap::new();
        out.insert(
            "place".to_string(),
            Value::from(default_place(&eblif).to_string_lossy().into_owned()),
        );
        Ok(out)
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        let eblif = ctx.takes.require_path("eblif")?;
        let build_dir = build_dir_of(&eblif);
        let (constraints, placeholder) = constraints_file(ctx, &eblif);
        if placeholder {
            fs::write(&constraints, b"")
                .with_context(|| format!("write {}", constraints.display()))?;
        }

        progress.phase("Running VPR...");
        let args = VprArgs::from_context(ctx, ctx.takes.path("sdc"))?
            .with_extra(["--fix_clusters".to_string(), constraints.to_string_lossy().into_owned()]);
        vpr(ctx, "place", &args, &build_dir)?;

        if ctx.is_output_explicit("place") {
            let dest = ctx.outputs.require_path("place")?;
            move_output(&default_place(&eblif), &dest)?;
        }

        progress.phase("Saving log...");
        save_vpr_log(&build_dir, &build_dir.join("place.log"))
    }
}
