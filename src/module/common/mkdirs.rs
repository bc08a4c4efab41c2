//! Creates build directories on demand.
//!
//! Each parameter names a directory product, so a build directory can be a
//! dependency like any other and is only created when something needs it.
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress};
use crate::value::{Value, ValueMap};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;

struct MkDirs {
    io: ModuleIo,
    dirs: ValueMap,
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let dirs = match args.params {
        Value::Null => ValueMap::new(),
        Value::Map(map) => map.clone(),
        other => return Err(anyhow!("mkdirs expects a map of directories, got {other}")),
    };
    let mut io = ModuleIo::new(args.instance_name);
    io.no_of_phases = dirs.len();
    io.produces = dirs.keys().map(IoName::required).collect();
    Ok(Box::new(MkDirs { io, dirs }))
}

impl Module for MkDirs {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        Ok(self
            .dirs
            .iter()
            .map(|(name, dir)| (name.clone(), ctx.r_env.resolve(dir)))
            .collect())
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        for (_, path) in ctx.outputs.bound() {
            for dir in path.strings() {
                progress.phase(format!("Creating directory {dir}..."));
                fs::create_dir_all(dir).with_context(|| format!("create directory {dir}"))?;
            }
        }
        Ok(())
    }
}
