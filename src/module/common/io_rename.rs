//! Wraps another module and renames its dependencies and values.
//!
//! `rename_takes`, `rename_produces` and `rename_values` map the wrapped
//! module's names to the names the rest of the flow sees. Names without an
//! entry keep their original spelling.
use super::{param, param_names, param_str};
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress};
use crate::value::Value;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

struct IoRename {
    io: ModuleIo,
    inner: Box<dyn Module>,
    rename_takes: BTreeMap<String, String>,
    rename_produces: BTreeMap<String, String>,
    rename_values: BTreeMap<String, String>,
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let reference = param_str(args.params, "module")?
        .ok_or_else(|| anyhow!("io_rename requires a `module` parameter"))?;
    let inner_params = param(args.params, "params").cloned().unwrap_or_default();
    let inner = args
        .registry
        .instantiate(reference, &inner_params, args.r_env, args.instance_name)?;

    let rename_takes = param_names(args.params, "rename_takes")?;
    let rename_produces = param_names(args.params, "rename_produces")?;
    let rename_values = param_names(args.params, "rename_values")?;

    let inner_io = inner.io();
    let io = ModuleIo {
        name: args.instance_name.to_string(),
        no_of_phases: inner_io.no_of_phases,
        takes: rename_entries(&inner_io.takes, &rename_takes),
        produces: rename_entries(&inner_io.produces, &rename_produces),
        values: rename_entries(&inner_io.values, &rename_values),
        prod_meta: switch_keys(inner_io.prod_meta.clone(), &rename_produces),
    };
    Ok(Box::new(IoRename {
        io,
        inner,
        rename_takes,
        rename_produces,
        rename_values,
    }))
}

fn rename_entries(entries: &[IoName], renames: &BTreeMap<String, String>) -> Vec<IoName> {
    entries
        .iter()
        .map(|entry| match renames.get(&entry.name) {
            Some(outer) => IoName {
                name: outer.clone(),
                qualifier: entry.qualifier,
            },
            None => entry.clone(),
        })
        .collect()
}

fn switch_keys<V>(map: BTreeMap<String, V>, renames: &BTreeMap<String, String>) -> BTreeMap<String, V> {
    map.into_iter()
        .map(|(key, value)| match renames.get(&key) {
            Some(outer) => (outer.clone(), value),
            None => (key, value),
        })
        .collect()
}

impl IoRename {
    fn inner_view(&self, ctx: &ModuleContext) -> ModuleContext {
        ctx.renamed_back(&self.rename_takes, &self.rename_values, &self.rename_produces)
    }
}

impl Module for IoRename {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        let mapped = self.inner.map_io(&self.inner_view(ctx))?;
        Ok(switch_keys(mapped, &self.rename_produces))
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        self.inner.execute(&self.inner_view(ctx), progress)
    }
}
