//! The `common` module collection shipped with the engine.
mod analysis;
mod fasm;
mod generic_script;
mod io_rename;
mod mkdirs;
mod nextpnr;
mod pack;
mod place;
mod place_constraints;
mod route;
mod synth;
pub mod vpr;

use super::registry::ModuleRegistry;
use crate::value::Value;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

pub const COLLECTION: &str = "common";

pub fn register(registry: &mut ModuleRegistry) {
    registry.register(COLLECTION, "mkdirs", mkdirs::create);
    registry.register(COLLECTION, "synth", synth::create);
    registry.register(COLLECTION, "io_rename", io_rename::create);
    registry.register(
        COLLECTION,
        "generic_script_wrapper",
        generic_script::create,
    );
    registry.register(COLLECTION, "pack", pack::create);
    registry.register(COLLECTION, "place_constraints", place_constraints::create);
    registry.register(COLLECTION, "place", place::create);
    registry.register(COLLECTION, "route", route::create);
    registry.register(COLLECTION, "fasm", fasm::create);
    registry.register(COLLECTION, "analysis", analysis::create);
    registry.register(COLLECTION, "nextpnr", nextpnr::create);
}

fn param<'a>(params: &'a Value, key: &str) -> Option<&'a Value> {
    params
        .as_map()
        .and_then(|map| map.get(key))
        .filter(|value| !value.is_null())
}

fn param_str<'a>(params: &'a Value, key: &str) -> Result<Option<&'a str>> {
    match param(params, key) {
        None => Ok(None),
        Some(Value::Str(text)) => Ok(Some(text)),
        Some(other) => Err(anyhow!("parameter `{key}` must be a string, got {other}")),
    }
}

/// A `name -> name` table such as the `rename_*` parameters.
fn param_names(params: &Value, key: &str) -> Result<BTreeMap<String, String>> {
    let Some(value) = param(params, key) else {
        return Ok(BTreeMap::new());
    };
    let map = value
        .as_map()
        .ok_or_else(|| anyhow!("parameter `{key}` must be a map"))?;
    map.iter()
        .map(|(from, to)| {
            to.as_str()
                .map(|to| (from.clone(), to.to_string()))
                .ok_or_else(|| anyhow!("parameter `{key}.{from}` must be a string"))
        })
        .collect()
}
