//! Lookup of stage modules by reference.
//!
//! Modules are registered at compile time under a collection and a name.
//! Flow definitions refer to them as `collection:name`, or by a path of the
//! form `.../<collection>_modules/<name>.<ext>` that maps to the same entry.
use super::Module;
use crate::resolve::ResolutionEnv;
use crate::value::Value;
use anyhow::{anyhow, Context, Result};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

/// Arguments passed to a module constructor.
pub struct ModuleArgs<'a> {
    /// The stage's `params` block, `Null` when absent.
    pub params: &'a Value,
    pub r_env: &'a ResolutionEnv,
    pub instance_name: &'a str,
    /// Lets wrapper modules instantiate the module they wrap.
    pub registry: &'a ModuleRegistry,
}

pub type ModuleFactory = fn(ModuleArgs<'_>) -> Result<Box<dyn Module>>;

#[derive(Default)]
pub struct ModuleRegistry {
    collections: BTreeMap<String, BTreeMap<String, ModuleFactory>>,
    loaded: RefCell<BTreeMap<String, ModuleFactory>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `common` collection.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        super::common::register(&mut registry);
        registry
    }

    pub fn register(&mut self, collection: &str, name: &str, factory: ModuleFactory) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(name.to_string(), factory);
    }

    /// Find the factory for `reference`, caching it under its canonical key.
    pub fn lookup(&self, reference: &str) -> Result<ModuleFactory> {
        let (collection, name) = split_reference(reference)?;
        let key = format!("{collection}:{name}");
        if let Some(factory) = self.loaded.borrow().get(&key) {
            return Ok(*factory);
        }
        let modules = self
            .collections
            .get(&collection)
            .ok_or_else(|| anyhow!("module collection `{collection}` does not exist"))?;
        let factory = *modules
            .get(&name)
            .ok_or_else(|| anyhow!("module `{name}` not found in collection `{collection}`"))?;
        tracing::debug!(module = key.as_str(), "module loaded");
        self.loaded.borrow_mut().insert(key, factory);
        Ok(factory)
    }

    /// Build a module instance for a stage.
    pub fn instantiate(
        &self,
        reference: &str,
        params: &Value,
        r_env: &ResolutionEnv,
        instance_name: &str,
    ) -> Result<Box<dyn Module>> {
        let factory = self.lookup(reference)?;
        factory(ModuleArgs {
            params,
            r_env,
            instance_name,
            registry: self,
        })
        .with_context(|| format!("instantiate module `{reference}` for stage `{instance_name}`"))
    }

    /// Number of distinct modules looked up so far.
    pub fn loaded_count(&self) -> usize {
        self.loaded.borrow().len()
    }
}

/// Canonical `(collection, name)` for a module reference.
pub fn split_reference(reference: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = reference.split(':').collect();
    match parts.as_slice() {
        [collection, name] if !collection.is_empty() && !name.is_empty() => {
            Ok((collection.to_string(), name.to_string()))
        }
        [_] => {
            let path = Path::new(reference);
            let name = path.file_stem().and_then(|stem| stem.to_str());
            let collection = path
                .parent()
                .and_then(|parent| parent.file_name())
                .and_then(|dir| dir.to_str())
                .and_then(|dir| dir.strip_suffix("_modules"));
            match (collection, name) {
                (Some(collection), Some(name)) if !collection.is_empty() => {
                    Ok((collection.to_string(), name.to_string()))
                }
                _ => Err(anyhow!(
                    "module reference `{reference}` is neither `collection:name` nor a path inside a `<collection>_modules` directory"
                )),
            }
        }
        _ => Err(anyhow!(
            "incorrect module reference `{reference}`: expected exactly one `:`"
        )),
    }
}
