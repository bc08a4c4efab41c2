//! The bindings a module sees while mapping or executing.
use super::io::Qualifier;
use super::Module;
use crate::resolve::ResolutionEnv;
use crate::value::Value;
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Install directories handed to every module.
#[derive(Debug, Clone, Default)]
pub struct Roots {
    pub share: PathBuf,
    pub bin: PathBuf,
    pub aux: PathBuf,
}

/// What the flow feeds into one stage.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    /// Paths of the stage's takes that are available.
    pub takes: BTreeMap<String, Value>,
    /// Output paths the user bound explicitly.
    pub produces: BTreeMap<String, Value>,
    /// Products something downstream (or the target) asks for.
    pub demanded: BTreeSet<String>,
}

/// Named bindings of one kind (takes, values or outputs) for a stage.
///
/// Every declared name is present; names that are not available map to `None`.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    stage: String,
    kind: &'static str,
    entries: BTreeMap<String, Option<Value>>,
}

impl Bindings {
    fn new(stage: &str, kind: &'static str) -> Self {
        Self {
            stage: stage.to_string(),
            kind,
            entries: BTreeMap::new(),
        }
    }

    fn set(&mut self, name: &str, value: Option<Value>) {
        self.entries.insert(name.to_string(), value);
    }

    /// Value bound to `name`; `None` when undeclared or unavailable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).and_then(Option::as_ref)
    }

    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name).ok_or_else(|| {
            anyhow!(
                "{} `{name}` is not available to stage `{}`",
                self.kind,
                self.stage
            )
        })
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn path(&self, name: &str) -> Option<PathBuf> {
        self.str(name).map(PathBuf::from)
    }

    pub fn require_path(&self, name: &str) -> Result<PathBuf> {
        let value = self.require(name)?;
        value.as_str().map(PathBuf::from).ok_or_else(|| {
            anyhow!(
                "{} `{name}` of stage `{}` is not a single path: {value}",
                self.kind,
                self.stage
            )
        })
    }

    /// Bound entries, skipping unavailable ones.
    pub fn bound(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .filter_map(|(name, value)| value.as_ref().map(|value| (name.as_str(), value)))
    }

    /// Re-key entries from outer names back to inner ones. `renames` maps inner to outer.
    pub fn renamed_back(&self, renames: &BTreeMap<String, String>) -> Self {
        let mut entries = self.entries.clone();
        for (inner, outer) in renames {
            if let Some(value) = entries.remove(outer) {
                entries.insert(inner.clone(), value);
            }
        }
        Self {
            stage: self.stage.clone(),
            kind: self.kind,
            entries,
        }
    }
}

/// Everything a module needs to map or run one stage.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub stage_name: String,
    pub takes: Bindings,
    /// Explicitly bound outputs only.
    pub produces: Bindings,
    /// Explicit outputs plus the module's defaults.
    pub outputs: Bindings,
    pub values: Bindings,
    pub r_env: ResolutionEnv,
    pub share: PathBuf,
    pub bin: PathBuf,
    pub aux: PathBuf,
}

impl ModuleContext {
    /// Bind inputs and values, then ask the module where its outputs go.
    pub fn new(
        module: &dyn Module,
        stage_name: &str,
        inputs: &StageInputs,
        env: &ResolutionEnv,
        roots: &Roots,
    ) -> Result<Self> {
        let io = module.io();
        let mut r_env = env.clone();

        let mut takes = Bindings::new(stage_name, "dependency");
        for take in &io.takes {
            let value = inputs.takes.get(&take.name).filter(|value| !value.is_null());
            if value.is_none() && take.is_required() {
                return Err(anyhow!(
                    "dependency `{}` is required by stage `{stage_name}` but wasn't provided",
                    take.name
                ));
            }
            // An optional input counts only once its files are on disk.
            let value = value
                .map(|value| r_env.resolve(value))
                .filter(|value| take.is_required() || files_exist(value));
            takes.set(&take.name, value);
        }

        let mut values = Bindings::new(stage_name, "value");
        for declared in &io.values {
            let value = env.get(&declared.name).filter(|value| !value.is_null());
            if value.is_none() && declared.is_required() {
                return Err(anyhow!(
                    "value `{}` is required by stage `{stage_name}` but wasn't provided",
                    declared.name
                ));
            }
            values.set(&declared.name, value.map(|value| r_env.resolve(value)));
        }

        let mut produces = Bindings::new(stage_name, "output");
        for product in &io.produces {
            let explicit = inputs
                .produces
                .get(&product.name)
                .filter(|value| !value.is_null())
                .map(|value| r_env.resolve(value));
            produces.set(&product.name, explicit);
        }

        for (name, value) in takes.bound() {
            add_path_variants(&mut r_env, name, value);
        }

        let mut ctx = Self {
            stage_name: stage_name.to_string(),
            takes,
            produces,
            outputs: Bindings::new(stage_name, "output"),
            values,
            r_env,
            share: roots.share.clone(),
            bin: roots.bin.clone(),
            aux: roots.aux.clone(),
        };

        let defaults = module.map_io(&ctx)?;
        let mut outputs = Bindings::new(stage_name, "output");
        for product in &io.produces {
            let value = match ctx.produces.get(&product.name) {
                Some(explicit) => Some(explicit.clone()),
                None => defaults
                    .get(&product.name)
                    .filter(|value| !value.is_null())
                    .filter(|_| {
                        product.qualifier != Qualifier::Demand
                            || inputs.demanded.contains(&product.name)
                    })
                    .map(|value| ctx.r_env.resolve(value)),
            };
            if value.is_none() && product.is_required() {
                return Err(anyhow!(
                    "stage `{stage_name}` did not provide a path for required output `{}`",
                    product.name
                ));
            }
            outputs.set(&product.name, value.map(|value| absolutize(&value)));
        }
        ctx.outputs = outputs;

        check_resolved(&ctx.takes)?;
        check_resolved(&ctx.outputs)?;
        Ok(ctx)
    }

    /// True when the user bound the output's path.
    pub fn is_output_explicit(&self, name: &str) -> bool {
        self.produces.get(name).is_some()
    }

    /// View of this context under a wrapped module's own names.
    pub fn renamed_back(
        &self,
        takes: &BTreeMap<String, String>,
        values: &BTreeMap<String, String>,
        produces: &BTreeMap<String, String>,
    ) -> Self {
        Self {
            takes: self.takes.renamed_back(takes),
            values: self.values.renamed_back(values),
            produces: self.produces.renamed_back(produces),
            outputs: self.outputs.renamed_back(produces),
            ..self.clone()
        }
    }
}

/// Expose `:name`, `:name[noext]` and `:name[dir]` for a bound dependency.
pub fn add_path_variants(env: &mut ResolutionEnv, name: &str, value: &Value) {
    env.bind_raw(format!(":{name}"), value.clone());
    env.bind_raw(
        format!(":{name}[noext]"),
        value.map_strings(&mut |text| {
            Value::from(Path::new(text).with_extension("").to_string_lossy().into_owned())
        }),
    );
    env.bind_raw(
        format!(":{name}[dir]"),
        value.map_strings(&mut |text| {
            let parent = Path::new(text).parent().unwrap_or(Path::new(""));
            Value::from(absolute_text(parent))
        }),
    );
}

/// True when `value` names at least one path and every one of them exists.
pub fn files_exist(value: &Value) -> bool {
    let paths = value.strings();
    !paths.is_empty() && paths.into_iter().all(|path| Path::new(path).exists())
}

/// Make every path in `value` absolute against the working directory.
pub fn absolutize(value: &Value) -> Value {
    value.map_strings(&mut |text| Value::from(absolute_text(Path::new(text))))
}

fn absolute_text(path: &Path) -> String {
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn check_resolved(bindings: &Bindings) -> Result<()> {
    for (name, value) in bindings.bound() {
        let leftover = ResolutionEnv::unresolved_names(value);
        if let Some(first) = leftover.first() {
            return Err(anyhow!(
                "{} `{name}` of stage `{}` references unknown variable `{first}`: {value}",
                bindings.kind,
                bindings.stage
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
