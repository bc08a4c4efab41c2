//! Backward chaining from a target to an ordered list of stage invocations.
//!
//! Every dependency is either produced by exactly one stage or bound
//! explicitly in the configuration. Planning builds each producer's context
//! in map mode to learn where its outputs go, so later stages can reference
//! them as `${:name}`.
use super::config::FlowConfig;
use super::stage::Stage;
use crate::cache::{FileStatus, FingerprintCache};
use crate::module::context::{add_path_variants, files_exist};
use crate::module::{IoName, ModuleContext, ModuleFailure, Mode, Qualifier, StageInputs};
use crate::resolve::ResolutionEnv;
use crate::value::{Value, ValueMap};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One stage invocation in a plan.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub stage: String,
    pub inputs: StageInputs,
    /// Stage environment with the paths of earlier dependencies bound.
    pub env: ResolutionEnv,
    /// Output paths the stage will write, keyed by product.
    pub outputs: ValueMap,
    /// Predicted need to run, from the cache as it was before the build.
    pub required: bool,
}

/// Where a dependency stands before the build starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepStatus {
    /// Neither produced nor bound.
    Missing,
    /// Its producer did not map a path for it.
    Unmapped,
    /// Will be rebuilt over an existing file.
    Rebuild,
    /// Will be built; no file yet.
    Scheduled,
    /// Present, but consumers see a different file than last time.
    Changed,
    UpToDate,
}

impl DepStatus {
    pub fn marker(self) -> &'static str {
        match self {
            DepStatus::Missing => "[X]",
            DepStatus::Unmapped => "[U]",
            DepStatus::Rebuild => "[R]",
            DepStatus::Scheduled => "[S]",
            DepStatus::Changed => "[N]",
            DepStatus::UpToDate => "[O]",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub target: String,
    pub steps: Vec<PlanStep>,
    /// Paths of every dependency resolved while planning.
    pub dep_paths: ValueMap,
    /// How many planned steps will rewrite each dependency.
    pub rebuilds: BTreeMap<String, usize>,
    pub missing: BTreeSet<String>,
    pub unmapped: BTreeSet<String>,
}

impl Plan {
    pub fn target_path(&self) -> Option<&Value> {
        self.dep_paths.get(&self.target)
    }

    /// Status of `dep` against `cache`; without a cache everything is rebuilt.
    pub fn dep_status(&self, dep: &str, cache: Option<&FingerprintCache>) -> DepStatus {
        if self.unmapped.contains(dep) {
            return DepStatus::Unmapped;
        }
        let Some(value) = self.dep_paths.get(dep) else {
            return DepStatus::Missing;
        };
        let exists = files_exist(value);
        if self.rebuilds.get(dep).copied().unwrap_or(0) > 0 {
            return if exists {
                DepStatus::Rebuild
            } else {
                DepStatus::Scheduled
            };
        }
        if !exists {
            return DepStatus::Missing;
        }
        let changed = match cache {
            None => true,
            Some(cache) => self.steps.iter().any(|step| {
                step.inputs.takes.contains_key(dep)
                    && value
                        .strings()
                        .iter()
                        .any(|path| cache.probe(Path::new(path), &step.stage) != FileStatus::Same)
            }),
        };
        if changed {
            DepStatus::Changed
        } else {
            DepStatus::UpToDate
        }
    }

    /// Every dependency the listing should mention, in name order.
    pub fn listed_deps(&self) -> BTreeSet<&str> {
        self.dep_paths
            .keys()
            .chain(self.missing.iter())
            .chain(self.unmapped.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Map of dependency name to the one stage producing it.
pub fn producer_map(flow: &FlowConfig) -> Result<BTreeMap<String, String>> {
    let mut producers: BTreeMap<String, String> = BTreeMap::new();
    for (name, stage) in &flow.stages {
        for product in stage.produces() {
            if let Some(other) = producers.insert(product.name.clone(), name.clone()) {
                return Err(anyhow!(
                    "dependency `{}` is produced by both stage `{other}` and stage `{name}`",
                    product.name
                ));
            }
        }
    }
    Ok(producers)
}

/// The target plus every take reachable from it through producers.
fn demanded_set(flow: &FlowConfig, producers: &BTreeMap<String, String>, target: &str) -> BTreeSet<String> {
    let mut demanded = BTreeSet::new();
    let mut queue = vec![target.to_string()];
    while let Some(dep) = queue.pop() {
        if !demanded.insert(dep.clone()) {
            continue;
        }
        if let Some(stage) = producers.get(&dep).and_then(|name| flow.stages.get(name)) {
            queue.extend(stage.takes().iter().map(|take| take.name.clone()));
        }
    }
    demanded
}

struct Planner<'a> {
    flow: &'a FlowConfig,
    cache: Option<&'a FingerprintCache>,
    producers: BTreeMap<String, String>,
    demanded: BTreeSet<String>,
    dep_paths: ValueMap,
    /// Path variables of every dependency resolved so far.
    dep_env: ResolutionEnv,
    steps: Vec<PlanStep>,
    planned: BTreeSet<String>,
    visiting: Vec<String>,
    missing: BTreeSet<String>,
    unmapped: BTreeSet<String>,
    rebuilt: BTreeSet<String>,
}

impl Planner<'_> {
    fn resolve_dep(&mut self, dep: &str, requester: Option<&str>, required: bool) -> Result<()> {
        if self.dep_paths.contains_key(dep) {
            return Ok(());
        }
        match self.producers.get(dep).cloned() {
            Some(stage) => self.plan_stage(&stage)?,
            None => {
                if let Some(value) = self.flow.dependencies.get(dep) {
                    self.bind(dep, value.clone());
                } else if !self.unmapped.contains(dep) {
                    self.missing.insert(dep.to_string());
                }
            }
        }
        if required && !self.dep_paths.contains_key(dep) {
            return Err(match requester {
                Some(stage) => anyhow!(
                    "dependency `{dep}` is required by stage `{stage}` but is neither produced nor provided"
                ),
                None => anyhow!("target `{dep}` is neither produced by any stage nor provided"),
            });
        }
        Ok(())
    }

    fn bind(&mut self, dep: &str, value: Value) {
        add_path_variants(&mut self.dep_env, dep, &value);
        self.dep_paths.insert(dep.to_string(), value);
    }

    fn plan_stage(&mut self, name: &str) -> Result<()> {
        if self.planned.contains(name) {
            return Ok(());
        }
        if let Some(pos) = self.visiting.iter().position(|entry| entry == name) {
            let mut cycle = self.visiting[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(anyhow!("dependency cycle between stages: {}", cycle.join(" -> ")));
        }
        self.visiting.push(name.to_string());

        let flow = self.flow;
        let stage = flow.stage(name)?;
        for take in stage.takes() {
            self.resolve_dep(&take.name, Some(name), take.is_required())?;
        }

        let mut inputs = StageInputs::default();
        for take in stage.takes() {
            if let Some(value) = self.dep_paths.get(&take.name) {
                inputs.takes.insert(take.name.clone(), value.clone());
            }
        }
        for product in stage.produces() {
            if let Some(value) = flow.dependencies.get(&product.name) {
                inputs.produces.insert(product.name.clone(), value.clone());
            }
            if self.demanded.contains(&product.name) {
                inputs.demanded.insert(product.name.clone());
            }
        }

        let mut env = stage.env.clone();
        for (var, value) in self.dep_env.values() {
            env.bind_raw(var.clone(), value.clone());
        }
        let ctx = ModuleContext::new(stage.module.as_ref(), name, &inputs, &env, &flow.roots)
            .map_err(|err| anyhow::Error::new(ModuleFailure::new(name, Mode::Map, err)))?;

        let mut outputs = ValueMap::new();
        for product in stage.produces() {
            match ctx.outputs.get(&product.name) {
                Some(value) => {
                    outputs.insert(product.name.clone(), value.clone());
                    self.bind(&product.name, value.clone());
                }
                None => {
                    self.producers.remove(&product.name);
                    self.unmapped.insert(product.name.clone());
                }
            }
        }

        let required = self.predict_required(name, &inputs, &outputs, stage);
        if required {
            self.rebuilt.extend(outputs.keys().cloned());
        }
        tracing::debug!(stage = name, required, "stage planned");
        self.steps.push(PlanStep {
            stage: name.to_string(),
            inputs,
            env,
            outputs,
            required,
        });

        self.visiting.pop();
        self.planned.insert(name.to_string());
        Ok(())
    }

    fn predict_required(
        &self,
        name: &str,
        inputs: &StageInputs,
        outputs: &ValueMap,
        stage: &Stage,
    ) -> bool {
        let Some(cache) = self.cache else {
            return true;
        };
        if !cache.has_consumer(name) {
            return true;
        }
        let take_changed = stage.takes().iter().any(|take| {
            let Some(value) = inputs.takes.get(&take.name) else {
                return false;
            };
            if self.rebuilt.contains(&take.name) {
                return true;
            }
            value.strings().iter().any(|path| {
                let path = Path::new(path);
                match cache.probe(path, name) {
                    FileStatus::Same => false,
                    // An optional input that never existed changes nothing.
                    FileStatus::Untracked => take.is_required() || path.exists(),
                    FileStatus::Changed => true,
                }
            })
        });
        if take_changed {
            return true;
        }
        mandatory_outputs(stage.produces(), outputs).any(|value| !files_exist(value))
    }
}

/// Bound outputs that must exist after the stage runs.
pub fn mandatory_outputs<'a>(
    produces: &'a [IoName],
    outputs: &'a ValueMap,
) -> impl Iterator<Item = &'a Value> + 'a {
    produces
        .iter()
        .filter(|product| product.qualifier != Qualifier::Maybe)
        .filter_map(|product| outputs.get(&product.name))
}

/// Plan the stages needed to produce `target`.
pub fn plan(flow: &FlowConfig, target: &str, cache: Option<&FingerprintCache>) -> Result<Plan> {
    let producers = producer_map(flow)?;
    let demanded = demanded_set(flow, &producers, target);
    let mut planner = Planner {
        flow,
        cache,
        producers,
        demanded,
        dep_paths: ValueMap::new(),
        dep_env: ResolutionEnv::new(),
        steps: Vec::new(),
        planned: BTreeSet::new(),
        visiting: Vec::new(),
        missing: BTreeSet::new(),
        unmapped: BTreeSet::new(),
        rebuilt: BTreeSet::new(),
    };
    planner.resolve_dep(target, None, true)?;

    let mut rebuilds = BTreeMap::new();
    for step in planner.steps.iter().filter(|step| step.required) {
        for product in step.outputs.keys() {
            *rebuilds.entry(product.clone()).or_insert(0) += 1;
        }
    }
    Ok(Plan {
        target: target.to_string(),
        steps: planner.steps,
        dep_paths: planner.dep_paths,
        rebuilds,
        missing: planner.missing,
        unmapped: planner.unmapped,
    })
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
