//! Runs a plan: rebuilds each stage's context, skips stages whose inputs and
//! outputs are unchanged, and executes the rest in order.
use super::config::FlowConfig;
use super::resolver::{mandatory_outputs, Plan, PlanStep};
use crate::cache::{FileStatus, FingerprintCache, TARGET_CONSUMER};
use crate::console::Reporter;
use crate::module::{IoName, ModuleContext, ModuleFailure, Mode, Progress, Qualifier};
use crate::value::Value;
use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Instant;

/// Which stages ran and which were reused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
}

fn paths(value: &Value) -> impl Iterator<Item = &Path> {
    value.strings().into_iter().map(Path::new)
}

/// Fingerprint the stage's takes and existing products; true when it must run.
///
/// An optional take that is not on disk is not fingerprinted; it only counts
/// as a change when an earlier run consumed it.
fn is_stale(
    cache: &mut FingerprintCache,
    step: &PlanStep,
    ctx: &ModuleContext,
    produces: &[IoName],
) -> Result<bool> {
    let had_records = cache.has_consumer(&step.stage);
    let mut take_changed = false;
    for (take, planned) in &step.inputs.takes {
        match ctx.takes.get(take) {
            Some(value) => {
                for path in paths(value) {
                    cache.update(path, &step.stage)?;
                    take_changed |= cache.status(path, &step.stage) != FileStatus::Same;
                }
            }
            None => {
                for path in paths(planned) {
                    if cache.probe(path, &step.stage) != FileStatus::Untracked {
                        take_changed |= cache.update(path, &step.stage)?;
                    }
                }
            }
        }
    }
    let mut product_missing = false;
    for value in mandatory_outputs(produces, &step.outputs) {
        for path in paths(value) {
            if path.exists() {
                cache.update(path, TARGET_CONSUMER)?;
            } else {
                product_missing = true;
            }
        }
    }
    tracing::debug!(
        stage = step.stage.as_str(),
        had_records,
        take_changed,
        product_missing,
        "freshness check"
    );
    Ok(!had_records || take_changed || product_missing)
}

/// Execute `plan` against `flow`. The caller owns saving the cache.
pub fn execute_plan(
    flow: &FlowConfig,
    plan: &Plan,
    mut cache: Option<&mut FingerprintCache>,
    reporter: Reporter,
) -> Result<RunReport> {
    let mut report = RunReport::default();
    for step in &plan.steps {
        let stage = flow.stage(&step.stage)?;
        let ctx = ModuleContext::new(
            stage.module.as_ref(),
            &step.stage,
            &step.inputs,
            &step.env,
            &flow.roots,
        )
        .map_err(|err| anyhow::Error::new(ModuleFailure::new(&step.stage, Mode::Exec, err)))?;

        let stale = match cache.as_deref_mut() {
            Some(cache) => is_stale(cache, step, &ctx, stage.produces())?,
            None => true,
        };
        if !stale {
            reporter.say(0, format!("Skipping stage `{}` (cached)", step.stage));
            report.skipped.push(step.stage.clone());
            continue;
        }

        reporter.say(1, format!("Executing stage `{}`:", step.stage));
        let started = Instant::now();
        let mut progress = Progress::new(reporter, stage.io().no_of_phases);
        if let Err(err) = stage.module.execute(&ctx, &mut progress) {
            if let Some(cache) = cache.as_deref_mut() {
                cache.forget_consumer(&step.stage);
            }
            return Err(anyhow::Error::new(ModuleFailure::new(&step.stage, Mode::Exec, err)));
        }
        tracing::info!(
            stage = step.stage.as_str(),
            phases = progress.phases_seen(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage finished"
        );

        for product in stage.produces() {
            let Some(value) = step.outputs.get(&product.name) else {
                continue;
            };
            let mandatory = product.qualifier != Qualifier::Maybe;
            for path in paths(value) {
                if path.exists() {
                    if let Some(cache) = cache.as_deref_mut() {
                        cache.update(path, &step.stage)?;
                    }
                } else if mandatory {
                    if let Some(cache) = cache.as_deref_mut() {
                        cache.forget_consumer(&step.stage);
                    }
                    return Err(anyhow::Error::new(ModuleFailure::new(
                        &step.stage,
                        Mode::Exec,
                        anyhow!(
                            "stage did not produce `{}` at {}",
                            product.name,
                            path.display()
                        ),
                    )));
                }
            }
        }
        reporter.say(1, format!("Stage `{}` has finished its work!", step.stage));
        report.executed.push(step.stage.clone());
    }

    let Some(target) = plan.target_path() else {
        return Err(anyhow!("target `{}` was not resolved", plan.target));
    };
    if let Some(cache) = cache.as_deref_mut() {
        for path in paths(target) {
            if path.exists() {
                cache.update(path, TARGET_CONSUMER)?;
            }
        }
    }
    reporter.say(0, format!("Target `{}` -> {target}", plan.target));
    Ok(report)
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
