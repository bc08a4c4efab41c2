//! Command handlers behind `f4pga build` and `f4pga showd`.
use crate::cache::{FingerprintCache, CACHE_FILE};
use crate::cli::{BuildArgs, ShowdArgs};
use crate::console::Reporter;
use crate::flow::report::{dependency_listing, product_listing, stage_listing, status_listing};
use crate::flow::{execute_plan, plan, FlowConfig, ProjectFlowConfig};
use crate::install::InstallPaths;
use crate::module::ModuleRegistry;
use crate::overrides::CliOverlay;
use anyhow::Result;
use std::path::Path;
use std::time::Instant;

pub fn run_build(args: &BuildArgs, reporter: Reporter) -> Result<()> {
    let started = Instant::now();
    let project = match &args.flow {
        Some(path) => ProjectFlowConfig::load(path)?,
        None => ProjectFlowConfig::default(),
    };
    let overlay = CliOverlay::from_args(&args.deps, &args.vals)?;
    let install = InstallPaths::from_env()?;
    let registry = ModuleRegistry::builtin();
    let flow = FlowConfig::load(&install, &project, &overlay, args.part.as_deref(), &registry)?;

    if args.info {
        print!("{}", product_listing(&flow));
        return Ok(());
    }
    if let Some(stage) = &args.stageinfo {
        print!("{}", stage_listing(flow.stage(stage)?));
        return Ok(());
    }

    let target = flow.select_target(args.target.as_deref())?;
    let mut cache = (!args.nocache).then(|| FingerprintCache::load(Path::new(CACHE_FILE)));
    let planned = plan(&flow, &target, cache.as_ref())?;
    let status_level = if args.pretend { 0 } else { 1 };
    reporter.say(status_level, status_listing(&planned, cache.as_ref()).trim_end());
    if args.pretend {
        return Ok(());
    }

    let result = execute_plan(&flow, &planned, cache.as_mut(), reporter);
    if let Some(cache) = cache.as_mut() {
        if let Err(err) = cache.save() {
            let message = format!("{err:#}");
            tracing::warn!(error = %message, "cannot write cache");
        }
    }
    let report = result?;
    tracing::info!(
        build_target = target.as_str(),
        executed = report.executed.len(),
        skipped = report.skipped.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "build finished"
    );
    Ok(())
}

pub fn run_showd(args: &ShowdArgs) -> Result<()> {
    let project = ProjectFlowConfig::load(&args.flow)?;
    let part = project.select_part(args.part.as_deref())?;
    print!(
        "{}",
        dependency_listing(&project, &part, args.stage.as_deref())
    );
    Ok(())
}
