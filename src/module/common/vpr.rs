//! Shared command-line plumbing for the VPR-based stages.
use crate::module::{IoName, ModuleContext};
use crate::process::Tool;
use crate::value::Value;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Values every VPR invocation reads.
pub const VPR_VALUES: [&str; 6] = [
    "arch_def",
    "rr_graph_lookahead_bin",
    "rr_graph_real_bin",
    "vpr_place_delay",
    "vpr_grid_layout_name",
    "vpr_options?",
];

/// Log file VPR writes into its working directory.
pub const VPR_LOG: &str = "vpr_stdout.log";

/// `device` followed by the VPR values, plus any stage-specific extras.
pub fn vpr_values(extra: &[&str]) -> Result<Vec<IoName>> {
    let mut names = vec![IoName::required("device")];
    for text in extra.iter().chain(VPR_VALUES.iter()) {
        let name = IoName::parse(text)?;
        if !names.iter().any(|known| known.name == name.name) {
            names.push(name);
        }
    }
    Ok(names)
}

#[derive(Debug, Clone)]
pub struct VprArgs {
    pub arch_def: String,
    pub eblif: PathBuf,
    pub device_name: String,
    pub rr_graph: String,
    pub lookahead: String,
    pub place_delay: String,
    pub optional: Vec<String>,
}

impl VprArgs {
    pub fn from_context(ctx: &ModuleContext, sdc: Option<PathBuf>) -> Result<Self> {
        let text = |name: &str| -> Result<String> { Ok(ctx.values.require(name)?.to_string()) };
        let mut optional = ctx
            .values
            .get("vpr_options")
            .map(options_to_args)
            .unwrap_or_default();
        if let Some(sdc) = sdc {
            optional.push("--sdc_file".to_string());
            optional.push(sdc.to_string_lossy().into_owned());
        }
        Ok(Self {
            arch_def: text("arch_def")?,
            eblif: ctx.takes.require_path("eblif")?,
            device_name: text("vpr_grid_layout_name")?,
            rr_graph: text("rr_graph_real_bin")?,
            lookahead: text("rr_graph_lookahead_bin")?,
            place_delay: text("vpr_place_delay")?,
            optional,
        })
    }

    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.extend(extra.into_iter().map(Into::into));
        self
    }
}

/// `{name: value}` to `--name value`. An empty list value yields a bare flag.
pub fn options_to_args(options: &Value) -> Vec<String> {
    let Some(map) = options.as_map() else {
        return options.to_args();
    };
    let mut args = Vec::new();
    for (key, value) in map {
        args.push(format!("--{key}"));
        match value {
            Value::List(items) if items.is_empty() => {}
            other => args.extend(other.to_args()),
        }
    }
    args
}

/// Prefer the install tree's copy of a tool, then `PATH`.
pub fn locate_tool(bin_dir: &Path, name: &str) -> String {
    let local = bin_dir.join(name);
    if local.is_file() {
        return local.to_string_lossy().into_owned();
    }
    which::which(name)
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|_| name.to_string())
}

/// Run VPR in `mode` (`pack`, `place`, `route` or `analysis`).
pub fn vpr(ctx: &ModuleContext, mode: &str, args: &VprArgs, cwd: &Path) -> Result<Vec<u8>> {
    let mut tool = Tool::new(locate_tool(&ctx.bin, "vpr"))
        .arg(args.arch_def.clone())
        .arg(args.eblif.to_string_lossy())
        .args([
            "--device",
            args.device_name.as_str(),
            "--read_rr_graph",
            args.rr_graph.as_str(),
            "--read_router_lookahead",
            args.lookahead.as_str(),
            "--read_placement_delay_lookup",
            args.place_delay.as_str(),
        ]);
    if matches!(mode, "pack" | "place" | "route" | "analysis") {
        tool = tool.arg(format!("--{mode}"));
    }
    if let Some(noisy) = ctx.r_env.get("noisyWarnings").and_then(Value::as_str) {
        tool = tool.env("OUR_NOISY_WARNINGS", noisy);
    }
    tool.args(args.optional.iter().cloned())
        .cwd(cwd)
        .run()
        .with_context(|| format!("vpr {mode} for stage `{}`", ctx.stage_name))
}

/// Move VPR's log out of `build_dir` to `dest`.
pub fn save_vpr_log(build_dir: &Path, dest: &Path) -> Result<()> {
    let log = build_dir.join(VPR_LOG);
    fs::rename(&log, dest)
        .with_context(|| format!("move {} to {}", log.display(), dest.display()))
}

/// Rename `from` to `to` unless they already name the same file.
pub fn move_output(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    fs::rename(from, to).with_context(|| format!("move {} to {}", from.display(), to.display()))
}

/// Directory holding the stage's main input.
pub fn build_dir_of(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
