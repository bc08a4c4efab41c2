//! Runs an arbitrary script as a stage.
//!
//! Parameters:
//! - `script` (required) and `interpreter` (optional, split like a shell would);
//! - `cwd` (optional) working directory;
//! - `inputs`: `#N` keys are positional arguments, `$VAR` keys set environment
//!   variables, any other key becomes `--key value`;
//! - `outputs`: product name to `{mode: file|stdout, file?, target, optional?}`.
//!
//! Takes and values are inferred from the `${:take}` and `${value}` references
//! found anywhere in the parameters.
use super::{param, param_str};
use crate::module::{IoName, Module, ModuleArgs, ModuleContext, ModuleIo, Progress};
use crate::process::Tool;
use crate::value::{Value, ValueMap};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    File,
    Stdout,
}

#[derive(Debug, Clone)]
struct ScriptOutput {
    mode: OutputMode,
    file: Option<Value>,
    target: Value,
    optional: bool,
}

struct GenericScript {
    io: ModuleIo,
    interpreter: Vec<String>,
    script: Value,
    cwd: Option<Value>,
    inputs: ValueMap,
    outputs: BTreeMap<String, ScriptOutput>,
}

fn reference_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{(:?)([^${}\[\]?]*)(\[[^${}]*\])?(\??)\}").expect("valid reference pattern"))
}

/// Collect `(take, value)` names referenced by `text`.
fn scan_references(text: &str, takes: &mut Vec<IoName>, values: &mut Vec<IoName>) {
    for caps in reference_regex().captures_iter(text) {
        let name = caps[2].to_string();
        if name.is_empty() {
            continue;
        }
        let maybe = !caps[4].is_empty();
        let target = if caps[1].is_empty() {
            &mut *values
        } else {
            &mut *takes
        };
        match target.iter_mut().find(|known| known.name == name) {
            // A single unconditional use makes the name required.
            Some(known) if !maybe => *known = IoName::required(name),
            Some(_) => {}
            None if maybe => target.push(IoName::maybe(name)),
            None => target.push(IoName::required(name)),
        }
    }
}

fn parse_output(name: &str, decl: &Value) -> Result<ScriptOutput> {
    let mode = match param_str(decl, "mode")? {
        None | Some("file") => OutputMode::File,
        Some("stdout") => OutputMode::Stdout,
        Some(other) => return Err(anyhow!("output `{name}` has unknown mode `{other}`")),
    };
    let target = param(decl, "target")
        .cloned()
        .ok_or_else(|| anyhow!("output `{name}` requires a `target`"))?;
    let file = param(decl, "file").cloned();
    if mode == OutputMode::File && file.is_none() {
        return Err(anyhow!("output `{name}` in file mode requires a `file`"));
    }
    let optional = matches!(param(decl, "optional"), Some(Value::Bool(true)));
    Ok(ScriptOutput {
        mode,
        file,
        target,
        optional,
    })
}

pub(super) fn create(args: ModuleArgs<'_>) -> Result<Box<dyn Module>> {
    let params = args.params;
    let script = param(params, "script")
        .cloned()
        .ok_or_else(|| anyhow!("generic_script_wrapper requires a `script` parameter"))?;
    let interpreter = match param_str(params, "interpreter")? {
        Some(text) => shell_words::split(text)
            .with_context(|| format!("split interpreter `{text}`"))?,
        None => Vec::new(),
    };
    let cwd = param(params, "cwd").cloned();
    let inputs = match param(params, "inputs") {
        None => ValueMap::new(),
        Some(Value::Map(map)) => map.clone(),
        Some(other) => return Err(anyhow!("parameter `inputs` must be a map, got {other}")),
    };

    let mut io = ModuleIo::new(param_str(params, "stage_name")?.unwrap_or(args.instance_name));
    let mut outputs = BTreeMap::new();
    if let Some(decls) = param(params, "outputs") {
        let decls = decls
            .as_map()
            .ok_or_else(|| anyhow!("parameter `outputs` must be a map"))?;
        for (name, decl) in decls {
            let output = parse_output(name, decl)?;
            io.produces.push(if output.optional {
                IoName::maybe(name.as_str())
            } else {
                IoName::required(name.as_str())
            });
            outputs.insert(name.clone(), output);
        }
    }

    let mut scanned: Vec<&str> = script.strings();
    if let Some(cwd) = &cwd {
        scanned.extend(cwd.strings());
    }
    for value in inputs.values() {
        scanned.extend(value.strings());
    }
    for output in outputs.values() {
        scanned.extend(output.target.strings());
        if let Some(file) = &output.file {
            scanned.extend(file.strings());
        }
    }
    for text in scanned {
        scan_references(text, &mut io.takes, &mut io.values);
    }
    io.no_of_phases = 2;

    Ok(Box::new(GenericScript {
        io,
        interpreter,
        script,
        cwd,
        inputs,
        outputs,
    }))
}

/// Position of a `#N` key.
fn positional_index(key: &str) -> Option<usize> {
    key.strip_prefix('#').and_then(|index| index.parse().ok())
}

impl GenericScript {
    fn command(&self, ctx: &ModuleContext) -> Result<Tool> {
        let resolve = |value: &Value| ctx.r_env.resolve_final(value);
        let script = resolve(&self.script).to_args();
        if script.is_empty() {
            return Err(anyhow!("script of stage `{}` resolved to nothing", ctx.stage_name));
        }
        let mut tool = Tool::from_argv(self.interpreter.clone()).args(script);

        let mut positional = Vec::new();
        for (key, value) in &self.inputs {
            let value = resolve(value);
            if let Some(index) = positional_index(key) {
                positional.push((index, value));
            } else if let Some(var) = key.strip_prefix('$') {
                tool = tool.env(var, value.to_args().join(" "));
            } else {
                match value {
                    Value::Null | Value::Bool(false) => {}
                    Value::Bool(true) => tool = tool.arg(format!("--{key}")),
                    other => tool = tool.arg(format!("--{key}")).args(other.to_args()),
                }
            }
        }
        positional.sort_by_key(|(index, _)| *index);
        for (_, value) in positional {
            tool = tool.args(value.to_args());
        }

        if let Some(cwd) = &self.cwd {
            let dir = resolve(cwd);
            let dir = dir
                .as_str()
                .ok_or_else(|| anyhow!("`cwd` of stage `{}` is not a single path", ctx.stage_name))?;
            tool = tool.cwd(dir);
        }
        Ok(tool)
    }

    fn working_dir(&self, ctx: &ModuleContext) -> PathBuf {
        self.cwd
            .as_ref()
            .and_then(|cwd| ctx.r_env.resolve_final(cwd).as_str().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Module for GenericScript {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>> {
        Ok(self
            .outputs
            .iter()
            .map(|(name, output)| (name.clone(), ctx.r_env.resolve(&output.target)))
            .collect())
    }

    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()> {
        let tool = self.command(ctx)?;
        if progress.verbose() {
            progress.phase(format!("Running script...\n           {}", tool.display()));
        } else {
            progress.phase("Running script...");
        }
        let stdout = tool
            .run()
            .with_context(|| format!("script of stage `{}`", ctx.stage_name))?;

        progress.phase("Writing outputs...");
        let cwd = self.working_dir(ctx);
        for (name, output) in &self.outputs {
            let Some(target) = ctx.outputs.path(name) else {
                continue;
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            match output.mode {
                OutputMode::Stdout => fs::write(&target, &stdout)
                    .with_context(|| format!("write {}", target.display()))?,
                OutputMode::File => {
                    let Some(file) = output
                        .file
                        .as_ref()
                        .and_then(|file| ctx.r_env.resolve_final(file).as_str().map(PathBuf::from))
                    else {
                        continue;
                    };
                    let produced = if file.is_absolute() { file } else { cwd.join(file) };
                    move_if_present(&produced, &target, output.optional)?;
                }
            }
        }
        Ok(())
    }
}

fn move_if_present(produced: &Path, target: &Path, optional: bool) -> Result<()> {
    if !produced.exists() {
        if optional {
            return Ok(());
        }
        return Err(anyhow!(
            "script did not write `{}`",
            produced.display()
        ));
    }
    let same = match (fs::canonicalize(produced), fs::canonicalize(target)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    };
    if same {
        return Ok(());
    }
    fs::rename(produced, target)
        .with_context(|| format!("move {} to {}", produced.display(), target.display()))
}
