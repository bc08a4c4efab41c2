//! Flow configuration: platform definitions, project config and CLI overlay.
//!
//! Values stack in layers where later layers win:
//! platform globals, project globals, the project's part section, then the
//! command line. A stage's environment is built from the same stack with its
//! own blocks at their rank: platform stage values after the platform globals,
//! the part section's stage block after the part values, and command-line
//! values scoped to the stage last. Every layer is applied exactly once.
use super::stage::Stage;
use crate::install::InstallPaths;
use crate::module::context::absolutize;
use crate::module::{ModuleRegistry, Roots};
use crate::overrides::CliOverlay;
use crate::process::Tool;
use crate::resolve::ResolutionEnv;
use crate::value::{Value, ValueMap};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Name of the file the noisy VPR warnings are redirected to.
pub const NOISY_WARNINGS_LOG: &str = "noisy_warnings.log";

/// `part_db.yml`: platform name to the parts it covers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct PartDb {
    platforms: BTreeMap<String, Vec<String>>,
}

impl PartDb {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read part database {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parse part database {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Platform whose part list contains `part`, ignoring case.
    pub fn platform_for(&self, part: &str) -> Option<&str> {
        self.platforms
            .iter()
            .find(|(_, parts)| parts.iter().any(|known| known.eq_ignore_ascii_case(part)))
            .map(|(platform, _)| platform.as_str())
    }
}

/// One stage of a platform flow definition.
#[derive(Debug, Clone, Deserialize)]
pub struct StageDef {
    pub module: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub values: ValueMap,
}

/// `platforms/<platform>.yml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformFlow {
    #[serde(default)]
    pub stages: BTreeMap<String, StageDef>,
    #[serde(default)]
    pub values: ValueMap,
    #[serde(default)]
    pub dependencies: ValueMap,
}

impl PlatformFlow {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read platform flow {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parse platform flow {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Per-stage block inside a project's part section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageOverrides {
    #[serde(default)]
    pub dependencies: ValueMap,
    #[serde(default)]
    pub values: ValueMap,
}

/// A part section of the project flow configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartConfig {
    #[serde(default)]
    pub default_target: Option<String>,
    #[serde(default)]
    pub dependencies: ValueMap,
    #[serde(default)]
    pub values: ValueMap,
    /// Any other key names a stage.
    #[serde(flatten)]
    pub stages: BTreeMap<String, StageOverrides>,
}

/// The project flow configuration (`flow.json`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFlowConfig {
    #[serde(default)]
    pub default_part: Option<String>,
    /// Used when the part database does not list the selected part.
    #[serde(default)]
    pub default_platform: Option<String>,
    #[serde(default)]
    pub default_target: Option<String>,
    #[serde(default)]
    pub dependencies: ValueMap,
    #[serde(default)]
    pub values: ValueMap,
    /// Any other key names a part.
    #[serde(flatten)]
    pub parts: BTreeMap<String, PartConfig>,
}

impl ProjectFlowConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("read flow configuration {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parse flow configuration {}", path.display()))
    }

    /// Part section for `part`; a part the project does not mention is empty.
    pub fn part(&self, part: &str) -> PartConfig {
        self.parts.get(part).cloned().unwrap_or_default()
    }

    /// `--part`, else the project's `default_part`.
    pub fn select_part(&self, requested: Option<&str>) -> Result<String> {
        requested
            .map(str::to_string)
            .or_else(|| self.default_part.clone())
            .ok_or_else(|| {
                anyhow!("no part selected: pass --part or set `default_part` in the flow configuration")
            })
    }
}

/// Everything `FlowConfig::compose` merges.
pub struct FlowSources<'a> {
    pub platform: &'a str,
    pub part: &'a str,
    pub flow: &'a PlatformFlow,
    pub project: &'a ProjectFlowConfig,
    pub overlay: &'a CliOverlay,
    /// Built-in values bound before any configuration layer.
    pub builtins: ValueMap,
    pub roots: Roots,
}

/// The resolved configuration of one flow for one part.
pub struct FlowConfig {
    pub part: String,
    pub platform: String,
    pub stages: BTreeMap<String, Stage>,
    /// Explicit dependency bindings, resolved and absolute.
    pub dependencies: ValueMap,
    pub default_target: Option<String>,
    pub roots: Roots,
}

impl std::fmt::Debug for FlowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowConfig")
            .field("part", &self.part)
            .field("platform", &self.platform)
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Builtins with `layers` stacked on top, in order.
fn layered<'a>(
    builtins: &ValueMap,
    layers: impl IntoIterator<Item = &'a ValueMap>,
) -> Result<ResolutionEnv> {
    let mut env = ResolutionEnv::with_values(builtins);
    env.layers(layers)?;
    Ok(env)
}

/// Merge `layers` left to right; later maps win per key.
fn merged<'a>(layers: impl IntoIterator<Item = &'a ValueMap>) -> ValueMap {
    let mut out = ValueMap::new();
    for layer in layers {
        out.extend(layer.iter().map(|(name, value)| (name.clone(), value.clone())));
    }
    out
}

impl FlowConfig {
    /// Read the install tree's part database and platform flow, then compose.
    pub fn load(
        install: &InstallPaths,
        project: &ProjectFlowConfig,
        overlay: &CliOverlay,
        part: Option<&str>,
        registry: &ModuleRegistry,
    ) -> Result<Self> {
        let part = project.select_part(part)?;
        let part_db = PartDb::load(&install.part_db_path())?;
        let platform = part_db
            .platform_for(&part)
            .map(str::to_string)
            .or_else(|| project.default_platform.clone())
            .ok_or_else(|| anyhow!("unknown part `{part}`: not listed in the part database"))?;
        let platform_path = install.platform_path(&platform);
        if !platform_path.is_file() {
            return Err(anyhow!(
                "unknown platform `{platform}`: {} does not exist",
                platform_path.display()
            ));
        }
        let flow = PlatformFlow::load(&platform_path)?;
        tracing::debug!(part = part.as_str(), platform = platform.as_str(), "platform selected");

        Self::compose(
            FlowSources {
                platform: &platform,
                part: &part,
                flow: &flow,
                project,
                overlay,
                builtins: builtin_values(install, &part),
                roots: install.roots(),
            },
            registry,
        )
    }

    /// Stack all layers, build stage environments and instantiate every stage.
    pub fn compose(sources: FlowSources<'_>, registry: &ModuleRegistry) -> Result<Self> {
        let FlowSources {
            platform,
            part,
            flow,
            project,
            overlay,
            builtins,
            roots,
        } = sources;
        if flow.stages.is_empty() {
            return Err(anyhow!("platform `{platform}` defines no stages"));
        }
        let part_config = project.part(part);

        let env = layered(
            &builtins,
            [
                &flow.values,
                &project.values,
                &part_config.values,
                &overlay.values,
            ],
        )
        .context("resolve flow values")?;

        let mut stages = BTreeMap::new();
        for (name, def) in &flow.stages {
            let part_stage = part_config.stages.get(name).cloned().unwrap_or_default();
            if !part_stage.dependencies.is_empty() {
                tracing::warn!(
                    stage = name.as_str(),
                    "per-stage dependencies are not supported and will be ignored"
                );
            }
            let empty = ValueMap::new();
            let cli_stage = overlay.stage_values(name).unwrap_or(&empty);
            let stage_env = layered(
                &builtins,
                [
                    &flow.values,
                    &def.values,
                    &project.values,
                    &part_config.values,
                    &part_stage.values,
                    &overlay.values,
                    cli_stage,
                ],
            )
            .with_context(|| format!("resolve values of stage `{name}`"))?;
            let value_overrides = merged([&def.values, &part_stage.values, cli_stage]);
            let module = registry.instantiate(&def.module, &def.params, &stage_env, name)?;
            stages.insert(
                name.clone(),
                Stage {
                    name: name.clone(),
                    module_ref: def.module.clone(),
                    module,
                    value_overrides,
                    env: stage_env,
                },
            );
        }
        for (stage, scoped) in &overlay.stages {
            if !scoped.dependencies.is_empty() {
                tracing::warn!(
                    stage = stage.as_str(),
                    "stage-scoped --dep bindings are not supported and will be ignored"
                );
            }
        }

        let dependencies = merged([
            &flow.dependencies,
            &project.dependencies,
            &part_config.dependencies,
            &overlay.dependencies,
        ])
        .into_iter()
        .map(|(name, value)| (name, absolutize(&env.resolve(&value))))
        .collect();

        let default_target = part_config
            .default_target
            .clone()
            .or_else(|| project.default_target.clone());

        tracing::debug!(
            stages = stages.len(),
            modules = registry.loaded_count(),
            "flow configured"
        );
        Ok(Self {
            part: part.to_string(),
            platform: platform.to_string(),
            stages,
            dependencies,
            default_target,
            roots,
        })
    }

    /// `--target`, else the configured default.
    pub fn select_target(&self, requested: Option<&str>) -> Result<String> {
        requested
            .map(str::to_string)
            .or_else(|| self.default_target.clone())
            .ok_or_else(|| {
                anyhow!("no target selected: pass --target or set `default_target` in the flow configuration")
            })
    }

    pub fn stage(&self, name: &str) -> Result<&Stage> {
        self.stages
            .get(name)
            .ok_or_else(|| anyhow!("stage `{name}` does not exist in platform `{}`", self.platform))
    }
}

/// Values every flow can reference without configuring them.
pub fn builtin_values(install: &InstallPaths, part: &str) -> ValueMap {
    let mut values = ValueMap::new();
    let text = |path: &Path| Value::from(path.to_string_lossy().into_owned());
    values.insert("shareDir".to_string(), text(install.share_dir()));
    values.insert("binDir".to_string(), text(install.bin_dir()));
    values.insert("auxDir".to_string(), text(&install.aux_dir()));
    let python = which::which("python3")
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "python3".to_string());
    values.insert("python3".to_string(), Value::from(python));
    values.insert("noisyWarnings".to_string(), Value::from(NOISY_WARNINGS_LOG));
    values.insert("part_name".to_string(), Value::from(part.to_lowercase()));
    if install.family() == "xc7" {
        if let Some(db) = prjxray_db() {
            values.insert("prjxray_db".to_string(), Value::from(db));
        }
    }
    values
}

/// Database root reported by `prjxray-config`, when it is installed.
fn prjxray_db() -> Option<String> {
    let program = which::which("prjxray-config").ok()?;
    match Tool::new(program.to_string_lossy()).run() {
        Ok(stdout) => {
            let db = String::from_utf8_lossy(&stdout).trim().to_string();
            (!db.is_empty()).then_some(db)
        }
        Err(err) => {
            tracing::warn!(error = %err, "prjxray-config failed; `prjxray_db` is not set");
            None
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
