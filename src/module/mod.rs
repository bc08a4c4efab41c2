//! Stage modules: the wrappers around external tools that make up a flow.
//!
//! A module is driven in two modes. In `map` mode it only reports where its
//! outputs would go for the given inputs; in `exec` mode it runs the tool.
//! Both modes see the same `ModuleContext`, built from the stage's bindings.
pub mod common;
pub mod context;
pub mod io;
pub mod registry;

pub use context::{ModuleContext, Roots, StageInputs};
pub use io::{IoName, ModuleIo, Qualifier};
pub use registry::{ModuleArgs, ModuleRegistry};

use crate::console::Reporter;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;

use crate::value::Value;

/// A tool wrapper used by flow stages.
pub trait Module {
    /// Static declaration of the module's inputs and outputs.
    fn io(&self) -> &ModuleIo;

    /// Default output paths for the inputs bound in `ctx`. Must not touch the filesystem.
    fn map_io(&self, ctx: &ModuleContext) -> Result<BTreeMap<String, Value>>;

    /// Run the tool. Call `progress.phase` once per declared phase.
    fn execute(&self, ctx: &ModuleContext, progress: &mut Progress) -> Result<()>;
}

/// Phase counter handed to `Module::execute`.
#[derive(Debug)]
pub struct Progress {
    reporter: Reporter,
    total: usize,
    current: usize,
}

impl Progress {
    pub fn new(reporter: Reporter, total: usize) -> Self {
        Self {
            reporter,
            total,
            current: 0,
        }
    }

    /// Announce the start of the next phase.
    pub fn phase(&mut self, message: impl AsRef<str>) {
        self.current += 1;
        self.reporter.say(
            1,
            format!("    [{}/{}]: {}", self.current, self.total, message.as_ref()),
        );
    }

    pub fn phases_seen(&self) -> usize {
        self.current
    }

    /// True when the user asked for verbose output.
    pub fn verbose(&self) -> bool {
        self.reporter.level() >= 2
    }
}

/// Which half of the module protocol failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Map,
    Exec,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Map => "map",
            Mode::Exec => "exec",
        })
    }
}

/// A stage module failed while building its context or running.
#[derive(Debug)]
pub struct ModuleFailure {
    pub stage: String,
    pub mode: Mode,
    pub source: anyhow::Error,
}

impl ModuleFailure {
    pub fn new(stage: &str, mode: Mode, source: anyhow::Error) -> Self {
        Self {
            stage: stage.to_string(),
            mode,
            source,
        }
    }
}

impl fmt::Display for ModuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module `{}` failed in {} mode", self.stage, self.mode)
    }
}

impl std::error::Error for ModuleFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
