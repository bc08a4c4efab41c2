//! Running external tools on behalf of stage modules.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// A tool exited with a non-zero status.
#[derive(Debug)]
pub struct SubprocessFailure {
    pub program: String,
    pub code: Option<i32>,
    pub stderr: String,
}

impl std::fmt::Display for SubprocessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} exited with code {code}", self.program)?,
            None => write!(f, "{} was terminated by a signal", self.program)?,
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, "\nstderr:\n{stderr}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SubprocessFailure {}

/// Exit code of the first tool failure in the error chain, if any.
pub fn subprocess_exit_code(err: &anyhow::Error) -> Option<i32> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<SubprocessFailure>()
            .and_then(|failure| failure.code)
    })
}

/// Command line plus the environment and directory it runs in.
#[derive(Debug, Clone, Default)]
pub struct Tool {
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl Tool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
            ..Self::default()
        }
    }

    /// Start from an already split command line (interpreter plus flags).
    pub fn from_argv(argv: Vec<String>) -> Self {
        Self {
            argv,
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-quoted command line, for logs.
    pub fn display(&self) -> String {
        shell_words::join(&self.argv)
    }

    /// Run to completion and return captured stdout.
    ///
    /// A non-zero exit becomes a `SubprocessFailure` carrying the tool's stderr.
    pub fn run(&self) -> Result<Vec<u8>> {
        let (program, args) = self
            .argv
            .split_first()
            .context("empty command line")?;
        let mut command = Command::new(program);
        command.args(args).envs(&self.env);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        tracing::debug!(command = %self.display(), "spawn tool");
        let start = Instant::now();
        let output = command
            .output()
            .with_context(|| format!("run {program}"))?;
        let elapsed_ms = start.elapsed().as_millis();
        tracing::info!(
            elapsed_ms,
            program = program.as_str(),
            code = output.status.code(),
            stdout_bytes = output.stdout.len(),
            "tool finished"
        );
        if !output.status.success() {
            return Err(SubprocessFailure {
                program: program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
        Ok(output.stdout)
    }
}
