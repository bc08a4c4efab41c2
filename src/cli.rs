//! CLI argument parsing for the flow runner.
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "f4pga",
    version,
    about = "Dependency-resolving build engine for FPGA toolchain flows",
    after_help = "Examples:\n  f4pga build -f flow.json -t bitstream\n  f4pga -vv build -f flow.json -p xc7a35tcpg236-1 -V synth.top=counter\n  f4pga build -f flow.json --info\n  f4pga showd -f flow.json -s synth",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Print more progress (repeat for more); goes before the command
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print nothing but errors; goes before the command
    #[arg(short, long, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Build(BuildArgs),
    Showd(ShowdArgs),
}

/// Build command inputs.
#[derive(Args, Debug)]
#[command(about = "Build a target of the flow")]
pub struct BuildArgs {
    /// Project flow configuration (JSON)
    #[arg(short, long, value_name = "PATH")]
    pub flow: Option<PathBuf>,

    /// Part to build for (defaults to the configuration's `default_part`)
    #[arg(short, long, value_name = "NAME")]
    pub part: Option<String>,

    /// Dependency to build (defaults to the configuration's `default_target`)
    #[arg(short, long, value_name = "NAME")]
    pub target: Option<String>,

    /// Bind a dependency path: `[stage.]name=value`
    #[arg(short = 'D', long = "dep", value_name = "BINDING")]
    pub deps: Vec<String>,

    /// Override a value: `[stage.]name=value`
    #[arg(short = 'V', long = "val", value_name = "BINDING")]
    pub vals: Vec<String>,

    /// Plan and show the status without running any stage
    #[arg(short = 'P', long)]
    pub pretend: bool,

    /// List the products of the flow and exit
    #[arg(short, long)]
    pub info: bool,

    /// Describe a stage's inputs and outputs and exit
    #[arg(short = 'S', long, value_name = "NAME")]
    pub stageinfo: Option<String>,

    /// Ignore and do not update the fingerprint cache
    #[arg(short = 'c', long)]
    pub nocache: bool,
}

/// Showd command inputs.
#[derive(Args, Debug)]
#[command(about = "Show the dependency bindings of a project")]
pub struct ShowdArgs {
    /// Project flow configuration (JSON)
    #[arg(short, long, value_name = "PATH")]
    pub flow: PathBuf,

    /// Part whose section to show (defaults to the configuration's `default_part`)
    #[arg(short, long, value_name = "NAME")]
    pub part: Option<String>,

    /// Also show this stage's value overrides
    #[arg(short = 's', long, value_name = "NAME")]
    pub stage: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn build_collects_repeated_overrides() {
        let args = RootArgs::try_parse_from([
            "f4pga", "-vv", "build", "-f", "flow.json", "-D", "a=1", "--dep", "b=2", "-V",
            "synth.top=x", "-c",
        ])
        .expect("parse");
        assert_eq!(args.verbose, 2);
        let Command::Build(build) = args.command else {
            panic!("expected build");
        };
        assert_eq!(build.deps, vec!["a=1", "b=2"]);
        assert_eq!(build.vals, vec!["synth.top=x"]);
        assert!(build.nocache);
    }
}
