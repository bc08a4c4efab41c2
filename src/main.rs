mod cache;
mod cli;
mod commands;
mod console;
mod flow;
mod install;
mod module;
mod overrides;
mod process;
mod resolve;
mod value;

use clap::Parser;
use cli::{Command, RootArgs};
use console::Reporter;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    let reporter = Reporter::new(args.verbose, args.silent);
    console::init_tracing(reporter);

    let result = match &args.command {
        Command::Build(build) => commands::run_build(build, reporter),
        Command::Showd(showd) => commands::run_showd(showd),
    };
    match result {
        Ok(()) => {
            reporter.say(0, "f4pga: DONE");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            reporter.say(0, "f4pga: FAILED");
            let code = process::subprocess_exit_code(&err)
                .and_then(|code| u8::try_from(code).ok())
                .filter(|code| *code != 0)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
