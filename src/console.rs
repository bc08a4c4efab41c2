//! User-facing output and diagnostics setup.
//!
//! Build progress goes to stdout through `Reporter`, gated by the `-v` count
//! (or `--silent`). Diagnostics go through `tracing` to stderr.
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "F4PGA_LOG";

/// Verbosity-gated printer for build progress.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    level: i32,
}

impl Reporter {
    pub fn new(verbose: u8, silent: bool) -> Self {
        let level = if silent { -1 } else { i32::from(verbose) };
        Self { level }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    /// Print `message` when the current level is at least `level`.
    pub fn say(&self, level: i32, message: impl AsRef<str>) {
        if level <= self.level {
            println!("{}", message.as_ref());
        }
    }
}

/// Install the stderr subscriber. `F4PGA_LOG` overrides the verbosity default.
pub fn init_tracing(reporter: Reporter) {
    let default = match reporter.level() {
        level if level < 0 => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
