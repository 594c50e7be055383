//! Start-up configuration: command-line options and logging.

use argh::FromArgs;
use tracing_subscriber::EnvFilter;

/// Prompt shown before every line when none is given on the command line.
pub const DEFAULT_PROMPT: &str = "%myshell%";

#[derive(FromArgs, Debug)]
/// A minimal interactive command interpreter.
/// Commands are read from standard input, one per line.
pub struct ShellArgs {
    #[argh(option, default = "DEFAULT_PROMPT.to_string()")]
    /// text printed (followed by a space) before each command is read
    pub prompt: String,

    #[argh(switch, short = 'v')]
    /// log dispatch and process events to standard error
    pub verbose: bool,
}

/// Settings the interpreter needs from start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub prompt: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl From<&ShellArgs> for ShellConfig {
    fn from(args: &ShellArgs) -> Self {
        Self {
            prompt: args.prompt.clone(),
        }
    }
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "warn" }
}

/// Installs the global subscriber. Logs go to stderr so they never mix with
/// command output.
pub fn init_logging(verbose: bool) {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| default_log_level(verbose).to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
