use mini_shell::config::{self, ShellArgs};
use mini_shell::{ForkExecLauncher, Interpreter, ShellConfig};
use std::io::{self, Write};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let args: ShellArgs = argh::from_env();
    config::init_logging(args.verbose);
    info!("starting myshell v{}", env!("CARGO_PKG_VERSION"));

    let mut shell = Interpreter::new(
        ShellConfig::from(&args),
        io::stdin().lock(),
        io::stdout(),
        io::stderr(),
        ForkExecLauncher,
    );

    let outcome = shell.run();
    let (mut stdout, _) = shell.into_outputs();
    stdout.flush()?;

    match outcome {
        Ok(status) => std::process::exit(status),
        Err(e) => {
            error!(error = %e, "fatal error, exiting");
            std::process::exit(1)
        }
    }
}
