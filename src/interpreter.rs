use crate::command::{ArgVector, CommandFactory, ExitCode};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::Launcher;
use crate::lexer;
use std::io::{BufRead, Write};
use tracing::{debug, warn};

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports the built-ins defined in this crate.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Decides whether a command is handled in-process.
///
/// Holds a fixed list of built-in factories, queried in order; the first one whose
/// name equals the command (exactly, case-sensitively) runs it.
pub struct Dispatcher {
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Dispatcher {
    /// Create a dispatcher with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { commands }
    }

    /// Names of the built-ins, in matching order.
    #[cfg(test)]
    fn names(&self) -> Vec<&'static str> {
        self.commands.iter().map(|f| f.name()).collect()
    }

    #[cfg(test)]
    fn is_builtin(&self, name: &str) -> bool {
        self.commands.iter().any(|f| f.name() == name)
    }

    /// Runs `argv` as a built-in if its first word names one.
    ///
    /// Returns `false`, without side effects, when no built-in matches.
    pub fn dispatch(
        &self,
        argv: &ArgVector,
        env: &mut Environment,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> bool {
        let Some(name) = argv.command() else {
            return false;
        };
        let operands = argv.operands();
        let args: Vec<&str> = operands.iter().map(|a| a.as_ref()).collect();
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(name, &args) {
                debug!(command = name, "running built-in");
                cmd.execute(stdout, stderr, env);
                return true;
            }
        }
        false
    }
}

impl Default for Dispatcher {
    /// Create a dispatcher with the default set of built-ins:
    /// `exit`, `pwd`, `cd`, `ls`, `cp`, `env`, `stat`, `tail`, `touch`.
    fn default() -> Self {
        use crate::builtin::*;
        Self::new(vec![
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Ls>::default()),
            Box::new(Factory::<Cp>::default()),
            Box::new(Factory::<Env>::default()),
            Box::new(Factory::<Stat>::default()),
            Box::new(Factory::<Tail>::default()),
            Box::new(Factory::<Touch>::default()),
        ])
    }
}

/// Result of reading one line.
enum Input {
    Line(Vec<u8>),
    Eof,
    Failed(std::io::Error),
}

/// The read-dispatch-execute loop.
///
/// Reads commands from `input`, writes the prompt and built-in output to `stdout`,
/// diagnostics to `stderr`, and hands everything that is not a built-in to the
/// [`Launcher`].
///
/// Example
/// ```
/// use mini_shell::{ForkExecLauncher, Interpreter, ShellConfig};
/// let input = "pwd\nexit 3\n".as_bytes();
/// let mut sh = Interpreter::new(ShellConfig::default(), input, Vec::new(), Vec::new(), ForkExecLauncher);
/// assert_eq!(sh.run().unwrap(), 3);
/// ```
pub struct Interpreter<R, W, E, L> {
    input: R,
    stdout: W,
    stderr: E,
    launcher: L,
    dispatcher: Dispatcher,
    env: Environment,
    prompt: String,
}

impl<R: BufRead, W: Write, E: Write, L: Launcher> Interpreter<R, W, E, L> {
    /// Create an interpreter over the given streams, capturing the process environment.
    pub fn new(config: ShellConfig, input: R, stdout: W, stderr: E, launcher: L) -> Self {
        Self {
            input,
            stdout,
            stderr,
            launcher,
            dispatcher: Dispatcher::default(),
            env: Environment::new(),
            prompt: config.prompt,
        }
    }

    /// Replace the environment captured by [`Interpreter::new`].
    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Consumes the interpreter, returning its output streams.
    pub fn into_outputs(self) -> (W, E) {
        (self.stdout, self.stderr)
    }

    /// Runs until end of input or until `exit` is executed.
    ///
    /// Returns the status the program should terminate with. Only a failure to create a
    /// child process is returned as an error.
    pub fn run(&mut self) -> Result<ExitCode, ShellError> {
        loop {
            self.show_prompt();

            let line = match self.read_line() {
                Input::Line(line) => line,
                Input::Eof => {
                    debug!("end of input");
                    return Ok(0);
                }
                Input::Failed(e) => {
                    debug!(error = %e, "failed to read input");
                    let _ = writeln!(self.stderr, "Error reading input: {}", e);
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            if let Some(status) = self.process_line(&line)? {
                return Ok(status);
            }
        }
    }

    /// Tokenizes and runs one line, which need not be valid UTF-8.
    ///
    /// Returns `Some(status)` when the line asked the interpreter to exit.
    pub fn process_line(
        &mut self,
        line: impl AsRef<[u8]>,
    ) -> Result<Option<ExitCode>, ShellError> {
        let argv = lexer::tokenize(line);
        if argv.is_empty() {
            return Ok(None);
        }

        let handled =
            self.dispatcher
                .dispatch(&argv, &mut self.env, &mut self.stdout, &mut self.stderr);
        if handled {
            return Ok(self.env.exit_requested());
        }

        let _ = self.stdout.flush();
        match self.launcher.launch(&argv, &self.env) {
            Ok(status) => debug!(
                command = argv.command().unwrap_or_default(),
                status,
                "external command finished"
            ),
            Err(e) if e.is_fatal() => {
                debug!(error = %e, "cannot continue");
                let _ = writeln!(self.stderr, "{}", e);
                return Err(e);
            }
            Err(e) => {
                debug!(error = %e, "external command failed");
                let _ = writeln!(self.stderr, "{}", e);
            }
        }
        Ok(None)
    }

    fn show_prompt(&mut self) {
        let shown = write!(self.stdout, "{} ", self.prompt).and_then(|_| self.stdout.flush());
        if let Err(e) = shown {
            warn!(error = %e, "failed to write prompt");
        }
    }

    /// Reads one line of any length and strips a single trailing newline.
    fn read_line(&mut self) -> Input {
        let mut line = Vec::new();
        match self.input.read_until(b'\n', &mut line) {
            Ok(0) => Input::Eof,
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                Input::Line(line)
            }
            Err(e) => Input::Failed(e),
        }
    }
}
