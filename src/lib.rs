//! A minimal interactive command interpreter.
//!
//! The interpreter reads one line at a time, splits it into whitespace-delimited
//! arguments, and either runs a built-in command in-process or forks a child that
//! replaces itself with the requested program. The parent waits for that child before
//! reading the next line, so at most one external command runs at a time.
//!
//! The main entry point is [`Interpreter`], which owns the read loop. The public
//! modules [`command`] and [`env`] expose the argument container, the built-in
//! dispatch traits, and the process-context object passed to every built-in.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod external;
mod interpreter;
pub mod lexer;

pub use command::{ArgVector, ExitCode};
pub use config::ShellConfig;
pub use error::ShellError;
pub use external::{ForkExecLauncher, Launcher};
/// Just a convenient re-export of the read loop and the dispatcher.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::{Dispatcher, Interpreter};
pub use lexer::tokenize;
