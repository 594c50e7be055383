//! Errors raised by the read-dispatch-execute core.

use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

/// Failures of the process launcher.
///
/// Built-ins never produce these: their problems are written to stderr and forgotten.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The child process could not be created.
    #[error("fork: {0}")]
    Fork(#[source] Errno),

    /// Waiting for the child failed for a reason other than interruption.
    #[error("waitpid({pid}): {source}")]
    Wait { pid: Pid, source: Errno },

    /// An argument cannot be passed to exec because it contains a NUL byte.
    #[error("{command}: argument contains a NUL byte")]
    NulByte { command: String },
}

impl ShellError {
    /// Whether the interpreter has to stop instead of reading the next line.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::Fork(_))
    }
}
