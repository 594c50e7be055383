use crate::env::Environment;
use std::borrow::Cow;
use std::ffi::{CString, NulError, OsStr, OsString};
use std::io::Write;
use std::ops::Index;
use std::os::unix::ffi::OsStrExt;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Owned, ordered list of the words of one input line.
///
/// Words are kept as raw OS strings, so bytes that are not valid UTF-8 reach `execve`
/// untouched. Produced by [`crate::tokenize`] and dropped as soon as the command that
/// used it has finished, whichever way it finished. The count of arguments is always
/// `len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgVector {
    args: Vec<OsString>,
}

impl ArgVector {
    pub fn new(args: Vec<OsString>) -> Self {
        Self { args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The command name, i.e. the first word, if it is valid UTF-8.
    ///
    /// Built-in names are ASCII, so a name that is not UTF-8 can only be a program.
    pub fn command(&self) -> Option<&str> {
        self.args.first().and_then(|a| a.to_str())
    }

    /// The first word exactly as it was read.
    pub fn program(&self) -> Option<&OsStr> {
        self.args.first().map(OsString::as_os_str)
    }

    /// Everything after the command name, for argument parsing.
    ///
    /// Invalid UTF-8 sequences are replaced with `U+FFFD`.
    pub fn operands(&self) -> Vec<Cow<'_, str>> {
        self.args.iter().skip(1).map(|a| a.to_string_lossy()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OsString> {
        self.args.iter()
    }

    pub(crate) fn push(&mut self, arg: OsString) {
        self.args.push(arg);
    }

    /// Converts the words into the C strings handed to `execve`.
    ///
    /// The terminating null pointer is appended by the exec wrapper itself.
    pub fn to_exec_args(&self) -> Result<Vec<CString>, NulError> {
        self.args.iter().map(|a| CString::new(a.as_bytes())).collect()
    }
}

impl Index<usize> for ArgVector {
    type Output = OsStr;

    fn index(&self, index: usize) -> &OsStr {
        &self.args[index]
    }
}

impl<'a> IntoIterator for &'a ArgVector {
    type Item = &'a OsString;
    type IntoIter = std::slice::Iter<'a, OsString>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

impl FromIterator<OsString> for ArgVector {
    fn from_iter<I: IntoIterator<Item = OsString>>(iter: I) -> Self {
        Self {
            args: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<String> for ArgVector {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        iter.into_iter().map(OsString::from).collect()
    }
}

/// Object-safe trait for a command that runs inside the interpreter process.
///
/// Implemented for every built-in via a blanket impl. Outcomes are reported only by
/// what the command writes; nothing is handed back to the dispatcher.
pub trait ExecutableCommand {
    /// Runs the command to completion.
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    );
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait CommandFactory {
    /// The exact, case-sensitive name this factory answers to.
    fn name(&self) -> &'static str;

    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}
