use crate::command::ExitCode;
use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Mutable view of the process-wide state that built-ins are allowed to change.
///
/// The environment contains:
/// - `vars`: the variables handed to every external command.
/// - `current_dir`: the working directory of built-ins and of launched children.
/// - `exit_status`: set by `exit`; the read loop stops as soon as it sees it.
///
/// The interpreter never touches the real working directory or environment of its own
/// process, so every change made by a built-in is visible here and only here.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME), kept as raw OS
    /// strings so children receive them byte for byte.
    pub vars: HashMap<OsString, OsString>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    exit_status: Option<ExitCode>,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies every variable from `std::env::vars_os()` and initializes
    /// `current_dir` from `std::env::current_dir()`.
    pub fn new() -> Self {
        let vars = stdenv::vars_os().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_vars(vars, current_dir)
    }

    /// Build an environment from explicit parts, without looking at the process.
    pub fn with_vars(vars: HashMap<OsString, OsString>, current_dir: PathBuf) -> Self {
        Self {
            vars,
            current_dir,
            exit_status: None,
        }
    }

    /// Get the value of an environment variable, if it is set and valid UTF-8.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.get_var_os(key).and_then(OsStr::to_str)
    }

    /// Get the raw value of an environment variable.
    pub fn get_var_os(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(key.as_ref()).map(OsString::as_os_str)
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<OsString>, val: impl Into<OsString>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Interpret `path` relative to the working directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.current_dir.join(path)
    }

    /// Variables sorted by name.
    pub fn sorted_vars(&self) -> Vec<(&OsStr, &OsStr)> {
        let mut vars: Vec<_> = self
            .vars
            .iter()
            .map(|(k, v)| (k.as_os_str(), v.as_os_str()))
            .collect();
        vars.sort_unstable();
        vars
    }

    /// The `NAME=VALUE` block passed to `execve`.
    ///
    /// Entries that cannot be represented as C strings are left out.
    pub fn to_envp(&self) -> Vec<CString> {
        self.vars
            .iter()
            .filter_map(|(k, v)| {
                CString::new([k.as_bytes(), &b"="[..], v.as_bytes()].concat()).ok()
            })
            .collect()
    }

    /// Ask the read loop to terminate with `status`.
    pub fn request_exit(&mut self, status: ExitCode) {
        self.exit_status = Some(status);
    }

    /// The status requested by `exit`, if any.
    pub fn exit_requested(&self) -> Option<ExitCode> {
        self.exit_status
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
