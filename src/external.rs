//! Launching programs that are not built-ins.
//!
//! One command runs at a time: [`ForkExecLauncher::launch`] forks, the child replaces
//! its image with the requested program, and the parent blocks until exactly that child
//! has been reaped.

use crate::command::{ArgVector, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, chdir, execve, fork};
use std::ffi::{CString, OsStr};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Status of a child whose program could not be found.
pub const EXIT_NOT_FOUND: ExitCode = 127;
/// Status of a child whose program was found but could not be executed.
pub const EXIT_CANNOT_EXECUTE: ExitCode = 126;

/// Runs an external command and reports how it terminated.
pub trait Launcher {
    /// Runs `argv` to completion using the working directory and variables of `env`.
    ///
    /// Returns the exit status of the reaped child.
    fn launch(&mut self, argv: &ArgVector, env: &Environment) -> Result<ExitCode, ShellError>;
}

/// Launcher backed by `fork`, `execve` and `waitpid`.
#[derive(Debug, Default)]
pub struct ForkExecLauncher;

/// Everything the child needs, prepared before forking so the child only has to
/// change directory and exec.
struct ExecPlan {
    name: String,
    program: Option<CString>,
    args: Vec<CString>,
    envp: Vec<CString>,
    workdir: PathBuf,
}

impl ExecPlan {
    fn prepare(argv: &ArgVector, env: &Environment) -> Result<Self, ShellError> {
        let raw_name = argv.program().unwrap_or_default();
        let name = raw_name.to_string_lossy().into_owned();
        let args = argv
            .to_exec_args()
            .map_err(|_| ShellError::NulByte {
                command: name.clone(),
            })?;
        let search_paths = env.get_var_os("PATH").unwrap_or_default();
        let program = find_command_path(search_paths, Path::new(raw_name), &env.current_dir)
            .and_then(|path| CString::new(path.as_os_str().as_bytes()).ok());

        Ok(Self {
            name,
            program,
            args,
            envp: env.to_envp(),
            workdir: env.current_dir.clone(),
        })
    }
}

impl Launcher for ForkExecLauncher {
    fn launch(&mut self, argv: &ArgVector, env: &Environment) -> Result<ExitCode, ShellError> {
        let plan = ExecPlan::prepare(argv, env)?;

        // SAFETY: all allocation happens before the fork; the child only changes
        // directory, execs, or reports and calls _exit.
        match unsafe { fork() } {
            Err(errno) => Err(ShellError::Fork(errno)),
            Ok(ForkResult::Child) => exec_child(&plan),
            Ok(ForkResult::Parent { child }) => {
                debug!(pid = %child, command = %plan.name, "spawned child");
                let status = wait_for(child)?;
                debug!(pid = %child, status, "reaped child");
                Ok(status)
            }
        }
    }
}

fn exec_child(plan: &ExecPlan) -> ! {
    if let Err(errno) = chdir(plan.workdir.as_path()) {
        report_child_failure(&plan.name, errno);
        exit_child(EXIT_CANNOT_EXECUTE);
    }
    let errno = match &plan.program {
        Some(program) => match execve(program.as_c_str(), &plan.args, &plan.envp) {
            Ok(never) => match never {},
            Err(errno) => errno,
        },
        None => Errno::ENOENT,
    };
    report_child_failure(&plan.name, errno);
    exit_child(if errno == Errno::ENOENT {
        EXIT_NOT_FOUND
    } else {
        EXIT_CANNOT_EXECUTE
    })
}

/// Ends a child whose exec failed without running the parent's exit handlers or
/// flushing buffers it inherited.
fn exit_child(status: ExitCode) -> ! {
    // SAFETY: _exit only terminates the calling process; it touches no memory of ours.
    unsafe { libc::_exit(status) }
}

fn report_child_failure(name: &str, errno: Errno) {
    let _ = writeln!(std::io::stderr(), "{}: {}", name, errno.desc());
}

/// Blocks until `child` terminates and returns its status.
///
/// A child killed by a signal reports `128 + signal`, like POSIX shells do.
fn wait_for(child: Pid) -> Result<ExitCode, ShellError> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(128 + signal as i32),
            Ok(other) => debug!(?other, "child not terminated yet"),
            Err(Errno::EINTR) => continue,
            Err(source) => {
                debug!(pid = %child, %source, "waitpid failed");
                return Err(ShellError::Wait { pid: child, source });
            }
        }
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative path with a separator (e.g. `bin/sh` or `./foo`): resolved against `cwd`,
///   returned if it exists.
/// - Single path component: search each directory in `search_paths` (PATH) and return
///   the first executable regular file.
/// - Empty path: returns `None`.
pub fn find_command_path(search_paths: &OsStr, path: &Path, cwd: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return find_by_path(path);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, _) => None,
        (Some(_), None) if !path.as_os_str().as_bytes().contains(&b'/') => {
            find_in_path(search_paths, path.as_os_str())
        }
        _ => find_by_path(&cwd.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(cmd))
        .find(|candidate| is_executable_file(candidate))
}

fn find_by_path(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

fn is_executable_file(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs::{self, File};

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    fn test_env(cwd: &Path) -> Environment {
        let mut env = Environment::with_vars(HashMap::new(), cwd.to_path_buf());
        env.set_var(
            "PATH",
            std::env::var_os("PATH").unwrap_or_else(|| "/usr/bin:/bin".into()),
        );
        env
    }

    fn argv(words: &[&str]) -> ArgVector {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let res = find_command_path(osstr("/bin"), path, Path::new("/"));
        assert_eq!(res.as_deref(), Some(path));
    }

    #[test]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        let res = find_command_path(osstr("/bin"), path, Path::new("/"));
        assert!(
            res.is_none(),
            "Expected not to find /bin/nonexisting via absolute path"
        );
    }

    #[test]
    fn single_component_found_in_path() {
        let res = find_command_path(osstr("/nonexistent_dir:/bin"), Path::new("sh"), Path::new("/"));
        let found = res.expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("nonexisting"), Path::new("/"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    fn single_component_skips_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("tool")).unwrap();
        let search = dir.path().as_os_str().to_owned();

        let res = find_command_path(&search, Path::new("tool"), Path::new("/"));
        assert!(res.is_none());
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        File::create(dir.path().join("bin").join("sh")).unwrap();
        File::create(dir.path().join("foo")).unwrap();

        let nested = find_command_path(osstr("/does/not/matter"), Path::new("bin/sh"), dir.path());
        assert_eq!(nested, Some(dir.path().join("bin/sh")));

        let dotted = find_command_path(osstr("/bin"), Path::new("./foo"), dir.path());
        assert_eq!(dotted, Some(dir.path().join("./foo")));
    }

    #[test]
    fn empty_path_is_none() {
        let res = find_command_path(osstr("/bin"), Path::new(""), Path::new("/"));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }

    #[test]
    fn launch_reports_child_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let mut launcher = ForkExecLauncher;

        assert_eq!(launcher.launch(&argv(&["true"]), &env).unwrap(), 0);
        assert_eq!(launcher.launch(&argv(&["false"]), &env).unwrap(), 1);
        assert_eq!(
            launcher.launch(&argv(&["sh", "-c", "exit 7"]), &env).unwrap(),
            7
        );
    }

    #[test]
    fn launch_unknown_program_exits_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let status = ForkExecLauncher
            .launch(&argv(&["definitely_not_a_real_program_xyz"]), &env)
            .unwrap();
        assert_eq!(status, EXIT_NOT_FOUND);
    }

    #[test]
    fn launch_non_executable_file_exits_cannot_execute() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "not a program\n").unwrap();
        let env = test_env(dir.path());

        let status = ForkExecLauncher
            .launch(&argv(&["./notes.txt"]), &env)
            .unwrap();
        assert_eq!(status, EXIT_CANNOT_EXECUTE);
    }

    #[test]
    fn launch_uses_context_dir_and_vars() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = test_env(dir.path());
        env.set_var("GREETING", "hello");

        let status = ForkExecLauncher
            .launch(
                &argv(&["sh", "-c", "echo \"$GREETING\" > out.txt; pwd >> out.txt"]),
                &env,
            )
            .unwrap();
        assert_eq!(status, 0);

        let written = fs::read_to_string(dir.path().join("out.txt")).unwrap();
        let canonical = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(written, format!("hello\n{}\n", canonical.display()));
    }

    #[test]
    fn launch_refuses_nul_bytes_without_forking() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let err = ForkExecLauncher
            .launch(&argv(&["echo", "a\0b"]), &env)
            .unwrap_err();
        assert!(matches!(err, ShellError::NulByte { .. }));
    }
}
