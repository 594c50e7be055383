use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use chrono::{DateTime, Local};
use nix::unistd::{Gid, Group, Uid, User};
use std::collections::VecDeque;
use std::fs::{self, File, FileTimes, Metadata, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::debug;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "tail".
    fn name() -> &'static str;

    /// Executes the command against the provided streams and environment.
    ///
    /// An `Err` is a failure of the whole command; it is printed to `stderr` by the
    /// caller. Problems with a single operand are written to `stderr` directly so the
    /// remaining operands are still processed.
    fn execute(
        self,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) {
        if let Err(e) = <T as BuiltinCommand>::execute(*self, stdout, stderr, env) {
            debug!(command = T::name(), error = %e, "built-in failed");
            let _ = writeln!(stderr, "{:#}", e);
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        _env: &mut Environment,
    ) {
        let out: &mut dyn Write = if self.is_error { stderr } else { stdout };
        let _ = out.write_all(self.output.as_bytes());
        if !self.output.ends_with('\n') {
            let _ = writeln!(out);
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

/// Exit the shell.
///
/// The status defaults to 0; only its leading digits are taken into account. Operands
/// are never treated as options, so `exit -1` and `exit help` both exit.
pub struct Exit {
    pub status: Vec<String>,
}

impl FromArgs for Exit {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Self {
            status: args.iter().map(|arg| arg.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()> {
        let status = self.status.first().map_or(0, |s| parse_status(s));
        env.request_exit(status);
        Ok(())
    }
}

/// Parses a status the way C's `atoi` does: optional leading whitespace and sign,
/// then as many digits as there are. Anything unparsable is 0.
fn parse_status(text: &str) -> ExitCode {
    let text = text.trim_start();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let limit = i64::from(i32::MAX) + 1;
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| (acc * 10 + i64::from(d - b'0')).min(limit));
    let value = if negative { -magnitude } else { magnitude };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as ExitCode
}

#[derive(FromArgs)]
#[argh(help_triggers("--help"))]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()> {
        writeln!(stdout, "{}", env.current_dir.display())?;
        Ok(())
    }
}

#[derive(FromArgs)]
#[argh(help_triggers("--help"))]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var_os("HOME") {
                Some(home) => PathBuf::from(home),
                None => bail!("cd: No HOME environment variable"),
            },
        };

        let canonical = fs::canonicalize(env.resolve(&target))
            .with_context(|| format!("cd: {}", target.display()))?;
        if !canonical.is_dir() {
            bail!("cd: {}: Not a directory", target.display());
        }

        env.current_dir = canonical;
        Ok(())
    }
}

#[derive(FromArgs)]
#[argh(help_triggers("--help"))]
/// List the entries of a directory, skipping hidden ones.
pub struct Ls {
    #[argh(switch, short = 'l')]
    /// use a long listing format
    pub long: bool,

    #[argh(positional)]
    /// directory to list; defaults to the current directory
    pub dir: Option<String>,
}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()> {
        let label = self.dir.as_deref().unwrap_or(".");
        let dir = env.resolve(label);

        let mut names: Vec<_> = fs::read_dir(&dir)
            .with_context(|| format!("ls: cannot open directory '{}'", label))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name())
            .filter(|name| !name.as_bytes().starts_with(b"."))
            .collect();
        names.sort();

        for name in names {
            let shown = name.to_string_lossy();
            if !self.long {
                writeln!(stdout, "{}", shown)?;
                continue;
            }
            match fs::metadata(dir.join(&name)) {
                Ok(meta) => writeln!(stdout, "{}", long_entry(&meta, &shown))?,
                Err(e) => writeln!(stderr, "ls: cannot access '{}': {}", shown, e)?,
            }
        }
        Ok(())
    }
}

fn long_entry(meta: &Metadata, name: &str) -> String {
    format!(
        "{} {} {} {} {:>5} {} {}",
        permission_string(meta),
        meta.nlink(),
        user_name(meta.uid()).unwrap_or_else(|| "???".into()),
        group_name(meta.gid()).unwrap_or_else(|| "???".into()),
        meta.size(),
        local_time(meta.mtime(), "%b %d %H:%M"),
        name
    )
}

/// `drwxr-xr-x` style rendering of the type and permission bits.
fn permission_string(meta: &Metadata) -> String {
    const BITS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    let mode = meta.mode();
    let kind = if meta.is_dir() { 'd' } else { '-' };
    std::iter::once(kind)
        .chain(
            BITS.iter()
                .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' }),
        )
        .collect()
}

fn user_name(uid: u32) -> Option<String> {
    User::from_uid(Uid::from_raw(uid)).ok().flatten().map(|u| u.name)
}

fn group_name(gid: u32) -> Option<String> {
    Group::from_gid(Gid::from_raw(gid)).ok().flatten().map(|g| g.name)
}

fn local_time(secs: i64, format: &str) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.with_timezone(&Local).format(format).to_string())
        .unwrap_or_else(|| "?".into())
}

#[derive(FromArgs)]
#[argh(help_triggers("--help"))]
/// Copy a file to a destination path.
pub struct Cp {
    #[argh(positional)]
    /// file to copy
    pub source: String,

    #[argh(positional)]
    /// path the copy is written to; created or truncated
    pub destination: String,
}

impl BuiltinCommand for Cp {
    fn name() -> &'static str {
        "cp"
    }

    fn execute(
        self,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()> {
        let src = env.resolve(&self.source);
        let dst = env.resolve(&self.destination);

        let src_meta =
            fs::metadata(&src).with_context(|| format!("cp: cannot stat '{}'", self.source))?;
        if let Ok(dst_meta) = fs::metadata(&dst) {
            if src_meta.dev() == dst_meta.dev() && src_meta.ino() == dst_meta.ino() {
                bail!(
                    "cp: '{}' and '{}' are the same file",
                    self.source,
                    self.destination
                );
            }
        }
        if src_meta.is_dir() {
            bail!("cp: '{}' is a directory", self.source);
        }

        let mut input = File::open(&src)
            .with_context(|| format!("cp: cannot open '{}' for reading", self.source))?;
        let mut output = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o664)
            .open(&dst)
            .with_context(|| format!("cp: cannot create '{}'", self.destination))?;
        io::copy(&mut input, &mut output).with_context(|| {
            format!(
                "cp: error copying '{}' to '{}'",
                self.source, self.destination
            )
        })?;
        Ok(())
    }
}

#[derive(FromArgs)]
#[argh(help_triggers("--help"))]
/// Print all environment variables, or set one with NAME=VALUE.
pub struct Env {
    #[argh(positional, greedy)]
    /// assignment of the form NAME=VALUE
    pub assignments: Vec<String>,
}

impl BuiltinCommand for Env {
    fn name() -> &'static str {
        "env"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()> {
        match self.assignments.as_slice() {
            [] => {
                for (name, value) in env.sorted_vars() {
                    stdout.write_all(name.as_bytes())?;
                    stdout.write_all(b"=")?;
                    stdout.write_all(value.as_bytes())?;
                    writeln!(stdout)?;
                }
            }
            [assignment] => {
                let (name, value) = assignment
                    .split_once('=')
                    .filter(|(name, value)| !name.is_empty() && !value.is_empty())
                    .context("Invalid format. Use NAME=VALUE.")?;
                env.set_var(name, value);
                writeln!(stdout, "Environment variable '{}' set to '{}'", name, value)?;
            }
            _ => bail!("Usage: env or env NAME=VALUE"),
        }
        Ok(())
    }
}

#[derive(FromArgs)]
#[argh(help_triggers("--help"))]
/// Print status information about files or directories.
pub struct Stat {
    #[argh(positional, greedy)]
    /// files or directories to describe
    pub files: Vec<String>,
}

impl BuiltinCommand for Stat {
    fn name() -> &'static str {
        "stat"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()> {
        if self.files.is_empty() {
            bail!("Usage: stat <file/directory>...");
        }

        let last = self.files.len() - 1;
        for (i, file) in self.files.iter().enumerate() {
            match fs::metadata(env.resolve(file)) {
                Ok(meta) => write_stat(stdout, file, &meta)?,
                Err(e) => writeln!(stderr, "stat: cannot stat '{}': {}", file, e)?,
            }
            if i < last {
                writeln!(stdout)?;
            }
        }
        Ok(())
    }
}

fn write_stat(out: &mut dyn Write, path: &str, meta: &Metadata) -> io::Result<()> {
    let kind = if meta.is_dir() {
        "Directory"
    } else if meta.is_file() {
        "Regular file"
    } else {
        "Other"
    };
    let (uid, gid) = (meta.uid(), meta.gid());

    writeln!(out, "  File: '{}'", path)?;
    writeln!(
        out,
        "  Size: {}\tBlocks: {}\tIO Block: {}\t{}",
        meta.size(),
        meta.blocks(),
        meta.blksize(),
        kind
    )?;
    writeln!(
        out,
        "  Access: ({:04o}/{})",
        meta.mode() & 0o7777,
        permission_string(meta)
    )?;
    writeln!(
        out,
        "  UID: ({}/{})   GID: ({}/{})",
        uid,
        user_name(uid).unwrap_or_else(|| "unknown".into()),
        gid,
        group_name(gid).unwrap_or_else(|| "unknown".into())
    )?;
    const STAMP: &str = "%Y-%m-%d %H:%M:%S";
    writeln!(out, "  Access: {}", local_time(meta.atime(), STAMP))?;
    writeln!(out, "  Modify: {}", local_time(meta.mtime(), STAMP))?;
    writeln!(out, "  Change: {}", local_time(meta.ctime(), STAMP))?;
    Ok(())
}

#[derive(FromArgs)]
#[argh(help_triggers("--help"))]
/// Print the last lines of each file.
pub struct Tail {
    #[argh(option, short = 'n', default = "10")]
    /// number of lines to print from the end of each file
    pub lines: usize,

    #[argh(positional, greedy)]
    /// files to read
    pub files: Vec<String>,
}

impl BuiltinCommand for Tail {
    fn name() -> &'static str {
        "tail"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()> {
        if self.files.is_empty() {
            bail!("Usage: tail <file1...fileN>");
        }

        let with_headers = self.files.len() > 1;
        let last = self.files.len() - 1;
        for (i, file) in self.files.iter().enumerate() {
            if with_headers {
                writeln!(stdout, "==> {} <==", file)?;
            }
            let lines = File::open(env.resolve(file))
                .and_then(|f| last_lines(BufReader::new(f), self.lines));
            match lines {
                Ok(lines) => {
                    for line in lines {
                        stdout.write_all(&line)?;
                    }
                }
                Err(e) => writeln!(stderr, "tail: cannot read '{}': {}", file, e)?,
            }
            if i < last {
                writeln!(stdout)?;
            }
        }
        Ok(())
    }
}

/// Keeps only the final `limit` lines of `reader`, terminators included.
fn last_lines(mut reader: impl BufRead, limit: usize) -> io::Result<VecDeque<Vec<u8>>> {
    let mut ring = VecDeque::with_capacity(limit);
    if limit == 0 {
        return Ok(ring);
    }
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(ring);
        }
        if ring.len() == limit {
            ring.pop_front();
        }
        ring.push_back(line);
    }
}

#[derive(FromArgs)]
#[argh(help_triggers("--help"))]
/// Create an empty file, or update the access and modification times of an existing one.
pub struct Touch {
    #[argh(positional)]
    /// file to create or update
    pub file: String,
}

impl BuiltinCommand for Touch {
    fn name() -> &'static str {
        "touch"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<()> {
        let path = env.resolve(&self.file);

        if fs::metadata(&path).is_ok() {
            let now = SystemTime::now();
            File::open(&path)
                .and_then(|f| f.set_times(FileTimes::new().set_accessed(now).set_modified(now)))
                .with_context(|| format!("touch: cannot touch '{}'", self.file))?;
            writeln!(
                stdout,
                "Updated access and modification times of '{}'",
                self.file
            )?;
        } else {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .with_context(|| format!("touch: cannot create '{}'", self.file))?;
            writeln!(stdout, "Created new file '{}'", self.file)?;
        }
        Ok(())
    }
}
