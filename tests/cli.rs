//! End-to-end tests that drive the `myshell` binary over piped stdin.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run_shell(input: &str, cwd: &std::path::Path) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_myshell"))
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start myshell");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().expect("myshell did not finish")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_end_of_input_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_shell("", dir.path());

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_of(&output), "%myshell% ");
}

#[test]
fn test_exit_with_status() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_shell("exit 7\necho never\n", dir.path());

    assert_eq!(output.status.code(), Some(7));
    assert_eq!(stdout_of(&output), "%myshell% ");
}

#[test]
fn test_exit_operands_are_not_options() {
    let dir = tempfile::tempdir().unwrap();

    let output = run_shell("exit -1\necho never\n", dir.path());
    assert_eq!(output.status.code(), Some(255));
    assert_eq!(stdout_of(&output), "%myshell% ");
    assert!(output.stderr.is_empty());

    let output = run_shell("exit help\necho never\n", dir.path());
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_of(&output), "%myshell% ");
}

#[test]
fn test_touch_help_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_shell("touch help\n", dir.path());

    assert_eq!(
        stdout_of(&output),
        "%myshell% Created new file 'help'\n%myshell% "
    );
    assert!(dir.path().join("help").is_file());
}

#[test]
fn test_external_command_output_between_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_shell("echo hello   world\n", dir.path());

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_of(&output), "%myshell% hello world\n%myshell% ");
}

#[test]
fn test_unknown_program_reported_and_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_shell("no_such_program_for_myshell\nexit 3\n", dir.path());

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no_such_program_for_myshell: "));
    assert_eq!(stdout_of(&output), "%myshell% %myshell% ");
}

#[test]
fn test_builtins_affect_later_commands() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("work")).unwrap();
    std::fs::write(
        dir.path().join("work/greet.sh"),
        "echo \"$GREETING\" > from_child.txt\n",
    )
    .unwrap();
    let script = "cd work\nenv GREETING=hi\ntouch made.txt\nsh greet.sh\n";
    let output = run_shell(script, dir.path());

    assert_eq!(output.status.code(), Some(0));
    assert!(dir.path().join("work/made.txt").exists());
    let written = std::fs::read_to_string(dir.path().join("work/from_child.txt")).unwrap();
    assert_eq!(written, "hi\n");
}

#[test]
fn test_cp_same_file_refused() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "data").unwrap();
    let output = run_shell("cp a.txt a.txt\n", dir.path());

    assert_eq!(output.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cp: 'a.txt' and 'a.txt' are the same file"));
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "data");
}

#[test]
fn test_custom_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_myshell"))
        .args(["--prompt", "$"])
        .current_dir(dir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    let mut out = String::new();
    std::io::Read::read_to_string(child.stdout.as_mut().unwrap(), &mut out).unwrap();

    assert!(child.wait().unwrap().success());
    assert_eq!(out, "$ ");
}
