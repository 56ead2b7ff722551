//! End-to-end tests driving the `envlock` binary.

use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::{TempDir, tempdir};

/// A throwaway envlock home with its own profiles directory.
struct Sandbox {
    home: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let home = tempdir().expect("tempdir");
        fs::create_dir_all(home.path().join("profiles")).expect("profiles dir");
        Self { home }
    }

    fn path(&self) -> &Path {
        self.home.path()
    }

    /// Writes `profiles/<name>.json`.
    fn profile(&self, document: Value) {
        let name = document["name"].as_str().expect("profile name");
        let path = self.path().join("profiles").join(format!("{}.json", name));
        fs::write(path, document.to_string()).expect("write profile");
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_envlock"));
        cmd.args(args)
            .current_dir(self.path())
            .env("ENVLOCK_HOME", self.path())
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .stdin(Stdio::null());
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().expect("envlock runs")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// `base` plus a `prod` profile that extends it.
fn base_and_prod(sandbox: &Sandbox) {
    sandbox.profile(json!({
        "name": "base",
        "description": "shared defaults",
        "variables": [
            { "key": "GREETING", "value": "hello" },
            { "key": "DB_HOST", "value": "localhost" },
            { "key": "DATABASE_URL", "value": "postgres://${DB_HOST}:5432/app" }
        ]
    }));
    sandbox.profile(json!({
        "name": "prod",
        "extends": ["base"],
        "variables": [ { "key": "DB_HOST", "value": "db.prod" } ]
    }));
}

#[test]
fn test_run_passes_the_child_exit_code_through() {
    // --- Setup ---
    let sandbox = Sandbox::new();
    base_and_prod(&sandbox);

    // --- Execute ---
    let output = sandbox.run(&["-p", "base", "--", "/bin/sh", "-c", "exit 3"]);

    // --- Assert ---
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_isolated_and_inherit_modes() {
    // --- Setup ---
    let sandbox = Sandbox::new();
    base_and_prod(&sandbox);
    let script = "printf '%s|%s' \"$DATABASE_URL\" \"${HOST_ONLY-unset}\"";

    // --- Execute ---
    let isolated = sandbox
        .command(&["run", "-p", "prod", "--isolated", "--", "/bin/sh", "-c", script])
        .env("HOST_ONLY", "present")
        .output()
        .expect("envlock runs");
    let inherit = sandbox
        .command(&["run", "-p", "prod", "--", "/bin/sh", "-c", script])
        .env("HOST_ONLY", "present")
        .output()
        .expect("envlock runs");

    // --- Assert ---
    assert!(isolated.status.success());
    assert_eq!(stdout(&isolated), "postgres://db.prod:5432/app|unset");
    assert!(inherit.status.success());
    assert_eq!(stdout(&inherit), "postgres://db.prod:5432/app|present");
}

#[test]
fn test_ops_edit_path_and_remove_host_variables() {
    // --- Setup ---
    let sandbox = Sandbox::new();
    sandbox.profile(json!({
        "name": "tools",
        "ops": [
            { "op": "prepend", "key": "PATH", "value": "/opt/tools/bin", "dedup": true },
            { "op": "unset", "key": "NOISY" }
        ]
    }));
    let script = "printf '%s|%s' \"$PATH\" \"${NOISY-gone}\"";

    // --- Execute ---
    let output = sandbox
        .command(&["run", "-p", "tools", "--", "/bin/sh", "-c", script])
        .env("PATH", "/usr/bin:/bin:/opt/tools/bin")
        .env("NOISY", "1")
        .output()
        .expect("envlock runs");
    let shell = sandbox
        .command(&["inspect", "-p", "tools", "--format", "shell"])
        .env("PATH", "/usr/bin:/bin")
        .output()
        .expect("envlock runs");

    // --- Assert ---
    assert!(output.status.success());
    assert_eq!(stdout(&output), "/opt/tools/bin:/usr/bin:/bin|gone");
    assert!(shell.status.success());
    assert_eq!(
        stdout(&shell),
        "export PATH='/opt/tools/bin:/usr/bin:/bin'\nunset NOISY\n"
    );
}

#[test]
fn test_missing_program_exits_127() {
    let sandbox = Sandbox::new();
    base_and_prod(&sandbox);

    let output = sandbox.run(&["run", "-p", "base", "--", "envlock-test-no-such-program"]);

    assert_eq!(output.status.code(), Some(127));
}

#[test]
fn test_inspect_json_and_redacted_shell() {
    // --- Setup ---
    let sandbox = Sandbox::new();
    base_and_prod(&sandbox);

    // --- Execute ---
    let json_output = sandbox.run(&["inspect", "-p", "prod", "--format", "json"]);
    let shell_output = sandbox.run(&["show", "-p", "base", "--format", "shell", "--redact"]);

    // --- Assert ---
    assert!(json_output.status.success());
    let env: Value = serde_json::from_slice(&json_output.stdout).expect("valid json");
    assert_eq!(
        env["variables"]["DATABASE_URL"]["value"],
        "postgres://db.prod:5432/app"
    );
    assert_eq!(env["variables"]["DB_HOST"]["provenance"]["profile"], "prod");
    assert_eq!(env["layers"], json!(["base", "prod"]));

    assert!(shell_output.status.success());
    assert_eq!(
        stdout(&shell_output),
        "export DATABASE_URL='***'\nexport DB_HOST='***'\nexport GREETING='***'\n"
    );
}

#[test]
fn test_options_alone_default_to_inspect() {
    let sandbox = Sandbox::new();
    base_and_prod(&sandbox);

    let output = sandbox.run(&["-p", "base", "--format", "shell"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("export GREETING='hello'"));
}

#[test]
fn test_error_classes_have_distinct_exit_codes() {
    // --- Setup ---
    let sandbox = Sandbox::new();
    fs::write(sandbox.path().join("profiles").join("broken.json"), "{ not json").expect("write");
    sandbox.profile(json!({
        "name": "cycle",
        "variables": [ { "key": "A", "value": "${B}" }, { "key": "B", "value": "${A}" } ]
    }));
    sandbox.profile(json!({
        "name": "dangling",
        "variables": [ { "key": "URL", "value": "http://${ENVLOCK_TEST_UNSET_HOST}/" } ]
    }));
    sandbox.profile(json!({
        "name": "locked",
        "variables": [ { "key": "REGION", "value": "eu", "locked": true } ]
    }));
    sandbox.profile(json!({
        "name": "override",
        "variables": [ { "key": "REGION", "value": "us" } ]
    }));

    // --- Execute & Assert ---
    let code = |args: &[&str]| sandbox.run(args).status.code();
    assert_eq!(code(&["validate", "-p", "broken"]), Some(3));
    assert_eq!(code(&["validate", "-p", "ghost"]), Some(3));
    assert_eq!(code(&["validate", "-p", "cycle"]), Some(4));
    assert_eq!(code(&["check", "-p", "dangling", "--isolated"]), Some(5));
    assert_eq!(code(&["validate", "-p", "locked", "-p", "override"]), Some(6));
    assert_eq!(code(&["validate", "-p", "override", "-p", "locked"]), Some(0));
    assert_eq!(code(&["inspect", "-p", "cycle"]), Some(4));
    assert_eq!(code(&["validate", "--no-such-flag"]), Some(2));

    let cycle = sandbox.run(&["validate", "-p", "cycle"]);
    let stderr = String::from_utf8_lossy(&cycle.stderr);
    assert!(stderr.contains("A -> B -> A"), "stderr was: {}", stderr);
}

#[test]
fn test_cycle_never_reaches_the_command() {
    // --- Setup ---
    let sandbox = Sandbox::new();
    sandbox.profile(json!({
        "name": "x",
        "variables": [ { "key": "A", "value": "${B}" }, { "key": "B", "value": "${A}" } ]
    }));
    let marker = sandbox.path().join("ran");

    // --- Execute ---
    let output = sandbox.run(&[
        "-p",
        "x",
        "--",
        "/usr/bin/touch",
        marker.to_str().expect("utf-8 path"),
    ]);

    // --- Assert ---
    assert_eq!(output.status.code(), Some(4));
    assert!(!marker.exists());
}

#[test]
fn test_lock_then_diff_detects_drift() {
    // --- Setup ---
    let sandbox = Sandbox::new();
    base_and_prod(&sandbox);

    // --- Execute ---
    let lock = sandbox.run(&["lock", "-p", "prod"]);
    let clean = sandbox.run(&["diff", "-p", "prod"]);
    sandbox.profile(json!({
        "name": "prod",
        "extends": ["base"],
        "variables": [ { "key": "DB_HOST", "value": "db.staging" } ]
    }));
    let drift = sandbox.run(&["diff", "-p", "prod"]);

    // --- Assert ---
    assert!(lock.status.success());
    let lock_path = sandbox.path().join("envlock.lock.json");
    let snapshot: Value =
        serde_json::from_str(&fs::read_to_string(&lock_path).expect("lock written")).expect("json");
    assert_eq!(snapshot["version"], 1);
    assert_eq!(snapshot["entries"].as_array().map(Vec::len), Some(3));

    assert_eq!(clean.status.code(), Some(0));
    assert_eq!(drift.status.code(), Some(8));
    assert!(stdout(&drift).contains("~ DB_HOST=db.prod -> db.staging"));
}

#[test]
fn test_lock_refuses_to_overwrite_without_a_terminal() {
    // --- Setup ---
    let sandbox = Sandbox::new();
    base_and_prod(&sandbox);
    let lock_path: PathBuf = sandbox.path().join("team.lock.json");
    let lock_arg = lock_path.to_str().expect("utf-8 path");
    assert!(sandbox.run(&["lock", "-p", "base", "-o", lock_arg]).status.success());
    let before = fs::read_to_string(&lock_path).expect("lock written");

    // --- Execute ---
    let refused = sandbox.run(&["lock", "-p", "prod", "-o", lock_arg]);
    let after_refusal = fs::read_to_string(&lock_path).expect("lock still there");
    let forced = sandbox.run(&["lock", "-p", "prod", "-o", lock_arg, "--yes"]);

    // --- Assert ---
    assert_eq!(refused.status.code(), Some(1));
    assert_eq!(before, after_refusal);
    assert!(forced.status.success());
    assert_ne!(before, fs::read_to_string(&lock_path).expect("lock rewritten"));
}

#[test]
fn test_list_marks_invalid_profiles() {
    let sandbox = Sandbox::new();
    base_and_prod(&sandbox);
    fs::write(sandbox.path().join("profiles").join("broken.json"), "[]").expect("write");

    let output = sandbox.run(&["ls"]);

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("base"));
    assert!(text.contains("extends base"));
    assert!(text.contains("invalid:"));
}

#[test]
fn test_validate_all_reports_the_first_failure() {
    let sandbox = Sandbox::new();
    base_and_prod(&sandbox);
    sandbox.profile(json!({ "name": "loop", "extends": ["loop"] }));

    let output = sandbox.run(&["validate", "--all"]);

    assert_eq!(output.status.code(), Some(4));
    assert!(stdout(&output).contains("3 profile(s) checked, 1 invalid."));
}

#[cfg(unix)]
mod signals {
    use super::*;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{Child, ExitStatus};
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for(path: &Path) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if path.exists() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    fn wait_with_deadline(child: &mut Child) -> Option<ExitStatus> {
        let deadline = Instant::now() + Duration::from_secs(20);
        while Instant::now() < deadline {
            if let Ok(Some(status)) = child.try_wait() {
                return Some(status);
            }
            thread::sleep(Duration::from_millis(20));
        }
        let _ = child.kill();
        None
    }

    #[test]
    fn test_sigterm_is_forwarded_to_the_child() {
        // --- Setup ---
        let sandbox = Sandbox::new();
        base_and_prod(&sandbox);
        let ready = sandbox.path().join("ready");
        let trapped = sandbox.path().join("trapped");
        let script = "trap 'echo \"$GREETING\" > \"$TRAPPED\"; exit 0' TERM; \
                      touch \"$READY\"; while true; do sleep 0.05; done";

        let mut child = sandbox
            .command(&["-p", "base", "--", "/bin/sh", "-c", script])
            .env("READY", &ready)
            .env("TRAPPED", &trapped)
            .spawn()
            .expect("envlock starts");
        assert!(wait_for(&ready), "child never became ready");

        // --- Execute ---
        let pid = Pid::from_raw(i32::try_from(child.id()).expect("pid fits"));
        kill(pid, Signal::SIGTERM).expect("signal sent");
        let status = wait_with_deadline(&mut child).expect("envlock exits");

        // --- Assert ---
        assert_eq!(status.code(), Some(0));
        let written = fs::read_to_string(&trapped).expect("trap ran");
        assert_eq!(written.trim(), "hello");
    }

    #[test]
    fn test_child_signal_death_is_reproduced() {
        // --- Setup ---
        let sandbox = Sandbox::new();
        base_and_prod(&sandbox);

        // --- Execute ---
        let mut child = sandbox
            .command(&["-p", "base", "--", "/bin/sh", "-c", "kill -TERM $$"])
            .spawn()
            .expect("envlock starts");
        let status = wait_with_deadline(&mut child).expect("envlock exits");

        // --- Assert ---
        assert_eq!(status.signal(), Some(15));
    }

    #[test]
    fn test_sigterm_stops_a_child_without_a_trap() {
        // --- Setup ---
        let sandbox = Sandbox::new();
        base_and_prod(&sandbox);
        let ready = sandbox.path().join("ready");
        let mut child = sandbox
            .command(&[
                "-p",
                "base",
                "--",
                "/bin/sh",
                "-c",
                "touch \"$READY\"; exec sleep 30",
            ])
            .env("READY", &ready)
            .spawn()
            .expect("envlock starts");
        assert!(wait_for(&ready), "child never became ready");
        let started = Instant::now();

        // --- Execute ---
        let pid = Pid::from_raw(i32::try_from(child.id()).expect("pid fits"));
        kill(pid, Signal::SIGTERM).expect("signal sent");
        let status = wait_with_deadline(&mut child).expect("envlock exits");

        // --- Assert ---
        assert!(started.elapsed() < Duration::from_secs(10), "child outlived the signal");
        assert_eq!(status.signal(), Some(15));
    }

    #[test]
    fn test_child_sigpipe_death_is_reproduced() {
        // --- Setup ---
        let sandbox = Sandbox::new();
        base_and_prod(&sandbox);

        // --- Execute ---
        let mut child = sandbox
            .command(&["-p", "base", "--", "/bin/sh", "-c", "kill -PIPE $$"])
            .spawn()
            .expect("envlock starts");
        let status = wait_with_deadline(&mut child).expect("envlock exits");

        // --- Assert ---
        assert_eq!(status.signal(), Some(13));
    }
}
