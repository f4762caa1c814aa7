use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

fn asc_bin() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_asc") {
        return PathBuf::from(path);
    }

    let mut exe = std::env::current_exe().expect("test executable path should be known");
    exe.pop();
    if exe.file_name().and_then(|name| name.to_str()) == Some("deps") {
        exe.pop();
    }
    exe.join("asc")
}

fn run_with_stdin(args: &[&str], input: &str) -> (i32, String, String) {
    let mut child = Command::new(asc_bin())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("asc should spawn");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(input.as_bytes())
        .expect("stdin write should succeed");
    let output = child.wait_with_output().expect("asc should run");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

const GRAPH: &str = r#"{
    "add3": {"t": "f", "p": ["a"], "b": {
        "=": {"t": "c", "f": "+", "a": ["a", "_three"]},
        "_three": {"t": "n", "v": 3}
    }},
    "one": {"t": "n", "v": 1},
    "call": {"t": "c", "f": "add3", "a": ["one"]}
}"#;

#[test]
fn evaluate_prints_each_top_level_id() {
    let (code, stdout, _stderr) = run_with_stdin(&[], GRAPH);
    assert_eq!(code, 0);
    assert!(stdout.contains("call -> 4"), "stdout was: {stdout}");
    assert!(stdout.contains("one -> 1"), "stdout was: {stdout}");
    assert!(stdout.contains("add3 -> <fn/1>"), "stdout was: {stdout}");
}

#[test]
fn analyze_prints_signatures_and_usage() {
    let (code, stdout, _stderr) = run_with_stdin(&["analyze"], GRAPH);
    assert_eq!(code, 0);
    assert!(stdout.contains("call :: number"), "stdout was: {stdout}");
    assert!(stdout.contains("one :: number"), "stdout was: {stdout}");
    assert!(stdout.contains("stdlib: +"), "stdout was: {stdout}");
}

#[test]
fn malformed_json_exits_nonzero() {
    let (code, _stdout, stderr) = run_with_stdin(&[], "{not json");
    assert_ne!(code, 0);
    assert!(stderr.contains("failed to parse JSON"), "stderr was: {stderr}");
}

#[test]
fn unknown_tags_exit_nonzero() {
    let (code, _stdout, stderr) = run_with_stdin(&[], r#"{"x": {"t": "q"}}"#);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown definition tag"), "stderr was: {stderr}");
}
