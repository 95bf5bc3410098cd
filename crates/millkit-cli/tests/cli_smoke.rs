use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "millkit-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_millkit<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_millkit"))
        .args(args)
        .output()
        .expect("millkit command should execute")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected valid JSON stdout, got error: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn list_json_covers_the_catalogue() {
    let output = run_millkit(["list", "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    let algorithms = payload["algorithms"].as_array().expect("algorithms array");
    assert_eq!(algorithms.len(), 26);
    assert!(
        algorithms
            .iter()
            .any(|a| a["id"] == "fea_2d" && a["safety_class"] == "safety_critical")
    );
}

#[test]
fn list_human_output_has_a_header() {
    let output = run_millkit(["list"]);
    assert_success(&output);
    let text = stdout_text(&output);
    assert!(text.starts_with("millkit list\n"));
    assert!(text.contains("Algorithms: 26"));
    assert!(text.contains("kmeans"));
}

#[test]
fn describe_json_includes_the_example() {
    let output = run_millkit(["describe", "taylor_tool_life", "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["id"], "taylor_tool_life");
    assert!(payload["example"].is_object());
    assert!(payload["inputs"].as_array().is_some_and(|a| !a.is_empty()));
}

#[test]
fn describe_unknown_id_exits_one() {
    let output = run_millkit(["describe", "warp_drive", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["error"]["kind"], "unknown_algorithm");
}

#[test]
fn validate_reports_missing_fields() {
    let output = run_millkit(["validate", "taylor_tool_life", "--params", "{}", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["validation"]["valid"], false);
    assert_eq!(payload["validation"]["issues"].as_array().map(Vec::len), Some(3));
}

#[test]
fn calculate_example_succeeds() {
    let output = run_millkit(["calculate", "fft", "--example", "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["algorithm_id"], "fft");
    assert!(payload["result"]["warnings"].is_array());
    assert!(payload["execution_time_ms"].as_f64().is_some());
}

#[test]
fn calculate_reads_params_from_a_file() {
    let temp = TempDirGuard::new("params-file");
    let path = temp.path().join("params.json");
    fs::write(
        &path,
        json!({"cutting_speed": 200.0, "taylor_n": 0.25, "taylor_c": 400.0}).to_string(),
    )
    .expect("params should be written");

    let output = run_millkit([
        "calculate",
        "taylor_tool_life",
        "--params-file",
        path.to_str().expect("utf-8 temp path"),
        "--json",
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    let life = payload["result"]["tool_life_min"].as_f64().expect("tool life");
    assert!((life - 16.0).abs() < 1e-9, "{life}");
}

#[test]
fn calculate_rejects_invalid_params_with_exit_one() {
    let output = run_millkit(["calculate", "kmeans", "--params", r#"{"data": [[1.0]], "k": 3}"#]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("validation failed"), "{stderr}");
}

#[test]
fn malformed_params_json_is_a_usage_error() {
    let output = run_millkit(["validate", "fft", "--params", "{not json"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn benchmark_reports_failure_as_data() {
    let output = run_millkit([
        "benchmark",
        "kmeans",
        "--params",
        r#"{"data": [[0.0], [1.0]], "k": 5}"#,
        "--json",
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["validation"]["valid"], false);
    assert_eq!(payload["outcome"]["status"], "failed");
}

#[test]
fn config_can_disable_benchmark() {
    let temp = TempDirGuard::new("config");
    let path = temp.path().join("millkit.toml");
    fs::write(&path, "[engine]\nbenchmark_enabled = false\n").expect("config should be written");

    let output = run_millkit([
        "benchmark",
        "fft",
        "--example",
        "--json",
        "--config",
        path.to_str().expect("utf-8 temp path"),
    ]);
    assert_eq!(output.status.code(), Some(1));
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["error"]["kind"], "benchmark_disabled");
}

#[test]
fn missing_config_file_is_a_usage_error() {
    let output = run_millkit(["list", "--config", "/nonexistent/millkit.toml"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn dispatch_reads_request_from_stdin() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_millkit"))
        .arg("dispatch")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("millkit should spawn");
    child
        .stdin
        .take()
        .expect("stdin piped")
        .write_all(br#"{"action": "describe", "payload": {"algorithm_id": "kmeans"}}"#)
        .expect("request should be written");
    let output = child.wait_with_output().expect("millkit should finish");
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["result"], "accepted");
    assert_eq!(payload["payload"]["id"], "kmeans");
}

#[test]
fn dispatch_unknown_action_exits_one() {
    let output = run_millkit(["dispatch", "--request", r#"{"action": "teleport"}"#]);
    assert_eq!(output.status.code(), Some(1));
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["result"], "rejected");
}

#[test]
fn registry_check_accepts_the_shipped_catalogue() {
    let output = run_millkit(["registry-check", "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["result"], "accepted");
    assert_eq!(payload["algorithmCount"], 26);
    assert!(
        payload["semanticDigest"]
            .as_str()
            .is_some_and(|d| d.starts_with("mk1_"))
    );
}
