use crate::cli::EngineArgs;
use crate::support::{engine_or_exit, read_file_or_exit, read_stdin_or_exit};
use millkit_transport::Transport;
use serde_json::Value;
use std::path::PathBuf;

pub fn run(request: Option<String>, request_file: Option<PathBuf>, engine_args: EngineArgs) {
    let request_json = match (request, request_file) {
        (Some(inline), _) => inline,
        (None, Some(path)) => read_file_or_exit(&path),
        (None, None) => read_stdin_or_exit(),
    };
    let transport = Transport::new(engine_or_exit(&engine_args));
    let response = transport.dispatch_json(&request_json);
    println!("{response}");

    let accepted = serde_json::from_str::<Value>(&response)
        .ok()
        .and_then(|v| v.get("result").and_then(Value::as_str).map(|r| r == "accepted"))
        .unwrap_or(false);
    if !accepted {
        std::process::exit(1);
    }
}
