use crate::cli::{EngineArgs, ParamsArgs};
use millkit_kernel::{Engine, EngineConfig, EngineError, Severity, ValidationIssue};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "MILLKIT_LOG";

/// Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn engine_or_exit(args: &EngineArgs) -> Engine {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            std::process::exit(2);
        }),
        None => EngineConfig::default(),
    };
    let registry = millkit_algorithms::default_registry().unwrap_or_else(|e| {
        eprintln!("error: failed to build algorithm registry: {e}");
        std::process::exit(2);
    });
    tracing::debug!(algorithms = registry.len(), "registry ready");
    Engine::with_config(Arc::new(registry), config)
}

/// Resolve the parameter object; with no source given, `{}` is used.
pub fn params_or_exit(engine: &Engine, id: &str, args: &ParamsArgs) -> Value {
    if args.example {
        return match engine.registry().lookup(id.trim()) {
            Some(algorithm) => algorithm.example(),
            None => {
                eprintln!("error: unknown algorithm: {}", id.trim());
                std::process::exit(1);
            }
        };
    }
    if let Some(inline) = &args.params {
        return parse_json_or_exit(inline, "--params");
    }
    if let Some(path) = &args.params_file {
        let source = read_file_or_exit(path);
        return parse_json_or_exit(&source, &path.display().to_string());
    }
    Value::Object(Default::default())
}

pub fn read_file_or_exit(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: failed to read {}: {e}", path.display());
        std::process::exit(2);
    })
}

pub fn read_stdin_or_exit() -> String {
    let mut buffer = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut buffer) {
        eprintln!("error: failed to read stdin: {e}");
        std::process::exit(2);
    }
    buffer
}

fn parse_json_or_exit(source: &str, origin: &str) -> Value {
    serde_json::from_str(source).unwrap_or_else(|e| {
        eprintln!("error: {origin} is not valid JSON: {e}");
        std::process::exit(2);
    })
}

pub fn print_json_or_exit<T: Serialize>(value: &T, what: &str) {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|err| {
        eprintln!("error: failed to render {what} payload: {err}");
        std::process::exit(2);
    });
    println!("{rendered}");
}

pub fn print_issues(issues: &[ValidationIssue]) {
    for issue in issues {
        let severity = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        println!("    [{severity}] {}: {}", issue.field, issue.message);
    }
}

/// Report an engine rejection and exit 1.
pub fn engine_error_exit(err: EngineError, json_output: bool) -> ! {
    if json_output {
        print_json_or_exit(&err.to_envelope(), "error");
    } else {
        eprintln!("error: {err}");
        if let EngineError::Validation { issues, .. } = &err {
            for issue in issues {
                eprintln!("  {}: {}", issue.field, issue.message);
            }
        }
    }
    std::process::exit(1);
}
