use crate::cli::{EngineArgs, ParamsArgs};
use crate::support::{
    engine_error_exit, engine_or_exit, params_or_exit, print_issues, print_json_or_exit,
};
use millkit_kernel::BenchmarkOutcome;

/// Exits 0 whenever the run was attempted; the outcome is data, not a failure.
pub fn run(id: String, params_args: ParamsArgs, engine_args: EngineArgs, json_output: bool) {
    let engine = engine_or_exit(&engine_args);
    let params = params_or_exit(&engine, &id, &params_args);
    let response = engine
        .benchmark(&id, &params)
        .unwrap_or_else(|err| engine_error_exit(err, json_output));

    if json_output {
        print_json_or_exit(&response, "benchmark");
        return;
    }

    println!("millkit benchmark {}", response.algorithm_id);
    println!("  Algorithm: {}", response.algorithm_name);
    println!(
        "  Gate verdict: {}",
        if response.validation.valid {
            "valid"
        } else {
            "invalid"
        }
    );
    print_issues(&response.validation.issues);
    match &response.outcome {
        BenchmarkOutcome::Completed { result } => {
            println!("  Outcome: completed");
            println!("  Warnings: {}", result.warnings.len());
        }
        BenchmarkOutcome::Failed { error } => {
            println!("  Outcome: failed ({})", error.kind());
            println!("  Error: {error}");
        }
    }
    println!("  Execution time: {:.3} ms", response.execution_time_ms);
}
