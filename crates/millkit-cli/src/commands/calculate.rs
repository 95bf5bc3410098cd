use crate::cli::{EngineArgs, ParamsArgs};
use crate::support::{engine_error_exit, engine_or_exit, params_or_exit, print_json_or_exit};

pub fn run(id: String, params_args: ParamsArgs, engine_args: EngineArgs, json_output: bool) {
    let engine = engine_or_exit(&engine_args);
    let params = params_or_exit(&engine, &id, &params_args);
    let response = engine
        .calculate(&id, &params)
        .unwrap_or_else(|err| engine_error_exit(err, json_output));

    if json_output {
        print_json_or_exit(&response, "calculate");
        return;
    }

    println!("millkit calculate {}", response.algorithm_id);
    println!("  Algorithm: {}", response.algorithm_name);
    println!("  Execution time: {:.3} ms", response.execution_time_ms);
    println!("  Warnings: {}", response.result.warnings.len());
    for warning in &response.result.warnings {
        println!("    {warning}");
    }
    println!("  Result:");
    let rendered = serde_json::to_string_pretty(&response.result.result).unwrap_or_default();
    for line in rendered.lines() {
        println!("    {line}");
    }
}
