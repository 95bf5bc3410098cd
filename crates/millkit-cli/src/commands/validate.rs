use crate::cli::{EngineArgs, ParamsArgs};
use crate::support::{
    engine_error_exit, engine_or_exit, params_or_exit, print_issues, print_json_or_exit,
};

pub fn run(id: String, params_args: ParamsArgs, engine_args: EngineArgs, json_output: bool) {
    let engine = engine_or_exit(&engine_args);
    let params = params_or_exit(&engine, &id, &params_args);
    let response = engine
        .validate(&id, &params)
        .unwrap_or_else(|err| engine_error_exit(err, json_output));

    if json_output {
        print_json_or_exit(&response, "validate");
    } else {
        println!("millkit validate {}", response.algorithm_id);
        println!("  Algorithm: {}", response.algorithm_name);
        println!(
            "  Result: {}",
            if response.validation.valid {
                "valid"
            } else {
                "invalid"
            }
        );
        println!("  Issues: {}", response.validation.issues.len());
        print_issues(&response.validation.issues);
    }

    if !response.validation.valid {
        std::process::exit(1);
    }
}
