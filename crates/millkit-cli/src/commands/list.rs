use crate::cli::EngineArgs;
use crate::support::{engine_or_exit, print_json_or_exit};
use millkit_kernel::SafetyClass;
use millkit_transport::list_payload;

pub fn run(engine_args: EngineArgs, json_output: bool) {
    let engine = engine_or_exit(&engine_args);
    let algorithms = list_payload(&engine);

    if json_output {
        print_json_or_exit(&serde_json::json!({ "algorithms": algorithms }), "list");
        return;
    }

    println!("millkit list");
    println!("  Algorithms: {}", algorithms.len());
    let width = algorithms.iter().map(|a| a.id.len()).max().unwrap_or(0);
    for algorithm in &algorithms {
        let marker = match algorithm.safety_class {
            SafetyClass::SafetyCritical => " [safety-critical]",
            SafetyClass::Standard => "",
        };
        println!(
            "  {:<width$}  {:<22} {}{marker}",
            algorithm.id,
            algorithm.domain.as_str(),
            algorithm.name,
        );
    }
}
