use crate::support::print_json_or_exit;
use millkit_transport::default_registry_check;

pub fn run(json_output: bool) {
    let report = default_registry_check();

    if json_output {
        print_json_or_exit(&report, "registry-check");
    } else {
        println!("millkit registry-check");
        println!("  Check kind: {}", report.check_kind);
        println!("  Result: {}", report.result);
        println!("  Algorithms: {}", report.algorithm_count);
        println!("  Issues: {}", report.issues.len());
        for issue in &report.issues {
            println!("    [{}] {}: {}", issue.failure_class, issue.path, issue.message);
        }
        println!("  Semantic digest: {}", report.semantic_digest);
    }

    if !report.accepted() {
        std::process::exit(1);
    }
}
