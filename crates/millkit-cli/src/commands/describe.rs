use crate::cli::EngineArgs;
use crate::support::{engine_error_exit, engine_or_exit, print_json_or_exit};
use millkit_kernel::FieldSpec;
use millkit_transport::describe_payload;

pub fn run(id: String, engine_args: EngineArgs, json_output: bool) {
    let engine = engine_or_exit(&engine_args);
    let description =
        describe_payload(&engine, &id).unwrap_or_else(|err| engine_error_exit(err, json_output));

    if json_output {
        print_json_or_exit(&description, "describe");
        return;
    }

    let meta = description.meta;
    println!("millkit describe {}", meta.id);
    println!("  Name: {}", meta.name);
    println!("  Domain: {}", meta.domain.as_str());
    println!("  Safety class: {:?}", meta.safety_class);
    println!("  Formula: {}", meta.formula);
    println!("  Reference: {}", meta.reference);
    println!("  {}", meta.description);
    println!("  Inputs:");
    print_fields(meta.inputs, true);
    println!("  Outputs:");
    print_fields(meta.outputs, false);
}

fn print_fields(fields: &[FieldSpec], mark_optional: bool) {
    for field in fields {
        let unit = if field.unit.is_empty() {
            String::new()
        } else {
            format!(" [{}]", field.unit)
        };
        let optional = if mark_optional && !field.required {
            " (optional)"
        } else {
            ""
        };
        println!("    {}{unit}{optional}: {}", field.name, field.description);
    }
}
