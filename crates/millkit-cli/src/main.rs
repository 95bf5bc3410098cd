//! Millkit CLI: the `millkit` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    support::init_tracing();

    match cli.command {
        Commands::List { json, engine } => commands::list::run(engine, json),

        Commands::Describe { id, json, engine } => commands::describe::run(id, engine, json),

        Commands::Validate {
            id,
            params,
            json,
            engine,
        } => commands::validate::run(id, params, engine, json),

        Commands::Calculate {
            id,
            params,
            json,
            engine,
        } => commands::calculate::run(id, params, engine, json),

        Commands::Benchmark {
            id,
            params,
            json,
            engine,
        } => commands::benchmark::run(id, params, engine, json),

        Commands::Dispatch {
            request,
            request_file,
            engine,
        } => commands::dispatch::run(request, request_file, engine),

        Commands::RegistryCheck { json } => commands::registry_check::run(json),
    }
}
