use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// millkit: manufacturing and numeric algorithms behind one calling convention
#[derive(Parser)]
#[command(name = "millkit", about, version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Engine settings shared by every engine-backed command.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Engine config file (TOML, `[engine]` table)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Where the parameter object comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct ParamsArgs {
    /// Parameters as an inline JSON object
    #[arg(long, conflicts_with_all = ["params_file", "example"])]
    pub params: Option<String>,

    /// Read parameters from a JSON file
    #[arg(long, conflicts_with = "example")]
    pub params_file: Option<PathBuf>,

    /// Use the algorithm's bundled example parameters
    #[arg(long)]
    pub example: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered algorithms
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Show an algorithm's metadata and example parameters
    Describe {
        /// Algorithm id
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Check parameters without running the computation
    Validate {
        /// Algorithm id
        id: String,

        #[command(flatten)]
        params: ParamsArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Validate parameters, then run the computation
    Calculate {
        /// Algorithm id
        id: String,

        #[command(flatten)]
        params: ParamsArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Run the computation without the validation gate
    Benchmark {
        /// Algorithm id
        id: String,

        #[command(flatten)]
        params: ParamsArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Dispatch one transport request ({action, payload}) and print the response
    Dispatch {
        /// Request JSON (reads stdin when omitted)
        #[arg(long)]
        request: Option<String>,

        /// Read the request from a file
        #[arg(long, conflicts_with = "request")]
        request_file: Option<PathBuf>,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Check the shipped catalogue for registration defects
    RegistryCheck {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
