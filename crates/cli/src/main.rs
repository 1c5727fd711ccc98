//! `codeplan`: plan code entities, check plans and print generation orders.
//!
//! ```bash
//! # Generation order of a plan on disk
//! codeplan order --steps plan.yaml --edges usage.json
//!
//! # Graph for an external renderer
//! codeplan describe --steps plan.yaml --edges usage.json --format dot | dot -Tsvg
//!
//! # Ask the model for a plan
//! codeplan plan --config llm.json --prompts prompts/code_planner.yaml \
//!     --requirement "a command line calculator"
//! ```

mod command;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "codeplan", version, about = "Plan code entities and the order to generate them in")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DescribeFormat {
    Text,
    Json,
    Dot,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the graph from plan files and print the generation order
    Order {
        /// YAML list of plan steps
        #[arg(long)]
        steps: PathBuf,

        /// JSON usage-edge declaration
        #[arg(long)]
        edges: PathBuf,

        /// Print JSON instead of a numbered list
        #[arg(long)]
        json: bool,
    },

    /// Print the node/arc description of the graph
    Describe {
        #[arg(long)]
        steps: PathBuf,

        #[arg(long)]
        edges: PathBuf,

        #[arg(long, value_enum, default_value = "text")]
        format: DescribeFormat,
    },

    /// Check every line of a step file against the step grammar
    Check {
        #[arg(long)]
        steps: PathBuf,
    },

    /// Ask the model for a plan and print its generation order
    Plan {
        /// LLM config file (JSON or YAML)
        #[arg(long)]
        config: PathBuf,

        /// Prompt book of the planner
        #[arg(long)]
        prompts: PathBuf,

        #[arg(long)]
        requirement: String,

        #[arg(long)]
        json: bool,
    },

    /// Plan interactively; `@Entity <requirement>` details an existing entity
    Chat {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        prompts: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();

    let result = match cli.command {
        Commands::Order { steps, edges, json } => command::order(&steps, &edges, json),
        Commands::Describe {
            steps,
            edges,
            format,
        } => command::describe(&steps, &edges, format),
        Commands::Check { steps } => command::check(&steps),
        Commands::Plan {
            config,
            prompts,
            requirement,
            json,
        } => command::plan(&config, &prompts, &requirement, json).await,
        Commands::Chat { config, prompts } => command::chat(&config, &prompts).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
