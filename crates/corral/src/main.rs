//! Corral operator CLI.
//!
//! Talks to a running coordinator over the admin HTTP API.
//!
//! Usage:
//!     corral agent:deploy parser.json
//!     corral agent:list
//!     corral node:list
//!     corral job:submit a1 input.bin
//!     corral job:list
//!     corral inspect n1
//!
//! `-h` selects the coordinator host (per the frozen CLI contract), so help
//! is long-form only: `--help`.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::client::AdminClient;

#[derive(Parser, Debug)]
#[command(
    name = "corral",
    about = "Operator CLI for the Corral coordinator",
    disable_help_flag = true
)]
struct Cli {
    /// Coordinator host
    #[arg(short = 'h', long, global = true, default_value = "localhost")]
    host: String,

    /// Coordinator admin port
    #[arg(short = 'p', long, global = true, default_value_t = 8080)]
    port: u16,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help, global = true)]
    help: Option<bool>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register an agent from a manifest file
    #[command(name = "agent:deploy", disable_help_flag = true)]
    AgentDeploy {
        /// Path to the agent manifest (JSON)
        path: PathBuf,
    },

    /// List registered agents
    #[command(name = "agent:list", disable_help_flag = true)]
    AgentList,

    /// List fleet nodes
    #[command(name = "node:list", disable_help_flag = true)]
    NodeList,

    /// Submit a job for an agent
    #[command(name = "job:submit", disable_help_flag = true)]
    JobSubmit {
        /// Target agent id
        agent_id: String,

        /// File whose bytes become the job input
        input_file: PathBuf,
    },

    /// List jobs
    #[command(name = "job:list", disable_help_flag = true)]
    JobList,

    /// Show one node in detail
    #[command(name = "inspect", disable_help_flag = true)]
    Inspect {
        /// Node id
        node_id: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("corral=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let client = AdminClient::new(&cli.host, cli.port);
    let result = match cli.command {
        Commands::AgentDeploy { path } => cli::agent::deploy(&client, &path),
        Commands::AgentList => cli::agent::list(&client),
        Commands::NodeList => cli::node::list(&client),
        Commands::JobSubmit {
            agent_id,
            input_file,
        } => cli::job::submit(&client, &agent_id, &input_file),
        Commands::JobList => cli::job::list(&client),
        Commands::Inspect { node_id } => cli::node::inspect(&client, &node_id),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
