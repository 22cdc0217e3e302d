//! Node Agent
//!
//! Runs protocol inbounds described by a remote panel and keeps them in
//! sync through hot reloads.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGINT/SIGTERM ──┐
//!   config watcher ──┼──▶ signal multiplexer ──▶ reload coordinator
//!   engine request ──┘        (depth-1 queue)          │
//!                                                      ├──▶ config loader
//!                                                      ├──▶ panel client
//!                                                      ├──▶ engine handle
//!                                                      └──▶ controller registry
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use node_agent::lifecycle::startup::run_server;

const CODENAME: &str = "node-agent";
const INTRO: &str = "A panel-driven proxy node agent";

#[derive(Parser)]
#[command(name = "node-agent")]
#[command(about = "Panel-driven proxy node agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run node server
    Server {
        /// Config file path
        #[arg(short, long, default_value = "/etc/node-agent/config.toml")]
        config: PathBuf,

        /// Watch the config file and reload on change
        #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
        watch: bool,
    },
    /// Print version info
    Version,
}

fn show_version() {
    println!("{} {} ({})", CODENAME, env!("CARGO_PKG_VERSION"), INTRO);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => show_version(),
        Commands::Server { config, watch } => {
            show_version();
            run_server(&config, watch).await?;
        }
    }

    Ok(())
}
