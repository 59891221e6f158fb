use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod config;
mod node;

use cli::{Cli, Commands};
use config::{generate_sample_config, NodeConfig};
use node::MembershipNode;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            start_block,
        } => {
            run_node(config, start_block).await?;
        }
        Commands::Init { output, sealers } => {
            init_config(output, sealers)?;
        }
        Commands::Keygen { output } => {
            generate_keypair(output)?;
        }
        Commands::Plan {
            config,
            from,
            to,
            view,
        } => {
            print_plan(config, from, to, view)?;
        }
    }

    Ok(())
}

fn load_config(config_path: &PathBuf) -> Result<NodeConfig> {
    info!("Loading configuration from {:?}", config_path);
    if !config_path.exists() {
        error!(
            "Configuration file not found: {:?}. Run 'tessera init' to create one.",
            config_path
        );
        return Err(anyhow::anyhow!("Configuration file not found"));
    }
    NodeConfig::load(config_path)
}

/// Run the membership scheduler until interrupted
async fn run_node(config_path: PathBuf, start_block: u64) -> Result<()> {
    let config = load_config(&config_path)?;
    let node = MembershipNode::from_config(&config, start_block)?;
    info!("Local node {}", node.local().abridged());

    let block_time = Duration::from_millis(config.block_time_ms);
    tokio::select! {
        result = node.drive(block_time, start_block, None) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

/// Initialize a new configuration file
fn init_config(output: PathBuf, sealers: usize) -> Result<()> {
    info!("Generating sample configuration with {} sealers", sealers);

    let config = generate_sample_config(sealers);
    config.save(&output)?;

    info!("Configuration saved to {:?}", output);

    println!("\nConfiguration file created: {}", output.display());
    println!("Edit the file to customize your node settings.");
    println!("\nTo start the node, run:");
    println!("  tessera run --config {}", output.display());

    Ok(())
}

/// Generate a new node key
fn generate_keypair(output: Option<PathBuf>) -> Result<()> {
    let keypair = tessera_core::KeyPair::generate();

    println!("Generated new node key:");
    println!("  Node id:     {}", keypair.id.to_hex());
    println!("  Secret key:  {}", keypair.secret.to_hex());

    if let Some(path) = output {
        std::fs::write(&path, keypair.secret.to_hex())?;
        info!("Secret key saved to {:?}", path);
    }

    println!("\nWARNING: Keep your secret key safe! Do not share it with anyone.");

    Ok(())
}

#[derive(Serialize)]
struct PlanEntry {
    block: u64,
    round: u64,
    role: String,
    leader: Option<String>,
    committee: Vec<String>,
    quorum: usize,
}

/// Print the committee schedule over `from..=to` as seen by this node
fn print_plan(config_path: PathBuf, from: u64, to: u64, view: u64) -> Result<()> {
    let config = load_config(&config_path)?;
    let node = MembershipNode::from_config(&config, from)?;

    let mut entries = Vec::new();
    for block in from..=to {
        if block > from {
            node.on_new_block(block, view)?;
        }
        let summary = node.summary(block, view);
        entries.push(PlanEntry {
            block,
            round: summary.round,
            role: format!("{:?}", summary.role),
            leader: summary.leader.map(|l| l.abridged()),
            committee: summary.committee.iter().map(|m| m.abridged()).collect(),
            quorum: summary.quorum_size,
        });
    }

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
