//! Workmesh agent binary

use anyhow::Result;
use clap::Parser;
use tracing::info;
use workmesh_agent::config::LoggingConfig;
use workmesh_agent::{Agent, AgentConfig};

/// Workmesh - federated workload agent
#[derive(Parser)]
#[command(name = "workmesh-agent")]
#[command(about = "Workmesh - federated workload agent")]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML); built-in defaults apply when
    /// omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,
}

fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    if config.format == "json" {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match cli.config.as_deref() {
        Some(path) => AgentConfig::from_file(path)?,
        None => {
            let mut config = AgentConfig::default();
            config.fill_generated_fields();
            config
        }
    };
    if let Some(bind) = cli.bind {
        config.node.listen_address = bind;
    }
    if let Some(port) = cli.port {
        config.node.listen_port = port;
    }

    init_tracing(&config.logging);

    let agent = Agent::start(config).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    agent.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("workmesh-agent: {:#}", e);
        std::process::exit(1);
    }
}
