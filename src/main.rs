use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lanlease::{Config, DhcpServer, Result};

#[derive(Parser)]
#[command(name = "lanlease")]
#[command(author, version, about = "A minimal DHCP server for a single network segment", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = Config::load_or_create(&cli.config).await?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("starting DHCP server with config: {:?}", cli.config);
            let mut server = DhcpServer::new(config).await?;

            tokio::select! {
                result = server.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("received shutdown signal, stopping server");
                    Ok(())
                }
            }
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
