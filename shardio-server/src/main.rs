mod client;
mod config;
mod server;

use clap::{Parser, Subcommand};
use config::{IngressConfig, NodeConfig};
use server::{run_ingress, run_node};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "shardio")]
#[command(about = "Sharded file store: ingress, storage nodes and client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingress that accepts uploads and tracks fragment placement
    Ingress {
        /// Path to configuration file
        #[arg(short, long, default_value = "ingress.yaml")]
        config: String,
    },
    /// Run a storage node and register it with the ingress
    Node {
        /// Path to configuration file
        #[arg(short, long, default_value = "node.yaml")]
        config: String,
    },
    /// Upload a local file; it is stored under its base name
    Upload {
        #[arg(long)]
        src: PathBuf,

        #[arg(long = "api-server", default_value = "127.0.0.1:8000")]
        api_server: String,
    },
    /// Download a stored file to a local path
    Download {
        /// Name the file was uploaded under
        #[arg(long)]
        src: String,

        #[arg(long)]
        dst: PathBuf,

        #[arg(long = "api-server", default_value = "127.0.0.1:8000")]
        api_server: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shardio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingress { config } => {
            tracing::info!("Starting Shardio ingress with config: {}", config);

            let cfg = match IngressConfig::from_file(&config) {
                Ok(c) => c,
                Err(error) => {
                    tracing::error!("Failed to load config: {}", error);
                    std::process::exit(1);
                }
            };

            if let Err(error) = run_ingress(cfg).await {
                tracing::error!("Ingress error: {}", error);
                std::process::exit(1);
            }
        }
        Commands::Node { config } => {
            tracing::info!("Starting Shardio node with config: {}", config);

            let cfg = match NodeConfig::from_file(&config) {
                Ok(c) => c,
                Err(error) => {
                    tracing::error!("Failed to load config: {}", error);
                    std::process::exit(1);
                }
            };

            if let Err(error) = run_node(cfg).await {
                tracing::error!("Node error: {}", error);
                std::process::exit(1);
            }
        }
        Commands::Upload { src, api_server } => {
            match client::upload_file(&src, &api_server, client::DEFAULT_FRAME_SIZE).await {
                Ok(reply) if reply.is_complete() => {}
                Ok(reply) => {
                    tracing::error!(
                        "Upload of {} ended as {}: {}",
                        reply.filename,
                        reply.status,
                        reply.error.unwrap_or_default()
                    );
                    std::process::exit(1);
                }
                Err(error) => {
                    tracing::error!("Upload failed: {}", error);
                    std::process::exit(1);
                }
            }
        }
        Commands::Download {
            src,
            dst,
            api_server,
        } => {
            if let Err(error) = client::download_file(&src, &dst, &api_server).await {
                tracing::error!("Download failed: {}", error);
                std::process::exit(1);
            }
        }
    }
}
