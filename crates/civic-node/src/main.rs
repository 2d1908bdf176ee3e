use anyhow::{bail, Context, Result};
use civic_node::clients::{LoggingPenalty, LoggingSettlement, LoggingSink, StoreHistory};
use civic_node::config::NodeConfig;
use civic_node::logging::init_logging;
use civic_node::service::AdjudicationService;
use civic_storage::{AdjudicationStore, MemoryBackend};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "civic-node")]
#[command(about = "Civic claim adjudication node", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the adjudication service
    Start {
        /// Data directory for storage
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Sweep interval in seconds
        #[arg(long)]
        sweep_interval: Option<u64>,
    },

    /// Write a default configuration file
    Init {
        /// Output directory for the configuration
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

fn open_store(config: &NodeConfig) -> Result<Arc<dyn AdjudicationStore>> {
    match config.storage.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryBackend::new())),
        #[cfg(feature = "rocksdb")]
        "rocksdb" => {
            let path = config.node.data_dir.join("adjudication");
            Ok(Arc::new(civic_storage::RocksBackend::new(&path)?))
        }
        other => bail!("unsupported storage backend: {}", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Init { output } => {
            let path = output.join("civic-config.toml");
            NodeConfig::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Commands::Start {
            data_dir,
            sweep_interval,
        } => {
            if let Some(dir) = data_dir {
                config.node.data_dir = dir;
            }
            if let Some(secs) = sweep_interval {
                config.adjudication.sweep_interval_secs = secs;
            }
            init_logging(&config.logging, cli.verbose)?;

            info!(
                name = %config.node.name,
                backend = %config.storage.backend,
                "🚀 Starting adjudication node"
            );

            let store = open_store(&config)?;
            let service = Arc::new(AdjudicationService::new(
                store.clone(),
                Arc::new(LoggingSettlement),
                Arc::new(LoggingPenalty),
                Arc::new(LoggingSink),
                Arc::new(StoreHistory::new(store)),
                &config.adjudication,
            ));

            let sweeper = service.run_sweeper(Duration::from_secs(
                config.adjudication.sweep_interval_secs,
            ));

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            sweeper.abort();
            Ok(())
        }
    }
}
