//! udtf-bridge - Plan-time table function analysis
//!
//! Asks a pooled worker process for the output schema of a table function.

mod input;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use udtf_worker::{AnalyzeError, Analyzer, AnalyzerConfig, ProcessWorkerPool, SideChannelCounter};

#[derive(Parser)]
#[command(name = "udtf-bridge")]
#[command(about = "Plan-time schema analysis for table functions")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, global = true, env = "UDTF_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one call and print the output schema
    Analyze {
        /// Function handle description (JSON)
        #[arg(short, long)]
        function: PathBuf,

        /// Argument descriptions (JSON array)
        #[arg(short, long)]
        args: PathBuf,
    },

    /// Print or write the effective configuration
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AnalyzerConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }

    match cli.command {
        Commands::Analyze { function, args } => {
            let counter = SideChannelCounter::shared();
            let handle = input::FunctionFile::load(&function)?.with_accumulator(counter.clone());
            let (exprs, table_args) = input::load_arguments(&args)?;

            tracing::info!(
                "Analyzing {} with {} argument(s)",
                handle.executable().display(),
                exprs.len()
            );

            let pool = Arc::new(ProcessWorkerPool::new(config.pool.clone()));
            let analyzer = Analyzer::new(pool.clone(), config.worker.clone());

            let result = analyzer.analyze(&handle, &exprs, &table_args);
            pool.shutdown();

            if !counter.lock().is_empty() {
                tracing::info!("Worker counters: {:?}", counter.lock().values());
            }

            match result {
                Ok(schema) => {
                    println!("{}", schema.json());
                    Ok(())
                }
                Err(AnalyzeError::AnalysisFailed { message }) => {
                    tracing::error!("Table function analysis failed");
                    Err(message.into())
                }
                Err(e) => {
                    tracing::error!("Analysis error: {}", e);
                    Err(e.into())
                }
            }
        }
        Commands::Config { output } => {
            match output {
                Some(path) => {
                    config.save(&path)?;
                    tracing::info!("Wrote config to {}", path.display());
                }
                None => print!("{}", config.to_yaml()?),
            }
            Ok(())
        }
    }
}
