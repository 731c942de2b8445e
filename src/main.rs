//! # docgraph CLI
//!
//! ```bash
//! docgraph --config ./config/docgraph.toml ingest
//! docgraph ingest --root /data/km --concurrency 4 --output meta.json
//! docgraph scan --root /data/km
//! docgraph init
//! docgraph graph stats
//! ```
//!
//! Logs go to stderr (or `--log-file`), filtered by `DOCGRAPH_LOG`
//! (default `info`). Run summaries and JSON go to stdout.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docgraph::config::{self, Config, GraphBackend, OutputFormat};
use docgraph::graph::sqlite::SqliteGraph;
use docgraph::graph::GraphStore;
use docgraph::ingest;
use docgraph::progress::ProgressMode;
use docgraph::stats;

/// Concurrent document ingestion into a property graph.
///
/// Settings come from a TOML file (`--config`); `--root` alone runs with
/// defaults for everything else.
#[derive(Parser)]
#[command(name = "docgraph", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append log output to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk, extract, enrich and project every document under the root.
    Ingest {
        /// Directory to ingest; overrides `[source] root`.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Number of worker tasks.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Write aggregated metadata to this file.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Format of the metadata file.
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Skip graph projection.
        #[arg(long)]
        no_graph: bool,

        /// Progress on stderr. Defaults to `human` on a TTY, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Print the sitemap (file descriptors) as JSON without extracting.
    Scan {
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Create the SQLite graph schema. Idempotent.
    Init,

    /// Inspect the graph store.
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Node counts per label and edge counts per type.
    Stats,
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env("DOCGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Load `--config` if given, otherwise build defaults around `--root`.
fn resolve_config(path: Option<&Path>, root: Option<PathBuf>) -> Result<Config> {
    let mut config = match (path, &root) {
        (Some(path), _) => config::load_config(path)?,
        (None, Some(root)) => Config::minimal(root.clone()),
        (None, None) => bail!("either --config or --root is required"),
    };
    if let Some(root) = root {
        config.source.root = root;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Ingest {
            root,
            concurrency,
            output,
            format,
            no_graph,
            progress,
        } => {
            let mut config = resolve_config(config_path, root)?;
            if let Some(n) = concurrency {
                config.pipeline.concurrency = n;
            }
            if let Some(output) = output {
                config.output.path = Some(output);
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            if no_graph {
                config.graph.backend = GraphBackend::Disabled;
            }
            config.validate()?;

            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&config, mode.reporter()).await?;
        }
        Commands::Scan { root } => {
            let config = resolve_config(config_path, root)?;
            ingest::run_scan(&config)?;
        }
        Commands::Init => {
            let path = match config_path {
                Some(path) => config::load_config(path)?.graph.path,
                None => Config::minimal(PathBuf::from(".")).graph.path,
            };
            let store = SqliteGraph::open(&path).await?;
            store.close().await;
            println!("Graph schema ready at {}", path.display());
        }
        Commands::Graph {
            action: GraphAction::Stats,
        } => {
            let config = match config_path {
                Some(path) => config::load_config(path)?,
                None => Config::minimal(PathBuf::from(".")),
            };
            stats::run_stats(&config).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_file.as_deref()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(2);
    }
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
