use anyhow::{Context, Result};
use blogsearch_core::persist::{load_snapshot, save_snapshot, IndexPaths};
use blogsearch_core::{DocumentStore, EngineConfig, Snapshot, DEFAULT_LIMIT};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "blogsearch-indexer")]
#[command(about = "Build and query a blog post search index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a search store (JSON array or generated lunr-store.js)
    Build {
        /// Store file
        #[arg(long)]
        input: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        /// Engine configuration (JSON); defaults apply to anything omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run a query against a saved index and print the results as JSON
    Search {
        /// Index directory
        #[arg(long, default_value = "./index")]
        index: PathBuf,
        /// Maximum number of results
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
        /// Engine configuration (JSON); the tokenizer always comes from the index
        #[arg(long)]
        config: Option<PathBuf>,
        query: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, config } => build_index(&input, &output, load_config(config.as_deref())?),
        Commands::Search { index, limit, config, query } => {
            search_index(&index, &query, limit, load_config(config.as_deref())?)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::from_json_file(p),
        None => Ok(EngineConfig::default()),
    }
}

fn build_index(input: &Path, output: &Path, config: EngineConfig) -> Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("reading store {}", input.display()))?;
    let store = DocumentStore::from_store_text(&text).with_context(|| format!("parsing store {}", input.display()))?;
    tracing::info!(documents = store.len(), rejected = store.rejected().len(), "loaded store");

    let snapshot = Snapshot::build(store, config);
    for warning in snapshot.index().warnings() {
        eprintln!("warning: {warning}");
    }
    save_snapshot(&IndexPaths::new(output), &snapshot)?;

    tracing::info!(
        output = %output.display(),
        num_docs = snapshot.index().num_docs(),
        num_terms = snapshot.index().num_terms(),
        "index build complete"
    );
    Ok(())
}

fn search_index(index: &Path, query: &str, limit: usize, config: EngineConfig) -> Result<()> {
    let snapshot = load_snapshot(&IndexPaths::new(index), config)?;
    let page = snapshot.search_page(query, limit)?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}
