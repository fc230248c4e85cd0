//! Tenant-Index CLI
//!
//! Command-line interface for per-tenant vector namespaces. Results are
//! printed to stdout as JSON; logs go to stderr (`RUST_LOG`, default `warn`).
//!
//! ## Usage
//!
//! ```bash
//! # Store pre-computed chunk vectors for a document
//! tenant-index --root ./indexes insert --namespace acme --doc handbook --input chunks.json
//!
//! # Relevant chunks for a query vector
//! tenant-index retrieve --namespace acme --query '[0.1, 0.9, 0.0]' --threshold 0.6
//!
//! # Remove a document and compact the namespace
//! tenant-index delete --namespace acme --doc handbook
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tenant_index::{
    ChunkDescriptor, Compression, IndexConfig, IndexManager, RetrievalConfig, Retriever,
    ScoreTransform,
};
use tracing_subscriber::EnvFilter;

/// Score transform selection
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum TransformArg {
    /// clamp((1 + raw) / 2, 0, 1)
    #[default]
    UnitInterval,
    /// Raw inner product
    Raw,
}

impl From<TransformArg> for ScoreTransform {
    fn from(arg: TransformArg) -> Self {
        match arg {
            TransformArg::UnitInterval => Self::UnitInterval,
            TransformArg::Raw => Self::Raw,
        }
    }
}

/// Artifact codec selection
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum CompressionArg {
    /// LZ4 (fast)
    #[default]
    Lz4,
    /// Zstandard (smaller)
    Zstd,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::Lz4 => Self::Lz4,
            CompressionArg::Zstd => Self::Zstd,
        }
    }
}

#[derive(Parser)]
#[command(name = "tenant-index")]
#[command(version)]
#[command(about = "Per-tenant exact vector index CLI", long_about = None)]
struct Cli {
    /// Directory holding one subdirectory per namespace
    #[arg(long, global = true, env = "TENANT_INDEX_ROOT", default_value = "indexes")]
    root: PathBuf,

    /// Codec for index and vector artifacts
    #[arg(long, global = true, value_enum, default_value = "lz4")]
    compression: CompressionArg,

    /// Skip fsync on commit
    #[arg(long, global = true)]
    no_sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store chunk vectors of one document
    Insert {
        /// Tenant namespace
        #[arg(short, long)]
        namespace: String,

        /// Owning document id
        #[arg(short, long)]
        doc: String,

        /// JSON file with `[{"chunkId", "order", "vector"}]`; stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Nearest neighbors of a query vector
    Search {
        /// Tenant namespace
        #[arg(short, long)]
        namespace: String,

        /// Query vector as a JSON array
        #[arg(short, long)]
        query: String,

        /// Number of results
        #[arg(short, long, default_value = "5")]
        top_k: usize,
    },

    /// Threshold-filtered relevant chunks with a confidence score
    Retrieve {
        /// Tenant namespace
        #[arg(short, long)]
        namespace: String,

        /// Query vector as a JSON array
        #[arg(short, long)]
        query: String,

        /// Number of candidates
        #[arg(short, long, default_value = "5")]
        top_k: usize,

        /// Minimum similarity for a chunk to count as relevant
        #[arg(long, env = "RELEVANCE_THRESHOLD", default_value = "0.6")]
        threshold: f32,

        /// Raw score transform
        #[arg(long, value_enum, default_value = "unit-interval")]
        transform: TransformArg,
    },

    /// Remove every chunk of a document and compact the namespace
    Delete {
        /// Tenant namespace
        #[arg(short, long)]
        namespace: String,

        /// Document id
        #[arg(short, long)]
        doc: String,
    },

    /// Drop all entries of a namespace
    Clear {
        /// Tenant namespace
        #[arg(short, long)]
        namespace: String,
    },

    /// Entry count, next id and dimensionality of a namespace
    Stats {
        /// Tenant namespace
        #[arg(short, long)]
        namespace: String,
    },

    /// Live chunks of one document
    Documents {
        /// Tenant namespace
        #[arg(short, long)]
        namespace: String,

        /// Document id
        #[arg(short, long)]
        doc: String,
    },

    /// Show configuration
    Info,
}

/// One chunk in an insert request
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertRecord {
    chunk_id: String,
    #[serde(default)]
    order: i64,
    vector: Vec<f32>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = IndexConfig::new(&cli.root)
        .with_compression(cli.compression.into())
        .with_sync(!cli.no_sync);

    match cli.command {
        Commands::Insert {
            namespace,
            doc,
            input,
        } => run_insert(config, &namespace, &doc, input)?,
        Commands::Search {
            namespace,
            query,
            top_k,
        } => run_search(config, &namespace, &query, top_k)?,
        Commands::Retrieve {
            namespace,
            query,
            top_k,
            threshold,
            transform,
        } => run_retrieve(config, &namespace, &query, top_k, threshold, transform)?,
        Commands::Delete { namespace, doc } => {
            let removed = IndexManager::new(config).delete_by_document(&namespace, &doc)?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
        Commands::Clear { namespace } => {
            let cleared = IndexManager::new(config).clear_namespace(&namespace)?;
            print_json(&serde_json::json!({ "cleared": cleared }))?;
        }
        Commands::Stats { namespace } => {
            print_json(&IndexManager::new(config).stats(&namespace)?)?;
        }
        Commands::Documents { namespace, doc } => run_documents(config, &namespace, &doc)?,
        Commands::Info => run_info(&config),
    }

    Ok(())
}

fn run_info(config: &IndexConfig) {
    println!("Tenant-Index");
    println!("============");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Root: {}", config.root.display());
    println!("Compression: {}", config.compression.as_str());
    println!("Sync on commit: {}", config.sync);
    println!();
    let defaults = RetrievalConfig::default();
    println!("Retrieval defaults:");
    println!("  - top_k: {}", defaults.top_k);
    println!("  - threshold: {:.2}", defaults.threshold);
    println!("  - transform: unit-interval (clamp((1 + raw) / 2, 0, 1))");
}

fn run_insert(config: IndexConfig, namespace: &str, doc: &str, input: Option<PathBuf>) -> Result<()> {
    let raw = match &input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read input: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read insert records from stdin")?;
            buf
        }
    };
    let records: Vec<InsertRecord> =
        serde_json::from_str(&raw).context("Insert input must be a JSON array of records")?;

    let (entries, vectors): (Vec<ChunkDescriptor>, Vec<Vec<f32>>) = records
        .into_iter()
        .map(|r| (ChunkDescriptor::new(r.chunk_id, r.order), r.vector))
        .unzip();

    let ids = IndexManager::new(config)
        .insert(namespace, doc, &entries, &vectors)
        .with_context(|| format!("Failed to insert into namespace {namespace}"))?;
    print_json(&serde_json::json!({ "ids": ids }))
}

fn run_search(config: IndexConfig, namespace: &str, query: &str, top_k: usize) -> Result<()> {
    let query = parse_vector(query)?;
    let hits = IndexManager::new(config).search(namespace, &query, top_k)?;
    print_json(&hits)
}

fn run_retrieve(
    config: IndexConfig,
    namespace: &str,
    query: &str,
    top_k: usize,
    threshold: f32,
    transform: TransformArg,
) -> Result<()> {
    let query = parse_vector(query)?;
    let retrieval = RetrievalConfig::default()
        .with_top_k(top_k)
        .with_threshold(threshold)
        .with_transform(transform.into());
    let retriever = Retriever::new(Arc::new(IndexManager::new(config)), retrieval)?;
    let outcome = retriever.retrieve(namespace, &query)?;
    print_json(&serde_json::json!({
        "results": outcome.results,
        "confidence": outcome.confidence_rounded(),
    }))
}

fn run_documents(config: IndexConfig, namespace: &str, doc: &str) -> Result<()> {
    let entries: Vec<serde_json::Value> = IndexManager::new(config)
        .document_entries(namespace, doc)?
        .into_iter()
        .map(|(id, meta)| {
            serde_json::json!({
                "id": id,
                "chunkId": meta.chunk_id,
                "order": meta.order,
            })
        })
        .collect();
    print_json(&entries)
}

fn parse_vector(raw: &str) -> Result<Vec<f32>> {
    serde_json::from_str(raw).with_context(|| format!("Query must be a JSON array of numbers: {raw}"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
