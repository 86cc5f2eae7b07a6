use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kb_chunker::ChunkerConfig;
use kb_indexer::KnowledgeBaseIndexer;
use kb_search::{IncludedChunk, KnowledgeBase, RetrievalOptions};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kb")]
#[command(about = "Hybrid retrieval over a local knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or refresh the indexes from a source directory
    Index(IndexArgs),

    /// Retrieve assembled context for a query
    Search(SearchArgs),

    /// Show index statistics
    Stats(StatsArgs),
}

#[derive(Args)]
struct IndexArgs {
    /// Directory of source documents (.md / .markdown / .txt)
    source: PathBuf,

    /// Data directory holding the indexes
    #[arg(long, default_value = ".kb")]
    data_dir: PathBuf,

    /// Chunk window size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Overlap between consecutive chunks in characters
    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Disable chunking (one chunk per document)
    #[arg(long)]
    no_chunking: bool,
}

#[derive(Args)]
struct SearchArgs {
    /// The query text
    query: String,

    /// Number of chunks to retrieve (falls back to KB_RETRIEVAL_K)
    #[arg(short)]
    k: Option<usize>,

    /// Data directory holding the indexes
    #[arg(long, default_value = ".kb")]
    data_dir: PathBuf,

    /// Context budget in characters
    #[arg(long)]
    max_chars: Option<usize>,

    /// Weight of the dense (vector) signal
    #[arg(long)]
    vector_weight: Option<f32>,

    /// Weight of the sparse (BM25) signal
    #[arg(long)]
    lexical_weight: Option<f32>,

    /// Minimum raw cosine similarity for vector-scored candidates
    #[arg(long)]
    similarity_threshold: Option<f32>,

    /// Query deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Emit the assembled context as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatsArgs {
    /// Data directory holding the indexes
    #[arg(long, default_value = ".kb")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Index(args) => run_index(args).await,
        Commands::Search(args) => run_search(args).await,
        Commands::Stats(args) => run_stats(args).await,
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

async fn run_index(args: IndexArgs) -> Result<()> {
    let mut config = ChunkerConfig::from_env()?;
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(overlap) = args.chunk_overlap {
        config.overlap = overlap;
    }
    if args.no_chunking {
        config.enabled = false;
    }

    let indexer = KnowledgeBaseIndexer::new(&args.data_dir, config)?;
    let report = indexer
        .reindex(&args.source)
        .await
        .with_context(|| format!("failed to reindex {}", args.source.display()))?;

    println!("{report}");
    for error in &report.errors {
        println!("  skipped {}: {}", error.path.display(), error.reason);
    }
    Ok(())
}

async fn run_search(args: SearchArgs) -> Result<()> {
    let k = match args.k {
        Some(k) => k,
        None => std::env::var("KB_RETRIEVAL_K")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .context("k is required: pass -k or set KB_RETRIEVAL_K")?,
    };

    let mut options = RetrievalOptions::from_env(k)?;
    if let Some(max_chars) = args.max_chars {
        options.max_context_chars = max_chars;
    }
    if let Some(vector_weight) = args.vector_weight {
        options.vector_weight = vector_weight;
    }
    if let Some(lexical_weight) = args.lexical_weight {
        options.lexical_weight = lexical_weight;
    }
    if let Some(threshold) = args.similarity_threshold {
        options.similarity_threshold = threshold;
    }
    options.timeout = args.timeout_ms.map(Duration::from_millis);

    let kb = KnowledgeBase::open(&args.data_dir)
        .await
        .with_context(|| format!("failed to open knowledge base at {}", args.data_dir.display()))?;
    let context = kb.retrieve_context(&args.query, &options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    if context.is_empty() {
        println!("No relevant documents.");
        return Ok(());
    }

    println!("{}", context.text);
    println!(
        "\n-- {} chunks, {} chars{}",
        context.included.len(),
        context.total_chars,
        if context.truncated { ", truncated" } else { "" }
    );
    for chunk in &context.included {
        println!("   {}", citation(chunk));
    }
    Ok(())
}

fn citation(chunk: &IncludedChunk) -> String {
    match chunk.metadata.frontmatter.get("title") {
        Some(title) => format!("{} ({})", chunk.chunk_id, title.as_text()),
        None => chunk.chunk_id.clone(),
    }
}

async fn run_stats(args: StatsArgs) -> Result<()> {
    let kb = KnowledgeBase::open(&args.data_dir)
        .await
        .with_context(|| format!("failed to open knowledge base at {}", args.data_dir.display()))?;

    println!("Vector index:  {} chunks", kb.vector_store().len());
    println!("Lexical index: {} chunks", kb.lexical_index().len());
    Ok(())
}
