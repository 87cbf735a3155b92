use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use semdex::config::Settings;
use semdex::embedder::Embedder;
use semdex::extract::PlainTextExtractor;
use semdex::indexer::{ChunkOptions, IndexBuilder};
use semdex::progress::ProgressSink;
use semdex::search::SearchEngine;
use semdex::store::index_info;

#[derive(Parser)]
#[command(name = "semdex")]
#[command(version = "0.1")]
#[command(about = "Build and query a semantic index over a document folder", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from every file under SOURCE_DIR
    Index {
        source_dir: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Rank indexed chunks against QUERY
    Search {
        query: String,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Show entry and vector counts of an index
    Info {
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

/// Prints a progress line to stderr every tenth of the way.
struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&self, fraction: f32) {
        let percent = (fraction * 100.0).round() as u32;
        if percent % 10 == 0 {
            eprintln!("indexing: {percent}%");
        }
    }
}

fn index_command(settings: &Settings, source_dir: PathBuf) -> Result<()> {
    let embedder = Embedder::from_settings(settings)?;
    let extractor = PlainTextExtractor;
    let options = ChunkOptions {
        chunk_size: settings.chunk_size,
        overlap: settings.overlap,
    };

    let report = IndexBuilder::new(&embedder, &extractor, options)?
        .build(&source_dir, &settings.index_dir, &StderrProgress)
        .with_context(|| format!("Failed to build index from '{}'", source_dir.display()))?;
    embedder.close();

    let output = serde_json::json!({
        "index_dir": settings.index_dir.display().to_string(),
        "files_total": report.files_total,
        "files_indexed": report.files_indexed,
        "chunks_embedded": report.chunks_embedded,
        "skipped": report.files_skipped.iter().map(|(path, reason)| {
            serde_json::json!({
                "path": path.display().to_string(),
                "reason": reason.to_string(),
            })
        }).collect::<Vec<_>>(),
        "success": report.success(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !report.success() {
        anyhow::bail!("No text could be indexed under '{}'", source_dir.display());
    }
    Ok(())
}

fn search_command(settings: &Settings, query: String) -> Result<()> {
    let embedder = Embedder::from_settings(settings)?;
    let (results, timings) = SearchEngine::new(&embedder)
        .with_parallel_scan(settings.parallel_scan)
        .search_timed(&query, &settings.index_dir, settings.top_k)
        .with_context(|| format!("Search against '{}' failed", settings.index_dir.display()))?;
    embedder.close();

    let output = serde_json::json!({
        "query": query,
        "results": results,
        "actual_results_count": results.len(),
        "requested_results_count": settings.top_k,
        "timings_ms": {
            "load": timings.load_duration.as_secs_f64() * 1000.0,
            "embed": timings.embed_duration.as_secs_f64() * 1000.0,
            "rank": timings.rank_duration.as_secs_f64() * 1000.0,
            "total": timings.total_duration.as_secs_f64() * 1000.0,
        },
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn info_command(settings: &Settings) -> Result<()> {
    let info = index_info(&settings.index_dir)
        .with_context(|| format!("Failed to read index at '{}'", settings.index_dir.display()))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn init_tracing(verbose: bool) {
    let verbose = verbose || std::env::var("SEMDEX_VERBOSE").map(|v| v == "true").unwrap_or(false);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "semdex=debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);
    let mut settings = Settings::load().context("Failed to load configuration")?;

    match args.command {
        Commands::Index {
            source_dir,
            out,
            chunk_size,
            overlap,
            model,
        } => {
            settings.index_dir = out.unwrap_or(settings.index_dir);
            settings.chunk_size = chunk_size.unwrap_or(settings.chunk_size);
            settings.overlap = overlap.unwrap_or(settings.overlap);
            settings.model_path = model.or(settings.model_path);
            settings.validate()?;
            index_command(&settings, source_dir)?
        }
        Commands::Search {
            query,
            index,
            top_k,
            model,
        } => {
            settings.index_dir = index.unwrap_or(settings.index_dir);
            settings.top_k = top_k.unwrap_or(settings.top_k);
            settings.model_path = model.or(settings.model_path);
            settings.validate()?;
            search_command(&settings, query)?
        }
        Commands::Info { index } => {
            settings.index_dir = index.unwrap_or(settings.index_dir);
            info_command(&settings)?
        }
        Commands::Config => settings.print_config(),
    }
    Ok(())
}
