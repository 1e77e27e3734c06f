//! weaver CLI.
//!
//! Command-line interface for indexing, searching, and managing
//! weaver indexes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use weaver_core::engine::ProgressReport;
use weaver_core::Engine;

/// weaver -- code-aware retrieval engine for AI coding agents
#[derive(Parser, Debug)]
#[command(name = "weaver", version, about = "Code-aware retrieval engine for AI coding agents")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Log level.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index a repository from scratch.
    Index {
        /// Path to the repository root.
        #[arg(default_value = ".")]
        path: String,
    },

    /// Reconcile the index against the current state of the repository.
    Reconcile {
        /// Path to the repository root.
        #[arg(default_value = ".")]
        path: String,
    },

    /// Search the indexed codebase.
    Search {
        /// Search query (natural language or keywords).
        query: String,

        /// Path to the repository root.
        #[arg(long, default_value = ".")]
        path: String,

        /// Maximum number of results.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show engine status and index statistics.
    Status {
        /// Path to the repository root.
        #[arg(default_value = ".")]
        path: String,
    },

    /// Watch a repository and keep the index up to date until interrupted.
    Watch {
        /// Path to the repository root.
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage configuration.
    Config {
        /// Path to the repository root.
        #[arg(long, default_value = ".")]
        path: String,

        /// Show current effective configuration.
        #[arg(long)]
        show: bool,
    },
}

fn report_progress(report: &ProgressReport, last_printed: &mut usize) {
    if report.processed.saturating_sub(*last_printed) >= 50 || report.processed == report.total {
        println!("  indexed {}/{} files", report.processed, report.total);
        *last_printed = report.processed;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(&cli.log_level).init();

    match cli.command {
        Commands::Index { path } => {
            let repo = PathBuf::from(&path);
            let engine = Engine::new(&repo).context("failed to initialize engine")?;
            let mut last_printed = 0usize;
            let summary = engine
                .bootstrap(Some(&mut |report| report_progress(&report, &mut last_printed)))
                .context("bootstrap failed")?;
            println!("Indexed {} files ({} failed)", summary.completed, summary.failed);
        }
        Commands::Reconcile { path } => {
            let repo = PathBuf::from(&path);
            let engine = Engine::new(&repo).context("failed to initialize engine")?;
            let summary = engine.reconcile(None).context("reconcile failed")?;
            println!(
                "Reconciled: {} new, {} modified, {} unchanged, {} deleted, {} failed ({}ms)",
                summary.new, summary.modified, summary.unchanged, summary.deleted, summary.failures, summary.duration_ms
            );
        }
        Commands::Search { query, path, limit } => {
            let repo = PathBuf::from(&path);
            let engine = Engine::new(&repo).context("failed to initialize engine")?;
            let results = engine.search(&query, limit).context("search failed")?;
            if results.is_empty() {
                println!("No results for \"{query}\"");
            }
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. {} (score {:.4}) [{:?} L{}-{}]",
                    i + 1,
                    result.file_path.display(),
                    result.score,
                    result.chunk.kind,
                    result.chunk.start_line,
                    result.chunk.end_line,
                );
            }
        }
        Commands::Status { path } => {
            let repo = PathBuf::from(&path);
            let engine = Engine::new(&repo).context("failed to initialize engine")?;
            let status = engine.status().context("status failed")?;
            println!("Repository: {}", status.repo_path.display());
            println!("Data dir:   {}", status.data_dir.display());
            println!("Search mode: {}", status.search_mode);
            println!(
                "Files: {}  Chunks: {}  Symbols: {}  Dependency edges: {} (cycles: {})",
                status.files_indexed,
                status.chunks_indexed,
                status.symbols_indexed,
                status.dependency_edges,
                status.has_cycles,
            );
        }
        Commands::Watch { path } => {
            let repo = PathBuf::from(&path);
            let engine = Engine::new(&repo).context("failed to initialize engine")?;
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            println!("Watching {} for changes (Ctrl-C to stop)...", repo.display());
            runtime.block_on(async {
                let cancel = tokio_util::sync::CancellationToken::new();
                let watch_cancel = cancel.clone();
                tokio::select! {
                    result = engine.watch(cancel) => result,
                    _ = tokio::signal::ctrl_c() => {
                        watch_cancel.cancel();
                        Ok(())
                    }
                }
            })
            .context("watch failed")?;
        }
        Commands::Config { path, show } => {
            let repo = PathBuf::from(&path);
            let config = weaver_core::Config::load(&repo).context("failed to load config")?;
            if show {
                let rendered = toml::to_string_pretty(&config).context("failed to render config")?;
                println!("{rendered}");
            } else {
                println!("Config for {} loaded from {}", path, config.data_dir().display());
                println!("Pass --show to print the full effective configuration.");
            }
        }
    }

    Ok(())
}
