//! weaver MCP Server.
//!
//! Exposes code intelligence tools to AI coding agents via the
//! Model Context Protocol (MCP) over the stdio transport.

mod tools;

use anyhow::Result;
use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};
use weaver_core::Engine;

use tools::WeaverServer;

/// weaver MCP Server
#[derive(Parser, Debug)]
#[command(name = "weaver-mcp", version, about)]
struct Args {
    /// Path to the repository to index.
    #[arg(long, default_value = ".")]
    repo: String,

    /// Transport protocol to use.
    #[arg(long, default_value = "stdio", value_parser = ["stdio"])]
    transport: String,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdio is the transport; anything written to stdout other than MCP
    // frames corrupts the protocol stream, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let repo_path = std::path::Path::new(&args.repo);
    if !repo_path.exists() {
        anyhow::bail!("repository path does not exist: {}", args.repo);
    }

    tracing::info!(repo = %args.repo, transport = %args.transport, "weaver MCP server starting");

    let engine = Engine::new(repo_path)?;
    let server = WeaverServer::new(engine);

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("MCP serve error: {e}"))?;

    tracing::info!("MCP server ready");

    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP runtime error: {e}"))?;

    Ok(())
}
