//! # weaver-core
//!
//! Core indexing, search, and code intelligence engine for the `weaver`
//! code-aware retrieval server.
//!
//! This crate provides the foundational components for building a semantic
//! code understanding engine. It is designed as a library with clear module
//! boundaries so that each subsystem can be developed, tested, and debugged
//! independently.
//!
//! ## Architecture
//!
//! - **`config`** -- Configuration loading and validation
//! - **`discovery`** -- Ignore/glob matching, filters, binary/symlink handling, scanning
//! - **`parser`** -- Tree-sitter AST parsing with per-language analyzers
//! - **`chunker`** -- AST-aware semantic code chunking
//! - **`embedder`** -- ONNX-based local embedding inference
//! - **`store`** -- SQLite metadata store + FTS5 full-text search
//! - **`graph`** -- Dependency graph construction and traversal (petgraph)
//! - **`vcs`** -- Git commit history parsing for the git-history provider
//! - **`watcher`** -- File system watcher with debouncing
//! - **`engine`** -- Orchestrates discovery, bootstrap, and incremental indexing
//! - **`search`** -- Hybrid retrieval engine (providers, RRF fusion, MMR, rendering)
//!
//! Modules communicate via well-defined types in the `types` module.

// Workspace lints are inherited from Cargo.toml

pub mod config;
pub mod error;
pub mod types;

pub mod discovery;
pub mod parser;
pub mod chunker;
pub mod embedder;
pub mod store;
pub mod graph;
pub mod vcs;
pub mod watcher;
pub mod engine;
pub mod search;

/// Re-export the primary engine interface.
pub use engine::Engine;
pub use config::Config;
pub use error::CoreError;
