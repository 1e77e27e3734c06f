//! `Engine` ties together storage, embedding, watching, indexing, and search
//! into the single object a front-end (CLI, MCP server) drives.
//!
//! `Engine` is the sole owner of long-lived state: the `Store` connection,
//! the `Embedder`, the `SearchEngine`'s query cache, and the in-memory
//! dependency graph. Everything else in this crate borrows those from an
//! `Engine` method rather than holding its own copy.

pub mod bootstrap;
pub mod indexer;
pub mod reconcile;

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::CoreResult;
use crate::graph::DependencyGraph;
use crate::parser;
use crate::search::{renderer, SearchEngine};
use crate::store::Store;
use crate::types::{ContextSnippet, DependencyEdge, PipelineEvent, SearchResult};
use crate::watcher::FileWatcher;

pub use bootstrap::BootstrapSummary;
pub use indexer::{IndexFailure, ProgressReport, UpdateResult};
pub use reconcile::ReconcileSummary;

/// A fully assembled search response: the results themselves plus the
/// rendered `project_context` document ready for splicing into a prompt.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    /// Individual scored results, for callers that want structured access.
    pub results: Vec<SearchResult>,
    /// The rendered XML document.
    pub document: String,
    /// Counts/timing surfaced alongside the document.
    pub diagnostics: renderer::RenderDiagnostics,
}

/// Snapshot of the engine's current state, for a `status` command/tool.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    /// Repository root being indexed.
    pub repo_path: PathBuf,
    /// Where the SQLite database and other on-disk state live.
    pub data_dir: PathBuf,
    /// Number of active (non-deleted) files in the index.
    pub files_indexed: u64,
    /// Number of chunks in the index.
    pub chunks_indexed: u64,
    /// Number of symbols in the index.
    pub symbols_indexed: u64,
    /// Number of edges in the in-memory dependency graph.
    pub dependency_edges: usize,
    /// Whether the dependency graph currently contains a cycle.
    pub has_cycles: bool,
    /// `"hybrid"` when the embedding model is loaded, `"keyword-only"` otherwise.
    pub search_mode: &'static str,
}

/// Owns everything needed to index a repository and answer queries against
/// it: the embedded store, the embedding model, the hybrid search pipeline,
/// and the in-memory dependency graph.
pub struct Engine {
    config: Config,
    store: Store,
    embedder: Embedder,
    search_engine: SearchEngine,
    dep_graph: DependencyGraph,
}

impl Engine {
    /// Load configuration for `repo_path` and construct an `Engine` over it.
    pub fn new(repo_path: &Path) -> CoreResult<Self> {
        let config = Config::load(repo_path)?;
        Self::with_config(config)
    }

    /// Construct an `Engine` from an already-resolved `Config`.
    pub fn with_config(config: Config) -> CoreResult<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;
        let store = Store::open(&config.db_path())?;
        let embedder = Embedder::new(&config.embedding)?;
        let search_engine =
            SearchEngine::with_cache_capacity(config.query.rrf_k, config.query.cache_max_entries);
        let dep_graph = DependencyGraph::new();

        Ok(Self { config, store, embedder, search_engine, dep_graph })
    }

    /// Run the prioritized first-time bootstrap sweep (C13), then build the
    /// in-memory dependency graph from what was indexed.
    pub fn bootstrap(
        &self,
        progress: Option<&mut dyn FnMut(ProgressReport)>,
    ) -> CoreResult<BootstrapSummary> {
        let summary =
            bootstrap::run(&self.store, &self.embedder, &self.config, &self.config.repo_path, progress)?;
        self.rebuild_dependency_graph()?;
        Ok(summary)
    }

    /// Reconcile the store against the filesystem (C14), for process
    /// restarts, then refresh the dependency graph.
    pub fn reconcile(
        &self,
        progress: Option<&mut dyn FnMut(ProgressReport)>,
    ) -> CoreResult<ReconcileSummary> {
        let summary =
            reconcile::run(&self.store, &self.embedder, &self.config, &self.config.repo_path, progress)?;
        self.rebuild_dependency_graph()?;
        Ok(summary)
    }

    /// Index or re-index an explicit list of absolute paths (C12), e.g. a
    /// one-shot `weaver index <path>` invocation outside of watch mode.
    pub fn index_paths(&self, paths: &[PathBuf]) -> CoreResult<UpdateResult> {
        let indexer = indexer::Indexer::new(&self.store, &self.embedder, &self.config, &self.config.repo_path);
        let result = indexer.update(paths, false, None)?;
        self.rebuild_dependency_graph()?;
        Ok(result)
    }

    /// Run the live file watcher (C7), applying every event to the
    /// incremental indexer (C12) until `cancel` fires.
    pub async fn watch(&self, cancel: CancellationToken) -> CoreResult<()> {
        let (tx, mut rx) = mpsc::channel::<PipelineEvent>(1024);
        let watcher = FileWatcher::new(&self.config.repo_path, &self.config.watcher, &self.config.indexing);

        let watch_cancel = cancel.clone();
        let watch_handle = tokio::spawn(async move { watcher.watch(tx, watch_cancel, false).await });

        let indexer = indexer::Indexer::new(&self.store, &self.embedder, &self.config, &self.config.repo_path);
        let mut dirty = false;

        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::FileChanged { path } | PipelineEvent::FileDeleted { path } => {
                    if let Err(e) = indexer.update(&[path.clone()], false, None) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to apply watch event");
                    } else {
                        dirty = true;
                    }
                }
                PipelineEvent::FullScan => {
                    if let Err(e) = self.reconcile(None) {
                        tracing::warn!(error = %e, "full rescan failed");
                    }
                }
                PipelineEvent::Shutdown => break,
            }
        }

        if dirty {
            if let Err(e) = self.rebuild_dependency_graph() {
                tracing::warn!(error = %e, "failed to rebuild dependency graph after watch session");
            }
        }

        watch_handle.await.map_err(|e| crate::error::CoreError::Internal(format!("watcher task panicked: {e}")))?
    }

    /// Run the hybrid search pipeline (C15-C20) and return scored results
    /// without rendering them.
    pub fn search(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchResult>> {
        self.search_engine.search(&self.store, &self.embedder, &self.config, query, limit)
    }

    /// Run search and render the results into a `project_context` document
    /// (C21), ready to splice into a prompt.
    pub fn query(&self, query: &str, limit: usize) -> CoreResult<QueryResponse> {
        let started = std::time::Instant::now();
        let results = self.search(query, limit)?;
        let snippets: Vec<ContextSnippet> = results.iter().map(renderer::snippet_from_result).collect();

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("repo_path".to_string(), self.config.repo_path.display().to_string());
        metadata.insert("search_mode".to_string(), self.search_mode().to_string());

        let budget = self.config.budget_as_token_budget();
        let (document, diagnostics) = renderer::render(
            query,
            &snippets,
            &metadata,
            budget.available_for_snippets(),
            None,
            started.elapsed().as_millis() as u64,
        );

        Ok(QueryResponse { results, document, diagnostics })
    }

    /// Current engine status: index size, dependency graph shape, search mode.
    pub fn status(&self) -> CoreResult<EngineStatus> {
        let active = self.store.list_active_files()?;
        let mut chunks_indexed = 0u64;
        let mut symbols_indexed = 0u64;
        for file in &active {
            chunks_indexed += self.store.get_chunks_for_file(file.id)?.len() as u64;
            symbols_indexed += self.store.symbols_for_file(file.id)?.len() as u64;
        }

        Ok(EngineStatus {
            repo_path: self.config.repo_path.clone(),
            data_dir: self.config.data_dir(),
            files_indexed: active.len() as u64,
            chunks_indexed,
            symbols_indexed,
            dependency_edges: self.dep_graph.edge_count(),
            has_cycles: self.dep_graph.has_cycles(),
            search_mode: self.search_mode(),
        })
    }

    /// Access the underlying store directly, for front-ends that need a
    /// lookup this API doesn't otherwise expose (e.g. `get_symbol`).
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Access the in-memory dependency graph directly.
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dep_graph
    }

    /// The repository root this engine was constructed over.
    pub fn repo_path(&self) -> &Path {
        &self.config.repo_path
    }

    /// The resolved configuration this engine is running with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn search_mode(&self) -> &'static str {
        if self.embedder.is_available() { "hybrid" } else { "keyword-only" }
    }

    /// Rebuild the in-memory dependency graph from every active file's
    /// extracted imports. Symbol-to-symbol edges (calls, extends, ...) would
    /// need cross-file name resolution beyond what the parser currently
    /// exposes, so only import edges are populated, using each file's first
    /// extracted symbol as a stand-in source node; see DESIGN.md.
    fn rebuild_dependency_graph(&self) -> CoreResult<()> {
        self.dep_graph.clear();

        for file in self.store.list_active_files()? {
            let Some(language) = file.language else { continue };
            if !language.is_code() {
                continue;
            }
            let absolute = self.config.repo_path.join(&file.relative_path);
            let Ok(bytes) = std::fs::read(&absolute) else { continue };

            let imports = match parser::parse_imports(&absolute, &bytes, language) {
                Ok(imports) => imports,
                Err(_) => continue,
            };
            if imports.is_empty() {
                continue;
            }

            let symbols = self.store.symbols_for_file(file.id)?;
            let Some(source_symbol) = symbols.first() else { continue };
            self.dep_graph.add_symbol(source_symbol.id)?;

            for import in imports {
                let Some(target) = self.resolve_import_target(&import.import_path)? else { continue };
                self.dep_graph.add_edge(&DependencyEdge {
                    source_id: source_symbol.id,
                    target_id: target,
                    kind: import.kind,
                })?;
            }
        }

        Ok(())
    }

    /// Resolve an import path to a symbol id by matching its trailing
    /// component against a symbol name. Best-effort: ambiguous or unresolved
    /// imports are simply skipped rather than guessed at.
    fn resolve_import_target(&self, import_path: &str) -> CoreResult<Option<i64>> {
        let needle = import_path.rsplit(['/', '.', ':']).next().unwrap_or(import_path);
        if needle.is_empty() {
            return Ok(None);
        }
        let matches = self.store.search_symbols_by_name(needle, 1)?;
        Ok(matches.into_iter().next().map(|s| s.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::defaults(dir);
        config.storage.db_path = Some(dir.join("index.db"));
        config
    }

    fn test_engine(dir: &Path) -> Engine {
        Engine::with_config(test_config(dir)).expect("engine")
    }

    #[test]
    fn test_engine_creation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = test_engine(dir.path());
        assert_eq!(engine.repo_path(), dir.path());
    }

    #[test]
    fn test_engine_status_on_empty_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = test_engine(dir.path());
        let status = engine.status().expect("status");
        assert_eq!(status.files_indexed, 0);
        assert_eq!(status.search_mode, "keyword-only");
    }

    #[test]
    fn test_index_paths_indexes_single_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.py");
        std::fs::write(&path, "def f():\n    pass\n").expect("write");

        let engine = test_engine(dir.path());
        let result = engine.index_paths(&[path]).expect("index");
        assert_eq!(result.new, 1);

        let status = engine.status().expect("status");
        assert_eq!(status.files_indexed, 1);
    }

    #[test]
    fn test_bootstrap_indexes_whole_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.py"), "def f():\n    pass\n").expect("write");
        std::fs::write(dir.path().join("b.py"), "def g():\n    pass\n").expect("write");

        let engine = test_engine(dir.path());
        let summary = engine.bootstrap(None).expect("bootstrap");
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 2);
    }

    #[test]
    fn test_search_on_empty_index_returns_no_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = test_engine(dir.path());
        let results = engine.search("anything", 10).expect("search");
        assert!(results.is_empty());
    }

    #[test]
    fn test_query_renders_document_for_indexed_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.py"), "def login(request):\n    pass\n").expect("write");

        let engine = test_engine(dir.path());
        engine.bootstrap(None).expect("bootstrap");
        let response = engine.query("login", 10).expect("query");
        assert!(response.document.contains("project_context"));
    }
}
