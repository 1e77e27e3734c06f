//! Configuration loading and validation.
//!
//! Configuration is resolved with the following precedence (highest wins):
//!
//! 1. Environment variables (`WEAVER_*`)
//! 2. Project config (`.weaver/config.toml`)
//! 3. User config (`~/.config/weaver/config.toml`)
//! 4. Compiled-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::discovery::symlink::DEFAULT_MAX_SYMLINK_DEPTH;
use crate::error::{CoreError, CoreResult};

/// Top-level configuration for weaver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Repository root path to index.
    pub repo_path: PathBuf,

    /// Watcher configuration.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Indexing configuration.
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Query/search configuration.
    #[serde(default)]
    pub query: QueryConfig,

    /// Token budget configuration.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Context-provider configuration.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Bootstrap prioritization configuration.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Security/path-restriction configuration.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// File watcher settings (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Debounce interval in milliseconds for the first debounce stage.
    #[serde(default = "WatcherConfig::default_debounce_ms")]
    pub debounce_ms: u64,
    /// Batch window in milliseconds for the second (coalescing) stage.
    #[serde(default = "WatcherConfig::default_batch_window_ms")]
    pub batch_window_ms: u64,
    /// Interval between full scans (in seconds) for catching missed events.
    #[serde(default = "WatcherConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Cheap pre-filter ceiling applied at watch time; the indexing-time
    /// limit (`IndexingConfig::max_file_size`) is authoritative (OQ-2).
    #[serde(default = "WatcherConfig::default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce_ms(),
            batch_window_ms: Self::default_batch_window_ms(),
            poll_interval_secs: Self::default_poll_interval_secs(),
            max_file_size_mb: Self::default_max_file_size_mb(),
        }
    }
}

impl WatcherConfig {
    fn default_debounce_ms() -> u64 { 100 }
    fn default_batch_window_ms() -> u64 { 500 }
    fn default_poll_interval_secs() -> u64 { 300 }
    fn default_max_file_size_mb() -> u64 { 10 }
}

/// Indexing-specific settings (C1-C6, C8-C9, C12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Gitignore-style patterns to exclude from indexing.
    #[serde(default = "IndexingConfig::default_excludes")]
    pub exclude_patterns: Vec<String>,

    /// If non-empty, only these extensions (with or without a leading dot)
    /// are indexed. Mutually exclusive with `blocked_extensions`.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,

    /// Extensions to never index. Ignored when `allowed_extensions` is
    /// non-empty.
    #[serde(default)]
    pub blocked_extensions: Vec<String>,

    /// Skip-glob patterns applied after the extension gate (C2); simple
    /// patterns match the filename only, `**/`-prefixed ones also try the
    /// filename-suffix form.
    #[serde(default)]
    pub skip_patterns: Vec<String>,

    /// If non-empty, restrict indexing to these relative path prefixes.
    #[serde(default)]
    pub include_paths: Vec<String>,

    /// Maximum file size to index (in bytes). Files larger than this are skipped.
    #[serde(default = "IndexingConfig::default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum number of concurrent parse tasks.
    #[serde(default = "IndexingConfig::default_parse_concurrency")]
    pub parse_concurrency: usize,

    /// Maximum chunk size in tokens.
    #[serde(default = "IndexingConfig::default_max_chunk_tokens")]
    pub max_chunk_tokens: u32,

    /// Whether to follow symbolic links.
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Maximum number of symlink hops to follow before giving up.
    #[serde(default = "IndexingConfig::default_max_symlink_depth")]
    pub max_symlink_depth: usize,

    /// Number of backward overlap lines to include before each chunk.
    #[serde(default = "IndexingConfig::default_overlap_lines")]
    pub overlap_lines: usize,

    /// Overlap fraction for intra-element splitting (0.0 - 0.5).
    #[serde(default = "IndexingConfig::default_overlap_fraction")]
    pub overlap_fraction: f64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Self::default_excludes(),
            allowed_extensions: Vec::new(),
            blocked_extensions: Vec::new(),
            skip_patterns: Vec::new(),
            include_paths: Vec::new(),
            max_file_size: Self::default_max_file_size(),
            parse_concurrency: Self::default_parse_concurrency(),
            max_chunk_tokens: Self::default_max_chunk_tokens(),
            follow_symlinks: false,
            max_symlink_depth: Self::default_max_symlink_depth(),
            overlap_lines: Self::default_overlap_lines(),
            overlap_fraction: Self::default_overlap_fraction(),
        }
    }
}

impl IndexingConfig {
    fn default_excludes() -> Vec<String> {
        vec![
            ".git".into(),
            "node_modules".into(),
            "target".into(),
            "__pycache__".into(),
            ".venv".into(),
            "venv".into(),
            "dist".into(),
            "build".into(),
            ".next".into(),
            "*.lock".into(),
            "*.min.js".into(),
            "*.min.css".into(),
            "*.map".into(),
        ]
    }

    fn default_max_file_size() -> u64 { 5 * 1024 * 1024 }
    fn default_parse_concurrency() -> usize { 2 }
    fn default_max_chunk_tokens() -> u32 { 512 }
    fn default_max_symlink_depth() -> usize { DEFAULT_MAX_SYMLINK_DEPTH }
    fn default_overlap_lines() -> usize { 10 }
    fn default_overlap_fraction() -> f64 { 0.12 }
}

/// Per-language chunking overrides (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Per-language override of `IndexingConfig::max_chunk_tokens`, keyed by
    /// `Language::as_str()`.
    #[serde(default)]
    pub max_tokens_overrides: std::collections::HashMap<String, u32>,
    /// Minimum number of lines a paragraph must span before the fallback
    /// splitter treats it as its own chunk (smaller ones are merged).
    #[serde(default = "ChunkingConfig::default_fallback_paragraph_min_lines")]
    pub fallback_paragraph_min_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens_overrides: std::collections::HashMap::new(),
            fallback_paragraph_min_lines: Self::default_fallback_paragraph_min_lines(),
        }
    }
}

impl ChunkingConfig {
    fn default_fallback_paragraph_min_lines() -> usize { 2 }
}

/// Query/search settings (C16-C20).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default number of results to return.
    #[serde(default = "QueryConfig::default_k")]
    pub default_k: usize,
    /// Maximum number of results a caller may request.
    #[serde(default = "QueryConfig::default_max_limit")]
    pub max_limit: usize,
    /// RRF constant (k parameter).
    #[serde(default = "QueryConfig::default_rrf_k")]
    pub rrf_k: u32,
    /// Results with fused score below this threshold are dropped.
    #[serde(default = "QueryConfig::default_min_score_threshold")]
    pub min_score_threshold: f64,
    /// MMR lambda: weight of relevance vs. diversity (1.0 = pure relevance).
    #[serde(default = "QueryConfig::default_mmr_lambda")]
    pub mmr_lambda: f64,
    /// How many adjacent chunks the neighbor expander pulls in per result.
    #[serde(default = "QueryConfig::default_neighbor_window")]
    pub neighbor_window: u32,
    /// Query-result cache TTL in seconds.
    #[serde(default = "QueryConfig::default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Maximum entries retained in the query-result cache.
    #[serde(default = "QueryConfig::default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Whether MMR diversity reranking (C17) runs before truncation. When
    /// false, the optimizer truncates the RRF-fused list directly and the
    /// query-result cache is bypassed (C20).
    #[serde(default = "QueryConfig::default_rerank_enabled")]
    pub rerank_enabled: bool,
    /// Score multipliers keyed by relative-path prefix (C18); the longest
    /// matching prefix wins. E.g. boosting `src/core/` over `vendor/`.
    #[serde(default)]
    pub path_boosts: Vec<(String, f64)>,
    /// Score multipliers keyed by `Language::as_str()` (C18).
    #[serde(default)]
    pub language_boosts: std::collections::HashMap<String, f64>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_k: Self::default_k(),
            max_limit: Self::default_max_limit(),
            rrf_k: Self::default_rrf_k(),
            min_score_threshold: Self::default_min_score_threshold(),
            mmr_lambda: Self::default_mmr_lambda(),
            neighbor_window: Self::default_neighbor_window(),
            cache_ttl_secs: Self::default_cache_ttl_secs(),
            cache_max_entries: Self::default_cache_max_entries(),
            rerank_enabled: Self::default_rerank_enabled(),
            path_boosts: Vec::new(),
            language_boosts: std::collections::HashMap::new(),
        }
    }
}

impl QueryConfig {
    fn default_k() -> usize { 10 }
    fn default_max_limit() -> usize { 100 }
    fn default_rrf_k() -> u32 { 60 }
    fn default_min_score_threshold() -> f64 { 0.0 }
    fn default_mmr_lambda() -> f64 { 0.7 }
    fn default_neighbor_window() -> u32 { 1 }
    fn default_cache_ttl_secs() -> u64 { 30 }
    fn default_cache_max_entries() -> usize { 256 }
    fn default_rerank_enabled() -> bool { true }
}

/// Token budget settings (C17, C21).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Total token budget available for a rendered response.
    #[serde(default = "BudgetConfig::default_max_tokens")]
    pub max_tokens: u32,
    /// Tokens reserved for the surrounding prompt.
    #[serde(default = "BudgetConfig::default_reserve_for_prompt")]
    pub reserve_for_prompt: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: Self::default_max_tokens(),
            reserve_for_prompt: Self::default_reserve_for_prompt(),
        }
    }
}

impl BudgetConfig {
    fn default_max_tokens() -> u32 { 4000 }
    fn default_reserve_for_prompt() -> u32 { 500 }
}

/// Context-provider settings (C15).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Which providers are active, by name (`semantic`, `symbol`, `full_text`, `git_history`).
    #[serde(default = "ProvidersConfig::default_enabled")]
    pub enabled: Vec<String>,
    /// Per-provider RRF weight, keyed by provider name.
    #[serde(default)]
    pub weights: std::collections::HashMap<String, f64>,
    /// Number of most-recent commits the git-history provider scans.
    #[serde(default = "ProvidersConfig::default_max_commits")]
    pub max_commits: usize,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            weights: std::collections::HashMap::new(),
            max_commits: Self::default_max_commits(),
        }
    }
}

impl ProvidersConfig {
    fn default_enabled() -> Vec<String> {
        vec!["semantic".into(), "symbol".into(), "full_text".into(), "git_history".into()]
    }

    fn default_max_commits() -> usize {
        crate::vcs::DEFAULT_MAX_COMMITS
    }

    /// Weight for `provider`, defaulting to 1.0 if unconfigured.
    pub fn weight_for(&self, provider: &str) -> f64 {
        self.weights.get(provider).copied().unwrap_or(1.0)
    }
}

/// Bootstrap prioritization settings (C13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Extensions given highest priority regardless of category order.
    #[serde(default)]
    pub priority_extensions: Vec<String>,
    /// Files above this size (MiB) get lowest priority.
    #[serde(default = "BootstrapConfig::default_oversized_threshold_mb")]
    pub oversized_threshold_mb: f64,
    /// Files below this size (KiB) get highest priority (subject to the
    /// oversized check, which never applies here).
    #[serde(default = "BootstrapConfig::default_small_threshold_kb")]
    pub small_threshold_kb: f64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            priority_extensions: Vec::new(),
            oversized_threshold_mb: Self::default_oversized_threshold_mb(),
            small_threshold_kb: Self::default_small_threshold_kb(),
        }
    }
}

impl BootstrapConfig {
    fn default_oversized_threshold_mb() -> f64 { 2.0 }
    fn default_small_threshold_kb() -> f64 { 10.0 }
}

/// Security / path-restriction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Roots the watcher/scanner is allowed to touch. Empty means
    /// `repo_path` only.
    #[serde(default)]
    pub watch_roots: Vec<PathBuf>,
    /// Paths that must never be scanned or watched even if nested under a
    /// watch root (e.g. secrets directories).
    #[serde(default)]
    pub restricted_roots: Vec<PathBuf>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { watch_roots: Vec::new(), restricted_roots: Vec::new() }
    }
}

/// Embedding model configuration (C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Path to the ONNX model file.
    #[serde(default = "EmbeddingConfig::default_model_path")]
    pub model_path: PathBuf,
    /// Output embedding dimensions.
    #[serde(default = "EmbeddingConfig::default_dimensions")]
    pub dimensions: usize,
    /// Batch size for embedding inference.
    #[serde(default = "EmbeddingConfig::default_batch_size")]
    pub batch_size: usize,
    /// Maximum sequence length for the tokenizer.
    #[serde(default = "EmbeddingConfig::default_max_seq_length")]
    pub max_seq_length: usize,
    /// Whether to L2-normalize output vectors.
    #[serde(default = "EmbeddingConfig::default_normalize")]
    pub normalize: bool,
    /// Number of retry attempts for a failing batch before isolating it.
    #[serde(default = "EmbeddingConfig::default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base backoff in milliseconds between retry attempts.
    #[serde(default = "EmbeddingConfig::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: Self::default_model_path(),
            dimensions: Self::default_dimensions(),
            batch_size: Self::default_batch_size(),
            max_seq_length: Self::default_max_seq_length(),
            normalize: Self::default_normalize(),
            retry_attempts: Self::default_retry_attempts(),
            retry_backoff_ms: Self::default_retry_backoff_ms(),
        }
    }
}

impl EmbeddingConfig {
    fn default_model_path() -> PathBuf {
        crate::embedder::model_manager::model_path(&crate::embedder::model_manager::DEFAULT_MODEL)
    }
    fn default_dimensions() -> usize { 768 }
    fn default_batch_size() -> usize { 32 }
    fn default_max_seq_length() -> usize { 512 }
    fn default_normalize() -> bool { true }
    fn default_retry_attempts() -> u32 { 2 }
    fn default_retry_backoff_ms() -> u64 { 200 }
}

/// Storage settings (C11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Override for the SQLite database file path. Defaults to
    /// `<data_dir>/index.db` when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: None }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// Whether to output logs as JSON.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: Self::default_level(), json: false }
    }
}

impl LoggingConfig {
    fn default_level() -> String { "info".into() }
}

impl Config {
    /// Load configuration from defaults, then overlay user config, then
    /// project config, then environment overrides.
    pub fn load(repo_path: &Path) -> CoreResult<Self> {
        let mut config = Self::defaults(repo_path);

        if let Some(user_config_dir) = dirs::config_dir() {
            let user_config_path = user_config_dir.join("weaver").join("config.toml");
            if user_config_path.exists() {
                config.merge_from_file(&user_config_path)?;
            }
        }

        let project_config_path = repo_path.join(".weaver").join("config.toml");
        if project_config_path.exists() {
            config.merge_from_file(&project_config_path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Create a default configuration for the given repo path.
    pub fn defaults(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            watcher: WatcherConfig::default(),
            indexing: IndexingConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            query: QueryConfig::default(),
            budget: BudgetConfig::default(),
            providers: ProvidersConfig::default(),
            bootstrap: BootstrapConfig::default(),
            security: SecurityConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Returns the data directory for this repo's index files.
    pub fn data_dir(&self) -> PathBuf {
        let hash = self.repo_hash();
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("weaver")
            .join("repos")
            .join(&hash)
    }

    /// Resolve the SQLite database path, honoring `storage.db_path`.
    pub fn db_path(&self) -> PathBuf {
        self.storage.db_path.clone().unwrap_or_else(|| self.data_dir().join("index.db"))
    }

    /// The configured response budget as a `TokenBudget`, for query paths
    /// that don't override it with a caller-supplied budget.
    pub fn budget_as_token_budget(&self) -> crate::types::TokenBudget {
        crate::types::TokenBudget {
            max_tokens: self.budget.max_tokens,
            reserve_for_prompt: self.budget.reserve_for_prompt,
        }
    }

    /// Validate every cross-field invariant named in the engine's
    /// configuration contract. Called at the end of `load`; also callable
    /// directly by tests and by callers constructing a `Config` by hand.
    pub fn validate(&self) -> CoreResult<()> {
        if self.indexing.max_file_size == 0 {
            return Err(CoreError::Config { details: "indexing.max_file_size must be > 0".into() });
        }
        if !self.indexing.allowed_extensions.is_empty() && !self.indexing.blocked_extensions.is_empty() {
            return Err(CoreError::Config {
                details: "indexing.allowed_extensions and indexing.blocked_extensions are mutually exclusive".into(),
            });
        }
        if self.indexing.overlap_fraction < 0.0 || self.indexing.overlap_fraction > 0.5 {
            return Err(CoreError::Config {
                details: "indexing.overlap_fraction must be within [0.0, 0.5]".into(),
            });
        }
        if self.indexing.max_symlink_depth == 0 {
            return Err(CoreError::Config { details: "indexing.max_symlink_depth must be > 0".into() });
        }
        if self.query.default_k == 0 || self.query.default_k > self.query.max_limit {
            return Err(CoreError::Config {
                details: "query.default_k must be > 0 and <= query.max_limit".into(),
            });
        }
        if self.query.mmr_lambda < 0.0 || self.query.mmr_lambda > 1.0 {
            return Err(CoreError::Config { details: "query.mmr_lambda must be within [0.0, 1.0]".into() });
        }
        if self.budget.reserve_for_prompt > self.budget.max_tokens {
            return Err(CoreError::Config {
                details: "budget.reserve_for_prompt must not exceed budget.max_tokens".into(),
            });
        }
        if self.providers.enabled.is_empty() {
            return Err(CoreError::Config { details: "providers.enabled must not be empty".into() });
        }
        if self.bootstrap.small_threshold_kb <= 0.0 || self.bootstrap.oversized_threshold_mb <= 0.0 {
            return Err(CoreError::Config {
                details: "bootstrap thresholds must be positive".into(),
            });
        }
        Ok(())
    }

    /// Merge values from a TOML config file (non-destructive overlay).
    fn merge_from_file(&mut self, path: &Path) -> CoreResult<()> {
        let content = std::fs::read_to_string(path)?;
        let overlay: toml::Value = toml::from_str(&content)
            .map_err(|e| CoreError::Config { details: format!("invalid TOML in {}: {e}", path.display()) })?;

        macro_rules! merge_section {
            ($field:ident, $section:literal, $ty:ty) => {
                if let Some(value) = overlay.get($section) {
                    if let Ok(parsed) = value.clone().try_into::<$ty>() {
                        self.$field = parsed;
                    }
                }
            };
        }

        merge_section!(watcher, "watcher", WatcherConfig);
        merge_section!(indexing, "indexing", IndexingConfig);
        merge_section!(embedding, "embedding", EmbeddingConfig);
        merge_section!(chunking, "chunking", ChunkingConfig);
        merge_section!(query, "query", QueryConfig);
        merge_section!(budget, "budget", BudgetConfig);
        merge_section!(providers, "providers", ProvidersConfig);
        merge_section!(bootstrap, "bootstrap", BootstrapConfig);
        merge_section!(security, "security", SecurityConfig);
        merge_section!(storage, "storage", StorageConfig);
        merge_section!(logging, "logging", LoggingConfig);

        Ok(())
    }

    /// Apply environment variable overrides (`WEAVER_*` prefix).
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("WEAVER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(model) = std::env::var("WEAVER_MODEL_PATH") {
            self.embedding.model_path = PathBuf::from(model);
        }
        if let Ok(db) = std::env::var("WEAVER_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(db));
        }
    }

    /// Compute a short hash of the repo path for the data directory name.
    ///
    /// Normalizes the path to avoid Windows `\\?\` extended path prefix
    /// causing different hashes for the same physical directory.
    fn repo_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let path_str = self.repo_path.to_string_lossy();
        let normalized = path_str.strip_prefix(r"\\?\").unwrap_or(&path_str);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..4])
    }
}
