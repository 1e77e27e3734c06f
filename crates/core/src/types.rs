//! Core domain types shared across all weaver-core subsystems.
//!
//! These types form the API contract between modules. Changing them
//! requires updating all consumers, so they should be stable and minimal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// File-level types
// ---------------------------------------------------------------------------

/// Persisted state of a tracked file.
///
/// `content_hash` is the sole authority for "has this file changed" --
/// mtime is recorded for diagnostics only and is never used alone to
/// decide whether a file needs reindexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileState {
    /// Database ID (0 if not yet persisted).
    pub id: i64,
    /// Path relative to the repository root, forward-slash separated.
    pub relative_path: String,
    /// SHA-256 hash of file content at time of indexing.
    pub content_hash: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Modification time, nanoseconds since epoch (diagnostics only).
    pub mtime_ns: i64,
    /// Detected programming language, if recognized.
    pub language: Option<Language>,
    /// Bootstrap priority category this file was sorted into, if known.
    pub kind: Option<String>,
    /// Opaque fingerprint of the indexing settings used to produce this
    /// state (chunking/embedding config version). A mismatch signals the
    /// file should be reindexed even if content is unchanged.
    pub fingerprint: Option<String>,
    /// Unix timestamp (seconds) of the last successful index of this file.
    pub indexed_at: i64,
    /// Soft-delete marker; rows are kept briefly for cascade bookkeeping.
    pub is_deleted: bool,
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Supported programming languages and document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python (.py)
    Python,
    /// TypeScript (.ts, .tsx)
    TypeScript,
    /// JavaScript (.js, .jsx)
    JavaScript,
    /// Rust (.rs)
    Rust,
    /// Go (.go)
    Go,
    /// Java (.java)
    Java,
    /// C (.c, .h)
    C,
    /// C++ (.cpp, .cc, .cxx, .hpp, .hxx)
    Cpp,
    /// C# (.cs)
    CSharp,
    /// CSS / SCSS (.css, .scss)
    Css,
    /// Ruby (.rb)
    Ruby,
    /// PHP (.php)
    Php,
    /// Swift (.swift)
    Swift,
    /// Kotlin (.kt, .kts)
    Kotlin,
    /// HTML (.html, .htm)
    Html,
    /// Shell / Bash (.sh, .bash, .zsh)
    Shell,
    /// Markdown (.md, .mdx)
    Markdown,
    /// TOML configuration (.toml)
    Toml,
    /// YAML configuration (.yml, .yaml)
    Yaml,
    /// JSON data (.json, .jsonc)
    Json,
    /// Unknown / unsupported
    Unknown,
}

impl Language {
    /// Detect language from a lowercase, dot-free file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "py" => Self::Python,
            "ts" | "tsx" => Self::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Self::Cpp,
            "cs" => Self::CSharp,
            "css" | "scss" => Self::Css,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kt" | "kts" => Self::Kotlin,
            "html" | "htm" => Self::Html,
            "sh" | "bash" | "zsh" => Self::Shell,
            "md" | "mdx" => Self::Markdown,
            "toml" => Self::Toml,
            "yml" | "yaml" => Self::Yaml,
            "json" | "jsonc" => Self::Json,
            _ => Self::Unknown,
        }
    }

    /// Returns the language identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Css => "css",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Html => "html",
            Self::Shell => "shell",
            Self::Markdown => "markdown",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true if this is an AST-parseable programming language.
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            Self::Python
                | Self::TypeScript
                | Self::JavaScript
                | Self::Rust
                | Self::Go
                | Self::Java
                | Self::C
                | Self::Cpp
                | Self::CSharp
                | Self::Css
                | Self::Ruby
                | Self::Php
                | Self::Swift
                | Self::Kotlin
        )
    }

    /// Returns true if this is a documentation or config format.
    pub fn is_document(&self) -> bool {
        matches!(
            self,
            Self::Markdown | Self::Toml | Self::Yaml | Self::Json | Self::Html | Self::Shell
        )
    }

    /// Parse from the stored database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "python" => Self::Python,
            "typescript" => Self::TypeScript,
            "javascript" => Self::JavaScript,
            "rust" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" => Self::C,
            "cpp" => Self::Cpp,
            "csharp" => Self::CSharp,
            "css" => Self::Css,
            "ruby" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kotlin" => Self::Kotlin,
            "html" => Self::Html,
            "shell" => Self::Shell,
            "markdown" => Self::Markdown,
            "toml" => Self::Toml,
            "yaml" => Self::Yaml,
            "json" => Self::Json,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Chunk types
// ---------------------------------------------------------------------------

/// The kind of code construct a chunk represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Function or method definition.
    Function,
    /// Class, struct, or record definition.
    Class,
    /// Trait, interface, or protocol definition.
    Trait,
    /// Implementation block (Rust `impl`, Java anonymous class, etc.).
    Impl,
    /// Constant or static variable.
    Const,
    /// Type alias or definition.
    TypeDef,
    /// Module or namespace declaration.
    Module,
    /// Test function or test block.
    Test,
    /// A paragraph-delimited block from a document/fallback chunker.
    Paragraph,
    /// Top-level statements that don't fit other categories.
    TopLevel,
}

impl ChunkKind {
    /// Returns the default structural importance weight for this kind.
    pub fn default_weight(&self) -> f64 {
        match self {
            Self::Function => 0.85,
            Self::Class => 0.95,
            Self::Trait => 0.95,
            Self::Impl => 0.85,
            Self::Const => 0.70,
            Self::TypeDef => 0.90,
            Self::Module => 0.60,
            Self::Test => 0.60,
            Self::Paragraph => 0.55,
            Self::TopLevel => 0.50,
        }
    }

    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Trait => "trait",
            Self::Impl => "impl",
            Self::Const => "const",
            Self::TypeDef => "typedef",
            Self::Module => "module",
            Self::Test => "test",
            Self::Paragraph => "paragraph",
            Self::TopLevel => "top_level",
        }
    }

    /// Parse from database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "class" => Self::Class,
            "trait" => Self::Trait,
            "impl" => Self::Impl,
            "const" => Self::Const,
            "typedef" => Self::TypeDef,
            "module" => Self::Module,
            "test" => Self::Test,
            "paragraph" => Self::Paragraph,
            _ => Self::TopLevel,
        }
    }
}

/// Visibility of a code symbol. Not persisted on `Chunk`/`Symbol` directly --
/// used by the parser's intermediate `StructuralElement` and folded into
/// `default_weight` via the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Accessible from outside the module/crate.
    Public,
    /// Accessible only within the current crate/package.
    Crate,
    /// Accessible from parent class or subclasses.
    Protected,
    /// Accessible only within the defining scope.
    Private,
}

impl Visibility {
    /// Returns a weight multiplier for public vs private apis.
    pub fn weight_multiplier(&self) -> f64 {
        match self {
            Self::Public => 1.0,
            Self::Crate => 0.9,
            Self::Protected => 0.85,
            Self::Private => 0.70,
        }
    }
}

/// A semantically meaningful chunk of code extracted from a file.
///
/// `(file_id, ordinal)` is unique: ordinals are 0-based and gap-free within
/// a file, assigned in the order chunks appear in the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Database ID (0 if not yet persisted).
    pub id: i64,
    /// ID of the parent file in the index.
    pub file_id: i64,
    /// 0-based position of this chunk within its file.
    pub ordinal: u32,
    /// What kind of code construct this is.
    pub kind: ChunkKind,
    /// Starting line number (1-indexed).
    pub start_line: u32,
    /// Ending line number (1-indexed, inclusive).
    pub end_line: u32,
    /// Estimated token count for this chunk, if computed.
    pub token_estimate: Option<u32>,
    /// The source code content of this chunk.
    pub content: String,
    /// Extracted doc comment or a derived one-line summary, if any.
    pub summary: Option<String>,
    /// Unix timestamp (seconds) this chunk was (re)created.
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Embedding types
// ---------------------------------------------------------------------------

/// A vector embedding persisted for a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    /// Database ID (0 if not yet persisted).
    pub id: i64,
    /// Chunk this embedding was computed for. Must reference a live chunk;
    /// deleting the chunk cascades to delete this row.
    pub chunk_id: i64,
    /// Identifier of the model that produced this vector.
    pub model: String,
    /// Vector dimensionality.
    pub dimensions: usize,
    /// The embedding vector itself.
    pub vector: Vec<f32>,
    /// Unix timestamp (seconds) this embedding was computed.
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Symbol types
// ---------------------------------------------------------------------------

/// A named symbol extracted from a parsed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    /// Database ID (0 if not yet persisted).
    pub id: i64,
    /// File this symbol is defined in.
    pub file_id: i64,
    /// Associated chunk ID, if the full definition maps onto one chunk.
    pub chunk_id: Option<i64>,
    /// What kind of symbol this is.
    pub kind: ChunkKind,
    /// Short name (e.g. `validate_token`).
    pub name: String,
    /// Fully qualified name (e.g. `crate::auth::middleware::validate_token`).
    pub qualified_name: Option<String>,
    /// Function/method signature, if applicable.
    pub signature: Option<String>,
    /// Source language, if known.
    pub language: Option<Language>,
    /// Starting line number (1-indexed), if known.
    pub start_line: Option<u32>,
    /// Ending line number (1-indexed, inclusive), if known.
    pub end_line: Option<u32>,
}

// ---------------------------------------------------------------------------
// Dependency edge / link types
// ---------------------------------------------------------------------------

/// The kind of dependency relationship between two symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// File/module A imports module B.
    Imports,
    /// Function A calls function B.
    Calls,
    /// Class A extends/inherits from class B.
    Extends,
    /// Struct/class A implements trait/interface B.
    Implements,
    /// Function A uses type B as parameter or return type.
    UsesType,
    /// Function A creates an instance of struct/class B.
    Instantiates,
    /// Function A accesses a field of struct B.
    FieldAccess,
}

impl DependencyKind {
    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imports => "imports",
            Self::Calls => "calls",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::UsesType => "uses_type",
            Self::Instantiates => "instantiates",
            Self::FieldAccess => "field_access",
        }
    }

    /// Parse from database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "imports" => Self::Imports,
            "calls" => Self::Calls,
            "extends" => Self::Extends,
            "implements" => Self::Implements,
            "uses_type" => Self::UsesType,
            "instantiates" => Self::Instantiates,
            "field_access" => Self::FieldAccess,
            _ => Self::Calls,
        }
    }
}

/// A directed edge in the in-memory dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Source symbol ID.
    pub source_id: i64,
    /// Target symbol ID.
    pub target_id: i64,
    /// Kind of dependency.
    pub kind: DependencyKind,
}

/// An import statement extracted from source code, used for dependency
/// graph construction before the imported name is resolved to a symbol.
#[derive(Debug, Clone)]
pub struct ImportStatement {
    /// The raw import path (e.g. "os.path", "crate::config", "./utils").
    pub import_path: String,
    /// Optional specific names imported (e.g. ["Config", "load"]).
    pub imported_names: Vec<String>,
    /// Line number where the import appears.
    pub line: u32,
    /// Kind of dependency this import represents.
    pub kind: DependencyKind,
}

/// A persisted relationship between a chunk and another file or chunk,
/// surfaced by the full-text/git-history providers and consumed by the
/// neighbor expander.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Database ID (0 if not yet persisted).
    pub id: i64,
    /// Chunk this link originates from.
    pub source_chunk_id: i64,
    /// File the link points at.
    pub target_file_id: i64,
    /// Specific chunk the link points at, if resolved to one.
    pub target_chunk_id: Option<i64>,
    /// Kind of link (reuses `DependencyKind` plus a catch-all).
    pub kind: DependencyKind,
    /// Human-readable label for rendering (e.g. a commit subject).
    pub label: Option<String>,
    /// Confidence/relevance score for this link, if computed.
    pub score: Option<f64>,
}

// ---------------------------------------------------------------------------
// Bootstrap progress
// ---------------------------------------------------------------------------

/// Status of a single file's initial-bootstrap processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BootstrapStatus {
    /// Queued, not yet picked up.
    Pending,
    /// Currently being chunked/embedded.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error; `error` on `BootstrapProgress` carries the reason.
    Failed,
}

impl BootstrapStatus {
    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Parse from database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "PROCESSING" => Self::Processing,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Per-file row tracking initial bootstrap progress, so a crash or restart
/// can resume rather than rescanning from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapProgress {
    /// Path relative to the repository root (primary key).
    pub relative_path: String,
    /// Current status.
    pub status: BootstrapStatus,
    /// Error message, if `status == Failed`.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Query / search types
// ---------------------------------------------------------------------------

/// A search result with scoring details, before rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched chunk.
    pub chunk: Chunk,
    /// File path of the matched chunk, relative to the repository root.
    pub file_path: PathBuf,
    /// Overall relevance score (higher is better).
    pub score: f64,
    /// Breakdown of how the score was computed (for debugging).
    pub score_breakdown: ScoreBreakdown,
}

/// Detailed scoring breakdown for a search result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Per-provider rank, keyed by provider name.
    pub provider_ranks: HashMap<String, u32>,
    /// RRF fusion score (before boosting/reranking).
    pub rrf_score: f64,
    /// MMR relevance component used during reranking, if reranked.
    pub mmr_relevance: Option<f64>,
    /// Structural importance weight applied.
    pub structural_weight: f64,
    /// Dependency proximity boost applied.
    pub dependency_boost: f64,
    /// Recency boost applied.
    pub recency_boost: f64,
}

/// An in-memory, rendering-ready snippet produced by the search pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnippet {
    /// Chunk this snippet was derived from.
    pub chunk_id: i64,
    /// Final relevance score after fusion/boost/rerank.
    pub score: f64,
    /// File path, relative to the repository root.
    pub file_path: String,
    /// Optional human-facing label (symbol name, commit subject, etc.).
    pub label: Option<String>,
    /// What kind of construct this snippet represents.
    pub kind: ChunkKind,
    /// Rendered source text.
    pub text: String,
    /// Source language, if known.
    pub language: Option<Language>,
    /// 1-indexed inclusive (start_line, end_line), if known.
    pub offsets: Option<(u32, u32)>,
    /// Free-form rendering metadata (provider name, neighbor distance, ...).
    pub metadata: HashMap<String, String>,
}

/// A token budget for assembling rendered context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Total token budget available for the response.
    pub max_tokens: u32,
    /// Tokens reserved for the surrounding prompt (not available to snippets).
    pub reserve_for_prompt: u32,
}

impl TokenBudget {
    /// Tokens actually available for snippet content.
    pub fn available_for_snippets(&self) -> u32 {
        self.max_tokens.saturating_sub(self.reserve_for_prompt)
    }
}

// ---------------------------------------------------------------------------
// Pipeline events
// ---------------------------------------------------------------------------

/// Events flowing from the watcher into the incremental indexer.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A file was created or modified and needs (re-)indexing.
    FileChanged {
        /// Absolute path to the file.
        path: PathBuf,
    },
    /// A file was deleted and should be removed from the index.
    FileDeleted {
        /// Absolute path to the deleted file.
        path: PathBuf,
    },
    /// A full repository scan is requested.
    FullScan,
    /// Shutdown the pipeline gracefully.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("xyz"), Language::Unknown);
    }

    #[test]
    fn test_chunk_kind_weights() {
        assert!(ChunkKind::Class.default_weight() > ChunkKind::Test.default_weight());
        assert!(ChunkKind::Function.default_weight() > ChunkKind::TopLevel.default_weight());
    }

    #[test]
    fn test_token_budget_available() {
        let budget = TokenBudget { max_tokens: 4000, reserve_for_prompt: 800 };
        assert_eq!(budget.available_for_snippets(), 3200);
    }

    #[test]
    fn test_bootstrap_status_roundtrip() {
        for s in [
            BootstrapStatus::Pending,
            BootstrapStatus::Processing,
            BootstrapStatus::Completed,
            BootstrapStatus::Failed,
        ] {
            assert_eq!(BootstrapStatus::from_str_lossy(s.as_str()), s);
        }
    }
}
