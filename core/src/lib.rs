pub mod document;
pub mod engine;
pub mod fuzzy;
pub mod index;
pub mod persist;
pub mod query;
pub mod results;
pub mod scoring;
pub mod tokenizer;

pub use document::{BuildWarning, Document, DocumentStore, RawDocument};
pub use engine::{EngineConfig, SearchEngine, SearchPage, Snapshot, DEFAULT_LIMIT};
pub use index::{Field, IndexBuilder, InvertedIndex, Posting, TermEntry};
pub use query::{QueryParser, StructuredQuery};
pub use results::{ResultAssembler, SearchResult, SnippetConfig};
pub use scoring::{Scorer, ScorerConfig};
pub use tokenizer::{Tokenizer, TokenizerConfig};

/// Position of a record in its source store.
pub type DocId = u32;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A ranked id has no document: the index and store come from different snapshots.
    #[error("document {0} is ranked by the index but missing from the store; index and store snapshots are mismatched")]
    SnapshotMismatch(DocId),
    #[error("malformed document store: {0}")]
    StoreFormat(String),
    /// A persisted file was written by a different save than the rest of the snapshot.
    #[error("{file} does not belong to this snapshot (expected {expected}, found {found})")]
    StaleSnapshotFile { file: String, expected: String, found: String },
    #[error("unsupported index format version {found} (expected {expected})")]
    IndexVersion { found: u32, expected: u32 },
}
