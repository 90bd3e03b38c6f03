//! Immutable search snapshots and the engine that swaps them.
//!
//! A [`Snapshot`] bundles one store with the index built from it and the configuration used to
//! build and query it. It is never mutated: refreshing content means building a new snapshot and
//! replacing the engine's `Arc` in one write. Queries hold their own `Arc`, so a query that
//! started before a swap finishes against the snapshot it started with.

use crate::document::DocumentStore;
use crate::index::{IndexBuilder, InvertedIndex};
use crate::query::{QueryParser, StructuredQuery};
use crate::results::{ResultAssembler, SearchResult, SnippetConfig};
use crate::scoring::{Scorer, ScorerConfig};
use crate::tokenizer::{Tokenizer, TokenizerConfig};
use crate::{DocId, SearchError};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tokenizer: TokenizerConfig,
    pub scorer: ScorerConfig,
    pub snippet: SnippetConfig,
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

/// One page of results plus the number of documents that matched overall.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    pub total_hits: usize,
    pub results: Vec<SearchResult>,
}

#[derive(Debug)]
pub struct Snapshot {
    config: EngineConfig,
    tokenizer: Tokenizer,
    store: DocumentStore,
    index: InvertedIndex,
}

impl Snapshot {
    pub fn build(store: DocumentStore, config: EngineConfig) -> Self {
        let tokenizer = Tokenizer::new(config.tokenizer.clone());
        let index = IndexBuilder::new(&tokenizer).build(&store);
        Self { config, tokenizer, store, index }
    }

    /// Reassemble a snapshot from parts built earlier with `config.tokenizer`.
    pub fn from_parts(store: DocumentStore, index: InvertedIndex, config: EngineConfig) -> Self {
        let tokenizer = Tokenizer::new(config.tokenizer.clone());
        Self { config, tokenizer, store, index }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn parse(&self, query: &str) -> StructuredQuery {
        QueryParser::new(&self.tokenizer).parse(query)
    }

    pub fn rank(&self, query: &StructuredQuery) -> Vec<(DocId, f32)> {
        Scorer::new(&self.config.scorer).score(query, &self.index)
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        Ok(self.search_page(query, limit)?.results)
    }

    pub fn search_page(&self, query: &str, limit: usize) -> Result<SearchPage, SearchError> {
        let structured = self.parse(query);
        if structured.is_empty() {
            return Ok(SearchPage { total_hits: 0, results: Vec::new() });
        }
        let ranked = self.rank(&structured);
        let results = ResultAssembler::new(&self.tokenizer, &self.config.snippet).assemble(
            &ranked,
            &self.store,
            &structured,
            limit,
        )?;
        Ok(SearchPage { total_hits: ranked.len(), results })
    }
}

pub struct SearchEngine {
    current: RwLock<Arc<Snapshot>>,
}

impl SearchEngine {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { current: RwLock::new(Arc::new(snapshot)) }
    }

    pub fn from_store(store: DocumentStore, config: EngineConfig) -> Self {
        Self::new(Snapshot::build(store, config))
    }

    /// The snapshot queries should run against. Holding it pins that version.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Install `snapshot`, returning the one it replaced.
    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(snapshot);
        std::mem::replace(&mut *self.current.write(), next)
    }

    /// Build a snapshot for `store` with the current configuration and swap it in.
    /// The build happens outside the lock; readers are only blocked for the pointer swap.
    pub fn rebuild(&self, store: DocumentStore) -> Arc<Snapshot> {
        let config = self.snapshot().config().clone();
        let snapshot = Snapshot::build(store, config);
        tracing::info!(num_docs = snapshot.index().num_docs(), "swapping in rebuilt snapshot");
        self.replace(snapshot)
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        self.snapshot().search(query, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RawDocument;

    fn store(titles: &[&str]) -> DocumentStore {
        DocumentStore::from_raw(
            titles
                .iter()
                .map(|t| RawDocument {
                    title: Some(t.to_string()),
                    excerpt: Some(format!("All about {t}")),
                    url: Some(format!("/{t}")),
                    ..RawDocument::default()
                })
                .collect(),
        )
    }

    #[test]
    fn snapshot_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Snapshot>();
        assert_send_sync::<SearchEngine>();
    }

    #[test]
    fn swap_leaves_held_snapshots_untouched() {
        let engine = SearchEngine::from_store(store(&["elixir", "lodash"]), EngineConfig::default());
        let before = engine.snapshot();
        let old = engine.rebuild(store(&["rails"]));
        assert!(Arc::ptr_eq(&before, &old));
        assert_eq!(before.search("lodash", 10).unwrap().len(), 1);
        assert!(engine.search("lodash", 10).unwrap().is_empty());
        assert_eq!(engine.search("rails", 10).unwrap()[0].url, "/rails");
    }

    #[test]
    fn pages_report_total_hits_beyond_the_limit() {
        let snapshot = Snapshot::build(store(&["graph one", "graph two", "graph three"]), EngineConfig::default());
        let page = snapshot.search_page("graph", 2).unwrap();
        assert_eq!(page.total_hits, 3);
        assert_eq!(page.results.len(), 2);
    }

    #[test]
    fn config_file_fields_default_individually() {
        let config: EngineConfig = serde_json::from_str(r#"{"scorer": {"k1": 2.0}, "snippet": {"highlight": true}}"#).unwrap();
        assert_eq!(config.scorer.k1, 2.0);
        assert_eq!(config.scorer.b, 0.75);
        assert_eq!(config.scorer.boosts.title, 10.0);
        assert!(config.snippet.highlight);
        assert_eq!(config.snippet.max_chars, 160);
    }
}
