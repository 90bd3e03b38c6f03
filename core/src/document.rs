//! Typed blog-post records and the immutable store that owns them.
//!
//! Records arrive loosely typed (a JSON array, or the `var store = [...]` script a static
//! site generates for client-side search). Each record is validated once, at load time;
//! records missing a required field are excluded and reported as [`BuildWarning`]s.

use crate::{DocId, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A record exactly as found in the source store. Every field is optional so that shape
/// problems surface as warnings instead of deserialization failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub teaser: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub excerpt: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub url: String,
    pub teaser: Option<String>,
}

impl Document {
    /// Text used for snippets: the excerpt, or the teaser when the excerpt is blank.
    pub fn display_text(&self) -> &str {
        if self.excerpt.trim().is_empty() {
            self.teaser.as_deref().unwrap_or("")
        } else {
            &self.excerpt
        }
    }
}

/// A record excluded from the store because a required field was missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildWarning {
    /// Position of the record in the source sequence (the id it would have had).
    pub position: DocId,
    pub missing: Vec<String>,
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {} excluded: missing {}", self.position, self.missing.join(", "))
    }
}

/// Immutable, ordered collection of validated documents. Ids are source positions, so they
/// are stable for the lifetime of the store and ascending in store order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStore {
    docs: Vec<Document>,
    rejected: Vec<BuildWarning>,
}

impl DocumentStore {
    pub fn from_raw(records: Vec<RawDocument>) -> Self {
        let mut docs = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();
        for (pos, raw) in records.into_iter().enumerate() {
            let id = pos as DocId;
            match validate(id, raw) {
                Ok(doc) => docs.push(doc),
                Err(warning) => {
                    tracing::debug!(position = warning.position, missing = ?warning.missing, "rejecting store record");
                    rejected.push(warning);
                }
            }
        }
        Self { docs, rejected }
    }

    /// Parse a JSON array of records.
    pub fn from_json(json: &str) -> Result<Self, SearchError> {
        let records: Vec<RawDocument> =
            serde_json::from_str(json).map_err(|e| SearchError::StoreFormat(e.to_string()))?;
        Ok(Self::from_raw(records))
    }

    /// Parse either a bare JSON array or a generated `lunr-store.js` (`var store = [...];`).
    pub fn from_store_text(text: &str) -> Result<Self, SearchError> {
        let trimmed = text.trim_start_matches('\u{feff}').trim();
        if trimmed.starts_with('[') {
            return Self::from_json(trimmed);
        }
        let start = trimmed
            .find('[')
            .ok_or_else(|| SearchError::StoreFormat("no record array found".into()))?;
        let end = trimmed
            .rfind(']')
            .filter(|&end| end > start)
            .ok_or_else(|| SearchError::StoreFormat("unterminated record array".into()))?;
        Self::from_json(&trimmed[start..=end])
    }

    pub fn get(&self, id: DocId) -> Option<&Document> {
        // ids ascend with position, so the store is always sorted by id
        self.docs.binary_search_by_key(&id, |d| d.id).ok().map(|i| &self.docs[i])
    }

    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    pub fn rejected(&self) -> &[BuildWarning] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

fn validate(id: DocId, raw: RawDocument) -> Result<Document, BuildWarning> {
    let mut missing = Vec::new();
    if raw.title.is_none() {
        missing.push("title".to_string());
    }
    if raw.excerpt.is_none() {
        missing.push("excerpt".to_string());
    }
    if raw.url.is_none() {
        missing.push("url".to_string());
    }
    match (raw.title, raw.excerpt, raw.url) {
        (Some(title), Some(excerpt), Some(url)) => Ok(Document {
            id,
            title,
            excerpt,
            categories: dedup(raw.categories.unwrap_or_default()),
            tags: dedup(raw.tags.unwrap_or_default()),
            url,
            teaser: raw.teaser.filter(|t| !t.trim().is_empty()),
        }),
        _ => Err(BuildWarning { position: id, missing }),
    }
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}
