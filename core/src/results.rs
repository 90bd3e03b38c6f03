use crate::document::{Document, DocumentStore};
use crate::query::StructuredQuery;
use crate::tokenizer::{Token, Tokenizer};
use crate::{DocId, SearchError};
use serde::{Deserialize, Serialize};

const ELLIPSIS: &str = "…";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetConfig {
    /// Maximum snippet length in characters, not counting ellipses or highlight tags.
    pub max_chars: usize,
    /// Wrap matched words in `<mark>` tags.
    pub highlight: bool,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self { max_chars: 160, highlight: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub doc_id: DocId,
    pub url: String,
    pub title: String,
    pub score: f32,
    pub snippet: String,
}

pub struct ResultAssembler<'a> {
    tokenizer: &'a Tokenizer,
    config: &'a SnippetConfig,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(tokenizer: &'a Tokenizer, config: &'a SnippetConfig) -> Self {
        Self { tokenizer, config }
    }

    /// Turn the top `limit` ranked ids into results. A ranked id absent from the store means the
    /// index was built from a different store snapshot; that is reported, never skipped.
    pub fn assemble(
        &self,
        ranked: &[(DocId, f32)],
        store: &DocumentStore,
        query: &StructuredQuery,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        ranked
            .iter()
            .take(limit)
            .map(|&(doc_id, score)| {
                let Some(doc) = store.get(doc_id) else {
                    tracing::error!(doc_id, "ranked document missing from store");
                    return Err(SearchError::SnapshotMismatch(doc_id));
                };
                Ok(SearchResult {
                    doc_id,
                    url: doc.url.clone(),
                    title: doc.title.clone(),
                    score,
                    snippet: self.snippet(doc, query),
                })
            })
            .collect()
    }

    pub fn snippet(&self, doc: &Document, query: &StructuredQuery) -> String {
        let text = doc.display_text();
        let tokens = self.tokenizer.analyze(text);
        let matched: Vec<bool> = tokens.iter().map(|t| query.highlights(&t.term)).collect();
        if !matched.contains(&true) {
            return self.prefix(text);
        }

        let (first, last) = self.densest_window(text, &tokens, &matched);
        let mut start = tokens[first].start;
        let mut end = tokens[last].end;
        // leading and trailing punctuation rides along only while the span stays within bounds
        if first == 0 && text[..end].chars().count() <= self.config.max_chars {
            start = 0;
        }
        if last + 1 == tokens.len() && text[start..].chars().count() <= self.config.max_chars {
            end = text.len();
        }

        let mut out = String::new();
        if has_words(&text[..start]) {
            out.push_str(ELLIPSIS);
        }
        if self.config.highlight {
            out.push_str(&highlight(text, start, end, &tokens[first..=last], &matched[first..=last]));
        } else {
            out.push_str(&text[start..end]);
        }
        if has_words(&text[end..]) {
            out.push_str(ELLIPSIS);
        }
        out
    }

    /// Token range `[first, last]` fitting in `max_chars` that holds the most matched tokens.
    /// Among equally dense windows the one with matches closest to its centre wins, then the earliest.
    fn densest_window(&self, text: &str, tokens: &[Token], matched: &[bool]) -> (usize, usize) {
        let mut best = (0, 0, 0usize, usize::MAX);
        for first in 0..tokens.len() {
            let mut last = first;
            let mut hits = usize::from(matched[first]);
            while last + 1 < tokens.len()
                && text[tokens[first].start..tokens[last + 1].end].chars().count() <= self.config.max_chars
            {
                last += 1;
                hits += usize::from(matched[last]);
            }
            if hits == 0 || hits < best.2 {
                continue;
            }
            let imbalance = imbalance(text, &tokens[first..=last], &matched[first..=last]);
            if hits > best.2 || imbalance < best.3 {
                best = (first, last, hits, imbalance);
            }
        }
        (best.0, best.1)
    }

    fn prefix(&self, text: &str) -> String {
        let text = text.trim();
        if text.chars().count() <= self.config.max_chars {
            return text.to_string();
        }
        let cut = text.char_indices().nth(self.config.max_chars).map_or(text.len(), |(i, _)| i);
        // back off to the last word boundary when there is one
        let cut = if text[cut..].starts_with(char::is_whitespace) {
            cut
        } else {
            text[..cut].rfind(char::is_whitespace).filter(|&i| i > 0).unwrap_or(cut)
        };
        format!("{}{}", text[..cut].trim_end(), ELLIPSIS)
    }
}

fn has_words(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

/// Difference in characters between the context before the first match and after the last.
fn imbalance(text: &str, tokens: &[Token], matched: &[bool]) -> usize {
    let (Some(first_hit), Some(last_hit)) = (matched.iter().position(|&m| m), matched.iter().rposition(|&m| m)) else {
        return usize::MAX;
    };
    let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
        return usize::MAX;
    };
    let before = text[first.start..tokens[first_hit].start].chars().count();
    let after = text[tokens[last_hit].end..last.end].chars().count();
    before.abs_diff(after)
}

fn highlight(text: &str, start: usize, end: usize, tokens: &[Token], matched: &[bool]) -> String {
    let mut out = String::new();
    let mut cursor = start;
    for (token, &hit) in tokens.iter().zip(matched) {
        // pieces of one decomposed word share a source span
        if !hit || token.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..token.start]);
        out.push_str("<mark>");
        out.push_str(&text[token.start..token.end]);
        out.push_str("</mark>");
        cursor = token.end;
    }
    out.push_str(&text[cursor..end]);
    out
}
