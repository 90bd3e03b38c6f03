use crate::document::{BuildWarning, Document, DocumentStore};
use crate::tokenizer::Tokenizer;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Positions skipped between two values of a multi-valued field, so phrases never span values.
pub const VALUE_POSITION_GAP: u32 = 100;

/// Searchable document fields. `url` is deliberately absent: it is returned, never indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Excerpt,
    Categories,
    Tags,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Title, Field::Excerpt, Field::Categories, Field::Tags];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Excerpt => "excerpt",
            Field::Categories => "categories",
            Field::Tags => "tags",
        }
    }

    /// Case-insensitive field lookup; unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.as_str().eq_ignore_ascii_case(name))
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Token counts per field, indexed in `Field::ALL` order.
pub type FieldLengths = [u32; 4];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub field: Field,
    pub frequency: u32,
    pub positions: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    /// Distinct documents containing the term in any field.
    pub document_frequency: u32,
    /// Sorted by (doc_id, field).
    pub postings: Vec<Posting>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertedIndex {
    terms: BTreeMap<String, TermEntry>,
    field_lengths: BTreeMap<DocId, FieldLengths>,
    field_totals: [u64; 4],
    doc_ids: Vec<DocId>,
    warnings: Vec<BuildWarning>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_docs(&self) -> u32 {
        self.doc_ids.len() as u32
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// Indexed document ids in store order.
    pub fn doc_ids(&self) -> &[DocId] {
        &self.doc_ids
    }

    pub fn term(&self, term: &str) -> Option<&TermEntry> {
        self.terms.get(term)
    }

    pub fn document_frequency(&self, term: &str) -> u32 {
        self.terms.get(term).map_or(0, |e| e.document_frequency)
    }

    /// Vocabulary in sorted order.
    pub fn vocabulary(&self) -> impl Iterator<Item = (&str, &TermEntry)> + '_ {
        self.terms.iter().map(|(t, e)| (t.as_str(), e))
    }

    /// All vocabulary terms starting with `prefix`, via a range scan of the sorted vocabulary.
    pub fn terms_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a TermEntry)> + 'a {
        self.terms
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(t, _)| t.starts_with(prefix))
            .map(|(t, e)| (t.as_str(), e))
    }

    pub fn field_length(&self, doc_id: DocId, field: Field) -> u32 {
        self.field_lengths.get(&doc_id).map_or(0, |l| l[field.slot()])
    }

    pub fn avg_field_length(&self, field: Field) -> f32 {
        if self.doc_ids.is_empty() {
            return 0.0;
        }
        self.field_totals[field.slot()] as f32 / self.doc_ids.len() as f32
    }

    /// Records the store excluded, carried so callers can report them after a build or load.
    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }
}

/// Per-document analysis result, produced independently for each document and merged in order.
struct AnalyzedDocument {
    id: DocId,
    lengths: FieldLengths,
    terms: BTreeMap<(String, Field), Vec<u32>>,
}

pub struct IndexBuilder<'a> {
    tokenizer: &'a Tokenizer,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn build(&self, store: &DocumentStore) -> InvertedIndex {
        for warning in store.rejected() {
            tracing::warn!(%warning, "document excluded from index");
        }

        #[cfg(feature = "parallel")]
        let analyzed: Vec<AnalyzedDocument> =
            store.documents().par_iter().map(|doc| self.analyze_document(doc)).collect();
        #[cfg(not(feature = "parallel"))]
        let analyzed: Vec<AnalyzedDocument> =
            store.documents().iter().map(|doc| self.analyze_document(doc)).collect();

        let mut index = InvertedIndex { warnings: store.rejected().to_vec(), ..InvertedIndex::default() };
        for doc in analyzed {
            for ((term, field), positions) in doc.terms {
                let entry = index.terms.entry(term).or_default();
                if entry.postings.last().map(|p| p.doc_id) != Some(doc.id) {
                    entry.document_frequency += 1;
                }
                entry.postings.push(Posting { doc_id: doc.id, field, frequency: positions.len() as u32, positions });
            }
            for field in Field::ALL {
                index.field_totals[field.slot()] += u64::from(doc.lengths[field.slot()]);
            }
            index.field_lengths.insert(doc.id, doc.lengths);
            index.doc_ids.push(doc.id);
        }

        tracing::info!(
            num_docs = index.num_docs(),
            num_terms = index.num_terms(),
            excluded = index.warnings.len(),
            "built inverted index"
        );
        index
    }

    fn analyze_document(&self, doc: &Document) -> AnalyzedDocument {
        let mut out = AnalyzedDocument { id: doc.id, lengths: [0; 4], terms: BTreeMap::new() };
        self.analyze_values(&mut out, Field::Title, std::slice::from_ref(&doc.title));
        self.analyze_values(&mut out, Field::Excerpt, std::slice::from_ref(&doc.excerpt));
        self.analyze_values(&mut out, Field::Categories, &doc.categories);
        self.analyze_values(&mut out, Field::Tags, &doc.tags);
        out
    }

    fn analyze_values(&self, out: &mut AnalyzedDocument, field: Field, values: &[String]) {
        let mut base = 0u32;
        for value in values {
            let tokens = self.tokenizer.analyze(value);
            let Some(last) = tokens.last() else { continue };
            let next_base = base + last.position + 1 + VALUE_POSITION_GAP;
            out.lengths[field.slot()] += tokens.len() as u32;
            for token in tokens {
                out.terms.entry((token.term, field)).or_default().push(base + token.position);
            }
            base = next_base;
        }
    }
}
