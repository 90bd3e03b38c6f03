//! Okapi BM25 per field, combined across clauses.
//!
//! A document's score is the sum of its clause scores. A term clause contributes, for every
//! field it occurs in,
//!
//! ```text
//! field_boost * clause_boost * idf(t) * tf * (k1 + 1) / (tf + k1 * (1 - b + b * len / avg_len))
//! ```
//!
//! with `idf(t) = ln(1 + (N - df + 0.5) / (df + 0.5))`, which stays positive even for terms in
//! every document. Ranking is deterministic: score descending, then store order.

use crate::fuzzy;
use crate::index::{Field, InvertedIndex, Posting, TermEntry};
use crate::query::{Clause, Matcher, Presence, StructuredQuery};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldBoosts {
    pub title: f32,
    pub excerpt: f32,
    pub categories: f32,
    pub tags: f32,
}

impl Default for FieldBoosts {
    fn default() -> Self {
        Self { title: 10.0, excerpt: 1.0, categories: 3.0, tags: 5.0 }
    }
}

impl FieldBoosts {
    pub fn get(&self, field: Field) -> f32 {
        match field {
            Field::Title => self.title,
            Field::Excerpt => self.excerpt,
            Field::Categories => self.categories,
            Field::Tags => self.tags,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Field-length normalization strength, 0 disables it.
    pub b: f32,
    pub boosts: FieldBoosts,
    /// Weight of the extra credit a phrase earns on top of its terms.
    pub phrase_boost: f32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75, boosts: FieldBoosts::default(), phrase_boost: 1.0 }
    }
}

pub struct Scorer<'a> {
    config: &'a ScorerConfig,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a ScorerConfig) -> Self {
        Self { config }
    }

    /// Rank every document matching `query`. Documents matching no positive clause, missing a
    /// required clause, or hit by a prohibited clause are left out.
    pub fn score(&self, query: &StructuredQuery, index: &InvertedIndex) -> Vec<(DocId, f32)> {
        let mut totals: BTreeMap<DocId, f32> = BTreeMap::new();
        let mut required_hits: HashMap<DocId, usize> = HashMap::new();
        let mut prohibited: HashSet<DocId> = HashSet::new();
        let mut required = 0usize;

        for clause in &query.clauses {
            let hits = self.clause_scores(clause, index);
            match clause.presence {
                Presence::Prohibited => prohibited.extend(hits.keys().copied()),
                Presence::Required => {
                    required += 1;
                    for (doc_id, score) in hits {
                        *required_hits.entry(doc_id).or_default() += 1;
                        *totals.entry(doc_id).or_default() += score;
                    }
                }
                Presence::Optional => {
                    for (doc_id, score) in hits {
                        *totals.entry(doc_id).or_default() += score;
                    }
                }
            }
        }

        let mut ranked: Vec<(DocId, f32)> = totals
            .into_iter()
            .filter(|(doc_id, _)| !prohibited.contains(doc_id))
            .filter(|(doc_id, _)| required_hits.get(doc_id).copied().unwrap_or(0) == required)
            .filter(|&(_, score)| score > 0.0)
            .collect();
        // ids ascend in store order, so this is a stable store-order tie-break
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    fn clause_scores(&self, clause: &Clause, index: &InvertedIndex) -> HashMap<DocId, f32> {
        let mut hits = HashMap::new();
        let fields = clause.scope.fields();
        if fields.is_empty() {
            return hits;
        }
        match &clause.matcher {
            Matcher::Term(term) => {
                if let Some(entry) = index.term(term) {
                    self.add_term(&mut hits, index, entry, fields, clause.boost);
                }
            }
            Matcher::Prefix(prefix) => {
                for (_, entry) in index.terms_with_prefix(prefix) {
                    self.add_term(&mut hits, index, entry, fields, clause.boost);
                }
            }
            Matcher::Fuzzy { term, distance } => {
                for (_, entry) in fuzzy::expand(index, term, *distance) {
                    self.add_term(&mut hits, index, entry, fields, clause.boost);
                }
            }
            Matcher::Phrase(terms) => self.add_phrase(&mut hits, index, terms, fields, clause.boost),
        }
        hits
    }

    fn add_term(&self, hits: &mut HashMap<DocId, f32>, index: &InvertedIndex, entry: &TermEntry, fields: &[Field], boost: f32) {
        let idf = self.idf(index.num_docs(), entry.document_frequency);
        for posting in entry.postings.iter().filter(|p| fields.contains(&p.field)) {
            let tf = self.saturate(index, posting.doc_id, posting.field, posting.frequency);
            let contribution = boost * self.config.boosts.get(posting.field) * idf * tf;
            // a field weighted to zero does not count as a match
            if contribution > 0.0 {
                *hits.entry(posting.doc_id).or_default() += contribution;
            }
        }
    }

    /// A phrase scores as the bag of its terms plus a bonus for every field holding the
    /// contiguous sequence, so it never ranks below the equivalent term query.
    fn add_phrase(&self, hits: &mut HashMap<DocId, f32>, index: &InvertedIndex, terms: &[String], fields: &[Field], boost: f32) {
        let Some(entries) = terms.iter().map(|t| index.term(t)).collect::<Option<Vec<&TermEntry>>>() else {
            return;
        };
        let Some((head, tail)) = entries.split_first() else {
            return;
        };
        let idf_sum: f32 = entries.iter().map(|e| self.idf(index.num_docs(), e.document_frequency)).sum();

        let mut bonus: HashMap<DocId, f32> = HashMap::new();
        for first in head.postings.iter().filter(|p| fields.contains(&p.field)) {
            let Some(rest) = tail
                .iter()
                .map(|e| find_posting(e, first.doc_id, first.field))
                .collect::<Option<Vec<&Posting>>>()
            else {
                continue;
            };
            let occurrences = count_phrase(first, &rest);
            if occurrences == 0 {
                continue;
            }
            let tf = self.saturate(index, first.doc_id, first.field, occurrences);
            let extra = self.config.phrase_boost * boost * self.config.boosts.get(first.field) * idf_sum * tf;
            if extra > 0.0 {
                *bonus.entry(first.doc_id).or_default() += extra;
            }
        }
        if bonus.is_empty() {
            return;
        }

        let mut bag = HashMap::new();
        for entry in &entries {
            self.add_term(&mut bag, index, entry, fields, boost);
        }
        for (doc_id, extra) in bonus {
            *hits.entry(doc_id).or_default() += bag.get(&doc_id).copied().unwrap_or(0.0) + extra;
        }
    }

    fn idf(&self, num_docs: u32, df: u32) -> f32 {
        let n = num_docs as f32;
        let df = df as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn saturate(&self, index: &InvertedIndex, doc_id: DocId, field: Field, frequency: u32) -> f32 {
        let tf = frequency as f32;
        let avg = index.avg_field_length(field);
        let norm = if avg > 0.0 {
            1.0 - self.config.b + self.config.b * index.field_length(doc_id, field) as f32 / avg
        } else {
            1.0
        };
        tf * (self.config.k1 + 1.0) / (tf + self.config.k1 * norm)
    }
}

fn find_posting(entry: &TermEntry, doc_id: DocId, field: Field) -> Option<&Posting> {
    entry
        .postings
        .binary_search_by(|p| (p.doc_id, p.field).cmp(&(doc_id, field)))
        .ok()
        .map(|i| &entry.postings[i])
}

/// Number of start positions in `first` followed by each posting in `rest` at consecutive positions.
fn count_phrase(first: &Posting, rest: &[&Posting]) -> u32 {
    first
        .positions
        .iter()
        .filter(|&&start| {
            rest.iter()
                .enumerate()
                .all(|(i, p)| p.positions.binary_search(&(start + i as u32 + 1)).is_ok())
        })
        .count() as u32
}
