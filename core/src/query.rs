//! Query syntax.
//!
//! A query is a whitespace-separated list of clauses; double quotes group a phrase.
//! Each clause may carry, in order:
//!
//! ```text
//! [+|-] [field:] ( word | word* | word~N | "a phrase" ) [^boost]
//! ```
//!
//! Parsing never fails. Fragments that cannot be interpreted are dropped, and clauses scoped
//! to an unknown field are kept but match nothing, so one bad clause leaves the rest intact.

use crate::fuzzy::{bounded_distance, MAX_EDIT_DISTANCE};
use crate::index::Field;
use crate::tokenizer::Tokenizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldScope {
    All,
    Field(Field),
    Unknown(String),
}

impl FieldScope {
    /// Fields a clause with this scope is evaluated against. Empty for unknown fields.
    pub fn fields(&self) -> &[Field] {
        match self {
            FieldScope::All => &Field::ALL,
            FieldScope::Field(field) => std::slice::from_ref(field),
            FieldScope::Unknown(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Optional,
    Required,
    Prohibited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Term(String),
    /// Two or more terms that must occur contiguously and in order within one field.
    Phrase(Vec<String>),
    Prefix(String),
    Fuzzy { term: String, distance: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub scope: FieldScope,
    pub matcher: Matcher,
    pub presence: Presence,
    pub boost: f32,
}

impl Clause {
    /// Whether an indexed term is one this clause would match.
    pub fn matches_term(&self, term: &str) -> bool {
        match &self.matcher {
            Matcher::Term(t) => t == term,
            Matcher::Phrase(terms) => terms.iter().any(|t| t == term),
            Matcher::Prefix(prefix) => term.starts_with(prefix.as_str()),
            Matcher::Fuzzy { term: t, distance } => bounded_distance(t, term, usize::from(*distance)).is_some(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredQuery {
    pub clauses: Vec<Clause>,
}

impl StructuredQuery {
    /// An empty query matches nothing.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// True when an indexed term is wanted by any non-prohibited clause on a known field.
    pub fn highlights(&self, term: &str) -> bool {
        self.clauses
            .iter()
            .filter(|c| c.presence != Presence::Prohibited && !c.scope.fields().is_empty())
            .any(|c| c.matches_term(term))
    }
}

pub struct QueryParser<'a> {
    tokenizer: &'a Tokenizer,
}

impl<'a> QueryParser<'a> {
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn parse(&self, query: &str) -> StructuredQuery {
        let clauses: Vec<Clause> = split_clauses(query).into_iter().flat_map(|chunk| self.parse_clause(chunk)).collect();
        tracing::debug!(query, clauses = clauses.len(), "parsed query");
        StructuredQuery { clauses }
    }

    fn parse_clause(&self, chunk: &str) -> Vec<Clause> {
        let (presence, rest) = match chunk.chars().next() {
            Some('+') => (Presence::Required, &chunk[1..]),
            Some('-') => (Presence::Prohibited, &chunk[1..]),
            _ => (Presence::Optional, chunk),
        };
        let (scope, value) = split_field(rest);

        let (matchers, modifiers) = if let Some(quoted) = value.strip_prefix('"') {
            let (inner, modifiers) = match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            };
            (self.phrase(inner), modifiers)
        } else {
            let split = value.find(|c: char| c == '~' || c == '^').unwrap_or(value.len());
            let (body, modifiers) = value.split_at(split);
            let fuzzy = parse_fuzzy(modifiers);
            (self.word(body, fuzzy), modifiers)
        };

        let boost = parse_boost(modifiers).unwrap_or(1.0);
        matchers
            .into_iter()
            .map(|matcher| Clause { scope: scope.clone(), matcher, presence, boost })
            .collect()
    }

    fn phrase(&self, text: &str) -> Vec<Matcher> {
        let mut terms = self.tokenizer.tokenize(text);
        match terms.len() {
            0 => Vec::new(),
            1 => vec![Matcher::Term(terms.remove(0))],
            _ => vec![Matcher::Phrase(terms)],
        }
    }

    fn word(&self, body: &str, fuzzy: Option<u8>) -> Vec<Matcher> {
        if let Some(stem) = body.strip_suffix('*') {
            let mut pieces = self.tokenizer.normalize_word(stem.trim_end_matches('*'));
            let Some(prefix) = pieces.pop() else {
                tracing::debug!(body, "dropping bare wildcard");
                return Vec::new();
            };
            let mut matchers: Vec<Matcher> = pieces.iter().flat_map(|p| self.tokenizer.tokenize(p)).map(Matcher::Term).collect();
            matchers.push(Matcher::Prefix(prefix));
            return matchers;
        }
        let terms = self.tokenizer.tokenize(body);
        match fuzzy {
            Some(distance) => terms.into_iter().map(|term| Matcher::Fuzzy { term, distance }).collect(),
            None => terms.into_iter().map(Matcher::Term).collect(),
        }
    }
}

/// Split on whitespace outside double quotes.
fn split_clauses(query: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start: Option<usize> = None;
    let mut quoted = false;
    for (i, c) in query.char_indices() {
        if c == '"' {
            quoted = !quoted;
        }
        if c.is_whitespace() && !quoted {
            if let Some(s) = start.take() {
                chunks.push(&query[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        chunks.push(&query[s..]);
    }
    chunks
}

fn split_field(clause: &str) -> (FieldScope, &str) {
    let Some(colon) = clause.find(':') else {
        return (FieldScope::All, clause);
    };
    let name = &clause[..colon];
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return (FieldScope::All, clause);
    }
    let scope = match Field::parse(name) {
        Some(field) => FieldScope::Field(field),
        None => {
            tracing::debug!(field = name, "unknown field in query clause");
            FieldScope::Unknown(name.to_string())
        }
    };
    (scope, &clause[colon + 1..])
}

/// `~` with no number means distance 1.
fn parse_fuzzy(modifiers: &str) -> Option<u8> {
    let rest = &modifiers[modifiers.find('~')? + 1..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Some(1);
    }
    let distance = digits.parse::<u32>().unwrap_or(u32::MAX);
    Some(distance.min(u32::from(MAX_EDIT_DISTANCE)) as u8)
}

fn parse_boost(modifiers: &str) -> Option<f32> {
    let raw = &modifiers[modifiers.find('^')? + 1..];
    let end = raw.find('~').unwrap_or(raw.len());
    match raw[..end].parse::<f32>() {
        Ok(boost) if boost.is_finite() && boost > 0.0 => Some(boost),
        _ => {
            tracing::debug!(modifier = raw, "ignoring invalid boost");
            None
        }
    }
}
