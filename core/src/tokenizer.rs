use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Stemming is repeated until the output stops changing so that re-tokenizing a term is a no-op.
const MAX_STEM_PASSES: usize = 8;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"[\p{L}\p{N}\p{M}]+").expect("valid regex");
    static ref ENGLISH_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "d","did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "ll","m","me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "re","s","same","she","should","so","some","such",
            "t","than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","ve","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Snowball stemmer languages exposed through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Danish,
    Dutch,
    English,
    Finnish,
    French,
    German,
    Italian,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
}

impl Language {
    fn algorithm(self) -> Algorithm {
        match self {
            Language::Danish => Algorithm::Danish,
            Language::Dutch => Algorithm::Dutch,
            Language::English => Algorithm::English,
            Language::Finnish => Algorithm::Finnish,
            Language::French => Algorithm::French,
            Language::German => Algorithm::German,
            Language::Italian => Algorithm::Italian,
            Language::Norwegian => Algorithm::Norwegian,
            Language::Portuguese => Algorithm::Portuguese,
            Language::Romanian => Algorithm::Romanian,
            Language::Russian => Algorithm::Russian,
            Language::Spanish => Algorithm::Spanish,
            Language::Swedish => Algorithm::Swedish,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "language", rename_all = "lowercase")]
pub enum Stemming {
    None,
    Snowball(Language),
}

impl Default for Stemming {
    fn default() -> Self {
        Stemming::Snowball(Language::English)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "words", rename_all = "lowercase")]
pub enum StopWords {
    None,
    English,
    Custom(Vec<String>),
}

impl Default for StopWords {
    fn default() -> Self {
        StopWords::English
    }
}

/// Normalization profile. Two tokenizers built from equal configs produce identical terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub stemming: Stemming,
    #[serde(default)]
    pub stop_words: StopWords,
}

/// A normalized term together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    /// Ordinal among emitted terms; stop words do not consume a position.
    pub position: u32,
    /// Byte range of the source word in the analyzed text.
    pub start: usize,
    pub end: usize,
}

pub struct Tokenizer {
    config: TokenizerConfig,
    stemmer: Option<Stemmer>,
    stop_words: HashSet<String>,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer").field("config", &self.config).finish()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        let stemmer = match config.stemming {
            Stemming::None => None,
            Stemming::Snowball(lang) => Some(Stemmer::create(lang.algorithm())),
        };
        let stop_words = match &config.stop_words {
            StopWords::None => HashSet::new(),
            StopWords::English => ENGLISH_STOPWORDS.iter().map(|w| w.to_string()).collect(),
            StopWords::Custom(words) => words.iter().flat_map(|w| fold_pieces(w)).collect(),
        };
        Self { config, stemmer, stop_words }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Tokenize text into positioned terms: lowercase, diacritic folding, stopword removal and stemming.
    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;
        for mat in WORD_RE.find_iter(text) {
            for piece in fold_pieces(mat.as_str()) {
                if self.is_stopword(&piece) {
                    continue;
                }
                let term = self.stem(&piece);
                // a stem can collide with a stop word; dropping it keeps re-tokenizing stable
                if term.is_empty() || self.is_stopword(&term) {
                    continue;
                }
                tokens.push(Token { term, position, start: mat.start(), end: mat.end() });
                position += 1;
            }
        }
        tokens
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.analyze(text).into_iter().map(|t| t.term).collect()
    }

    /// Lowercase and fold a raw word without stemming or stopword removal.
    /// Used for wildcard prefixes, which must match stems by their leading characters.
    pub fn normalize_word(&self, word: &str) -> Vec<String> {
        WORD_RE.find_iter(word).flat_map(|m| fold_pieces(m.as_str())).collect()
    }

    fn is_stopword(&self, token: &str) -> bool {
        self.stop_words.contains(token)
    }

    fn stem(&self, word: &str) -> String {
        let Some(stemmer) = &self.stemmer else {
            return word.to_string();
        };
        let mut current = word.to_string();
        for _ in 0..MAX_STEM_PASSES {
            let next = stemmer.stem(&current).into_owned();
            if next == current {
                break;
            }
            current = next;
        }
        current
    }
}

/// Decompose, strip combining marks, split on anything that is no longer alphanumeric, then
/// lowercase each piece. Compatibility decomposition can introduce separators (`½` -> `1⁄2`) and
/// capitals (`𝐍` -> `N`), so case folding has to come last.
fn fold_pieces(word: &str) -> Vec<String> {
    let decomposed = strip_marks(word);
    decomposed
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        // lowercasing can itself add marks (`İ` -> `i̇`)
        .map(|piece| strip_marks(&piece.to_lowercase()))
        .collect()
}

fn strip_marks(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}
