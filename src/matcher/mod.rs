//! Multi-pattern keyword matching
//!
//! The keyword set is fixed for the duration of a run, so it is compiled once
//! into an Aho-Corasick automaton and every document is scanned in a single
//! pass regardless of how many keywords are watched.
//!
//! - Case-insensitive keywords are matched against a lowercased copy of the text
//! - Whole-word keywords require a non-alphanumeric character (or the start/end
//!   of the text) on both sides of the occurrence, checked in the original text
//! - Overlapping occurrences are all counted
//! - Batches of documents are matched in parallel with rayon; the caller gets
//!   the records back in input order and merges them serially
//!
//! # Example
//!
//! ```
//! use legiswatch::matcher::{KeywordMatcher, KeywordSet, MatchOptions};
//! use legiswatch::models::Document;
//!
//! let options = MatchOptions { case_sensitive: false, whole_word: true, ..Default::default() };
//! let keywords = KeywordSet::new(["bitcoin"], &options).unwrap();
//! let matcher = KeywordMatcher::new(&keywords).unwrap();
//!
//! let doc = Document::new("doc-1", "", "Bitcoin and bitcoins");
//! let records = matcher.match_document(&doc);
//! assert_eq!(records[0].occurrence_count, 1);
//! ```

use aho_corasick::{AhoCorasick, MatchKind};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::{ErrorCategory, LegiswatchErrorTrait};
use crate::models::{Document, MatchRecord};

/// Errors raised while loading the keyword set
#[derive(Debug, Error)]
pub enum MatchConfigError {
    #[error("Keyword at position {position} is empty")]
    EmptyKeyword { position: usize },

    #[error("Keyword '{keyword}' is shorter than the minimum length of {min}")]
    TooShort { keyword: String, min: usize },

    #[error("Failed to read keyword file {}: {source}", path.display())]
    KeywordFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build keyword automaton: {0}")]
    Automaton(String),
}

impl LegiswatchErrorTrait for MatchConfigError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Config
    }
}

/// Options applied to every keyword of a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Match keywords with their exact casing
    pub case_sensitive: bool,

    /// Only count occurrences bounded by non-alphanumeric characters
    pub whole_word: bool,

    /// Minimum keyword length in characters
    pub min_keyword_length: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            whole_word: false,
            min_keyword_length: 1,
        }
    }
}

/// A normalized watched term with its match-mode flags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keyword {
    text: String,
    case_sensitive: bool,
    whole_word: bool,
}

impl Keyword {
    /// Normalize a raw keyword
    ///
    /// Surrounding whitespace is trimmed and, for case-insensitive matching,
    /// the keyword is lowercased. `position` is only used for error reporting.
    pub fn new(raw: &str, options: &MatchOptions, position: usize) -> Result<Self, MatchConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MatchConfigError::EmptyKeyword { position });
        }
        if trimmed.chars().count() < options.min_keyword_length {
            return Err(MatchConfigError::TooShort {
                keyword: trimmed.to_string(),
                min: options.min_keyword_length,
            });
        }

        let text = if options.case_sensitive {
            trimmed.to_string()
        } else {
            FoldedText::new(trimmed).text
        };

        Ok(Self {
            text,
            case_sensitive: options.case_sensitive,
            whole_word: options.whole_word,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn whole_word(&self) -> bool {
        self.whole_word
    }
}

/// Immutable set of keywords loaded once per run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
}

impl KeywordSet {
    /// Build a keyword set, rejecting empty keywords
    ///
    /// Keywords that normalize to the same text are collapsed; the first
    /// occurrence keeps its position in the set.
    pub fn new<I, S>(raw: I, options: &MatchOptions) -> Result<Self, MatchConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords = Vec::new();
        let mut seen = HashSet::new();

        for (position, item) in raw.into_iter().enumerate() {
            let keyword = Keyword::new(item.as_ref(), options, position)?;
            if seen.insert(keyword.text.clone()) {
                keywords.push(keyword);
            }
        }

        Ok(Self { keywords })
    }

    /// Read keywords from a text file, one per line
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn read_file(path: &Path) -> Result<Vec<String>, MatchConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| MatchConfigError::KeywordFile {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect())
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }

    /// Normalized keyword texts in set order
    pub fn texts(&self) -> Vec<&str> {
        self.keywords.iter().map(Keyword::text).collect()
    }
}

/// One compiled automaton plus the mapping back to keyword indices
struct PatternGroup {
    automaton: AhoCorasick,
    keyword_index: Vec<usize>,
}

impl PatternGroup {
    fn build(keywords: &[Keyword], indices: Vec<usize>) -> Result<Option<Self>, MatchConfigError> {
        if indices.is_empty() {
            return Ok(None);
        }

        let patterns: Vec<&str> = indices.iter().map(|&i| keywords[i].text()).collect();
        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&patterns)
            .map_err(|e| MatchConfigError::Automaton(e.to_string()))?;

        Ok(Some(Self {
            automaton,
            keyword_index: indices,
        }))
    }

    /// Add the occurrences found in `haystack` to `counts`
    ///
    /// `bounded` decides whether a span of `haystack` stands as a whole word.
    fn scan<F>(&self, keywords: &[Keyword], haystack: &str, bounded: F, counts: &mut [u64])
    where
        F: Fn(usize, usize) -> bool,
    {
        for found in self.automaton.find_overlapping_iter(haystack) {
            let index = self.keyword_index[found.pattern().as_usize()];
            if keywords[index].whole_word && !bounded(found.start(), found.end()) {
                continue;
            }
            counts[index] += 1;
        }
    }
}

/// Check that the span `start..end` is delimited by non-alphanumerics or the text edges
fn is_word_bounded(haystack: &str, start: usize, end: usize) -> bool {
    let before = haystack[..start].chars().next_back();
    let after = haystack[end..].chars().next();

    before.map_or(true, |c| !c.is_alphanumeric()) && after.map_or(true, |c| !c.is_alphanumeric())
}

/// Lowercased text that remembers where each of its bytes came from
///
/// Lowercasing is done per character, so one original character may expand
/// into several (`İ` becomes `i` plus a combining dot). Word boundaries are
/// judged on the original characters, never on such expansions.
struct FoldedText {
    text: String,
    /// Byte span of the original character behind each byte of `text`
    origin: Vec<Range<usize>>,
}

impl FoldedText {
    fn new(original: &str) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len());

        for (start, c) in original.char_indices() {
            let span = start..start + c.len_utf8();
            for lower in c.to_lowercase() {
                text.push(lower);
                origin.extend(std::iter::repeat(span.clone()).take(lower.len_utf8()));
            }
        }

        Self { text, origin }
    }

    /// Whether the folded span `start..end` is a whole word of `original`
    ///
    /// A span that begins or ends inside the expansion of one character is
    /// part of that character and never a whole word.
    fn is_word_bounded(&self, original: &str, start: usize, end: usize) -> bool {
        if start >= end || end > self.origin.len() {
            return false;
        }
        let starts_char = start == 0 || self.origin[start - 1] != self.origin[start];
        let ends_char = end == self.origin.len() || self.origin[end] != self.origin[end - 1];
        if !starts_char || !ends_char {
            return false;
        }

        is_word_bounded(original, self.origin[start].start, self.origin[end - 1].end)
    }
}

/// Keyword matcher compiled from a [`KeywordSet`]
///
/// Case-sensitive and case-insensitive keywords live in separate automata so
/// that a set can mix both modes while each document is still scanned once
/// per mode.
pub struct KeywordMatcher {
    keywords: Vec<Keyword>,
    exact: Option<PatternGroup>,
    folded: Option<PatternGroup>,
}

impl KeywordMatcher {
    /// Compile the automata for a keyword set
    pub fn new(set: &KeywordSet) -> Result<Self, MatchConfigError> {
        let keywords = set.keywords.clone();

        let (exact, folded): (Vec<usize>, Vec<usize>) =
            (0..keywords.len()).partition(|&i| keywords[i].case_sensitive);

        Ok(Self {
            exact: PatternGroup::build(&keywords, exact)?,
            folded: PatternGroup::build(&keywords, folded)?,
            keywords,
        })
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// Count occurrences of every keyword in `text`, indexed like the keyword set
    pub fn count_occurrences(&self, text: &str) -> Vec<u64> {
        let mut counts = vec![0u64; self.keywords.len()];
        if text.is_empty() || self.keywords.is_empty() {
            return counts;
        }

        if let Some(group) = &self.exact {
            let bounded = |start, end| is_word_bounded(text, start, end);
            group.scan(&self.keywords, text, bounded, &mut counts);
        }
        if let Some(group) = &self.folded {
            let folded = FoldedText::new(text);
            let bounded = |start, end| folded.is_word_bounded(text, start, end);
            group.scan(&self.keywords, &folded.text, bounded, &mut counts);
        }

        counts
    }

    /// Match a single document
    ///
    /// The title and body are scanned together. A document with an empty body
    /// yields no records.
    pub fn match_document(&self, document: &Document) -> Vec<MatchRecord> {
        if document.body.is_empty() || self.keywords.is_empty() {
            return Vec::new();
        }

        let text = if document.title.is_empty() {
            self.count_occurrences(&document.body)
        } else {
            self.count_occurrences(&format!("{}\n{}", document.title, document.body))
        };

        text.into_iter()
            .zip(&self.keywords)
            .filter_map(|(count, keyword)| MatchRecord::new(&document.id, keyword.text(), count))
            .collect()
    }

    /// Match a batch of documents in parallel
    ///
    /// Records are returned grouped by document, in the order of `documents`.
    pub fn match_batch(&self, documents: &[Document]) -> Vec<Vec<MatchRecord>> {
        documents
            .par_iter()
            .map(|document| self.match_document(document))
            .collect()
    }
}

impl std::fmt::Debug for KeywordMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordMatcher")
            .field("keywords", &self.keywords.len())
            .field("exact", &self.exact.as_ref().map(|g| g.keyword_index.len()))
            .field("folded", &self.folded.as_ref().map(|g| g.keyword_index.len()))
            .finish()
    }
}
