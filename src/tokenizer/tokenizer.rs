use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use stop_words::{get, LANGUAGE};
use unicode_segmentation::UnicodeSegmentation;

/// English stop set used by the standard and stop analyzers
pub const LUCENE_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// How raw text is split into candidate tokens
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitMode {
    /// Unicode word boundaries (UAX #29)
    UnicodeWords,
    /// Maximal runs of alphabetic characters
    Letters,
    /// Runs of non-whitespace characters
    Whitespace,
}

/// Stop word list applied after lowercasing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopwordSet {
    None,
    Lucene,
    /// The much larger English list from the `stop-words` crate
    Extended,
}

/// Token pipeline options
#[derive(Clone, Debug)]
pub struct TokenizerOptions {
    pub split: SplitMode,
    pub lowercase: bool,
    pub stopwords: StopwordSet,
    pub stem: bool,
    pub min_token_length: usize,
    pub max_token_length: usize,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            split: SplitMode::UnicodeWords,
            lowercase: true,
            stopwords: StopwordSet::Lucene,
            stem: false,
            min_token_length: 1,
            max_token_length: 255,
        }
    }
}

/// Text tokenizer with stemming and stopword removal
pub struct Tokenizer {
    options: TokenizerOptions,
    stemmer: Option<Stemmer>,
    stopwords: HashSet<String>,
}

impl Tokenizer {
    /// Create a new tokenizer from options
    pub fn new(options: TokenizerOptions) -> Self {
        let stemmer = if options.stem {
            Some(Stemmer::create(Algorithm::English))
        } else {
            None
        };

        let stopwords = match options.stopwords {
            StopwordSet::None => HashSet::new(),
            StopwordSet::Lucene => LUCENE_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
            StopwordSet::Extended => get(LANGUAGE::English)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
        };

        Self {
            options,
            stemmer,
            stopwords,
        }
    }

    pub fn options(&self) -> &TokenizerOptions {
        &self.options
    }

    /// Tokenize text into a vector of terms
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.tokenize_with_positions_ordered(text)
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    /// Normalize a single query-side term without splitting it
    ///
    /// Used for wildcard, prefix, fuzzy and range terms, which Lucene only
    /// lowercases instead of running through the full analysis chain.
    pub fn normalize_term(&self, term: &str) -> String {
        if self.options.lowercase {
            term.to_lowercase()
        } else {
            term.to_string()
        }
    }

    /// Compute term frequencies for a tokenized document
    pub fn compute_term_frequencies(&self, text: &str) -> HashMap<String, u32> {
        let mut freq = HashMap::new();
        for token in self.tokenize(text) {
            *freq.entry(token).or_insert(0) += 1;
        }
        freq
    }

    /// Tokenize and return (term, position) pairs in order
    ///
    /// Positions count every candidate token, so removed stopwords and
    /// out-of-bounds tokens still advance the position.
    pub fn tokenize_with_positions_ordered(&self, text: &str) -> Vec<(String, u32)> {
        let mut results = Vec::new();
        let mut pos = 0u32;

        for word in self.split(text) {
            let mut token = word.to_string();

            if self.options.lowercase {
                token = token.to_lowercase();
            }

            let len = token.chars().count();
            if len < self.options.min_token_length || len > self.options.max_token_length {
                pos += 1;
                continue;
            }

            if self.stopwords.contains(&token) {
                pos += 1;
                continue;
            }

            if let Some(stemmer) = &self.stemmer {
                token = stemmer.stem(&token).to_string();
            }

            results.push((token, pos));
            pos += 1;
        }

        results
    }

    fn split<'a>(&self, text: &'a str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        match self.options.split {
            SplitMode::UnicodeWords => Box::new(text.unicode_words()),
            SplitMode::Letters => Box::new(
                text.split(|c: char| !c.is_alphabetic())
                    .filter(|s| !s.is_empty()),
            ),
            SplitMode::Whitespace => Box::new(text.split_whitespace()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(stopwords: StopwordSet, stem: bool) -> TokenizerOptions {
        TokenizerOptions {
            stopwords,
            stem,
            ..Default::default()
        }
    }

    #[test]
    fn test_basic_tokenization() {
        let tokenizer = Tokenizer::new(options(StopwordSet::None, false));
        let tokens = tokenizer.tokenize("Hello World! This is a test.");

        assert_eq!(tokens, vec!["hello", "world", "this", "is", "a", "test"]);
    }

    #[test]
    fn test_lucene_stopword_removal() {
        let tokenizer = Tokenizer::new(options(StopwordSet::Lucene, false));
        let tokens = tokenizer.tokenize("This is a document about the system");

        assert_eq!(tokens, vec!["document", "about", "system"]);
    }

    #[test]
    fn test_stemming() {
        let tokenizer = Tokenizer::new(options(StopwordSet::None, true));
        let tokens = tokenizer.tokenize("running runs");

        assert!(tokens.iter().all(|t| t == "run"));
    }

    #[test]
    fn test_term_frequencies() {
        let tokenizer = Tokenizer::new(options(StopwordSet::None, false));

        let freq = tokenizer.compute_term_frequencies("apple apple banana");
        assert_eq!(freq.get("apple"), Some(&2));
        assert_eq!(freq.get("banana"), Some(&1));
    }

    #[test]
    fn test_min_max_token_length() {
        let tokenizer = Tokenizer::new(TokenizerOptions {
            stopwords: StopwordSet::None,
            min_token_length: 3,
            max_token_length: 5,
            ..Default::default()
        });
        let tokens = tokenizer.tokenize("a ab abc abcd abcde abcdef");

        assert_eq!(tokens, vec!["abc", "abcd", "abcde"]);
    }

    #[test]
    fn test_positions_skip_stopwords() {
        let tokenizer = Tokenizer::new(options(StopwordSet::Lucene, false));
        let ordered = tokenizer.tokenize_with_positions_ordered("rust the programming");

        assert_eq!(
            ordered,
            vec![("rust".to_string(), 0), ("programming".to_string(), 2)]
        );
    }

    #[test]
    fn test_letter_split() {
        let tokenizer = Tokenizer::new(TokenizerOptions {
            split: SplitMode::Letters,
            stopwords: StopwordSet::None,
            ..Default::default()
        });
        assert_eq!(tokenizer.tokenize("R2D2 rocks"), vec!["r", "d", "rocks"]);
    }

    #[test]
    fn test_whitespace_split_keeps_case() {
        let tokenizer = Tokenizer::new(TokenizerOptions {
            split: SplitMode::Whitespace,
            lowercase: false,
            stopwords: StopwordSet::None,
            ..Default::default()
        });
        assert_eq!(tokenizer.tokenize("Foo-Bar  baz"), vec!["Foo-Bar", "baz"]);
        assert_eq!(tokenizer.normalize_term("Foo*"), "Foo*");
    }

    #[test]
    fn test_underscore_joins_word() {
        let tokenizer = Tokenizer::new(options(StopwordSet::Lucene, false));
        assert_eq!(tokenizer.tokenize("science_fiction"), vec!["science_fiction"]);
    }
}
