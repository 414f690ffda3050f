use serde::{Deserialize, Serialize};

use super::tokenizer::{SplitMode, StopwordSet, Tokenizer, TokenizerOptions};
use crate::config::TokenizerConfig;

/// Named analysis chain attached to a field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Analyzer {
    /// Unicode word split, lowercase, English stop set
    #[default]
    Standard,
    /// Whole value as a single token
    Keyword,
    /// Letter runs, lowercase
    Simple,
    /// Letter runs, lowercase, English stop set
    Stop,
    /// Whitespace split, case preserved
    Whitespace,
    /// Standard plus the extended stop list and English stemming
    Snowball,
}

impl Analyzer {
    pub fn name(&self) -> &'static str {
        match self {
            Analyzer::Standard => "standard",
            Analyzer::Keyword => "keyword",
            Analyzer::Simple => "simple",
            Analyzer::Stop => "stop",
            Analyzer::Whitespace => "whitespace",
            Analyzer::Snowball => "snowball",
        }
    }
}

impl std::str::FromStr for Analyzer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Analyzer::Standard),
            "keyword" => Ok(Analyzer::Keyword),
            "simple" => Ok(Analyzer::Simple),
            "stop" => Ok(Analyzer::Stop),
            "whitespace" => Ok(Analyzer::Whitespace),
            "snowball" => Ok(Analyzer::Snowball),
            other => Err(format!("unknown analyzer '{}'", other)),
        }
    }
}

/// One prebuilt tokenizer per analyzer
///
/// Stemmers and stop sets are built once per engine and shared by the write
/// path and the query parser, so both sides analyze a field identically.
pub struct AnalyzerSet {
    standard: Tokenizer,
    simple: Tokenizer,
    stop: Tokenizer,
    whitespace: Tokenizer,
    snowball: Tokenizer,
    max_token_length: usize,
}

impl AnalyzerSet {
    pub fn new(config: &TokenizerConfig) -> Self {
        let base = TokenizerOptions {
            min_token_length: config.min_token_length,
            max_token_length: config.max_token_length,
            ..Default::default()
        };

        Self {
            standard: Tokenizer::new(base.clone()),
            simple: Tokenizer::new(TokenizerOptions {
                split: SplitMode::Letters,
                stopwords: StopwordSet::None,
                ..base.clone()
            }),
            stop: Tokenizer::new(TokenizerOptions {
                split: SplitMode::Letters,
                ..base.clone()
            }),
            whitespace: Tokenizer::new(TokenizerOptions {
                split: SplitMode::Whitespace,
                lowercase: false,
                stopwords: StopwordSet::None,
                ..base.clone()
            }),
            snowball: Tokenizer::new(TokenizerOptions {
                stopwords: StopwordSet::Extended,
                stem: true,
                ..base
            }),
            max_token_length: config.max_token_length,
        }
    }

    /// Analyze `text`, returning tokens with their positions
    pub fn analyze(&self, analyzer: Analyzer, text: &str) -> Vec<(String, u32)> {
        match analyzer {
            Analyzer::Keyword => {
                if text.is_empty() || text.chars().count() > self.max_token_length {
                    Vec::new()
                } else {
                    vec![(text.to_string(), 0)]
                }
            }
            other => self.tokenizer(other).tokenize_with_positions_ordered(text),
        }
    }

    /// Normalize a query term that bypasses full analysis (wildcards, fuzzy, ranges)
    pub fn normalize_term(&self, analyzer: Analyzer, term: &str) -> String {
        match analyzer {
            Analyzer::Keyword => term.to_string(),
            other => self.tokenizer(other).normalize_term(term),
        }
    }

    fn tokenizer(&self, analyzer: Analyzer) -> &Tokenizer {
        match analyzer {
            Analyzer::Standard | Analyzer::Keyword => &self.standard,
            Analyzer::Simple => &self.simple,
            Analyzer::Stop => &self.stop,
            Analyzer::Whitespace => &self.whitespace,
            Analyzer::Snowball => &self.snowball,
        }
    }
}

impl Default for AnalyzerSet {
    fn default() -> Self {
        Self::new(&TokenizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(set: &AnalyzerSet, analyzer: Analyzer, text: &str) -> Vec<String> {
        set.analyze(analyzer, text).into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_keyword_keeps_value() {
        let set = AnalyzerSet::default();
        assert_eq!(
            set.analyze(Analyzer::Keyword, "Science Fiction"),
            vec![("Science Fiction".to_string(), 0)]
        );
        assert!(set.analyze(Analyzer::Keyword, "").is_empty());
    }

    #[test]
    fn test_standard_vs_simple() {
        let set = AnalyzerSet::default();
        assert_eq!(tokens(&set, Analyzer::Standard, "The R2D2 droid"), vec!["r2d2", "droid"]);
        assert_eq!(
            tokens(&set, Analyzer::Simple, "The R2D2 droid"),
            vec!["the", "r", "d", "droid"]
        );
        assert_eq!(tokens(&set, Analyzer::Stop, "The R2D2 droid"), vec!["r", "d", "droid"]);
    }

    #[test]
    fn test_snowball_stems() {
        let set = AnalyzerSet::default();
        assert_eq!(tokens(&set, Analyzer::Snowball, "jumping foxes"), vec!["jump", "fox"]);
    }

    #[test]
    fn test_whitespace_preserves_case() {
        let set = AnalyzerSet::default();
        assert_eq!(tokens(&set, Analyzer::Whitespace, "Hello, World"), vec!["Hello,", "World"]);
    }

    #[test]
    fn test_parse_analyzer_name() {
        assert_eq!("Keyword".parse::<Analyzer>(), Ok(Analyzer::Keyword));
        assert!("klingon".parse::<Analyzer>().is_err());
        assert_eq!(Analyzer::Snowball.name(), "snowball");
    }
}
