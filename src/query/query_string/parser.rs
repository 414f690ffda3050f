//! Recursive descent parser for query strings
//!
//! # Grammar
//!
//! ```text
//! query       := clause_expr (conjunction? clause_expr)*
//! clause_expr := modifier? clause
//! conjunction := AND | OR
//! modifier    := '+' | '-' | NOT
//! clause      := (TERM COLON)? (grouped | value)
//! grouped     := '(' query ')' (CARET boost)?
//! value       := range | phrase | term
//! range       := ('[' | '{') value TO value (']' | '}')
//! phrase      := QUOTED (TILDE slop)? (CARET boost)?
//! term        := TERM (TILDE distance)? (CARET boost)?
//! ```
//!
//! Clauses are combined the way Lucene's classic parser does it: an explicit
//! `AND` also makes the preceding clause required, and clauses without a
//! modifier take their occurrence from the default operator.

use super::lexer::{Lexer, Token};
use crate::error::RtSearchError;
use crate::query::ast::{MatchAllQuery, MatchNoneQuery, QueryNode};
use crate::query::nodes::{
    BoolQuery, FuzzyQuery, PhraseQuery, PrefixQuery, RangeQuery, TermQuery, WildcardQuery,
    MAX_EDIT_DISTANCE,
};
use crate::query::types::MatchOperator;
use crate::schema::Schema;
use crate::tokenizer::AnalyzerSet;
use crate::Result;

/// Default field to search when no field is specified
const DEFAULT_FIELD: &str = "content";

#[derive(Clone, Copy, Debug, PartialEq)]
enum Conjunction {
    None,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Modifier {
    None,
    Required,
    Prohibited,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Occur {
    Must,
    Should,
    MustNot,
}

struct Clause {
    occur: Occur,
    query: Box<dyn QueryNode>,
}

/// Parser for Lucene-style query strings
///
/// Query text is analyzed with the analyzer the schema records for each
/// field, so a query matches the tokens the same field produced at index
/// time.
pub struct QueryStringParser<'a> {
    lexer: Lexer,
    current_token: Token,
    schema: &'a Schema,
    analyzers: &'a AnalyzerSet,
    /// Default field for unqualified terms
    default_field: String,
    /// Default operator between terms (AND or OR)
    default_operator: MatchOperator,
}

impl<'a> QueryStringParser<'a> {
    /// Create a new parser for the given query string
    pub fn new(input: &str, schema: &'a Schema, analyzers: &'a AnalyzerSet) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;

        Ok(Self {
            lexer,
            current_token,
            schema,
            analyzers,
            default_field: DEFAULT_FIELD.to_string(),
            default_operator: MatchOperator::Or,
        })
    }

    /// Set the default field for unqualified terms
    pub fn with_default_field(mut self, field: impl Into<String>) -> Self {
        self.default_field = field.into();
        self
    }

    /// Set the default operator between terms
    pub fn with_default_operator(mut self, operator: MatchOperator) -> Self {
        self.default_operator = operator;
        self
    }

    /// Parse the query string into a query AST
    ///
    /// A query whose every clause analyzed away matches nothing.
    pub fn parse(&mut self) -> Result<Box<dyn QueryNode>> {
        let query = self.parse_query(false)?;

        // Ensure we've consumed all input
        if self.current_token != Token::Eof {
            return Err(RtSearchError::InvalidQuery(format!(
                "Unexpected token after query: {:?}",
                self.current_token
            )));
        }

        Ok(query.unwrap_or_else(|| Box::new(MatchNoneQuery)))
    }

    /// Parse a sequence of clauses up to the end of input or a closing paren
    fn parse_query(&mut self, in_group: bool) -> Result<Option<Box<dyn QueryNode>>> {
        let mut clauses: Vec<Clause> = Vec::new();
        let mut first_plain: Option<Box<dyn QueryNode>> = None;
        let mut clause_count = 0usize;

        loop {
            if matches!(self.current_token, Token::Eof | Token::RightParen) {
                break;
            }

            let conj = self.parse_conjunction()?;
            if conj != Conjunction::None && clause_count == 0 {
                return Err(RtSearchError::InvalidQuery(format!(
                    "Query cannot start with {:?}",
                    conj
                )));
            }
            let mods = self.parse_modifier()?;
            let query = self.parse_clause()?;

            if clause_count == 0 && mods == Modifier::None {
                first_plain = query.as_ref().map(|q| q.clone_box());
            }
            clause_count += 1;
            self.add_clause(&mut clauses, conj, mods, query);
        }

        if clause_count == 0 {
            let message = match (in_group, &self.current_token) {
                (true, Token::RightParen) => "Empty group",
                (true, _) => "Unclosed group",
                (false, Token::RightParen) => "Unbalanced ')'",
                (false, _) => "Empty Query",
            };
            return Err(RtSearchError::InvalidQuery(message.to_string()));
        }
        if clause_count == 1 {
            if let Some(query) = first_plain {
                return Ok(Some(query));
            }
        }
        if clauses.is_empty() {
            return Ok(None);
        }

        let mut bool_query = BoolQuery::new();
        for clause in clauses {
            bool_query = match clause.occur {
                Occur::Must => bool_query.must_boxed(clause.query),
                Occur::Should => bool_query.should_boxed(clause.query),
                Occur::MustNot => bool_query.must_not_boxed(clause.query),
            };
        }
        Ok(Some(Box::new(bool_query)))
    }

    /// Lucene's clause combination rules
    fn add_clause(
        &self,
        clauses: &mut Vec<Clause>,
        conj: Conjunction,
        mods: Modifier,
        query: Option<Box<dyn QueryNode>>,
    ) {
        // An explicit AND makes the previous clause required
        if conj == Conjunction::And {
            if let Some(last) = clauses.last_mut() {
                if last.occur != Occur::MustNot {
                    last.occur = Occur::Must;
                }
            }
        }
        // Under a default AND, an explicit OR makes the previous clause optional
        if conj == Conjunction::Or && self.default_operator == MatchOperator::And {
            if let Some(last) = clauses.last_mut() {
                if last.occur != Occur::MustNot {
                    last.occur = Occur::Should;
                }
            }
        }

        // Clauses that analyzed to nothing are dropped
        let query = match query {
            Some(q) => q,
            None => return,
        };

        let prohibited = mods == Modifier::Prohibited;
        let required = match self.default_operator {
            MatchOperator::Or => {
                mods == Modifier::Required || (conj == Conjunction::And && !prohibited)
            }
            MatchOperator::And => !prohibited && conj != Conjunction::Or,
        };

        let occur = if prohibited {
            Occur::MustNot
        } else if required {
            Occur::Must
        } else {
            Occur::Should
        };
        clauses.push(Clause { occur, query });
    }

    fn parse_conjunction(&mut self) -> Result<Conjunction> {
        let conj = match self.current_token {
            Token::And => Conjunction::And,
            Token::Or => Conjunction::Or,
            _ => return Ok(Conjunction::None),
        };
        self.advance()?;
        Ok(conj)
    }

    fn parse_modifier(&mut self) -> Result<Modifier> {
        let modifier = match self.current_token {
            Token::Plus => Modifier::Required,
            Token::Minus | Token::Not => Modifier::Prohibited,
            _ => return Ok(Modifier::None),
        };
        self.advance()?;
        Ok(modifier)
    }

    /// Parse: clause := (TERM COLON)? (grouped | value)
    fn parse_clause(&mut self) -> Result<Option<Box<dyn QueryNode>>> {
        let mut field = self.default_field.clone();
        if let Token::Term(name) = &self.current_token {
            if self.lexer.peek_token()? == Token::Colon {
                field = name.clone();
                self.advance()?; // field name
                self.advance()?; // ':'
            }
        }

        if self.current_token == Token::LeftParen {
            self.advance()?; // consume '('

            // field:(a b) searches `field` for every unqualified term inside
            let saved = std::mem::replace(&mut self.default_field, field);
            let inner = self.parse_query(true);
            self.default_field = saved;
            let inner = inner?;

            self.expect(Token::RightParen)?;
            let boost = self.parse_boost()?;
            return Ok(inner.map(|query| boosted(query, boost)));
        }

        self.parse_value(&field)
    }

    /// Parse: value := range | phrase | term
    fn parse_value(&mut self, field: &str) -> Result<Option<Box<dyn QueryNode>>> {
        match self.current_token.clone() {
            Token::LeftBracket | Token::LeftBrace => self.parse_range_query(field).map(Some),
            Token::QuotedString(text) => {
                self.advance()?;
                let slop = self.parse_tilde()?.map(|v| v as u32).unwrap_or(0);
                let boost = self.parse_boost()?;
                Ok(self.analyzed_query(field, &text, slop, boost))
            }
            Token::Term(term) => {
                self.advance()?;
                self.parse_term_with_modifiers(field, term)
            }
            other => Err(RtSearchError::InvalidQuery(format!(
                "Expected value for field '{}', got {:?}",
                field, other
            ))),
        }
    }

    /// Parse a term with optional wildcard/fuzzy/boost modifiers
    fn parse_term_with_modifiers(
        &mut self,
        field: &str,
        term: String,
    ) -> Result<Option<Box<dyn QueryNode>>> {
        let fuzzy = self.parse_tilde()?;
        let boost = self.parse_boost()?;

        // *:* matches all documents
        if field == "*" && term == "*" {
            return Ok(Some(Box::new(MatchAllQuery::default().with_boost(boost))));
        }

        let analyzer = self.schema.analyzer_for(field);
        if let Some(similarity) = fuzzy {
            let term = self.analyzers.normalize_term(analyzer, &term);
            let distance = fuzzy_edits(similarity, term.chars().count());
            return Ok(Some(Box::new(
                FuzzyQuery::new(field, term)
                    .with_fuzziness(distance)
                    .with_boost(boost),
            )));
        }

        let has_wildcard = term.contains('*') || term.contains('?');
        if has_wildcard {
            let term = self.analyzers.normalize_term(analyzer, &term);
            let body = &term[..term.len().saturating_sub(1)];
            // Prefix query (term ends with a lone trailing *)
            if term.ends_with('*') && !body.contains('*') && !body.contains('?') {
                return Ok(Some(Box::new(
                    PrefixQuery::new(field, body).with_boost(boost),
                )));
            }
            return Ok(Some(Box::new(
                WildcardQuery::new(field, term)?.with_boost(boost),
            )));
        }

        Ok(self.analyzed_query(field, &term, 0, boost))
    }

    /// Run `text` through the field's analyzer
    ///
    /// No tokens yield no clause, one token a term query and several a phrase.
    fn analyzed_query(
        &self,
        field: &str,
        text: &str,
        slop: u32,
        boost: f32,
    ) -> Option<Box<dyn QueryNode>> {
        let analyzer = self.schema.analyzer_for(field);
        let tokens = self.analyzers.analyze(analyzer, text);

        match tokens.len() {
            0 => None,
            1 => {
                let (token, _) = tokens.into_iter().next()?;
                Some(Box::new(TermQuery::new(field, token).with_boost(boost)))
            }
            _ => {
                let base = tokens[0].1;
                let terms = tokens
                    .into_iter()
                    .map(|(token, pos)| (token, pos - base))
                    .collect();
                Some(Box::new(
                    PhraseQuery::new(field, terms)
                        .with_slop(slop)
                        .with_boost(boost),
                ))
            }
        }
    }

    /// Parse range query: [low TO high] or {low TO high}, either end may be `*`
    fn parse_range_query(&mut self, field: &str) -> Result<Box<dyn QueryNode>> {
        let include_lower = self.current_token == Token::LeftBracket;
        self.advance()?; // consume '[' or '{'

        let lower = self.parse_range_value()?;
        self.expect(Token::To)?;
        let upper = self.parse_range_value()?;

        let include_upper = match self.current_token {
            Token::RightBracket => true,
            Token::RightBrace => false,
            ref other => {
                return Err(RtSearchError::InvalidQuery(format!(
                    "Expected ']' or '}}' to close range, got {:?}",
                    other
                )))
            }
        };
        self.advance()?;
        let boost = self.parse_boost()?;

        let analyzer = self.schema.analyzer_for(field);
        let normalize = |v: Option<String>| v.map(|v| self.analyzers.normalize_term(analyzer, &v));

        let mut query = RangeQuery::new(field).with_boost(boost);
        query.lower = normalize(lower);
        query.upper = normalize(upper);
        query.include_lower = include_lower;
        query.include_upper = include_upper;
        Ok(Box::new(query))
    }

    /// A range endpoint; `*` is open
    fn parse_range_value(&mut self) -> Result<Option<String>> {
        let value = match &self.current_token {
            Token::Term(t) if t == "*" => None,
            Token::Term(t) => Some(t.clone()),
            Token::QuotedString(s) => Some(s.clone()),
            other => {
                return Err(RtSearchError::InvalidQuery(format!(
                    "Expected range value, got {:?}",
                    other
                )))
            }
        };
        self.advance()?;
        Ok(value)
    }

    fn parse_tilde(&mut self) -> Result<Option<f32>> {
        if let Token::Tilde(value) = self.current_token {
            self.advance()?;
            return Ok(Some(value.unwrap_or(MAX_EDIT_DISTANCE as f32)));
        }
        Ok(None)
    }

    fn parse_boost(&mut self) -> Result<f32> {
        match self.current_token {
            Token::Caret(Some(boost)) => {
                self.advance()?;
                Ok(boost)
            }
            Token::Caret(None) => Err(RtSearchError::InvalidQuery(
                "Expected a number after '^'".to_string(),
            )),
            _ => Ok(1.0),
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.current_token == expected {
            self.advance()
        } else {
            Err(RtSearchError::InvalidQuery(format!(
                "Expected {:?}, got {:?}",
                expected, self.current_token
            )))
        }
    }
}

/// Edit distance for `term~value`
///
/// Whole numbers are distances; values below 1 are the legacy minimum
/// similarity, scaled by the term length.
fn fuzzy_edits(value: f32, term_len: usize) -> u32 {
    if value >= 1.0 {
        (value as u32).min(MAX_EDIT_DISTANCE)
    } else if value <= 0.0 {
        0
    } else {
        (((1.0 - value) * term_len as f32) as u32).min(MAX_EDIT_DISTANCE)
    }
}

/// Apply a group boost by wrapping the group in a single required clause
fn boosted(query: Box<dyn QueryNode>, boost: f32) -> Box<dyn QueryNode> {
    if boost == 1.0 {
        return query;
    }
    Box::new(BoolQuery::new().must_boxed(query).with_boost(boost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Field};
    use crate::tokenizer::Analyzer;

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema.learn(
            &Document::new("k")
                .with_text("title", "x")
                .with_field(Field::new("category", "x").with_analyzer(Analyzer::Keyword))
                .with_field(Field::new("body", "x").with_analyzer(Analyzer::Snowball)),
        );
        schema
    }

    fn parse_with(input: &str, operator: MatchOperator) -> Result<Box<dyn QueryNode>> {
        let schema = schema();
        let analyzers = AnalyzerSet::default();
        QueryStringParser::new(input, &schema, &analyzers)?
            .with_default_field("title")
            .with_default_operator(operator)
            .parse()
    }

    fn parse(input: &str) -> Box<dyn QueryNode> {
        parse_with(input, MatchOperator::Or).unwrap()
    }

    /// Compact rendering of the tree for assertions
    fn render(query: &dyn QueryNode) -> String {
        format!("{:?}", query)
    }

    #[test]
    fn test_simple_term() {
        let query = parse("Rust");
        assert_eq!(query.query_type(), "term");
        assert!(render(query.as_ref()).contains("field: \"title\", term: \"rust\""));
    }

    #[test]
    fn test_field_term_uses_field_analyzer() {
        let keyword = parse("category:Science_Fiction");
        assert!(render(keyword.as_ref()).contains("term: \"Science_Fiction\""));

        let stemmed = parse("body:running");
        assert!(render(stemmed.as_ref()).contains("term: \"run\""));
    }

    #[test]
    fn test_quoted_keyword_value() {
        let query = parse("category:\"science_fiction\"");
        assert_eq!(query.query_type(), "term");
        assert!(render(query.as_ref()).contains("category"));
    }

    #[test]
    fn test_multi_token_term_becomes_phrase() {
        let query = parse("title:\"the lord of the rings\"~1");
        assert_eq!(query.query_type(), "phrase");
        let text = render(query.as_ref());
        assert!(text.contains("(\"lord\", 0)"));
        assert!(text.contains("(\"rings\", 3)"));
        assert!(text.contains("slop: 1"));
    }

    #[test]
    fn test_stop_word_matches_nothing() {
        assert_eq!(parse("the").query_type(), "match_none");
        // Dropped from a larger query
        let query = parse("the fox");
        assert_eq!(query.query_type(), "bool");
        assert!(!render(query.as_ref()).contains("\"the\""));
    }

    #[test]
    fn test_default_or_operator() {
        let query = parse("rust python");
        let text = render(query.as_ref());
        assert!(text.starts_with("BoolQuery { must: [], should: [TermQuery"));
    }

    #[test]
    fn test_default_and_operator() {
        let query = parse_with("rust python", MatchOperator::And).unwrap();
        let text = render(query.as_ref());
        assert!(text.starts_with("BoolQuery { must: [TermQuery"));
        assert!(text.contains("should: []"));
    }

    #[test]
    fn test_explicit_and_requires_both_sides() {
        let query = parse("rust AND python");
        let text = render(query.as_ref());
        assert!(text.contains("should: []"));
        assert!(text.contains("\"rust\""));
        assert!(text.contains("\"python\""));
    }

    #[test]
    fn test_modifiers() {
        let query = parse("+rust -python go");
        let text = render(query.as_ref());
        let must = text.find("must: [").unwrap();
        let should = text.find("should: [").unwrap();
        let must_not = text.find("must_not: [").unwrap();
        assert!(text[must..should].contains("rust"));
        assert!(text[should..must_not].contains("go"));
        assert!(text[must_not..].contains("python"));

        let not = parse("rust NOT python");
        assert!(render(not.as_ref()).contains("must_not: [TermQuery"));
    }

    #[test]
    fn test_match_all() {
        assert_eq!(parse("*:*").query_type(), "match_all");
    }

    #[test]
    fn test_prefix_wildcard_fuzzy() {
        assert_eq!(parse("Prog*").query_type(), "prefix");
        assert!(render(parse("Prog*").as_ref()).contains("prefix: \"prog\""));
        assert_eq!(parse("te?t").query_type(), "wildcard");
        assert_eq!(parse("t*st").query_type(), "wildcard");
        assert_eq!(parse("title:*").query_type(), "prefix");

        let fuzzy = parse("roust~1");
        assert_eq!(fuzzy.query_type(), "fuzzy");
        assert!(render(fuzzy.as_ref()).contains("fuzziness: 1"));
        assert!(render(parse("roust~").as_ref()).contains("fuzziness: 2"));
    }

    #[test]
    fn test_range() {
        let query = parse("title:[Apple TO *}");
        assert_eq!(query.query_type(), "range");
        let text = render(query.as_ref());
        assert!(text.contains("lower: Some(\"apple\")"));
        assert!(text.contains("upper: None"));
        assert!(text.contains("include_lower: true"));
    }

    #[test]
    fn test_field_group() {
        let query = parse("category:(a OR b) rust");
        let text = render(query.as_ref());
        assert!(text.contains("field: \"category\", term: \"a\""));
        assert!(text.contains("field: \"category\", term: \"b\""));
        assert!(text.contains("field: \"title\", term: \"rust\""));
    }

    #[test]
    fn test_boosts() {
        assert_eq!(parse("rust^2").boost(), 2.0);
        assert_eq!(parse("(rust python)^3").boost(), 3.0);
        assert!(parse_with("rust^", MatchOperator::Or).is_err());
    }

    #[test]
    fn test_errors() {
        assert!(parse_with("title:(rust", MatchOperator::Or).is_err());
        assert!(parse_with("AND rust", MatchOperator::Or).is_err());
        assert!(parse_with("rust)", MatchOperator::Or).is_err());
        assert!(parse_with("title:[a b]", MatchOperator::Or).is_err());
        assert!(parse_with("()", MatchOperator::Or).is_err());
        assert!(matches!(
            parse_with("\"open", MatchOperator::Or),
            Err(RtSearchError::InvalidQuery(_))
        ));
    }

    fn error_message(input: &str) -> String {
        match parse_with(input, MatchOperator::Or) {
            Err(RtSearchError::InvalidQuery(message)) => message,
            Err(other) => panic!("unexpected error for {:?}: {}", input, other),
            Ok(_) => panic!("{:?} should not parse", input),
        }
    }

    #[test]
    fn test_group_error_messages() {
        assert_eq!(error_message("()"), "Empty group");
        assert_eq!(error_message("rust AND ()"), "Empty group");
        assert_eq!(error_message("((("), "Unclosed group");
        assert_eq!(error_message("title:("), "Unclosed group");
        assert_eq!(error_message(")"), "Unbalanced ')'");
        assert_eq!(error_message("   "), "Empty Query");
    }

    #[test]
    fn test_fuzzy_edits() {
        assert_eq!(fuzzy_edits(1.0, 5), 1);
        assert_eq!(fuzzy_edits(5.0, 5), 2);
        assert_eq!(fuzzy_edits(0.0, 5), 0);
        assert_eq!(fuzzy_edits(0.5, 2), 1);
        assert_eq!(fuzzy_edits(0.5, 10), 2);
    }
}
