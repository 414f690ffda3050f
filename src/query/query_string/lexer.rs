//! Lexer for query string syntax
//!
//! Tokenizes Lucene-style query strings into a stream of tokens. Operators
//! are recognized only in upper case, as in Lucene's classic parser, so a
//! lowercase `and` is an ordinary term.

use crate::error::RtSearchError;
use crate::Result;

/// Token types for query string parsing
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A term (unquoted word, escapes resolved, may hold `*` and `?`)
    Term(String),
    /// A quoted string (phrase)
    QuotedString(String),

    /// AND operator (`AND` or `&&`)
    And,
    /// OR operator (`OR` or `||`)
    Or,
    /// NOT operator (`NOT` or `!`)
    Not,
    /// Colon separator (field:value)
    Colon,

    /// Tilde with optional slop, edit distance or legacy similarity
    Tilde(Option<f32>),
    /// Caret for boosting with optional boost value
    Caret(Option<f32>),

    /// Left square bracket (inclusive range start)
    LeftBracket,
    /// Right square bracket (inclusive range end)
    RightBracket,
    /// Left curly brace (exclusive range start)
    LeftBrace,
    /// Right curly brace (exclusive range end)
    RightBrace,
    /// TO keyword for ranges
    To,

    /// Left parenthesis (grouping)
    LeftParen,
    /// Right parenthesis (grouping)
    RightParen,

    /// Plus sign (required clause)
    Plus,
    /// Minus sign (prohibited clause)
    Minus,

    /// End of input
    Eof,
}

impl Token {
    /// Check if this token is a term-like token (can be a field name or value)
    pub fn is_term_like(&self) -> bool {
        matches!(self, Token::Term(_))
    }
}

/// Lexer for tokenizing query strings
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    /// Create a new lexer for the given input string
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        if self.position >= self.input.len() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();

        match ch {
            ':' => {
                self.advance();
                Ok(Token::Colon)
            }
            '~' => {
                self.advance();
                Ok(Token::Tilde(self.read_float()))
            }
            '^' => {
                self.advance();
                Ok(Token::Caret(self.read_float()))
            }
            '[' => {
                self.advance();
                Ok(Token::LeftBracket)
            }
            ']' => {
                self.advance();
                Ok(Token::RightBracket)
            }
            '{' => {
                self.advance();
                Ok(Token::LeftBrace)
            }
            '}' => {
                self.advance();
                Ok(Token::RightBrace)
            }
            '(' => {
                self.advance();
                Ok(Token::LeftParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RightParen)
            }
            '+' => {
                self.advance();
                Ok(Token::Plus)
            }
            '-' => {
                self.advance();
                Ok(Token::Minus)
            }
            '!' => {
                self.advance();
                Ok(Token::Not)
            }
            '&' if self.peek() == Some('&') => {
                self.position += 2;
                Ok(Token::And)
            }
            '|' if self.peek() == Some('|') => {
                self.position += 2;
                Ok(Token::Or)
            }
            '"' => {
                self.advance();
                self.read_quoted_string()
            }
            _ if Self::is_term_start(ch) => self.read_term(),
            _ => Err(RtSearchError::InvalidQuery(format!(
                "Unexpected character at position {}: '{}'",
                self.position, ch
            ))),
        }
    }

    /// Peek at the next token without consuming it
    pub fn peek_token(&mut self) -> Result<Token> {
        let saved_position = self.position;
        let token = self.next_token();
        self.position = saved_position;
        token
    }

    /// Check if the lexer has reached the end of input
    pub fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Get remaining input as string (for error messages)
    pub fn remaining(&self) -> String {
        self.input[self.position..].iter().collect()
    }

    fn read_term(&mut self) -> Result<Token> {
        let mut term = String::new();
        let mut escaped = false;

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch == '\\' {
                self.advance();
                if self.position >= self.input.len() {
                    return Err(RtSearchError::InvalidQuery(
                        "Term cannot end with escape character".to_string(),
                    ));
                }
                term.push(self.current_char());
                escaped = true;
                self.advance();
            } else if Self::is_term_char(ch) {
                term.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Keywords are upper case only; an escaped keyword is a term
        if escaped {
            return Ok(Token::Term(term));
        }
        match term.as_str() {
            "AND" => Ok(Token::And),
            "OR" => Ok(Token::Or),
            "NOT" => Ok(Token::Not),
            "TO" => Ok(Token::To),
            _ => Ok(Token::Term(term)),
        }
    }

    fn read_quoted_string(&mut self) -> Result<Token> {
        let mut s = String::new();

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch == '"' {
                self.advance();
                return Ok(Token::QuotedString(s));
            }
            if ch == '\\' {
                self.advance();
                if self.position < self.input.len() {
                    s.push(self.current_char());
                    self.advance();
                }
            } else {
                s.push(ch);
                self.advance();
            }
        }

        Err(RtSearchError::InvalidQuery(
            "Unterminated quoted string".to_string(),
        ))
    }

    fn read_float(&mut self) -> Option<f32> {
        let mut num_str = String::new();
        let mut has_dot = false;

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        num_str.parse().ok()
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.position < self.input.len() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    /// Characters with syntactic meaning; they end a term unless escaped
    fn is_special(ch: char) -> bool {
        matches!(
            ch,
            ':' | '^' | '~' | '"' | '(' | ')' | '[' | ']' | '{' | '}' | '\\' | '!' | '+' | '-'
        )
    }

    /// Check if a character can start a term
    fn is_term_start(ch: char) -> bool {
        ch == '\\' || (!ch.is_whitespace() && !Self::is_special(ch) && ch != '&' && ch != '|')
    }

    /// Check if a character can be part of a term
    fn is_term_char(ch: char) -> bool {
        ch == '-' || ch == '+' || (!ch.is_whitespace() && !Self::is_special(ch))
    }
}
