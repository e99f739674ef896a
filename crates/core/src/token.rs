//! Lexical tokens. Tokens are pure data -- no behavior beyond accessors --
//! and serialize to JSON for golden-file testing of scanner output.

use crate::num::Num;
use serde::{Deserialize, Serialize};

/// The closed set of lexical kinds the scanner can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Eof,
    Eol,
    // Literals
    Number,
    Str,
    Regex,
    Symbol,
    DynamicSymbol,
    Literal,
    Comment,
    // Arithmetic / structural operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Question,
    AllOf,
    Assign,
    Arrow,
    Pipe,
    PipeForward,
    Concat,
    Dot,
    Comma,
    Semicolon,
    Colon,
    Underscore,
    Spread,
    RangeOp,
    // Comparison
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    // Markdown / prose constructs
    Heading,
    Blockquote,
    ListItem,
    Fence,
    Text,
    Break,
}

/// Secondary shading on a token: raw (verbatim) strings, multi-line
/// strings, and markup/prose spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flavor {
    Raw,
    Multi,
    Markup,
}

/// Payload carried by a token. Most operators carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenValue {
    None,
    /// Numeric literal plus the unit word captured immediately after it,
    /// when the unit-registration chain recognized one.
    Number { num: Num, unit: Option<String> },
    Str(String),
}

/// One lexical unit with its source position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub line: u32,
    pub col: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<Flavor>,
}

impl Token {
    pub fn new(kind: TokenKind, line: u32, col: u32) -> Token {
        Token {
            kind,
            value: TokenValue::None,
            line,
            col,
            flavor: None,
        }
    }

    pub fn number(num: Num, unit: Option<String>, line: u32, col: u32) -> Token {
        Token {
            kind: TokenKind::Number,
            value: TokenValue::Number { num, unit },
            line,
            col,
            flavor: None,
        }
    }

    pub fn string(kind: TokenKind, text: impl Into<String>, line: u32, col: u32) -> Token {
        Token {
            kind,
            value: TokenValue::Str(text.into()),
            line,
            col,
            flavor: None,
        }
    }

    pub fn with_flavor(mut self, flavor: Flavor) -> Token {
        self.flavor = Some(flavor);
        self
    }

    /// The string payload, for kinds that carry one.
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// True for the prose-side kinds the evaluator passes through verbatim.
    pub fn is_prose(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Heading
                | TokenKind::Blockquote
                | TokenKind::ListItem
                | TokenKind::Fence
                | TokenKind::Text
                | TokenKind::Break
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_through_json() {
        let tok = Token::number(Num::Int(35), Some("mm".into()), 4, 7);
        let json = serde_json::to_string(&tok).unwrap();
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(tok, back);
    }

    #[test]
    fn flavor_omitted_when_absent() {
        let tok = Token::new(TokenKind::Plus, 1, 1);
        let json = serde_json::to_value(&tok).unwrap();
        assert!(json.get("flavor").is_none());
    }
}
