use serde::Serialize;
use thiserror::Error;

/// What went wrong. Closed set -- every error the pipeline can raise
/// falls into exactly one of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Malformed lexical construct (unterminated string, bad regex flag, ...).
    Scan,
    /// Structural/grammar violation (unmatched bracket, wrong statement shape).
    Parse,
    /// Name not bound anywhere in the scope chain.
    UndeclaredLocal,
    /// A non-callable binding referenced itself before it was resolved.
    UnexpectedSelfReference,
    /// Wrong value kind supplied to an operator or call.
    TypeMismatch,
    /// Missing or excess call arguments.
    Arity,
    /// Unresolvable module, missing export, or cyclic import.
    Import,
    /// Incompatible or unknown unit conversion.
    Unit,
}

/// A positioned error. Everything the scanner, parser, and evaluator raise
/// carries the source line/col of the offending token and, where available,
/// the lexeme itself for caret-style rendering.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind:?} at {line}:{col}: {message}")]
pub struct SlateError {
    pub kind: ErrorKind,
    pub line: u32,
    pub col: u32,
    pub message: String,
    /// The offending lexeme, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexeme: Option<String>,
}

impl SlateError {
    pub fn new(kind: ErrorKind, line: u32, col: u32, message: impl Into<String>) -> Self {
        SlateError {
            kind,
            line,
            col,
            message: message.into(),
            lexeme: None,
        }
    }

    pub fn with_lexeme(mut self, lexeme: impl Into<String>) -> Self {
        self.lexeme = Some(lexeme.into());
        self
    }

    pub fn scan(line: u32, col: u32, message: impl Into<String>) -> Self {
        SlateError::new(ErrorKind::Scan, line, col, message)
    }

    pub fn parse(line: u32, col: u32, message: impl Into<String>) -> Self {
        SlateError::new(ErrorKind::Parse, line, col, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position() {
        let err = SlateError::scan(3, 14, "unterminated string literal");
        assert_eq!(err.to_string(), "Scan at 3:14: unterminated string literal");
    }

    #[test]
    fn lexeme_is_optional_in_json() {
        let err = SlateError::parse(1, 1, "unmatched '('");
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("lexeme").is_none());
        let with = err.with_lexeme("(");
        let json = serde_json::to_value(&with).unwrap();
        assert_eq!(json["lexeme"], "(");
    }
}
