//! User-defined token-substitution templates (macros).
//!
//! A `:template` statement registers a rule keyed by the literal spelling
//! of the tokens it intercepts. The parser consults the table while
//! scanning subsequent tokens in the same parse pass; on a full match it
//! substitutes the gathered arguments into a deep copy of the rule body
//! via name-directed subtree substitution.

use crate::expr::Expr;
use crate::token::{Token, TokenKind, TokenValue};
use std::collections::HashMap;

/// One registered macro rule.
#[derive(Debug, Clone)]
pub struct TemplateRule {
    /// Parameter names bound to the expressions preceding the matched span,
    /// innermost last.
    pub params: Vec<String>,
    pub body: Vec<Expr>,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    rule: Option<TemplateRule>,
}

/// Trie over token spellings -> template rules.
#[derive(Debug, Default)]
pub struct TemplateTable {
    root: TrieNode,
}

impl TemplateTable {
    pub fn new() -> TemplateTable {
        TemplateTable::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    pub fn insert(&mut self, spellings: &[String], rule: TemplateRule) {
        let mut node = &mut self.root;
        for s in spellings {
            node = node.children.entry(s.clone()).or_default();
        }
        node.rule = Some(rule);
    }

    /// Longest match of consecutive token spellings starting at `tokens[0]`.
    /// Returns the number of tokens consumed and the matched rule.
    pub fn matches(&self, tokens: &[Token]) -> Option<(usize, &TemplateRule)> {
        let mut node = &self.root;
        let mut best: Option<(usize, &TemplateRule)> = None;
        for (i, tok) in tokens.iter().enumerate() {
            let Some(next) = node.children.get(&spelling(tok)) else {
                break;
            };
            node = next;
            if let Some(rule) = &node.rule {
                best = Some((i + 1, rule));
            }
        }
        best
    }
}

/// The literal source spelling of a token, as used for trie keys.
pub fn spelling(tok: &Token) -> String {
    match (&tok.kind, &tok.value) {
        (_, TokenValue::Str(s)) => s.clone(),
        (_, TokenValue::Number { num, .. }) => num.to_string(),
        (kind, TokenValue::None) => match kind {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::Question => "?",
            TokenKind::AllOf => "$",
            TokenKind::Assign => "=",
            TokenKind::Arrow => "->",
            TokenKind::Pipe => "|",
            TokenKind::PipeForward => "|>",
            TokenKind::Concat => "++",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Underscore => "_",
            TokenKind::Spread => "..",
            TokenKind::RangeOp => "..",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Lte => "<=",
            TokenKind::Gte => ">=",
            TokenKind::Eq => "==",
            TokenKind::Neq => "!=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            _ => "",
        }
        .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    fn rule() -> TemplateRule {
        TemplateRule { params: vec!["a".into()], body: vec![Expr::literal("a")] }
    }

    #[test]
    fn longest_match_wins() {
        let mut table = TemplateTable::new();
        table.insert(&["+".into()], rule());
        table.insert(&["+".into(), "+".into()], TemplateRule { params: vec![], body: vec![] });
        let toks = vec![Token::new(TokenKind::Plus, 1, 1), Token::new(TokenKind::Plus, 1, 2)];
        let (len, matched) = table.matches(&toks).unwrap();
        assert_eq!(len, 2);
        assert!(matched.params.is_empty());
    }

    #[test]
    fn no_match_on_empty_table() {
        let table = TemplateTable::new();
        let toks = vec![Token::new(TokenKind::Concat, 1, 1)];
        assert!(table.matches(&toks).is_none());
    }

    #[test]
    fn word_spelling_uses_payload() {
        let tok = Token::string(TokenKind::Literal, "twice", 1, 1);
        assert_eq!(spelling(&tok), "twice");
    }
}
