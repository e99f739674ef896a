//! The universal AST/runtime value node.
//!
//! An `Expr` is the currency of the whole interpreter: the parser produces
//! nested lists of them, the evaluator reduces them, and evaluated results
//! are themselves `Expr`s. Construction goes through value-constructor
//! functions; `clone()` is a deep structural copy for every aggregate
//! variant, which template substitution and partial application rely on
//! (substituted subtrees must never alias).

use crate::num::Num;
use crate::token::{Flavor, TokenKind};
use serde::Serialize;

/// Discriminant-only view of an `Expr`, for dispatch tables and error
/// messages. Closed: adding a variant makes every `match` below fail
/// to compile until handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExprKind {
    Null,
    Bool,
    Number,
    Str,
    Symbol,
    Regex,
    Text,
    Comment,
    Op,
    Literal,
    Hole,
    Block,
    Array,
    Object,
    Range,
    Callable,
    Native,
    Ffi,
}

/// Lazy range descriptor: bounds and step stay unevaluated expressions
/// until the evaluator touches them, and the slice is applied without
/// materializing the sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeSpec {
    pub begin: Expr,
    pub end: Expr,
    pub step: Option<Expr>,
    pub slice: Option<SliceSpec>,
}

/// `[begin..end : length - offset]` slice parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceSpec {
    pub length: Option<Expr>,
    pub offset: Option<Expr>,
}

/// One closure parameter. A spread parameter (`..rest`) collects all
/// remaining positional arguments into one bound array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub spread: bool,
}

/// A closure template: parameters plus unevaluated body. The argument
/// list is immutable once built; partial application substitutes into a
/// deep copy of the body, never into the original.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Callable {
    pub params: Vec<Param>,
    pub body: Vec<Expr>,
    pub name: Option<String>,
    /// Cached callables memoize results keyed by serialized arguments.
    pub cached: bool,
}

impl Callable {
    /// Total arity across curried layers: `a -> b -> a + b` has arity 2.
    pub fn arity(&self) -> usize {
        let nested = match self.body.as_slice() {
            [Expr { value: ExprValue::Callable(inner), .. }] => inner.arity(),
            _ => 0,
        };
        self.params.len() + nested
    }
}

/// The tagged payload of an `Expr`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprValue {
    Null,
    Bool(bool),
    Number { num: Num, unit: Option<String> },
    Str(String),
    Symbol(String),
    Regex(String),
    /// Prose span passed through evaluation verbatim.
    Text { text: String, flavor: Flavor },
    Comment(String),
    /// An operator occurrence awaiting binary reduction.
    Op(TokenKind),
    /// A bare name, resolved against `Env` at evaluation time.
    Literal(String),
    /// `_` placeholder: a hole filled by a later call.
    Hole,
    /// Parenthesized groups; inner vec per comma-separated group.
    Block(Vec<Vec<Expr>>),
    Array(Vec<Expr>),
    /// Insertion-ordered `:key value` mapping; doubles as the encoding of
    /// every control form.
    Object(Vec<(String, Expr)>),
    Range(Box<RangeSpec>),
    Callable(Box<Callable>),
    /// Handle to a host-native function, by registry label.
    Native(String),
    /// Foreign function handle: registry label plus calling convention.
    /// Raw FFIs receive unevaluated argument ASTs.
    Ffi { label: String, raw: bool },
}

/// AST/value node with its source position.
#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    pub value: ExprValue,
    pub line: u32,
    pub col: u32,
}

/// Equality is structural and ignores source position; `:match` and the
/// test suite both compare values, not provenance.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Expr {
    pub fn new(value: ExprValue) -> Expr {
        Expr { value, line: 0, col: 0 }
    }

    pub fn at(mut self, line: u32, col: u32) -> Expr {
        self.line = line;
        self.col = col;
        self
    }

    pub fn null() -> Expr {
        Expr::new(ExprValue::Null)
    }

    pub fn bool(v: bool) -> Expr {
        Expr::new(ExprValue::Bool(v))
    }

    pub fn number(num: Num) -> Expr {
        Expr::new(ExprValue::Number { num, unit: None })
    }

    pub fn quantity(num: Num, unit: impl Into<String>) -> Expr {
        Expr::new(ExprValue::Number { num, unit: Some(unit.into()) })
    }

    pub fn string(s: impl Into<String>) -> Expr {
        Expr::new(ExprValue::Str(s.into()))
    }

    pub fn symbol(s: impl Into<String>) -> Expr {
        Expr::new(ExprValue::Symbol(s.into()))
    }

    pub fn literal(s: impl Into<String>) -> Expr {
        Expr::new(ExprValue::Literal(s.into()))
    }

    pub fn op(kind: TokenKind) -> Expr {
        Expr::new(ExprValue::Op(kind))
    }

    pub fn array(items: Vec<Expr>) -> Expr {
        Expr::new(ExprValue::Array(items))
    }

    pub fn object(pairs: Vec<(String, Expr)>) -> Expr {
        Expr::new(ExprValue::Object(pairs))
    }

    pub fn block(groups: Vec<Vec<Expr>>) -> Expr {
        Expr::new(ExprValue::Block(groups))
    }

    pub fn range(spec: RangeSpec) -> Expr {
        Expr::new(ExprValue::Range(Box::new(spec)))
    }

    pub fn callable(params: Vec<Param>, body: Vec<Expr>) -> Expr {
        Expr::new(ExprValue::Callable(Box::new(Callable {
            params,
            body,
            name: None,
            cached: false,
        })))
    }

    /// Wrap a token group: singletons unwrap, anything longer becomes a
    /// one-group block so it evaluates as a unit.
    pub fn group(mut exprs: Vec<Expr>) -> Expr {
        if exprs.len() == 1 {
            exprs.pop().unwrap()
        } else {
            Expr::new(ExprValue::Block(vec![exprs]))
        }
    }

    pub fn kind(&self) -> ExprKind {
        match &self.value {
            ExprValue::Null => ExprKind::Null,
            ExprValue::Bool(_) => ExprKind::Bool,
            ExprValue::Number { .. } => ExprKind::Number,
            ExprValue::Str(_) => ExprKind::Str,
            ExprValue::Symbol(_) => ExprKind::Symbol,
            ExprValue::Regex(_) => ExprKind::Regex,
            ExprValue::Text { .. } => ExprKind::Text,
            ExprValue::Comment(_) => ExprKind::Comment,
            ExprValue::Op(_) => ExprKind::Op,
            ExprValue::Literal(_) => ExprKind::Literal,
            ExprValue::Hole => ExprKind::Hole,
            ExprValue::Block(_) => ExprKind::Block,
            ExprValue::Array(_) => ExprKind::Array,
            ExprValue::Object(_) => ExprKind::Object,
            ExprValue::Range(_) => ExprKind::Range,
            ExprValue::Callable(_) => ExprKind::Callable,
            ExprValue::Native(_) => ExprKind::Native,
            ExprValue::Ffi { .. } => ExprKind::Ffi,
        }
    }

    pub fn is_op(&self, kind: TokenKind) -> bool {
        matches!(&self.value, ExprValue::Op(k) if *k == kind)
    }

    pub fn as_number(&self) -> Option<(&Num, Option<&str>)> {
        match &self.value {
            ExprValue::Number { num, unit } => Some((num, unit.as_deref())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            ExprValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match &self.value {
            ExprValue::Callable(c) => Some(c),
            _ => None,
        }
    }

    /// Language truthiness: null, false, and zero are falsy.
    pub fn is_truthy(&self) -> bool {
        match &self.value {
            ExprValue::Null => false,
            ExprValue::Bool(b) => *b,
            ExprValue::Number { num, .. } => !num.is_zero(),
            ExprValue::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Name-directed subtree substitution: every `Literal(name)` below this
    /// node is replaced with a deep copy of `replacement`. Substitution is
    /// hygienic -- it does not descend into a callable whose parameter list
    /// rebinds `name`.
    pub fn sub(&mut self, name: &str, replacement: &Expr) {
        match &mut self.value {
            ExprValue::Literal(l) if l == name => {
                let (line, col) = (self.line, self.col);
                *self = replacement.clone().at(line, col);
            }
            ExprValue::Block(groups) => {
                for group in groups {
                    for e in group {
                        e.sub(name, replacement);
                    }
                }
            }
            ExprValue::Array(items) => {
                for e in items {
                    e.sub(name, replacement);
                }
            }
            ExprValue::Object(pairs) => {
                for (_, e) in pairs {
                    e.sub(name, replacement);
                }
            }
            ExprValue::Range(spec) => {
                spec.begin.sub(name, replacement);
                spec.end.sub(name, replacement);
                if let Some(step) = &mut spec.step {
                    step.sub(name, replacement);
                }
                if let Some(slice) = &mut spec.slice {
                    if let Some(l) = &mut slice.length {
                        l.sub(name, replacement);
                    }
                    if let Some(o) = &mut slice.offset {
                        o.sub(name, replacement);
                    }
                }
            }
            ExprValue::Callable(c) => {
                if c.params.iter().any(|p| p.name == name) {
                    return;
                }
                for e in &mut c.body {
                    e.sub(name, replacement);
                }
            }
            _ => {}
        }
    }
}
