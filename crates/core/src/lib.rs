//! Slate language core -- scanner, parser, AST model, serializer.
//!
//! Slate is a literate-calculation language: markdown-like prose with
//! inline executable expressions. This crate covers the front half of the
//! pipeline: source text -> tokens -> nested `Expr` lists, plus the
//! round-trippable pretty-printer. Evaluation lives in `slate-eval`.

pub mod error;
pub mod expr;
pub mod num;
pub mod parser;
pub mod scanner;
pub mod serialize;
pub mod template;
pub mod token;
pub mod units;

pub use error::{ErrorKind, SlateError};
pub use expr::{Callable, Expr, ExprKind, ExprValue, Param, RangeSpec, SliceSpec};
pub use num::Num;
pub use parser::{parse, split};
pub use scanner::scan;
pub use serialize::{serialize, serialize_all};
pub use template::{TemplateRule, TemplateTable};
pub use token::{Flavor, Token, TokenKind, TokenValue};
pub use units::{UnitRegistry, UnitValue};
