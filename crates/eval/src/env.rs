//! Lexical scope chain.
//!
//! One `Env` per lexical block entered during evaluation (function call,
//! `:let`, `:if` branch, loop iteration, module). Environments are created
//! on entry and dropped when evaluation of the block completes; the only
//! mutation form in the language is `:let` rebinding, scoped to the
//! enclosing `Env`.

use slate_core::{ErrorKind, Expr, ExprValue, SlateError};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

pub type SharedEnv = Rc<RefCell<Env>>;

/// Resolution state of a non-callable binding. Guards direct self-recursive
/// variable definitions (`a = 1.5 * a`) while callables stay exempt so
/// recursive functions work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolve {
    Unresolved,
    Resolving,
    Resolved,
}

#[derive(Debug)]
pub struct Binding {
    pub value: Expr,
    state: Cell<Resolve>,
    /// Definition site, carried into error messages.
    pub line: u32,
    pub col: u32,
}

impl Binding {
    fn is_callable(&self) -> bool {
        matches!(self.value.value, ExprValue::Callable(_) | ExprValue::Native(_) | ExprValue::Ffi { .. })
    }
}

#[derive(Debug, Default)]
pub struct Env {
    locals: HashMap<String, Binding>,
    parent: Option<SharedEnv>,
    /// Set by `:module`; names the module this env belongs to.
    pub module_descriptor: Option<String>,
    /// Names marked by `:export`, in declaration order.
    pub exported: Vec<String>,
}

impl Env {
    pub fn root() -> SharedEnv {
        Rc::new(RefCell::new(Env::default()))
    }

    pub fn child(parent: &SharedEnv) -> SharedEnv {
        Rc::new(RefCell::new(Env {
            parent: Some(Rc::clone(parent)),
            ..Env::default()
        }))
    }

    /// Declare a name whose value is not evaluated yet. A lookup during its
    /// own resolution returns the raw body once; a second lookup raises
    /// `UnexpectedSelfReference`.
    pub fn declare(&mut self, name: impl Into<String>, raw: Expr) {
        let (line, col) = (raw.line, raw.col);
        self.locals.insert(
            name.into(),
            Binding { value: raw, state: Cell::new(Resolve::Unresolved), line, col },
        );
    }

    /// Bind a fully evaluated value.
    pub fn bind(&mut self, name: impl Into<String>, value: Expr) {
        let (line, col) = (value.line, value.col);
        self.locals.insert(
            name.into(),
            Binding { value, state: Cell::new(Resolve::Resolved), line, col },
        );
    }

    /// Register a callable binding with its definition site attached.
    pub fn defn(&mut self, name: impl Into<String>, callable: Expr, line: u32, col: u32) {
        self.locals.insert(
            name.into(),
            Binding { value: callable, state: Cell::new(Resolve::Resolved), line, col },
        );
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    /// Walk the scope chain. Raises `UndeclaredLocal` on a root miss and
    /// `UnexpectedSelfReference` on a re-entrant non-callable lookup.
    pub fn get(&self, name: &str, line: u32, col: u32) -> Result<Expr, SlateError> {
        if let Some(b) = self.locals.get(name) {
            if b.is_callable() {
                return Ok(b.value.clone());
            }
            return match b.state.get() {
                Resolve::Resolved => Ok(b.value.clone()),
                Resolve::Resolving => Err(SlateError::new(
                    ErrorKind::UnexpectedSelfReference,
                    line,
                    col,
                    format!("'{}' refers to itself before it is defined", name),
                )
                .with_lexeme(name)),
                Resolve::Unresolved => {
                    b.state.set(Resolve::Resolving);
                    Ok(b.value.clone())
                }
            };
        }
        match &self.parent {
            Some(p) => p.borrow().get(name, line, col),
            None => Err(SlateError::new(
                ErrorKind::UndeclaredLocal,
                line,
                col,
                format!("'{}' is not defined", name),
            )
            .with_lexeme(name)),
        }
    }

    /// True when the name resolves anywhere in the chain.
    pub fn knows(&self, name: &str) -> bool {
        if self.locals.contains_key(name) {
            return true;
        }
        match &self.parent {
            Some(p) => p.borrow().knows(name),
            None => false,
        }
    }

    /// Exported bindings of this env: names marked by `:export`, or every
    /// local when nothing was marked (a module with no `:export` statements
    /// exposes everything it defines).
    pub fn exports(&self) -> Vec<(String, Expr)> {
        if self.exported.is_empty() {
            let mut all: Vec<(String, Expr)> =
                self.locals.iter().map(|(k, b)| (k.clone(), b.value.clone())).collect();
            all.sort_by(|a, b| a.0.cmp(&b.0));
            return all;
        }
        self.exported
            .iter()
            .filter_map(|n| self.locals.get(n).map(|b| (n.clone(), b.value.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slate_core::Num;

    #[test]
    fn get_walks_the_chain() {
        let root = Env::root();
        root.borrow_mut().bind("x", Expr::number(Num::Int(1)));
        let child = Env::child(&root);
        let got = child.borrow().get("x", 1, 1).unwrap();
        assert_eq!(got, Expr::number(Num::Int(1)));
    }

    #[test]
    fn root_miss_is_undeclared_local() {
        let root = Env::root();
        let err = root.borrow().get("nope", 2, 5).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndeclaredLocal);
        assert_eq!((err.line, err.col), (2, 5));
    }

    #[test]
    fn second_unresolved_lookup_is_self_reference() {
        let root = Env::root();
        root.borrow_mut().declare("a", Expr::literal("a"));
        // First lookup returns the raw body.
        assert!(root.borrow().get("a", 1, 1).is_ok());
        // Second lookup, still unresolved: self reference.
        let err = root.borrow().get("a", 1, 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedSelfReference);
    }

    #[test]
    fn callables_are_exempt_from_the_guard() {
        let root = Env::root();
        let f = Expr::callable(vec![], vec![Expr::literal("f")]);
        root.borrow_mut().defn("f", f, 1, 1);
        assert!(root.borrow().get("f", 1, 1).is_ok());
        assert!(root.borrow().get("f", 1, 1).is_ok());
    }

    #[test]
    fn shadowing_is_lexical() {
        let root = Env::root();
        root.borrow_mut().bind("x", Expr::number(Num::Int(1)));
        let child = Env::child(&root);
        child.borrow_mut().bind("x", Expr::number(Num::Int(2)));
        assert_eq!(child.borrow().get("x", 1, 1).unwrap(), Expr::number(Num::Int(2)));
        assert_eq!(root.borrow().get("x", 1, 1).unwrap(), Expr::number(Num::Int(1)));
    }

    #[test]
    fn explicit_exports_win_over_everything() {
        let root = Env::root();
        root.borrow_mut().bind("a", Expr::number(Num::Int(1)));
        root.borrow_mut().bind("b", Expr::number(Num::Int(2)));
        assert_eq!(root.borrow().exports().len(), 2);
        root.borrow_mut().exported.push("b".into());
        let ex = root.borrow().exports();
        assert_eq!(ex, vec![("b".into(), Expr::number(Num::Int(2)))]);
    }
}
