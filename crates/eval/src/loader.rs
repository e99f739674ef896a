//! Host integration seams: module loading and foreign functions.
//!
//! Both are injected into the interpreter as trait objects so embedders
//! decide where modules come from (memory, disk, network) and what foreign
//! calls exist. The interpreter owns the per-path module cache and cyclic
//! import detection; loaders only fetch.

use async_trait::async_trait;
use serde_json::Value;
use slate_core::{ErrorKind, Expr, ExprValue, Num, SlateError};
use std::collections::HashMap;

/// What a loader hands back for an import path.
#[derive(Debug)]
pub enum ModuleHandle {
    /// Slate source text, evaluated in a fresh module environment.
    Source(String),
    /// Pre-built export map from a host-native module.
    Native(Vec<(String, Expr)>),
}

#[async_trait(?Send)]
pub trait ModuleLoader {
    async fn load(&self, path: &str) -> Result<ModuleHandle, SlateError>;
}

/// In-memory loader: a path-to-source map, used by tests and embedders
/// that bundle their modules. A missed path is retried with an `.md`
/// suffix before giving up.
#[derive(Default)]
pub struct MemoryLoader {
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> MemoryLoader {
        MemoryLoader::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(path.into(), source.into());
    }
}

#[async_trait(?Send)]
impl ModuleLoader for MemoryLoader {
    async fn load(&self, path: &str) -> Result<ModuleHandle, SlateError> {
        let found = self
            .sources
            .get(path)
            .or_else(|| self.sources.get(&format!("{}.md", path)));
        match found {
            Some(src) => Ok(ModuleHandle::Source(src.clone())),
            None => Err(SlateError::new(
                ErrorKind::Import,
                0,
                0,
                format!("module not found: {}", path),
            )),
        }
    }
}

// ── foreign functions ────────────────────────────────────────────────────

/// A regular foreign function: arguments are evaluated and converted to
/// JSON before the call, and the JSON result converts back to a value.
#[async_trait(?Send)]
pub trait ForeignFn {
    async fn call(&self, args: Vec<Value>) -> Result<Value, SlateError>;
}

/// A raw foreign function: receives the unevaluated argument expressions
/// and returns an expression the interpreter evaluates in the call's
/// environment. This is the macro-like escape hatch.
pub trait RawForeignFn {
    fn call(&self, args: Vec<Expr>) -> Result<Expr, SlateError>;
}

/// Label-addressed registry of foreign functions. `Expr::Ffi` nodes carry
/// only the label and calling convention; the table resolves them at call
/// time.
#[derive(Default)]
pub struct FfiTable {
    regular: HashMap<String, Box<dyn ForeignFn>>,
    raw: HashMap<String, Box<dyn RawForeignFn>>,
}

impl FfiTable {
    pub fn new() -> FfiTable {
        FfiTable::default()
    }

    pub fn register(&mut self, label: impl Into<String>, f: Box<dyn ForeignFn>) -> Expr {
        let label = label.into();
        self.regular.insert(label.clone(), f);
        Expr::new(ExprValue::Ffi { label, raw: false })
    }

    pub fn register_raw(&mut self, label: impl Into<String>, f: Box<dyn RawForeignFn>) -> Expr {
        let label = label.into();
        self.raw.insert(label.clone(), f);
        Expr::new(ExprValue::Ffi { label, raw: true })
    }

    pub fn regular(&self, label: &str) -> Option<&dyn ForeignFn> {
        self.regular.get(label).map(|b| b.as_ref())
    }

    pub fn raw(&self, label: &str) -> Option<&dyn RawForeignFn> {
        self.raw.get(label).map(|b| b.as_ref())
    }
}

// ── JSON bridge ──────────────────────────────────────────────────────────

/// Value-to-JSON conversion for regular foreign calls. Callables and other
/// code-bearing values do not cross the boundary.
pub fn to_json(e: &Expr) -> Result<Value, SlateError> {
    match &e.value {
        ExprValue::Null => Ok(Value::Null),
        ExprValue::Bool(b) => Ok(Value::Bool(*b)),
        ExprValue::Number { num, .. } => match num {
            Num::Int(n) => Ok(Value::from(*n)),
            other => serde_json::Number::from_f64(other.to_f64())
                .map(Value::Number)
                .ok_or_else(|| {
                    SlateError::new(ErrorKind::TypeMismatch, e.line, e.col, "non-finite number")
                }),
        },
        ExprValue::Str(s) | ExprValue::Symbol(s) => Ok(Value::String(s.clone())),
        ExprValue::Array(items) => items.iter().map(to_json).collect::<Result<_, _>>().map(Value::Array),
        ExprValue::Object(pairs) => {
            let mut map = serde_json::Map::new();
            for (k, v) in pairs {
                map.insert(k.clone(), to_json(v)?);
            }
            Ok(Value::Object(map))
        }
        _ => Err(SlateError::new(
            ErrorKind::TypeMismatch,
            e.line,
            e.col,
            format!("{:?} values cannot cross a foreign call", e.kind()),
        )),
    }
}

pub fn from_json(v: &Value) -> Expr {
    match v {
        Value::Null => Expr::null(),
        Value::Bool(b) => Expr::bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Expr::number(Num::Int(i))
            } else {
                Expr::number(Num::from_f64(n.as_f64().unwrap_or(0.0)))
            }
        }
        Value::String(s) => Expr::string(s.clone()),
        Value::Array(items) => Expr::array(items.iter().map(from_json).collect()),
        Value::Object(map) => {
            Expr::object(map.iter().map(|(k, v)| (k.clone(), from_json(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_loader_falls_back_to_md() {
        let mut loader = MemoryLoader::new();
        loader.insert("rates.md", ":export usd_to_mxn");
        match loader.load("rates").await.unwrap() {
            ModuleHandle::Source(src) => assert!(src.contains("usd_to_mxn")),
            ModuleHandle::Native(_) => panic!("expected source module"),
        }
        let err = loader.load("missing").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Import);
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        // Keys in sorted order: serde_json maps iterate alphabetically.
        let e = Expr::object(vec![
            ("items".into(), Expr::array(vec![Expr::string("a"), Expr::bool(true)])),
            ("n".into(), Expr::number(Num::Int(3))),
        ]);
        let j = to_json(&e).unwrap();
        assert_eq!(j["n"], 3);
        assert_eq!(from_json(&j), e);
    }

    #[test]
    fn callables_do_not_cross_the_boundary() {
        let f = Expr::callable(vec![], vec![Expr::null()]);
        assert!(to_json(&f).is_err());
    }

    #[test]
    fn ffi_table_resolves_by_label() {
        struct Echo;
        #[async_trait(?Send)]
        impl ForeignFn for Echo {
            async fn call(&self, args: Vec<Value>) -> Result<Value, SlateError> {
                Ok(args.into_iter().next().unwrap_or(Value::Null))
            }
        }
        let mut table = FfiTable::new();
        let handle = table.register("echo", Box::new(Echo));
        assert_eq!(handle.value, ExprValue::Ffi { label: "echo".into(), raw: false });
        assert!(table.regular("echo").is_some());
        assert!(table.raw("echo").is_none());
    }
}
