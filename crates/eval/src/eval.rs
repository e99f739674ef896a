//! The evaluator.
//!
//! Evaluation walks each expression group with a cursor and an output
//! stack: a fixed chain of rules consumes operator/value shapes in priority
//! order (unary, dot-access, pipes, calls), then two binary-reduction
//! passes collapse the remaining stack (`*`/`/` first, then
//! `+`/`-`/`%`/`++`), giving conventional precedence without a
//! precedence-climbing parser. The whole walk is a single-threaded async
//! state machine; suspension points are statement recursion, foreign
//! calls, and module imports.

use crate::call::{self, Applied};
use crate::env::{Env, SharedEnv};
use crate::globals::{self, display, Natives};
use crate::loader::{from_json, to_json, FfiTable, MemoryLoader, ModuleLoader};
use crate::range::EvalRange;
use crate::units::ConversionContext;
use slate_core::{
    parse, scan, ErrorKind, Expr, ExprValue, Flavor, Num, RangeSpec, SlateError, SliceSpec,
    TemplateTable, Token, TokenKind,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

pub(crate) type EvalFut<'a> = Pin<Box<dyn Future<Output = Result<Expr, SlateError>> + 'a>>;

/// Largest sequence a lazy range will materialize into.
const RANGE_LIMIT: i64 = 1_000_000;

/// Outcome of evaluating a document: every result produced before the
/// first uncaught error, plus that error if one occurred.
#[derive(Debug)]
pub struct DocumentEval {
    pub results: Vec<Expr>,
    pub error: Option<SlateError>,
}

pub(crate) enum ModuleState {
    Loading,
    Ready(Vec<(String, Expr)>),
}

pub struct Interp {
    pub(crate) natives: Natives,
    pub(crate) ffi: FfiTable,
    pub(crate) conv: ConversionContext,
    pub(crate) loader: Box<dyn ModuleLoader>,
    pub(crate) modules: RefCell<HashMap<String, ModuleState>>,
    /// Host-provided names seeded into every top-level scope. Foreign
    /// function handles land here so scripts can call them by name.
    bindings: Vec<(String, Expr)>,
    /// Per-top-level-pass memo for cached callables.
    memo: RefCell<HashMap<String, Expr>>,
    memo_hits: Cell<u64>,
    /// Document mode: an undeclared bare word passes through as prose.
    lenient: Cell<bool>,
}

impl Default for Interp {
    fn default() -> Interp {
        Interp::new()
    }
}

impl Interp {
    pub fn new() -> Interp {
        Interp::with_loader(Box::new(MemoryLoader::new()))
    }

    pub fn with_loader(loader: Box<dyn ModuleLoader>) -> Interp {
        Interp {
            natives: Natives::standard(),
            ffi: FfiTable::new(),
            conv: ConversionContext::default(),
            loader,
            modules: RefCell::new(HashMap::new()),
            bindings: Vec::new(),
            memo: RefCell::new(HashMap::new()),
            memo_hits: Cell::new(0),
            lenient: Cell::new(true),
        }
    }

    pub fn conversion(mut self, conv: ConversionContext) -> Interp {
        self.conv = conv;
        self
    }

    /// Register foreign functions before evaluation starts.
    pub fn ffi_mut(&mut self) -> &mut FfiTable {
        &mut self.ffi
    }

    /// Seed a top-level name. Module scopes do not see these.
    pub fn bind(&mut self, name: impl Into<String>, value: Expr) {
        self.bindings.push((name.into(), value));
    }

    fn seeded_root(&self) -> SharedEnv {
        let env = Env::root();
        for (name, value) in &self.bindings {
            env.borrow_mut().bind(name.clone(), value.clone());
        }
        env
    }

    /// Cache hits recorded by memoized calls since construction.
    pub fn memo_hits(&self) -> u64 {
        self.memo_hits.get()
    }

    // ── entry points ─────────────────────────────────────────────────

    pub fn tokens(&self, source: &str) -> Result<Vec<Token>, SlateError> {
        scan(source, &self.conv.scanner_units())
    }

    pub fn ast(&self, source: &str, document: bool) -> Result<Vec<Expr>, SlateError> {
        let tokens = self.tokens(source)?;
        let mut templates = TemplateTable::new();
        parse(&tokens, document, &mut templates)
    }

    /// Evaluate a whole document: prose passes through, statements reduce
    /// to values, and evaluation stops at the first uncaught error while
    /// keeping everything already produced.
    pub async fn eval_document(&self, source: &str) -> DocumentEval {
        self.lenient.set(true);
        let stmts = match self.ast(source, true) {
            Ok(s) => s,
            Err(e) => return DocumentEval { results: Vec::new(), error: Some(e) },
        };
        if let Err(e) = self.conv.refresh_rates().await {
            return DocumentEval { results: Vec::new(), error: Some(e) };
        }
        let env = self.seeded_root();
        let mut results = Vec::new();
        for stmt in stmts {
            if matches!(stmt.value, ExprValue::Text { .. } | ExprValue::Comment(_)) {
                results.push(stmt);
                continue;
            }
            self.memo.borrow_mut().clear();
            match self.eval(env.clone(), stmt).await {
                Ok(v) => results.push(v),
                Err(e) => return DocumentEval { results, error: Some(e) },
            }
        }
        DocumentEval { results, error: None }
    }

    /// One-shot strict evaluation: no prose tolerance, last value wins.
    pub async fn eval_expr(&self, source: &str) -> Result<Expr, SlateError> {
        self.lenient.set(false);
        let stmts = self.ast(source, false)?;
        self.conv.refresh_rates().await?;
        let env = self.seeded_root();
        let mut last = Expr::null();
        for stmt in stmts {
            self.memo.borrow_mut().clear();
            last = self.eval(env.clone(), stmt).await?;
        }
        Ok(last)
    }

    // ── recursive evaluation ─────────────────────────────────────────

    pub(crate) fn eval<'a>(&'a self, env: SharedEnv, e: Expr) -> EvalFut<'a> {
        Box::pin(async move {
            let (line, col) = (e.line, e.col);
            match e.value {
                ExprValue::Object(pairs) => self.exec_object(env, pairs, line, col).await,
                ExprValue::Block(groups) => {
                    if groups.len() == 1 {
                        let group = groups.into_iter().next().unwrap_or_default();
                        self.eval_group(env, group).await
                    } else {
                        let mut out = Vec::with_capacity(groups.len());
                        for g in groups {
                            out.push(self.eval_group(env.clone(), g).await?);
                        }
                        Ok(Expr::array(out).at(line, col))
                    }
                }
                ExprValue::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.eval(env.clone(), item).await?);
                    }
                    Ok(Expr::array(out).at(line, col))
                }
                ExprValue::Literal(name) => self.resolve(env, &name, line, col).await,
                ExprValue::Range(spec) => {
                    // Bounds evaluate now; the sequence stays lazy.
                    let spec = *spec;
                    let begin = self.eval(env.clone(), spec.begin).await?;
                    let end = self.eval(env.clone(), spec.end).await?;
                    let step = match spec.step {
                        Some(s) => Some(self.eval(env.clone(), s).await?),
                        None => None,
                    };
                    let slice = match spec.slice {
                        Some(s) => Some(SliceSpec {
                            length: match s.length {
                                Some(l) => Some(self.eval(env.clone(), l).await?),
                                None => None,
                            },
                            offset: match s.offset {
                                Some(o) => Some(self.eval(env.clone(), o).await?),
                                None => None,
                            },
                        }),
                        None => None,
                    };
                    Ok(Expr::range(RangeSpec { begin, end, step, slice }).at(line, col))
                }
                value => Ok(Expr { value, line, col }),
            }
        })
    }

    async fn resolve(
        &self,
        env: SharedEnv,
        name: &str,
        line: u32,
        col: u32,
    ) -> Result<Expr, SlateError> {
        let got = env.borrow().get(name, line, col);
        match got {
            Ok(v) => match v.value {
                ExprValue::Callable(_) | ExprValue::Native(_) | ExprValue::Ffi { .. } => Ok(v),
                // A raw body (mid-`:let` self lookup) still needs reducing;
                // evaluated bindings re-evaluate to themselves.
                _ => self.eval(env.clone(), v).await,
            },
            Err(e) if e.kind == ErrorKind::UndeclaredLocal && self.lenient.get() => Ok(Expr::new(
                ExprValue::Text { text: name.to_string(), flavor: Flavor::Markup },
            )
            .at(line, col)),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn eval_group<'a>(&'a self, env: SharedEnv, exprs: Vec<Expr>) -> EvalFut<'a> {
        Box::pin(async move {
            let (gline, gcol) = exprs.first().map(|e| (e.line, e.col)).unwrap_or((0, 0));
            // Prefix logic form: `(< a b)`, `(? a b c)`, `($ a b c)`.
            if let Some(first) = exprs.iter().find(|e| !matches!(e.value, ExprValue::Comment(_)))
            {
                if let ExprValue::Op(k) = &first.value {
                    let k = *k;
                    if matches!(
                        k,
                        TokenKind::Lt
                            | TokenKind::Gt
                            | TokenKind::Lte
                            | TokenKind::Gte
                            | TokenKind::Eq
                            | TokenKind::Neq
                            | TokenKind::Question
                            | TokenKind::AllOf
                            | TokenKind::Pipe
                    ) {
                        return self.prefix_form(env, k, exprs).await;
                    }
                }
            }

            let mut out: Vec<Expr> = Vec::new();
            let mut i = 0;
            while i < exprs.len() {
                let cur = &exprs[i];
                let prev_is_value =
                    out.last().map(|p| !matches!(p.value, ExprValue::Op(_))).unwrap_or(false);
                match &cur.value {
                    ExprValue::Comment(_) => i += 1,
                    ExprValue::Op(TokenKind::Minus) if !prev_is_value => {
                        let operand = exprs
                            .get(i + 1)
                            .cloned()
                            .ok_or_else(|| self.op_err(cur, "dangling '-'"))?;
                        let v = self.eval(env.clone(), operand).await?;
                        match v.value {
                            ExprValue::Number { num, unit } => out.push(
                                Expr { value: ExprValue::Number { num: num.neg(), unit }, line: cur.line, col: cur.col },
                            ),
                            _ => return Err(self.op_err(cur, "'-' needs a number")),
                        }
                        i += 2;
                    }
                    ExprValue::Op(TokenKind::Bang) if prev_is_value => {
                        // Postfix cache marker; the flag lives on the binding.
                        i += 1;
                    }
                    ExprValue::Op(TokenKind::Bang) => {
                        let operand = exprs
                            .get(i + 1)
                            .cloned()
                            .ok_or_else(|| self.op_err(cur, "dangling '!'"))?;
                        let v = self.eval(env.clone(), operand).await?;
                        out.push(Expr::bool(!v.is_truthy()).at(cur.line, cur.col));
                        i += 2;
                    }
                    ExprValue::Op(TokenKind::Dot) => {
                        let recv = out
                            .pop()
                            .ok_or_else(|| self.op_err(cur, "dangling '.'"))?;
                        let name_e = exprs
                            .get(i + 1)
                            .ok_or_else(|| self.op_err(cur, "missing name after '.'"))?;
                        let name = match &name_e.value {
                            ExprValue::Literal(n) | ExprValue::Str(n) => n.clone(),
                            _ => return Err(self.op_err(name_e, "expected a name after '.'")),
                        };
                        let arg_block = exprs
                            .get(i + 2)
                            .filter(|b| matches!(b.value, ExprValue::Block(_)));
                        let is_map = matches!(recv.value, ExprValue::Object(_));
                        if let (Some(block), false) = (arg_block, is_map) {
                            let mut args = Vec::new();
                            for a in call::args_of(block) {
                                args.push(self.eval(env.clone(), a).await?);
                            }
                            match globals::method(&self.natives, &recv, &name, &args) {
                                Some(r) => {
                                    out.push(r?);
                                    i += 3;
                                    continue;
                                }
                                None => {}
                            }
                            // `recv.f(a)` with `f` bound in scope calls
                            // `f(recv, a)`.
                            if let Some(f) = self.bound_callee(&env, &name) {
                                let mut full = Vec::with_capacity(args.len() + 1);
                                full.push(recv);
                                full.extend(args);
                                let v = self
                                    .invoke(env.clone(), f, full, cur.line, cur.col)
                                    .await?;
                                out.push(v);
                                i += 3;
                                continue;
                            }
                        }
                        let v = match self.dot_value(recv.clone(), &name, name_e.line, name_e.col)
                        {
                            Ok(v) => v,
                            // `recv.f` with `f` bound in scope calls `f(recv)`.
                            Err(e) => match self.bound_callee(&env, &name) {
                                Some(f) => {
                                    self.invoke(env.clone(), f, vec![recv], cur.line, cur.col)
                                        .await?
                                }
                                None => return Err(e),
                            },
                        };
                        out.push(v);
                        i += 2;
                    }
                    ExprValue::Op(TokenKind::PipeForward) => {
                        let lhs = out
                            .pop()
                            .ok_or_else(|| self.op_err(cur, "'|>' needs a left operand"))?;
                        let mut j = i + 1;
                        let callee_e = exprs
                            .get(j)
                            .cloned()
                            .ok_or_else(|| self.op_err(cur, "'|>' needs a target"))?;
                        j += 1;
                        let mut callee = self.eval(env.clone(), callee_e).await?;
                        // Dotted pipe target: `xs |> list.sum`.
                        while exprs.get(j).map(|e| e.is_op(TokenKind::Dot)).unwrap_or(false) {
                            let name_e = exprs
                                .get(j + 1)
                                .ok_or_else(|| self.op_err(cur, "missing name after '.'"))?;
                            let name = match &name_e.value {
                                ExprValue::Literal(n) => n.clone(),
                                _ => return Err(self.op_err(name_e, "expected a name after '.'")),
                            };
                            callee = self.dot_value(callee, &name, name_e.line, name_e.col)?;
                            j += 2;
                        }
                        let v = self.invoke(env.clone(), callee, vec![lhs], cur.line, cur.col).await?;
                        out.push(v);
                        i = j;
                    }
                    ExprValue::Block(_) if prev_is_value && is_callee(out.last()) => {
                        let callee = out.pop().unwrap_or_else(Expr::null);
                        let v = self
                            .invoke_block(env.clone(), callee, cur, cur.line, cur.col)
                            .await?;
                        out.push(v);
                        i += 1;
                    }
                    ExprValue::Literal(_) => {
                        let lit = cur.clone();
                        let v = self.eval(env.clone(), lit).await?;
                        // Infix call sugar: `a foo b` with `foo` callable.
                        let next_is_plain = exprs
                            .get(i + 1)
                            .map(|n| {
                                !matches!(n.value, ExprValue::Block(_) | ExprValue::Op(_))
                            })
                            .unwrap_or(false);
                        if is_callee(Some(&v)) && prev_is_value && next_is_plain {
                            let left = out.pop().unwrap_or_else(Expr::null);
                            let right_e = exprs[i + 1].clone();
                            let right = self.eval(env.clone(), right_e).await?;
                            let r = self
                                .invoke(env.clone(), v, vec![left, right], cur.line, cur.col)
                                .await?;
                            out.push(r);
                            i += 2;
                        } else {
                            out.push(v);
                            i += 1;
                        }
                    }
                    _ => {
                        let v = self.eval(env.clone(), cur.clone()).await?;
                        out.push(v);
                        i += 1;
                    }
                }
            }

            self.reduce(&mut out, call::is_tight_op).await?;
            self.reduce(&mut out, call::is_loose_op).await?;

            // Prose mixed into an expression statement (a sentence-ending
            // dot, trailing words) stays out of the computed result.
            let values = out
                .iter()
                .filter(|e| !matches!(e.value, ExprValue::Text { .. }))
                .count();
            if values == 1 && values != out.len() {
                out.retain(|e| !matches!(e.value, ExprValue::Text { .. }));
            }
            match out.len() {
                0 => Ok(Expr::null().at(gline, gcol)),
                1 => Ok(out.pop().unwrap_or_else(Expr::null)),
                _ => Ok(Expr::array(out).at(gline, gcol)),
            }
        })
    }

    /// One binary-reduction pass: collapse `(left, op, right)` triples
    /// left-to-right until no matching operator remains.
    async fn reduce(
        &self,
        out: &mut Vec<Expr>,
        matches_op: fn(&Expr) -> bool,
    ) -> Result<(), SlateError> {
        loop {
            let pos = out
                .iter()
                .enumerate()
                .position(|(i, e)| i > 0 && i + 1 < out.len() && matches_op(e));
            let Some(i) = pos else { return Ok(()) };
            let right = out.remove(i + 1);
            let op = out.remove(i);
            let left = out.remove(i - 1);
            let kind = match op.value {
                ExprValue::Op(k) => k,
                _ => TokenKind::Plus,
            };
            let v = self.binary(kind, left, right, op.line, op.col).await?;
            out.insert(i - 1, v);
        }
    }

    async fn binary(
        &self,
        kind: TokenKind,
        left: Expr,
        right: Expr,
        line: u32,
        col: u32,
    ) -> Result<Expr, SlateError> {
        // `15 * :MXN` tags the number with a unit.
        if kind == TokenKind::Star {
            if let (ExprValue::Number { num, .. }, ExprValue::Symbol(s)) =
                (&left.value, &right.value)
            {
                if self.conv.is_unit(s) {
                    return Ok(Expr::quantity(*num, s.clone()).at(line, col));
                }
            }
        }
        if kind == TokenKind::Concat {
            return Ok(self.concat(left, right).at(line, col));
        }
        if kind == TokenKind::Percent {
            if let ExprValue::Str(s) = &left.value {
                return Ok(Expr::string(self.format_str(s, &right)).at(line, col));
            }
        }
        let (ln, lu) = match &left.value {
            ExprValue::Number { num, unit } => (*num, unit.clone()),
            _ => {
                return Err(SlateError::new(
                    ErrorKind::TypeMismatch,
                    line,
                    col,
                    format!("'{}' needs numbers, found {:?}", op_name(kind), left.kind()),
                ))
            }
        };
        let (mut rn, ru) = match &right.value {
            ExprValue::Number { num, unit } => (*num, unit.clone()),
            _ => {
                return Err(SlateError::new(
                    ErrorKind::TypeMismatch,
                    line,
                    col,
                    format!("'{}' needs numbers, found {:?}", op_name(kind), right.kind()),
                ))
            }
        };
        // Mixed units: additive operators convert right into left's unit.
        let unit = match (&lu, &ru) {
            (Some(a), Some(b)) => {
                if a != b && matches!(kind, TokenKind::Plus | TokenKind::Minus) {
                    rn = self.conv.convert(&rn, b, a).map_err(|e| at(e, line, col))?;
                }
                match kind {
                    TokenKind::Slash if a == b => None,
                    _ => Some(a.clone()),
                }
            }
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
        let num = match kind {
            TokenKind::Plus => ln.add(&rn),
            TokenKind::Minus => ln.sub(&rn),
            TokenKind::Star => ln.mul(&rn),
            TokenKind::Slash => ln.div(&rn),
            TokenKind::Percent => ln.rem(&rn),
            _ => None,
        };
        let num = num.ok_or_else(|| {
            let why = if matches!(kind, TokenKind::Slash | TokenKind::Percent) && rn.is_zero() {
                "division by zero"
            } else {
                "numeric overflow"
            };
            SlateError::new(ErrorKind::TypeMismatch, line, col, why)
        })?;
        Ok(Expr { value: ExprValue::Number { num, unit }, line, col })
    }

    fn concat(&self, left: Expr, right: Expr) -> Expr {
        match (left.value, right.value) {
            (ExprValue::Array(mut a), ExprValue::Array(b)) => {
                a.extend(b);
                Expr::array(a)
            }
            (ExprValue::Array(mut a), other) => {
                a.push(Expr::new(other));
                Expr::array(a)
            }
            (l, r) => {
                let mut s = display(&Expr::new(l));
                s.push_str(&display(&Expr::new(r)));
                Expr::string(s)
            }
        }
    }

    /// `"a: %, b: %" % [1, 2]`: each `%` consumes one argument; `%%`
    /// escapes a literal percent sign.
    fn format_str(&self, s: &str, arg: &Expr) -> String {
        let mut args: std::collections::VecDeque<Expr> = match &arg.value {
            ExprValue::Array(items) => items.iter().cloned().collect(),
            _ => std::iter::once(arg.clone()).collect(),
        };
        let mut out = String::new();
        let mut chars = s.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                out.push('%');
                continue;
            }
            // Precision form `%.Nf`: fixed decimal places for a numeric
            // argument. Anything else after the dot stays literal.
            if chars.peek() == Some(&'.') {
                let mut ahead = chars.clone();
                ahead.next();
                let mut digits = String::new();
                while let Some(c) = ahead.peek().copied() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    digits.push(c);
                    ahead.next();
                }
                if ahead.peek() == Some(&'f') && !digits.is_empty() {
                    ahead.next();
                    chars = ahead;
                    let places = digits.parse::<usize>().unwrap_or(0);
                    match args.pop_front() {
                        Some(a) => match a.as_number() {
                            Some((n, _)) => {
                                out.push_str(&format!("{:.*}", places, n.to_f64()))
                            }
                            None => out.push_str(&display(&a)),
                        },
                        None => {
                            out.push('%');
                            out.push('.');
                            out.push_str(&digits);
                            out.push('f');
                        }
                    }
                    continue;
                }
            }
            if let Some(a) = args.pop_front() {
                out.push_str(&display(&a));
            } else {
                out.push('%');
            }
        }
        out
    }

    async fn prefix_form(
        &self,
        env: SharedEnv,
        kind: TokenKind,
        exprs: Vec<Expr>,
    ) -> Result<Expr, SlateError> {
        let (line, col) = exprs.first().map(|e| (e.line, e.col)).unwrap_or((0, 0));
        let operands: Vec<Expr> = exprs
            .into_iter()
            .skip(1)
            .filter(|e| !matches!(e.value, ExprValue::Comment(_)))
            .collect();
        match kind {
            TokenKind::Question | TokenKind::Pipe => {
                // Any-of: the first truthy operand wins, short-circuiting.
                for e in operands {
                    let v = self.eval(env.clone(), e).await?;
                    if v.is_truthy() {
                        return Ok(v);
                    }
                }
                Ok(Expr::bool(false).at(line, col))
            }
            TokenKind::AllOf => {
                let mut last = Expr::bool(true).at(line, col);
                for e in operands {
                    let v = self.eval(env.clone(), e).await?;
                    if !v.is_truthy() {
                        return Ok(Expr::bool(false).at(line, col));
                    }
                    last = v;
                }
                Ok(last)
            }
            TokenKind::Eq | TokenKind::Neq => {
                let mut vals = Vec::new();
                for e in operands {
                    vals.push(self.eval(env.clone(), e).await?);
                }
                if vals.len() < 2 {
                    return Err(SlateError::new(
                        ErrorKind::TypeMismatch,
                        line,
                        col,
                        "comparison needs two operands",
                    ));
                }
                let eq = self.values_equal(&vals[0], &vals[1]);
                Ok(Expr::bool(if kind == TokenKind::Eq { eq } else { !eq }).at(line, col))
            }
            _ => {
                let mut vals = Vec::new();
                for e in operands {
                    vals.push(self.eval(env.clone(), e).await?);
                }
                if vals.len() < 2 {
                    return Err(SlateError::new(
                        ErrorKind::TypeMismatch,
                        line,
                        col,
                        "comparison needs two operands",
                    ));
                }
                // Chains: (< a b c) holds when every adjacent pair holds.
                for pair in vals.windows(2) {
                    let ord = self.compare(&pair[0], &pair[1], line, col)?;
                    let ok = match kind {
                        TokenKind::Lt => ord.is_lt(),
                        TokenKind::Gt => ord.is_gt(),
                        TokenKind::Lte => ord.is_le(),
                        _ => ord.is_ge(),
                    };
                    if !ok {
                        return Ok(Expr::bool(false).at(line, col));
                    }
                }
                Ok(Expr::bool(true).at(line, col))
            }
        }
    }

    pub(crate) fn values_equal(&self, a: &Expr, b: &Expr) -> bool {
        match (a.as_number(), b.as_number()) {
            (Some((an, au)), Some((bn, bu))) if au == bu => an.compare(bn).is_eq(),
            _ => a == b,
        }
    }

    fn compare(
        &self,
        a: &Expr,
        b: &Expr,
        line: u32,
        col: u32,
    ) -> Result<std::cmp::Ordering, SlateError> {
        match (&a.value, &b.value) {
            (
                ExprValue::Number { num: an, unit: au },
                ExprValue::Number { num: bn, unit: bu },
            ) => match (au, bu) {
                (Some(u1), Some(u2)) if u1 != u2 => {
                    let converted = self.conv.convert(bn, u2, u1).map_err(|e| at(e, line, col))?;
                    Ok(an.compare(&converted))
                }
                _ => Ok(an.compare(bn)),
            },
            (ExprValue::Str(x), ExprValue::Str(y)) => Ok(x.cmp(y)),
            _ => Err(SlateError::new(
                ErrorKind::TypeMismatch,
                line,
                col,
                format!("cannot compare {:?} with {:?}", a.kind(), b.kind()),
            )),
        }
    }

    // ── access & calls ───────────────────────────────────────────────

    fn dot_value(&self, recv: Expr, name: &str, line: u32, col: u32) -> Result<Expr, SlateError> {
        match &recv.value {
            ExprValue::Object(pairs) => pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| {
                    SlateError::new(
                        ErrorKind::UndeclaredLocal,
                        line,
                        col,
                        format!("no entry '{}'", name),
                    )
                    .with_lexeme(name)
                }),
            ExprValue::Number { num, unit } => {
                // Unit accessor: `(35 * :mm).cm` converts.
                if self.conv.is_unit(name) {
                    let from = unit.as_deref().unwrap_or(name);
                    let converted =
                        self.conv.convert(num, from, name).map_err(|e| at(e, line, col))?;
                    return Ok(Expr::quantity(converted, name).at(line, col));
                }
                globals::property(&self.natives, &recv, name).unwrap_or_else(|| {
                    Err(no_property(&recv, name, line, col))
                })
            }
            ExprValue::Range(_) => {
                let r = self.built_range(&recv)?;
                match name {
                    "count" | "length" => Ok(Expr::number(Num::Int(r.len())).at(line, col)),
                    "first" => Ok(r.get(0).unwrap_or_else(Expr::null).at(line, col)),
                    "last" => Ok(r.get(r.len() - 1).unwrap_or_else(Expr::null).at(line, col)),
                    "sum" => {
                        let items = r.materialize(RANGE_LIMIT, line, col)?;
                        self.natives.call("list.sum", &[Expr::array(items)])
                    }
                    _ => Err(no_property(&recv, name, line, col)),
                }
            }
            _ => globals::property(&self.natives, &recv, name)
                .unwrap_or_else(|| Err(no_property(&recv, name, line, col))),
        }
    }

    /// A scope-bound callable by name, for dot-method dispatch.
    fn bound_callee(&self, env: &SharedEnv, name: &str) -> Option<Expr> {
        let v = env.borrow().get(name, 0, 0).ok()?;
        is_callee(Some(&v)).then_some(v)
    }

    async fn invoke_block(
        &self,
        env: SharedEnv,
        callee: Expr,
        block: &Expr,
        line: u32,
        col: u32,
    ) -> Result<Expr, SlateError> {
        let raw_args = call::args_of(block);
        if let ExprValue::Ffi { label, raw: true } = &callee.value {
            let f = self.ffi.raw(label).ok_or_else(|| {
                SlateError::new(ErrorKind::UndeclaredLocal, line, col, format!("no FFI '{}'", label))
            })?;
            let produced = f.call(raw_args)?;
            return self.eval(env, produced).await;
        }
        let mut args = Vec::with_capacity(raw_args.len());
        for a in raw_args {
            args.push(self.eval(env.clone(), a).await?);
        }
        self.invoke(env, callee, args, line, col).await
    }

    pub(crate) fn invoke<'a>(
        &'a self,
        env: SharedEnv,
        callee: Expr,
        args: Vec<Expr>,
        line: u32,
        col: u32,
    ) -> EvalFut<'a> {
        Box::pin(async move {
            match &callee.value {
                ExprValue::Callable(c) => {
                    let key = if c.cached {
                        c.name.as_ref().map(|n| call::memo_key(n, &args))
                    } else {
                        None
                    };
                    if let Some(k) = &key {
                        if let Some(hit) = self.memo.borrow().get(k) {
                            self.memo_hits.set(self.memo_hits.get() + 1);
                            return Ok(hit.clone());
                        }
                    }
                    let v = match call::apply(c, &args, line, col)? {
                        Applied::Partial(p) => p,
                        Applied::Body(body) => {
                            let child = Env::child(&env);
                            self.eval_group(child, body).await?
                        }
                    };
                    if let Some(k) = key {
                        self.memo.borrow_mut().insert(k, v.clone());
                    }
                    Ok(v)
                }
                ExprValue::Native(label) => self.natives.call(label, &args),
                ExprValue::Ffi { label, raw: false } => {
                    let f = self.ffi.regular(label).ok_or_else(|| {
                        SlateError::new(
                            ErrorKind::UndeclaredLocal,
                            line,
                            col,
                            format!("no FFI '{}'", label),
                        )
                    })?;
                    let mut json_args = Vec::with_capacity(args.len());
                    for a in &args {
                        json_args.push(to_json(a)?);
                    }
                    let result = f.call(json_args).await?;
                    Ok(from_json(&result).at(line, col))
                }
                ExprValue::Range(_) => {
                    let r = self.built_range(&callee)?;
                    let idx = args
                        .first()
                        .and_then(|a| a.as_number())
                        .and_then(|(n, _)| n.as_int())
                        .ok_or_else(|| {
                            SlateError::new(
                                ErrorKind::TypeMismatch,
                                line,
                                col,
                                "range access needs a whole-number index",
                            )
                        })?;
                    Ok(r.get(idx).unwrap_or_else(Expr::null).at(line, col))
                }
                ExprValue::Array(items) => {
                    let idx = args
                        .first()
                        .and_then(|a| a.as_number())
                        .and_then(|(n, _)| n.as_int())
                        .ok_or_else(|| {
                            SlateError::new(
                                ErrorKind::TypeMismatch,
                                line,
                                col,
                                "array access needs a whole-number index",
                            )
                        })?;
                    Ok(items
                        .get(usize::try_from(idx).unwrap_or(usize::MAX))
                        .cloned()
                        .unwrap_or_else(Expr::null)
                        .at(line, col))
                }
                _ => Err(SlateError::new(
                    ErrorKind::TypeMismatch,
                    line,
                    col,
                    format!("{:?} is not callable", callee.kind()),
                )),
            }
        })
    }

    /// Build the lazy accessor for an evaluated range expression.
    pub(crate) fn built_range(&self, e: &Expr) -> Result<EvalRange, SlateError> {
        let ExprValue::Range(spec) = &e.value else {
            return Err(SlateError::new(ErrorKind::TypeMismatch, e.line, e.col, "not a range"));
        };
        let (length, offset) = match &spec.slice {
            Some(s) => (s.length.as_ref(), s.offset.as_ref()),
            None => (None, None),
        };
        EvalRange::new(&spec.begin, &spec.end, spec.step.as_ref(), length, offset)
    }

    /// Array view of an iterable value, for loops and inclusion checks.
    pub(crate) fn iterable_items(&self, v: &Expr) -> Result<Vec<Expr>, SlateError> {
        match &v.value {
            ExprValue::Array(items) => Ok(items.clone()),
            ExprValue::Range(_) => {
                self.built_range(v)?.materialize(RANGE_LIMIT, v.line, v.col)
            }
            ExprValue::Number { num, .. } => {
                let n = num.as_int().unwrap_or(0).max(0);
                Ok((1..=n).map(|i| Expr::number(Num::Int(i))).collect())
            }
            ExprValue::Str(s) => Ok(s.chars().map(|c| Expr::string(c.to_string())).collect()),
            _ => Err(SlateError::new(
                ErrorKind::TypeMismatch,
                v.line,
                v.col,
                format!("cannot iterate {:?}", v.kind()),
            )),
        }
    }

    fn op_err(&self, e: &Expr, msg: &str) -> SlateError {
        SlateError::new(ErrorKind::TypeMismatch, e.line, e.col, msg)
    }
}

fn is_callee(e: Option<&Expr>) -> bool {
    matches!(
        e.map(|e| &e.value),
        Some(
            ExprValue::Callable(_)
                | ExprValue::Native(_)
                | ExprValue::Ffi { .. }
                | ExprValue::Range(_)
                | ExprValue::Array(_)
        )
    )
}

fn no_property(recv: &Expr, name: &str, line: u32, col: u32) -> SlateError {
    SlateError::new(
        ErrorKind::TypeMismatch,
        line,
        col,
        format!("no property '{}' on {:?}", name, recv.kind()),
    )
    .with_lexeme(name)
}

fn at(mut e: SlateError, line: u32, col: u32) -> SlateError {
    if e.line == 0 {
        e.line = line;
        e.col = col;
    }
    e
}

fn op_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::Concat => "++",
        _ => "?",
    }
}
