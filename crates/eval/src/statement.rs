//! The statement interpreter.
//!
//! A parsed statement mapping (`Expr::Object`) either carries a control
//! keyword with a fixed grammar or is plain data. The dispatcher checks the
//! control keys in a fixed priority order and evaluates at most one form;
//! an object with no control keys evaluates each entry and stays an object.

use crate::env::{Env, SharedEnv};
use crate::eval::{EvalFut, Interp, ModuleState};
use slate_core::parser::group_items;
use slate_core::{ErrorKind, Expr, ExprValue, SlateError};

fn find<'a>(pairs: &'a [(String, Expr)], key: &str) -> Option<&'a Expr> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn name_of(e: &Expr) -> Option<String> {
    match &e.value {
        ExprValue::Literal(n) | ExprValue::Str(n) => Some(n.clone()),
        _ => None,
    }
}

/// Flatten `(a, b, c)` or a single name into a name list.
fn name_list(e: &Expr) -> Vec<String> {
    match &e.value {
        ExprValue::Block(groups) => groups
            .iter()
            .flatten()
            .filter_map(name_of)
            .collect(),
        _ => name_of(e).into_iter().collect(),
    }
}

impl Interp {
    pub(crate) fn exec_object<'a>(
        &'a self,
        env: SharedEnv,
        pairs: Vec<(String, Expr)>,
        line: u32,
        col: u32,
    ) -> EvalFut<'a> {
        Box::pin(async move {
            let has = |k: &str| pairs.iter().any(|(key, _)| key == k);
            if has("let") {
                self.exec_let(env, &pairs, line, col).await
            } else if has("if") {
                self.exec_if(env, &pairs, line, col).await
            } else if has("loop") {
                self.exec_loop(env, &pairs, line, col).await
            } else if has("match") {
                self.exec_match(env, &pairs, line, col).await
            } else if has("try") {
                self.exec_try(env, &pairs, line, col).await
            } else if has("while") {
                self.exec_while(env, &pairs).await
            } else if has("import") || has("from") {
                self.exec_import(env, &pairs, line, col).await
            } else if has("module") {
                if let Some(name) = find(&pairs, "module").and_then(name_of) {
                    env.borrow_mut().module_descriptor = Some(name);
                }
                Ok(Expr::null().at(line, col))
            } else if has("export") {
                for (key, v) in &pairs {
                    if key == "export" {
                        env.borrow_mut().exported.extend(name_list(v));
                    }
                }
                Ok(Expr::null().at(line, col))
            } else {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((k, self.eval(env.clone(), v).await?));
                }
                Ok(Expr::object(out).at(line, col))
            }
        })
    }

    /// `:let name = value`. A fresh name is pre-declared so the value can
    /// see its own raw body exactly once (the self-reference guard); a
    /// known name rebinds using its previous value.
    async fn exec_let(
        &self,
        env: SharedEnv,
        pairs: &[(String, Expr)],
        line: u32,
        col: u32,
    ) -> Result<Expr, SlateError> {
        let name = find(pairs, "let").and_then(name_of).ok_or_else(|| {
            SlateError::new(ErrorKind::TypeMismatch, line, col, "':let' needs a name")
        })?;
        let cached = find(pairs, "cached").map(|v| v.is_truthy()).unwrap_or(false);
        let value = find(pairs, "value").cloned().unwrap_or_else(Expr::null);
        let fresh = !env.borrow().knows(&name);
        if fresh {
            env.borrow_mut().declare(&name, value.clone());
        }
        let v = self.eval(env.clone(), value).await?;
        match v.value {
            ExprValue::Callable(mut c) => {
                c.name = Some(name.clone());
                c.cached = cached;
                let bound = Expr { value: ExprValue::Callable(c), line, col };
                env.borrow_mut().defn(&name, bound.clone(), line, col);
                Ok(bound)
            }
            _ => {
                env.borrow_mut().bind(&name, v.clone());
                Ok(v)
            }
        }
    }

    /// `:if (cond) body :else (cond) body :else body` -- first true
    /// condition wins, conditions after it never evaluate.
    async fn exec_if(
        &self,
        env: SharedEnv,
        pairs: &[(String, Expr)],
        line: u32,
        col: u32,
    ) -> Result<Expr, SlateError> {
        for (key, v) in pairs {
            let items = group_items(v);
            let conditional = key == "if"
                || (items.len() > 1 && matches!(items[0].value, ExprValue::Block(_)));
            let child = Env::child(&env);
            if conditional {
                let cond = items[0].clone();
                let taken = self.eval(child.clone(), cond).await?.is_truthy();
                if taken {
                    return self.eval_group(child, items[1..].to_vec()).await;
                }
            } else if key == "else" {
                return self.eval_group(child, items).await;
            }
        }
        Ok(Expr::null().at(line, col))
    }

    /// `:loop iterable :in name :do body` -- ranges iterate lazily, arrays
    /// element-wise, a scalar `n` counts 1 to n. Yields the per-iteration
    /// results as an array.
    async fn exec_loop(
        &self,
        env: SharedEnv,
        pairs: &[(String, Expr)],
        line: u32,
        col: u32,
    ) -> Result<Expr, SlateError> {
        let source = find(pairs, "loop").cloned().ok_or_else(|| {
            SlateError::new(ErrorKind::TypeMismatch, line, col, "':loop' needs an iterable")
        })?;
        let var = find(pairs, "in").and_then(name_of).unwrap_or_else(|| "it".to_string());
        let body = find(pairs, "do").cloned();
        let iterable = self.eval(env.clone(), source).await?;
        let mut out = Vec::new();
        if let ExprValue::Range(_) = iterable.value {
            let r = self.built_range(&iterable)?;
            for i in 0..r.len() {
                let item = r.get(i).unwrap_or_else(Expr::null);
                out.push(self.loop_step(&env, &var, item, body.as_ref()).await?);
            }
        } else {
            for item in self.iterable_items(&iterable)? {
                out.push(self.loop_step(&env, &var, item, body.as_ref()).await?);
            }
        }
        Ok(Expr::array(out).at(line, col))
    }

    async fn loop_step(
        &self,
        env: &SharedEnv,
        var: &str,
        item: Expr,
        body: Option<&Expr>,
    ) -> Result<Expr, SlateError> {
        match body {
            Some(b) => {
                let child = Env::child(env);
                child.borrow_mut().bind(var, item);
                self.eval(child, b.clone()).await
            }
            None => Ok(item),
        }
    }

    /// `:match subject :when pattern body ... :else body` -- patterns
    /// compare structurally, arrays and ranges match by inclusion, and a
    /// parenthesized pattern is a guard over `it`.
    async fn exec_match(
        &self,
        env: SharedEnv,
        pairs: &[(String, Expr)],
        line: u32,
        col: u32,
    ) -> Result<Expr, SlateError> {
        let subject_e = find(pairs, "match").cloned().ok_or_else(|| {
            SlateError::new(ErrorKind::TypeMismatch, line, col, "':match' needs a value")
        })?;
        let subject = self.eval(env.clone(), subject_e).await?;
        for (key, v) in pairs {
            let child = Env::child(&env);
            child.borrow_mut().bind("it", subject.clone());
            match key.as_str() {
                "when" => {
                    let items = group_items(v);
                    let Some(pattern) = items.first().cloned() else { continue };
                    let body = items[1..].to_vec();
                    let hit = if matches!(pattern.value, ExprValue::Block(_)) {
                        self.eval(child.clone(), pattern).await?.is_truthy()
                    } else {
                        let p = self.eval(child.clone(), pattern).await?;
                        self.pattern_matches(&subject, &p)?
                    };
                    if hit {
                        if body.is_empty() {
                            return Ok(subject);
                        }
                        return self.eval_group(child, body).await;
                    }
                }
                "else" => return self.eval(child, v.clone()).await,
                _ => {}
            }
        }
        Ok(Expr::null().at(line, col))
    }

    fn pattern_matches(&self, subject: &Expr, pattern: &Expr) -> Result<bool, SlateError> {
        match &pattern.value {
            ExprValue::Array(items) => Ok(items.iter().any(|i| self.values_equal(subject, i))),
            ExprValue::Range(_) => {
                let r = self.built_range(pattern)?;
                let hit = r.iter().any(|i| self.values_equal(subject, &i));
                Ok(hit)
            }
            _ => Ok(self.values_equal(subject, pattern)),
        }
    }

    /// `:try body :check (cond) :rescue fix ...` -- the body re-evaluates
    /// after each rescue clause runs, until the check passes or the clauses
    /// run out. `it` carries the candidate result into the check and the
    /// error message into a rescue clause.
    async fn exec_try(
        &self,
        env: SharedEnv,
        pairs: &[(String, Expr)],
        line: u32,
        col: u32,
    ) -> Result<Expr, SlateError> {
        let body = find(pairs, "try").cloned().ok_or_else(|| {
            SlateError::new(ErrorKind::TypeMismatch, line, col, "':try' needs a body")
        })?;
        let check = find(pairs, "check").cloned();
        let rescues: Vec<&Expr> =
            pairs.iter().filter(|(k, _)| k == "rescue").map(|(_, v)| v).collect();
        let scope = Env::child(&env);
        let mut last_err: Option<SlateError> = None;
        let mut next_rescue = 0;
        loop {
            match self.eval(scope.clone(), body.clone()).await {
                Ok(v) => {
                    let passed = match &check {
                        None => true,
                        Some(c) => {
                            let guard = Env::child(&scope);
                            guard.borrow_mut().bind("it", v.clone());
                            self.eval(guard, c.clone()).await?.is_truthy()
                        }
                    };
                    if passed {
                        return Ok(v);
                    }
                    last_err = Some(SlateError::new(
                        ErrorKind::TypeMismatch,
                        line,
                        col,
                        "':check' condition never passed",
                    ));
                }
                Err(e) => last_err = Some(e),
            }
            let Some(clause) = rescues.get(next_rescue) else {
                return Err(last_err.unwrap_or_else(|| {
                    SlateError::new(ErrorKind::TypeMismatch, line, col, "':try' failed")
                }));
            };
            next_rescue += 1;
            let rescue_env = Env::child(&scope);
            let msg = last_err.as_ref().map(|e| e.message.clone()).unwrap_or_default();
            rescue_env.borrow_mut().bind("it", Expr::string(msg));
            if let Err(e) = self.eval(rescue_env, (*clause).clone()).await {
                last_err = Some(e);
            }
        }
    }

    /// `:while (cond) :do body` and `:do body :while (cond)`; the latter
    /// runs the body before the first check.
    async fn exec_while(
        &self,
        env: SharedEnv,
        pairs: &[(String, Expr)],
    ) -> Result<Expr, SlateError> {
        let cond = find(pairs, "while").cloned().unwrap_or_else(|| Expr::bool(false));
        let body = find(pairs, "do").cloned();
        let do_first = pairs.first().map(|(k, _)| k == "do").unwrap_or(false);
        let scope = Env::child(&env);
        let mut last = Expr::null();
        if do_first {
            if let Some(b) = &body {
                last = self.eval(scope.clone(), b.clone()).await?;
            }
        }
        loop {
            if !self.eval(scope.clone(), cond.clone()).await?.is_truthy() {
                return Ok(last);
            }
            if let Some(b) = &body {
                last = self.eval(scope.clone(), b.clone()).await?;
            }
        }
    }

    /// `:import path` binds the module's exports as one object under the
    /// path's last segment; `:from path :import (a, b)` binds named exports
    /// directly; `:from path` alone splices every export in.
    async fn exec_import(
        &self,
        env: SharedEnv,
        pairs: &[(String, Expr)],
        line: u32,
        col: u32,
    ) -> Result<Expr, SlateError> {
        let from = find(pairs, "from").and_then(name_of);
        let import = find(pairs, "import");
        let path = match (&from, import) {
            (Some(p), _) => p.clone(),
            (None, Some(e)) => name_of(e).ok_or_else(|| {
                SlateError::new(ErrorKind::Import, line, col, "':import' needs a module path")
            })?,
            (None, None) => {
                return Err(SlateError::new(
                    ErrorKind::Import,
                    line,
                    col,
                    "':import' needs a module path",
                ))
            }
        };
        let exports = self.load_module(&path, line, col).await?;
        match (from.is_some(), import) {
            (true, Some(wanted)) => {
                for name in name_list(wanted) {
                    let found = exports.iter().find(|(k, _)| *k == name).map(|(_, v)| v.clone());
                    match found {
                        Some(v) => env.borrow_mut().bind(&name, v),
                        None => {
                            return Err(SlateError::new(
                                ErrorKind::Import,
                                line,
                                col,
                                format!("module '{}' has no export '{}'", path, name),
                            )
                            .with_lexeme(name))
                        }
                    }
                }
            }
            (true, None) => {
                for (name, v) in exports {
                    env.borrow_mut().bind(&name, v);
                }
            }
            (false, _) => {
                let short = path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&path)
                    .trim_end_matches(".md")
                    .to_string();
                env.borrow_mut().bind(&short, Expr::object(exports).at(line, col));
            }
        }
        Ok(Expr::null().at(line, col))
    }

    /// Load a module through the cache. A path already mid-load means the
    /// import graph has a cycle.
    pub(crate) async fn load_module(
        &self,
        path: &str,
        line: u32,
        col: u32,
    ) -> Result<Vec<(String, Expr)>, SlateError> {
        {
            let modules = self.modules.borrow();
            match modules.get(path) {
                Some(ModuleState::Ready(exports)) => return Ok(exports.clone()),
                Some(ModuleState::Loading) => {
                    return Err(SlateError::new(
                        ErrorKind::Import,
                        line,
                        col,
                        format!("cyclic import of '{}'", path),
                    )
                    .with_lexeme(path))
                }
                None => {}
            }
        }
        self.modules.borrow_mut().insert(path.to_string(), ModuleState::Loading);
        let loaded = match self.loader.load(path).await {
            Ok(crate::loader::ModuleHandle::Source(src)) => self.eval_module_source(&src).await,
            Ok(crate::loader::ModuleHandle::Native(exports)) => Ok(exports),
            // Safe globals resolve by name with no loader behind them.
            Err(e) => self.natives.module(path).ok_or(e),
        };
        match loaded {
            Ok(exports) => {
                self.modules
                    .borrow_mut()
                    .insert(path.to_string(), ModuleState::Ready(exports.clone()));
                Ok(exports)
            }
            Err(mut e) => {
                self.modules.borrow_mut().remove(path);
                if e.line == 0 {
                    e.line = line;
                    e.col = col;
                }
                Err(e)
            }
        }
    }

    async fn eval_module_source(&self, source: &str) -> Result<Vec<(String, Expr)>, SlateError> {
        let stmts = self.ast(source, true)?;
        let env = Env::root();
        for stmt in stmts {
            if matches!(stmt.value, ExprValue::Text { .. } | ExprValue::Comment(_)) {
                continue;
            }
            self.eval(env.clone(), stmt).await?;
        }
        let exports = env.borrow().exports();
        Ok(exports)
    }
}
