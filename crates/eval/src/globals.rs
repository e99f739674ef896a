//! Safe built-in globals and dot-access natives.
//!
//! `Natives` is the label-addressed registry behind `Expr::Native` handles:
//! numeric, collection, text, and date built-ins plus `show`. The same
//! registry backs the loader's "safe globals" (`:import math` works with no
//! filesystem) and the dot-access rule (`"abc".length`, `x.round`).

use slate_core::{serialize, ErrorKind, Expr, ExprValue, Num, SlateError};
use std::collections::HashMap;
use time::macros::format_description;
use time::OffsetDateTime;

pub type NativeFn = Box<dyn Fn(&[Expr]) -> Result<Expr, SlateError>>;

#[derive(Default)]
pub struct Natives {
    fns: HashMap<String, NativeFn>,
}

fn type_err(e: &Expr, msg: impl Into<String>) -> SlateError {
    SlateError::new(ErrorKind::TypeMismatch, e.line, e.col, msg)
}

fn want_num(e: &Expr) -> Result<Num, SlateError> {
    e.as_number()
        .map(|(n, _)| *n)
        .ok_or_else(|| type_err(e, format!("expected a number, found {:?}", e.kind())))
}

fn want_items(e: &Expr) -> Result<&[Expr], SlateError> {
    match &e.value {
        ExprValue::Array(items) => Ok(items),
        _ => Err(type_err(e, format!("expected an array, found {:?}", e.kind()))),
    }
}

fn arg<'a>(args: &'a [Expr], i: usize, label: &str) -> Result<&'a Expr, SlateError> {
    args.get(i).ok_or_else(|| {
        SlateError::new(
            ErrorKind::Arity,
            0,
            0,
            format!("{} needs at least {} argument(s)", label, i + 1),
        )
    })
}

impl Natives {
    pub fn standard() -> Natives {
        let mut n = Natives::default();
        n.register_math();
        n.register_list();
        n.register_text();
        n.register_date();
        n.put("show", |args| {
            let target = arg(args, 0, "show")?;
            Ok(Expr::string(serialize(target)))
        });
        n
    }

    fn put(&mut self, label: &str, f: impl Fn(&[Expr]) -> Result<Expr, SlateError> + 'static) {
        self.fns.insert(label.to_string(), Box::new(f));
    }

    pub fn call(&self, label: &str, args: &[Expr]) -> Result<Expr, SlateError> {
        match self.fns.get(label) {
            Some(f) => f(args),
            None => Err(SlateError::new(
                ErrorKind::UndeclaredLocal,
                0,
                0,
                format!("no native function: {}", label),
            )),
        }
    }

    pub fn knows(&self, label: &str) -> bool {
        self.fns.contains_key(label)
    }

    /// Export map of one safe-global module, or `None` for an unknown name.
    pub fn module(&self, name: &str) -> Option<Vec<(String, Expr)>> {
        if !matches!(name, "math" | "list" | "text" | "date") {
            return None;
        }
        let prefix = format!("{}.", name);
        let mut exports: Vec<(String, Expr)> = self
            .fns
            .keys()
            .filter_map(|label| {
                label.strip_prefix(&prefix).map(|short| {
                    (short.to_string(), Expr::new(ExprValue::Native(label.clone())))
                })
            })
            .collect();
        exports.sort_by(|a, b| a.0.cmp(&b.0));
        Some(exports)
    }

    fn register_math(&mut self) {
        self.put("math.abs", |args| {
            let n = want_num(arg(args, 0, "abs")?)?;
            Ok(Expr::number(if n.compare(&Num::Int(0)).is_lt() { n.neg() } else { n }))
        });
        self.put("math.floor", |args| {
            let n = want_num(arg(args, 0, "floor")?)?;
            Ok(Expr::number(Num::from_f64(n.to_f64().floor())))
        });
        self.put("math.ceil", |args| {
            let n = want_num(arg(args, 0, "ceil")?)?;
            Ok(Expr::number(Num::from_f64(n.to_f64().ceil())))
        });
        self.put("math.round", |args| {
            let n = want_num(arg(args, 0, "round")?)?;
            let digits = match args.get(1) {
                Some(d) => want_num(d)?.as_int().unwrap_or(0).clamp(0, 28) as u32,
                None => 0,
            };
            Ok(Expr::number(Num::from_decimal(n.to_decimal().round_dp(digits))))
        });
        self.put("math.sqrt", |args| {
            let target = arg(args, 0, "sqrt")?;
            let n = want_num(target)?;
            let v = n.to_f64();
            if v < 0.0 {
                return Err(type_err(target, "sqrt of a negative number"));
            }
            Ok(Expr::number(Num::from_f64(v.sqrt())))
        });
        self.put("math.pow", |args| {
            let base_expr = arg(args, 0, "pow")?;
            let base = want_num(base_expr)?;
            let exp = want_num(arg(args, 1, "pow")?)?;
            match exp.as_int() {
                Some(e) if (0..=32).contains(&e) => {
                    let mut acc = Num::Int(1);
                    for _ in 0..e {
                        acc = acc
                            .mul(&base)
                            .ok_or_else(|| type_err(base_expr, "pow overflow"))?;
                    }
                    Ok(Expr::number(acc))
                }
                _ => Ok(Expr::number(Num::from_f64(base.to_f64().powf(exp.to_f64())))),
            }
        });
        self.put("math.min", |args| fold_extreme(args, "min", true));
        self.put("math.max", |args| fold_extreme(args, "max", false));
    }

    fn register_list(&mut self) {
        self.put("list.count", |args| {
            let items = want_items(arg(args, 0, "count")?)?;
            Ok(Expr::number(Num::Int(items.len() as i64)))
        });
        self.put("list.sum", |args| {
            let items = want_items(arg(args, 0, "sum")?)?;
            let mut acc = Num::Int(0);
            for item in items {
                let n = want_num(item)?;
                acc = acc.add(&n).ok_or_else(|| type_err(item, "sum overflow"))?;
            }
            Ok(Expr::number(acc))
        });
        self.put("list.first", |args| {
            let items = want_items(arg(args, 0, "first")?)?;
            Ok(items.first().cloned().unwrap_or_else(Expr::null))
        });
        self.put("list.last", |args| {
            let items = want_items(arg(args, 0, "last")?)?;
            Ok(items.last().cloned().unwrap_or_else(Expr::null))
        });
        self.put("list.reverse", |args| {
            let mut items = want_items(arg(args, 0, "reverse")?)?.to_vec();
            items.reverse();
            Ok(Expr::array(items))
        });
        self.put("list.sort", |args| {
            let mut items = want_items(arg(args, 0, "sort")?)?.to_vec();
            items.sort_by(|a, b| match (a.as_number(), b.as_number()) {
                (Some((an, _)), Some((bn, _))) => an.compare(bn),
                _ => serialize(a).cmp(&serialize(b)),
            });
            Ok(Expr::array(items))
        });
        self.put("list.unique", |args| {
            let items = want_items(arg(args, 0, "unique")?)?;
            let mut seen: Vec<Expr> = Vec::new();
            for item in items {
                if !seen.contains(item) {
                    seen.push(item.clone());
                }
            }
            Ok(Expr::array(seen))
        });
        self.put("list.join", |args| {
            let items = want_items(arg(args, 0, "join")?)?;
            let sep = args.get(1).and_then(|s| s.as_str()).unwrap_or(", ");
            let parts: Vec<String> = items.iter().map(display).collect();
            Ok(Expr::string(parts.join(sep)))
        });
    }

    fn register_text(&mut self) {
        self.put("text.upper", |args| {
            text_map(arg(args, 0, "upper")?, |s| s.to_uppercase())
        });
        self.put("text.lower", |args| {
            text_map(arg(args, 0, "lower")?, |s| s.to_lowercase())
        });
        self.put("text.trim", |args| {
            text_map(arg(args, 0, "trim")?, |s| s.trim().to_string())
        });
        self.put("text.length", |args| {
            let target = arg(args, 0, "length")?;
            let s = target
                .as_str()
                .ok_or_else(|| type_err(target, "expected a string"))?;
            Ok(Expr::number(Num::Int(s.chars().count() as i64)))
        });
        self.put("text.split", |args| {
            let target = arg(args, 0, "split")?;
            let s = target
                .as_str()
                .ok_or_else(|| type_err(target, "expected a string"))?;
            let sep = args.get(1).and_then(|x| x.as_str()).unwrap_or(" ");
            Ok(Expr::array(s.split(sep).map(Expr::string).collect()))
        });
        self.put("text.contains", |args| {
            let target = arg(args, 0, "contains")?;
            let s = target
                .as_str()
                .ok_or_else(|| type_err(target, "expected a string"))?;
            let needle = arg(args, 1, "contains")?
                .as_str()
                .unwrap_or_default()
                .to_string();
            Ok(Expr::bool(s.contains(&needle)))
        });
        self.put("text.symbol", |args| {
            let target = arg(args, 0, "symbol")?;
            let s = target
                .as_str()
                .ok_or_else(|| type_err(target, "expected a string"))?;
            Ok(Expr::symbol(s))
        });
        self.put("text.replace", |args| {
            let target = arg(args, 0, "replace")?;
            let s = target
                .as_str()
                .ok_or_else(|| type_err(target, "expected a string"))?;
            let from = arg(args, 1, "replace")?.as_str().unwrap_or_default().to_string();
            let to = arg(args, 2, "replace")?.as_str().unwrap_or_default().to_string();
            Ok(Expr::string(s.replace(&from, &to)))
        });
    }

    fn register_date(&mut self) {
        self.put("date.today", |_| {
            let fmt = format_description!("[year]-[month]-[day]");
            let today = OffsetDateTime::now_utc().date();
            today
                .format(fmt)
                .map(Expr::string)
                .map_err(|e| SlateError::new(ErrorKind::TypeMismatch, 0, 0, e.to_string()))
        });
        self.put("date.now", |_| {
            let fmt =
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
            OffsetDateTime::now_utc()
                .format(fmt)
                .map(Expr::string)
                .map_err(|e| SlateError::new(ErrorKind::TypeMismatch, 0, 0, e.to_string()))
        });
        self.put("date.year", |_| {
            Ok(Expr::number(Num::Int(OffsetDateTime::now_utc().year() as i64)))
        });
    }
}

fn fold_extreme(args: &[Expr], label: &str, min: bool) -> Result<Expr, SlateError> {
    // Accepts either spread numbers or a single array.
    let items: Vec<Expr> = match args {
        [single] if matches!(single.value, ExprValue::Array(_)) => want_items(single)?.to_vec(),
        _ => args.to_vec(),
    };
    let first = items
        .first()
        .ok_or_else(|| SlateError::new(ErrorKind::Arity, 0, 0, format!("{} of nothing", label)))?;
    let mut best = want_num(first)?;
    for item in &items[1..] {
        let n = want_num(item)?;
        let ord = n.compare(&best);
        if (min && ord.is_lt()) || (!min && ord.is_gt()) {
            best = n;
        }
    }
    Ok(Expr::number(best))
}

fn text_map(target: &Expr, f: impl Fn(&str) -> String) -> Result<Expr, SlateError> {
    let s = target
        .as_str()
        .ok_or_else(|| type_err(target, "expected a string"))?;
    Ok(Expr::string(f(s)))
}

/// Plain display form used by string interpolation and `join`: strings
/// print without quotes, everything else serializes.
pub fn display(e: &Expr) -> String {
    match &e.value {
        ExprValue::Str(s) => s.clone(),
        ExprValue::Text { text, .. } => text.clone(),
        _ => serialize(e),
    }
}

/// Zero-argument dot-access on primitive receivers. Returns `None` when the
/// name is not a known property, letting the caller fall through to map
/// lookup or report the miss.
pub fn property(natives: &Natives, recv: &Expr, name: &str) -> Option<Result<Expr, SlateError>> {
    let label = match (&recv.value, name) {
        (ExprValue::Number { .. }, "abs" | "floor" | "ceil" | "round" | "sqrt") => {
            format!("math.{}", name)
        }
        (ExprValue::Array(_), "count" | "length") => "list.count".to_string(),
        (ExprValue::Array(_), "sum" | "first" | "last" | "reverse" | "sort" | "unique" | "join") => {
            format!("list.{}", name)
        }
        (ExprValue::Str(_), "upper" | "lower" | "trim" | "length" | "split" | "symbol") => {
            format!("text.{}", name)
        }
        _ => return None,
    };
    Some(natives.call(&label, std::slice::from_ref(recv)))
}

/// Dot-call with arguments: `s.replace("a", "b")`, `xs.join("-")`.
pub fn method(
    natives: &Natives,
    recv: &Expr,
    name: &str,
    args: &[Expr],
) -> Option<Result<Expr, SlateError>> {
    let label = match (&recv.value, name) {
        (ExprValue::Number { .. }, "round" | "pow") => format!("math.{}", name),
        (ExprValue::Array(_), "join") => "list.join".to_string(),
        (ExprValue::Str(_), "split" | "contains" | "replace") => format!("text.{}", name),
        _ => return None,
    };
    let mut full = vec![recv.clone()];
    full.extend_from_slice(args);
    Some(natives.call(&label, &full))
}
