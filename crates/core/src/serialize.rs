//! Round-trippable pretty-printer for `Expr` trees.
//!
//! Load-bearing, not cosmetic: memo keys, `show`, REPL echo, and the golden
//! fixtures all go through here, and `serialize(parse(s))` must be a fixed
//! point -- parsing the output and serializing again reproduces it exactly.

use crate::expr::{Callable, Expr, ExprValue, RangeSpec};
use crate::template::spelling;
use crate::token::{Token, TokenKind};

/// Serialize one expression. A statement-level group loses its synthetic
/// wrapping block, so `1+2` prints as `1 + 2`, not `(1 + 2)`.
pub fn serialize(expr: &Expr) -> String {
    render_group(expr)
}

/// Serialize a statement list (one line per statement).
pub fn serialize_all(exprs: &[Expr]) -> String {
    exprs.iter().map(render_group).collect::<Vec<_>>().join("\n")
}

fn render(expr: &Expr) -> String {
    match &expr.value {
        ExprValue::Null => "null".to_string(),
        ExprValue::Bool(b) => b.to_string(),
        ExprValue::Number { num, unit } => match unit {
            Some(u) => format!("{} {}", num, u),
            None => num.to_string(),
        },
        ExprValue::Str(s) => format!("\"{}\"", escape(s)),
        ExprValue::Symbol(s) => format!(":{}", s),
        ExprValue::Regex(s) => s.clone(),
        ExprValue::Text { text, .. } => text.clone(),
        ExprValue::Comment(text) => format!("// {}", text),
        ExprValue::Op(kind) => op_spelling(*kind),
        ExprValue::Literal(name) => name.clone(),
        ExprValue::Hole => "_".to_string(),
        ExprValue::Block(groups) => {
            let inner: Vec<String> = groups.iter().map(|g| join(g)).collect();
            format!("({})", inner.join(", "))
        }
        ExprValue::Array(items) => {
            let inner: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", inner.join(", "))
        }
        ExprValue::Object(pairs) => render_object(pairs),
        ExprValue::Range(spec) => render_range(spec),
        ExprValue::Callable(c) => render_callable(c),
        ExprValue::Native(name) => name.clone(),
        ExprValue::Ffi { label, .. } => label.clone(),
    }
}

/// Join a flat expression run with the original spacing heuristics:
/// spaces around binary operators, none around `.`, and call blocks
/// attach directly to the callee.
fn join(exprs: &[Expr]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Expr> = None;
    for e in exprs {
        let glue = match (prev, e) {
            (None, _) => "",
            (Some(p), _) if p.is_op(TokenKind::Dot) => "",
            (_, e) if e.is_op(TokenKind::Dot) => "",
            // Unary minus binds to its operand.
            (Some(p), _) if p.is_op(TokenKind::Minus) && prev_is_unary(exprs, p) => "",
            // `f(x)` and `a[0]`: call/index blocks attach to the callee.
            (Some(p), Expr { value: ExprValue::Block(_), .. })
                if matches!(p.value, ExprValue::Literal(_) | ExprValue::Callable(_)) =>
            {
                ""
            }
            _ => " ",
        };
        out.push_str(glue);
        out.push_str(&render(e));
        prev = Some(e);
    }
    out
}

fn prev_is_unary(exprs: &[Expr], minus: &Expr) -> bool {
    // A minus is unary when nothing precedes it or an operator does.
    match exprs.iter().position(|e| std::ptr::eq(e, minus)) {
        Some(0) => true,
        Some(i) => matches!(exprs[i - 1].value, ExprValue::Op(_)),
        None => false,
    }
}

fn render_object(pairs: &[(String, Expr)]) -> String {
    // The canonical `:let` object prints back in assignment form.
    if pairs.first().map(|(k, _)| k.as_str()) == Some("let") {
        let name = render(&pairs[0].1);
        let cached = pairs.iter().any(|(k, _)| k == "cached");
        let value = pairs
            .iter()
            .find(|(k, _)| k == "value")
            .map(|(_, v)| render_group(v))
            .unwrap_or_default();
        return format!("{}{} = {}", name, if cached { "!" } else { "" }, value);
    }
    let reserved = crate::parser::RESERVED;
    let parts: Vec<String> = pairs
        .iter()
        .map(|(k, v)| {
            if matches!(v.value, ExprValue::Null) {
                format!(":{}", k)
            } else {
                format!(":{} {}", k, render_group(v))
            }
        })
        .collect();
    let plain = pairs.iter().all(|(k, _)| !reserved.contains(&k.as_str()));
    parts.join(if plain { ", " } else { " " })
}

/// A shaped group value renders without its synthetic wrapping block.
fn render_group(e: &Expr) -> String {
    match &e.value {
        ExprValue::Block(groups) if groups.len() == 1 => join(&groups[0]),
        _ => render(e),
    }
}

fn render_range(spec: &RangeSpec) -> String {
    let mut out = format!("[{}..{}", render_group(&spec.begin), render_group(&spec.end));
    if let Some(slice) = &spec.slice {
        out.push(':');
        if let Some(l) = &slice.length {
            out.push_str(&render_group(l));
        }
        if let Some(o) = &slice.offset {
            out.push('-');
            out.push_str(&render_group(o));
        }
    }
    if let Some(step) = &spec.step {
        if spec.slice.is_none() {
            out.push(':');
        }
        out.push(':');
        out.push_str(&render_group(step));
    }
    out.push(']');
    out
}

fn render_callable(c: &Callable) -> String {
    let params: Vec<String> = c
        .params
        .iter()
        .map(|p| {
            if p.spread {
                format!("..{}", p.name)
            } else {
                p.name.clone()
            }
        })
        .collect();
    format!("{} -> {}", params.join(", "), join(&c.body))
}

fn op_spelling(kind: TokenKind) -> String {
    spelling(&Token::new(kind, 0, 0))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::scanner::scan;
    use crate::template::TemplateTable;
    use crate::units::UnitRegistry;

    fn normalize(src: &str) -> String {
        let toks = scan(src, &UnitRegistry::new()).unwrap();
        let mut templates = TemplateTable::new();
        let exprs = parse(&toks, true, &mut templates).unwrap();
        serialize_all(&exprs)
    }

    #[test]
    fn spacing_heuristics() {
        assert_eq!(normalize("1+2*3"), "1 + 2 * 3");
        assert_eq!(normalize("sum(3, 4)"), "sum(3, 4)");
        assert_eq!(normalize("list.sum"), "list.sum");
    }

    #[test]
    fn assignment_round_trips() {
        assert_eq!(normalize("a=1+2"), "a = 1 + 2");
        assert_eq!(normalize("fib! = n -> n"), "fib! = n -> n");
    }

    #[test]
    fn adjacent_numbers_normalize_to_explicit_addition() {
        assert_eq!(normalize("1 2 3"), "1 + 2 + 3");
    }

    #[test]
    fn range_with_slice() {
        assert_eq!(normalize("[-10..10:5-3]"), "[-10..10:5-3]");
        assert_eq!(normalize("[1..5]"), "[1..5]");
    }

    #[test]
    fn statement_mapping_keeps_key_order() {
        assert_eq!(normalize(":if (1) (2) :else (3)"), ":if (1) (2) :else (3)");
        assert_eq!(normalize(":name \"Ada\", :age 36"), ":name \"Ada\", :age 36");
    }

    #[test]
    fn idempotent_under_reserialization() {
        for src in [
            "1+2*3",
            "a=1+2",
            "sum = a -> b -> a + b",
            "[-10..10:5-3]",
            ":if (x < 3) (1) :else (2)",
            "x |> double |> show",
            "\"total: #{1 + 2}\"",
        ] {
            let once = normalize(src);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", src);
        }
    }
}
