//! Callable application.
//!
//! Application is substitution-based: supplied arguments are already
//! evaluated values, so they substitute into a deep copy of the body with
//! no captured environment. Under-supplying returns a new callable closed
//! over the supplied arguments; `_` holes defer specific positions; a `..`
//! spread parameter absorbs the remaining arguments as one array.

use slate_core::{serialize, Callable, Expr, ExprValue, Param, SlateError};
use slate_core::{ErrorKind, TokenKind};

/// Outcome of applying arguments to a callable.
#[derive(Debug)]
pub enum Applied {
    /// Saturated: the substituted body, ready to evaluate.
    Body(Vec<Expr>),
    /// Under-applied: a callable awaiting the remaining arguments.
    Partial(Expr),
}

/// Apply `args` to `c`. Over-supply past the total curried arity is an
/// arity error reported at the call site.
pub fn apply(c: &Callable, args: &[Expr], line: u32, col: u32) -> Result<Applied, SlateError> {
    let has_spread = c.params.iter().any(|p| p.spread);
    if !has_spread && args.len() > c.arity() {
        return Err(SlateError::new(
            ErrorKind::Arity,
            line,
            col,
            format!(
                "{} takes {} argument(s), {} supplied",
                c.name.as_deref().unwrap_or("callable"),
                c.arity(),
                args.len()
            ),
        ));
    }

    let positional = c.params.iter().take_while(|p| !p.spread).count();
    let mut filled: Vec<(&str, &Expr)> = Vec::new();
    let mut remaining: Vec<Param> = Vec::new();
    for (i, p) in c.params.iter().enumerate().take(positional) {
        match args.get(i) {
            Some(a) if !matches!(a.value, ExprValue::Hole) => filled.push((&p.name, a)),
            _ => remaining.push(p.clone()),
        }
    }
    if !remaining.is_empty() {
        if args.len() > positional {
            // Arguments cannot skip open parameters and spill into a lower
            // curried layer in the same call.
            return Err(SlateError::new(
                ErrorKind::Arity,
                line,
                col,
                "argument list leaves parameters open but supplies extras",
            ));
        }
        let mut body: Vec<Expr> = c.body.clone();
        for e in &mut body {
            for (name, arg) in &filled {
                e.sub(name, arg);
            }
        }
        if let Some(spread) = c.params.iter().find(|p| p.spread) {
            remaining.push(spread.clone());
        }
        let partial = Callable { params: remaining, body, name: c.name.clone(), cached: false };
        return Ok(Applied::Partial(
            Expr::new(ExprValue::Callable(Box::new(partial))).at(line, col),
        ));
    }

    let mut body: Vec<Expr> = c.body.clone();
    for e in &mut body {
        for (name, arg) in &filled {
            e.sub(name, arg);
        }
    }
    if let Some(spread) = c.params.iter().find(|p| p.spread) {
        let rest: Vec<Expr> = args[positional.min(args.len())..].to_vec();
        let rest = Expr::array(rest);
        for e in &mut body {
            e.sub(&spread.name, &rest);
        }
        return Ok(Applied::Body(body));
    }

    let leftover = &args[positional.min(args.len())..];
    if leftover.is_empty() {
        return Ok(Applied::Body(body));
    }
    // Curried: push leftover arguments into the inner callable.
    match body.as_slice() {
        [Expr { value: ExprValue::Callable(inner), .. }] => apply(inner, leftover, line, col),
        _ => Err(SlateError::new(
            ErrorKind::Arity,
            line,
            col,
            format!("{} excess argument(s)", leftover.len()),
        )),
    }
}

/// Memo key for a cached call: the callable's name plus its serialized
/// arguments. Serialization is canonical, so structurally equal argument
/// lists share an entry.
pub fn memo_key(name: &str, args: &[Expr]) -> String {
    let parts: Vec<String> = args.iter().map(serialize).collect();
    format!("{}({})", name, parts.join(","))
}

/// Splice call arguments out of a parenthesized block: one argument per
/// comma group, already evaluated by the caller.
pub fn args_of(block: &Expr) -> Vec<Expr> {
    match &block.value {
        ExprValue::Block(groups) => groups
            .iter()
            .filter(|g| !g.is_empty())
            .map(|g| Expr::group(g.clone()))
            .collect(),
        _ => vec![block.clone()],
    }
}

/// True when an operator participates in the first reduction pass.
pub fn is_tight_op(e: &Expr) -> bool {
    e.is_op(TokenKind::Star) || e.is_op(TokenKind::Slash)
}

/// True when an operator participates in the second reduction pass.
pub fn is_loose_op(e: &Expr) -> bool {
    e.is_op(TokenKind::Plus)
        || e.is_op(TokenKind::Minus)
        || e.is_op(TokenKind::Percent)
        || e.is_op(TokenKind::Concat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slate_core::Num;

    fn int(n: i64) -> Expr {
        Expr::number(Num::Int(n))
    }

    fn plus_body(a: &str, b: &str) -> Vec<Expr> {
        vec![Expr::literal(a), Expr::op(TokenKind::Plus), Expr::literal(b)]
    }

    fn curried_sum() -> Callable {
        // a -> b -> a + b
        let inner = Expr::callable(
            vec![Param { name: "b".into(), spread: false }],
            plus_body("a", "b"),
        );
        Callable {
            params: vec![Param { name: "a".into(), spread: false }],
            body: vec![inner],
            name: Some("sum".into()),
            cached: false,
        }
    }

    #[test]
    fn full_application_substitutes_the_body() {
        let c = Callable {
            params: vec![
                Param { name: "a".into(), spread: false },
                Param { name: "b".into(), spread: false },
            ],
            body: plus_body("a", "b"),
            name: None,
            cached: false,
        };
        match apply(&c, &[int(3), int(5)], 1, 1).unwrap() {
            Applied::Body(body) => {
                assert_eq!(body[0], int(3));
                assert_eq!(body[2], int(5));
            }
            Applied::Partial(_) => panic!("expected saturation"),
        }
    }

    #[test]
    fn under_supply_returns_a_partial() {
        let c = curried_sum();
        let partial = match apply(&c, &[int(3)], 1, 1).unwrap() {
            Applied::Body(body) => Expr::group(body),
            Applied::Partial(p) => p,
        };
        // sum(3) saturates the outer layer; the result is the inner
        // callable with `a` already substituted.
        let inner = partial.as_callable().expect("inner callable");
        assert_eq!(inner.params[0].name, "b");
        assert_eq!(inner.body[0], int(3));
    }

    #[test]
    fn curried_layers_accept_a_flat_argument_list() {
        let c = curried_sum();
        match apply(&c, &[int(3), int(5)], 1, 1).unwrap() {
            Applied::Body(body) => {
                assert_eq!(body[0], int(3));
                assert_eq!(body[2], int(5));
            }
            Applied::Partial(_) => panic!("expected saturation across layers"),
        }
    }

    #[test]
    fn over_supply_is_an_arity_error_at_the_call_site() {
        let c = curried_sum();
        let err = apply(&c, &[int(1), int(2), int(3)], 7, 9).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arity);
        assert_eq!((err.line, err.col), (7, 9));
        assert!(err.message.contains("sum"));
    }

    #[test]
    fn holes_defer_positions() {
        let c = Callable {
            params: vec![
                Param { name: "a".into(), spread: false },
                Param { name: "b".into(), spread: false },
            ],
            body: plus_body("a", "b"),
            name: None,
            cached: false,
        };
        let p = match apply(&c, &[Expr::new(ExprValue::Hole), int(5)], 1, 1).unwrap() {
            Applied::Partial(p) => p,
            Applied::Body(_) => panic!("expected a partial"),
        };
        let pc = p.as_callable().unwrap();
        assert_eq!(pc.params.len(), 1);
        assert_eq!(pc.params[0].name, "a");
        assert_eq!(pc.body[2], int(5));
    }

    #[test]
    fn spread_collects_the_rest() {
        let c = Callable {
            params: vec![
                Param { name: "a".into(), spread: false },
                Param { name: "rest".into(), spread: true },
            ],
            body: vec![Expr::literal("rest")],
            name: None,
            cached: false,
        };
        match apply(&c, &[int(1), int(2), int(3)], 1, 1).unwrap() {
            Applied::Body(body) => {
                assert_eq!(body[0], Expr::array(vec![int(2), int(3)]));
            }
            Applied::Partial(_) => panic!("expected saturation"),
        }
    }

    #[test]
    fn memo_keys_are_structural() {
        let a = memo_key("fib", &[int(12)]);
        let b = memo_key("fib", &[Expr::number(Num::Int(12))]);
        assert_eq!(a, b);
        assert_ne!(a, memo_key("fib", &[int(13)]));
    }
}
