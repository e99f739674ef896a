//! Evaluator conformance suite.
//!
//! Exercises the documented language behaviors end to end through the
//! public `Interp` entry points: implied operators, exact arithmetic,
//! closures and currying, memoization, lazy ranges, units, and the
//! statement forms.

use slate_core::{serialize, ErrorKind, Expr, ExprValue, Num, SlateError};
use slate_eval::Interp;

async fn ev(src: &str) -> Expr {
    Interp::new()
        .eval_expr(src)
        .await
        .unwrap_or_else(|e| panic!("evaluation of {:?} failed: {}", src, e))
}

async fn ev_err(src: &str) -> SlateError {
    match Interp::new().eval_expr(src).await {
        Ok(v) => panic!("expected {:?} to fail, got {}", src, serialize(&v)),
        Err(e) => e,
    }
}

fn int(e: &Expr) -> i64 {
    match &e.value {
        ExprValue::Number { num: Num::Int(n), .. } => *n,
        other => panic!("expected an integer, got {:?}", other),
    }
}

// ── implied operators and exact arithmetic ───────────────────────────

#[tokio::test]
async fn adjacent_numbers_sum() {
    assert_eq!(int(&ev("1 2 3").await), 6);
}

#[tokio::test]
async fn multiplication_binds_tighter_than_addition() {
    assert_eq!(int(&ev("1 + 2 * 3").await), 7);
}

#[tokio::test]
async fn fractions_stay_exact() {
    let v = ev("1/2 + 3/4").await;
    match v.value {
        ExprValue::Number { num: Num::Fraction(5, 4), .. } => {}
        other => panic!("expected 5/4, got {:?}", other),
    }
    assert_eq!(int(&ev("1/2 + 1/2").await), 1);
}

#[tokio::test]
async fn division_by_zero_is_reported() {
    let e = ev_err("1 / 0").await;
    assert_eq!(e.kind, ErrorKind::TypeMismatch);
    assert!(e.message.contains("division by zero"));
}

#[tokio::test]
async fn self_reference_in_a_binding_is_rejected() {
    let e = ev_err("a = 1.5 * a").await;
    assert_eq!(e.kind, ErrorKind::UnexpectedSelfReference);
    assert_eq!(e.lexeme.as_deref(), Some("a"));
}

#[tokio::test]
async fn rebinding_sees_the_old_value() {
    assert_eq!(int(&ev("a = 2\na = a * 3\na").await), 6);
}

// ── closures, currying, partial application ──────────────────────────

#[tokio::test]
async fn curried_calls_saturate_across_parens() {
    assert_eq!(int(&ev("sum = a -> b -> a + b\nsum(3)(5)").await), 8);
}

#[tokio::test]
async fn under_application_returns_a_callable() {
    let v = ev("sum = a -> b -> a + b\nadd3 = sum(3)\nadd3(5)").await;
    assert_eq!(int(&v), 8);
    let partial = ev("sum = a -> b -> a + b\nsum(3)").await;
    assert!(matches!(partial.value, ExprValue::Callable(_)));
}

#[tokio::test]
async fn over_application_is_an_arity_error_at_the_call_site() {
    let e = ev_err("sum = a -> b -> a + b\nsum(1, 2, 3)").await;
    assert_eq!(e.kind, ErrorKind::Arity);
    assert_eq!(e.line, 2);
}

#[tokio::test]
async fn holes_defer_specific_positions() {
    assert_eq!(int(&ev("sub = a, b -> a - b\nminus2 = sub(_, 2)\nminus2(10)").await), 8);
}

#[tokio::test]
async fn spread_parameter_absorbs_the_rest() {
    let v = ev("collect = a, ..rest -> rest\ncollect(1, 2, 3)").await;
    match v.value {
        ExprValue::Array(items) => {
            assert_eq!(items.len(), 2);
            assert_eq!(int(&items[0]), 2);
            assert_eq!(int(&items[1]), 3);
        }
        other => panic!("expected an array, got {:?}", other),
    }
}

#[tokio::test]
async fn infix_call_sugar_applies_both_sides() {
    assert_eq!(int(&ev("avg = a, b -> (a + b) / 2\n4 avg 8").await), 6);
}

#[tokio::test]
async fn dot_access_falls_back_to_scope_bound_callables() {
    assert_eq!(int(&ev("twice = n -> n * 2\n1.twice").await), 2);
    assert_eq!(int(&ev("add = a, b -> a + b\n4.add(3)").await), 7);
}

#[tokio::test]
async fn dot_fallback_still_reports_unknown_properties() {
    let e = ev_err("1.twice").await;
    assert_eq!(e.kind, ErrorKind::TypeMismatch);
    assert!(e.message.contains("twice"));
}

// ── memoization ──────────────────────────────────────────────────────

#[tokio::test]
async fn bang_bindings_memoize_recursive_calls() {
    let interp = Interp::new();
    let src = "fib! = n -> :if (< n 2) (n) :else (fib(n - 1) + fib(n - 2))\nfib(20)";
    let v = interp.eval_expr(src).await.unwrap();
    assert_eq!(int(&v), 6765);
    assert!(interp.memo_hits() > 0);
}

#[tokio::test]
async fn plain_bindings_never_touch_the_memo() {
    let interp = Interp::new();
    let src = "fib = n -> :if (< n 2) (n) :else (fib(n - 1) + fib(n - 2))\nfib(10)";
    let v = interp.eval_expr(src).await.unwrap();
    assert_eq!(int(&v), 55);
    assert_eq!(interp.memo_hits(), 0);
}

// ── lazy ranges ──────────────────────────────────────────────────────

#[tokio::test]
async fn sliced_range_stays_lazy() {
    let v = ev("[-10..10:5-3]").await;
    assert!(matches!(v.value, ExprValue::Range(_)));
}

#[tokio::test]
async fn range_accessors_avoid_materialization() {
    assert_eq!(int(&ev("[-10..10:5-3].count").await), 5);
    assert_eq!(int(&ev("[-10..10:5-3].first").await), -7);
    assert_eq!(int(&ev("[-10..10:5-3].last").await), -3);
    assert_eq!(int(&ev("[-10..10:5-3].sum").await), -25);
}

#[tokio::test]
async fn descending_range_infers_step_direction() {
    assert_eq!(int(&ev("[3..1].first").await), 3);
    assert_eq!(int(&ev("[3..1].last").await), 1);
}

// ── strings ──────────────────────────────────────────────────────────

#[tokio::test]
async fn interpolation_splices_evaluated_segments() {
    let v = ev(r#""total: #{1 + 2}!""#).await;
    assert_eq!(v.value, ExprValue::Str("total: 3!".into()));
}

#[tokio::test]
async fn percent_formatting_consumes_arguments_in_order() {
    let v = ev(r#""a: %, b: %" % [1, 2]"#).await;
    assert_eq!(v.value, ExprValue::Str("a: 1, b: 2".into()));
}

#[tokio::test]
async fn percent_formatting_honors_precision() {
    let v = ev(r#""pi is %.2f" % 22/7"#).await;
    assert_eq!(v.value, ExprValue::Str("pi is 3.14".into()));
    let v = ev(r#""%.1f and %" % [1, 2]"#).await;
    assert_eq!(v.value, ExprValue::Str("1.0 and 2".into()));
}

#[tokio::test]
async fn interpolated_dynamic_symbols_evaluate_their_text() {
    let v = ev(r#":"u#{1 + 1}""#).await;
    assert_eq!(v.value, ExprValue::Symbol("u2".into()));
}

#[tokio::test]
async fn concat_joins_values_and_arrays() {
    let v = ev(r#""a" ++ 1"#).await;
    assert_eq!(v.value, ExprValue::Str("a1".into()));
    let v = ev("[1, 2] ++ [3]").await;
    assert!(matches!(v.value, ExprValue::Array(items) if items.len() == 3));
}

// ── prefix logic forms ───────────────────────────────────────────────

#[tokio::test]
async fn comparisons_chain_pairwise() {
    assert_eq!(ev("(< 1 2 3)").await.value, ExprValue::Bool(true));
    assert_eq!(ev("(< 1 3 2)").await.value, ExprValue::Bool(false));
    assert_eq!(ev("(== 1 1)").await.value, ExprValue::Bool(true));
    assert_eq!(ev("(!= 1 2)").await.value, ExprValue::Bool(true));
}

#[tokio::test]
async fn any_of_returns_the_first_truthy_value() {
    assert_eq!(int(&ev("(? false 7 9)").await), 7);
    assert_eq!(ev("(? false 0)").await.value, ExprValue::Bool(false));
}

#[tokio::test]
async fn all_of_returns_the_last_value_when_all_pass() {
    assert_eq!(int(&ev("($ 1 2 3)").await), 3);
    assert_eq!(ev("($ 1 0 3)").await.value, ExprValue::Bool(false));
}

// ── units ────────────────────────────────────────────────────────────

#[tokio::test]
async fn star_symbol_tags_a_number_with_a_unit() {
    assert_eq!(serialize(&ev("15 * :MXN").await), "15 MXN");
}

#[tokio::test]
async fn unit_accessor_converts() {
    assert_eq!(serialize(&ev("(35 * :mm).cm").await), "3.5 cm");
    assert_eq!(serialize(&ev("(2000 * :m).km").await), "2 km");
}

#[tokio::test]
async fn additive_units_convert_into_the_left_operand() {
    assert_eq!(serialize(&ev("1cm - 35mm").await), "-2.5 cm");
}

#[tokio::test]
async fn unknown_conversion_is_a_unit_error() {
    let e = ev_err("(3 * :kg).cm").await;
    assert_eq!(e.kind, ErrorKind::Unit);
}

// ── statement forms ──────────────────────────────────────────────────

#[tokio::test]
async fn if_takes_the_first_true_branch() {
    assert_eq!(int(&ev(":if (< 1 2) (10) :else (20)").await), 10);
    assert_eq!(int(&ev(":if (< 2 1) (10) :else (20)").await), 20);
}

#[tokio::test]
async fn loop_collects_body_results() {
    let v = ev(":loop [1..3] :do (it * 2)").await;
    match v.value {
        ExprValue::Array(items) => {
            assert_eq!(items.iter().map(int).collect::<Vec<_>>(), vec![2, 4, 6]);
        }
        other => panic!("expected an array, got {:?}", other),
    }
}

#[tokio::test]
async fn loop_binds_a_named_variable() {
    let v = ev(":loop [1, 2] :in x :do (x + x)").await;
    match v.value {
        ExprValue::Array(items) => {
            assert_eq!(items.iter().map(int).collect::<Vec<_>>(), vec![2, 4]);
        }
        other => panic!("expected an array, got {:?}", other),
    }
}

#[tokio::test]
async fn match_supports_inclusion_guards_and_else() {
    let v = ev(r#":match 5 :when [1, 2, 3] ("low") :when (< 4 it) ("high") :else ("mid")"#).await;
    assert_eq!(v.value, ExprValue::Str("high".into()));
    let v = ev(r#":match 2 :when [1, 2, 3] ("low") :else ("mid")"#).await;
    assert_eq!(v.value, ExprValue::Str("low".into()));
}

#[tokio::test]
async fn match_with_an_empty_body_returns_the_subject() {
    assert_eq!(int(&ev(":match 2 :when [1, 2, 3]").await), 2);
}

#[tokio::test]
async fn match_ranges_by_inclusion() {
    let v = ev(r#":match 2 :when [1..3] ("in") :else ("out")"#).await;
    assert_eq!(v.value, ExprValue::Str("in".into()));
    let v = ev(r#":match 9 :when [1..3] ("in") :else ("out")"#).await;
    assert_eq!(v.value, ExprValue::Str("out".into()));
}

#[tokio::test]
async fn while_repeats_until_the_condition_fails() {
    assert_eq!(int(&ev(":let i = 0\n:while (< i 3) :do (:let i = i + 1)").await), 3);
}

#[tokio::test]
async fn try_returns_the_body_value_when_it_succeeds() {
    assert_eq!(int(&ev(":try (40 + 2)").await), 42);
}

#[tokio::test]
async fn try_exhausts_rescues_and_reports_the_last_error() {
    let e = ev_err(":try (1 / 0) :rescue (it)").await;
    assert!(e.message.contains("division by zero"));
}

#[tokio::test]
async fn try_check_failure_is_an_error_without_rescues() {
    let e = ev_err(":try (1) :check (< it 0)").await;
    assert!(e.message.contains("never passed"));
}
