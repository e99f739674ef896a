//! Document mode: prose passes through, statements reduce in order, and
//! evaluation stops at the first error while keeping earlier results.

use slate_core::{serialize, ErrorKind, Expr, ExprValue, Num};
use slate_eval::Interp;

fn int(e: &Expr) -> i64 {
    match &e.value {
        ExprValue::Number { num: Num::Int(n), .. } => *n,
        other => panic!("expected an integer, got {:?}", other),
    }
}

#[tokio::test]
async fn prose_lines_pass_through_verbatim() {
    let doc = Interp::new().eval_document("# Title\nx = 2\nx + 3").await;
    assert!(doc.error.is_none());
    assert_eq!(doc.results.len(), 3);
    assert!(matches!(doc.results[0].value, ExprValue::Text { .. }));
    assert_eq!(int(&doc.results[1]), 2);
    assert_eq!(int(&doc.results[2]), 5);
}

#[tokio::test]
async fn sentence_prose_stays_out_of_the_computed_value() {
    let doc = Interp::new().eval_document("1cm - 35mm.").await;
    assert!(doc.error.is_none());
    assert_eq!(doc.results.len(), 1);
    assert_eq!(serialize(&doc.results[0]), "-2.5 cm");
}

#[tokio::test]
async fn an_error_keeps_everything_already_produced() {
    let doc = Interp::new().eval_document("x = 2\nx * 3\n1 / 0").await;
    assert_eq!(doc.results.iter().map(int).collect::<Vec<_>>(), vec![2, 6]);
    let e = doc.error.unwrap();
    assert_eq!(e.kind, ErrorKind::TypeMismatch);
    assert_eq!(e.line, 3);
}

#[tokio::test]
async fn undeclared_words_soften_to_text_in_documents() {
    let doc = Interp::new().eval_document("answer").await;
    assert!(doc.error.is_none());
    assert!(matches!(doc.results[0].value, ExprValue::Text { .. }));
}

#[tokio::test]
async fn undeclared_names_stay_errors_in_strict_mode() {
    let e = Interp::new().eval_expr("answer").await.unwrap_err();
    assert_eq!(e.kind, ErrorKind::UndeclaredLocal);
}

#[tokio::test]
async fn templates_expand_before_evaluation() {
    let doc = Interp::new()
        .eval_document(":template ++ (a -> :let a = a + 1)\nx = 1\nx++\nx")
        .await;
    assert!(doc.error.is_none());
    let last = doc.results.last().unwrap();
    assert_eq!(int(last), 2);
}

#[tokio::test]
async fn a_parse_error_yields_no_results() {
    let doc = Interp::new().eval_document("x = 2\nf(1, 2").await;
    assert!(doc.results.is_empty());
    assert_eq!(doc.error.unwrap().kind, ErrorKind::Parse);
}
