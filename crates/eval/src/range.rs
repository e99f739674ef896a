//! Lazy range sequences.
//!
//! A parsed `RangeSpec` reaches the evaluator with its bounds reduced to
//! values; this module turns that into an `EvalRange` that can report its
//! length, index individual elements, and slice, all without materializing
//! the sequence. Materialization happens only where the language demands a
//! concrete array (`:in` loops, list natives).

use rust_decimal::prelude::ToPrimitive;
use slate_core::{ErrorKind, Expr, ExprValue, Num, SlateError};

/// One endpoint of a range: numeric, or a single character for `["a".."f"]`.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Num(Num),
    Char(char),
}

/// A fully evaluated range, still lazy.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRange {
    begin: Bound,
    step: Num,
    /// Count of elements in the unsliced sequence; both bounds inclusive.
    raw_len: i64,
    offset: i64,
    length: Option<i64>,
}

fn bound_of(e: &Expr) -> Result<Bound, SlateError> {
    match &e.value {
        ExprValue::Number { num, .. } => Ok(Bound::Num(*num)),
        ExprValue::Str(s) if s.chars().count() == 1 => {
            Ok(Bound::Char(s.chars().next().unwrap_or(' ')))
        }
        _ => Err(SlateError::new(
            ErrorKind::TypeMismatch,
            e.line,
            e.col,
            "range bounds must be numbers or single characters",
        )),
    }
}

fn want_int(e: &Expr, what: &str) -> Result<i64, SlateError> {
    e.as_number()
        .and_then(|(n, _)| n.as_int())
        .ok_or_else(|| {
            SlateError::new(
                ErrorKind::TypeMismatch,
                e.line,
                e.col,
                format!("range {} must be a whole number", what),
            )
        })
}

impl EvalRange {
    /// Build from evaluated pieces. The step's sign is forced to match the
    /// direction of travel so `[10..1]` and `[10..1:2]` both descend.
    pub fn new(
        begin: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        length: Option<&Expr>,
        offset: Option<&Expr>,
    ) -> Result<EvalRange, SlateError> {
        let b = bound_of(begin)?;
        let e = bound_of(end)?;
        let step = match step {
            Some(s) => {
                let (n, _) = s.as_number().ok_or_else(|| {
                    SlateError::new(
                        ErrorKind::TypeMismatch,
                        s.line,
                        s.col,
                        "range step must be a number",
                    )
                })?;
                if n.is_zero() {
                    return Err(SlateError::new(
                        ErrorKind::TypeMismatch,
                        s.line,
                        s.col,
                        "range step must be nonzero",
                    ));
                }
                *n
            }
            None => Num::Int(1),
        };
        let delta = match (b, e) {
            (Bound::Num(bn), Bound::Num(en)) => en.sub(&bn),
            (Bound::Char(bc), Bound::Char(ec)) => Some(Num::Int(ec as i64 - bc as i64)),
            _ => {
                return Err(SlateError::new(
                    ErrorKind::TypeMismatch,
                    begin.line,
                    begin.col,
                    "range bounds must agree in kind",
                ))
            }
        };
        let delta = delta.ok_or_else(|| {
            SlateError::new(ErrorKind::TypeMismatch, begin.line, begin.col, "range overflow")
        })?;
        let descending = delta.compare(&Num::Int(0)).is_lt();
        let step_positive = step.compare(&Num::Int(0)).is_gt();
        let step = if descending == step_positive { step.neg() } else { step };
        if matches!(b, Bound::Char(_)) && step.as_int().is_none() {
            return Err(SlateError::new(
                ErrorKind::TypeMismatch,
                begin.line,
                begin.col,
                "character ranges need a whole-number step",
            ));
        }
        let raw_len = delta
            .div(&step)
            .and_then(|q| q.to_decimal().floor().to_i64())
            .map(|n| n + 1)
            .unwrap_or(0)
            .max(0);
        let offset = match offset {
            Some(o) => want_int(o, "offset")?.max(0),
            None => 0,
        };
        let length = match length {
            Some(l) => Some(want_int(l, "length")?.max(0)),
            None => None,
        };
        Ok(EvalRange { begin: b, step, raw_len, offset, length })
    }

    /// Element count after the slice is applied.
    pub fn len(&self) -> i64 {
        let remaining = (self.raw_len - self.offset).max(0);
        match self.length {
            Some(l) => remaining.min(l),
            None => remaining,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at sliced index `i`, computed directly from the bounds.
    pub fn get(&self, i: i64) -> Option<Expr> {
        if i < 0 || i >= self.len() {
            return None;
        }
        let raw = i + self.offset;
        match self.begin {
            Bound::Num(b) => {
                let v = self.step.mul(&Num::Int(raw)).and_then(|s| b.add(&s))?;
                Some(Expr::number(v))
            }
            Bound::Char(c) => {
                let code = c as i64 + self.step.as_int()? * raw;
                let ch = u32::try_from(code).ok().and_then(char::from_u32)?;
                Some(Expr::string(ch.to_string()))
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Expr> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    /// Concrete array of the sliced sequence, refused beyond `limit`
    /// elements so an unbounded range cannot exhaust memory.
    pub fn materialize(&self, limit: i64, line: u32, col: u32) -> Result<Vec<Expr>, SlateError> {
        if self.len() > limit {
            return Err(SlateError::new(
                ErrorKind::TypeMismatch,
                line,
                col,
                format!("range of {} elements exceeds the limit of {}", self.len(), limit),
            ));
        }
        Ok(self.iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Expr {
        Expr::number(Num::Int(n))
    }

    #[test]
    fn inclusive_ascending() {
        let r = EvalRange::new(&int(1), &int(5), None, None, None).unwrap();
        assert_eq!(r.len(), 5);
        assert_eq!(r.get(0), Some(int(1)));
        assert_eq!(r.get(4), Some(int(5)));
        assert_eq!(r.get(5), None);
    }

    #[test]
    fn descending_infers_step_sign() {
        let r = EvalRange::new(&int(10), &int(1), Some(&int(2)), None, None).unwrap();
        assert_eq!(r.len(), 5);
        assert_eq!(r.get(1), Some(int(8)));
    }

    #[test]
    fn slice_applies_without_materializing() {
        // [-10..10:5] sliced to 5 elements starting at offset 3.
        let r = EvalRange::new(&int(-10), &int(10), Some(&int(5)), Some(&int(5)), Some(&int(3)))
            .unwrap();
        // Raw sequence is -10, -5, 0, 5, 10; offset 3 leaves two elements.
        assert_eq!(r.len(), 2);
        assert_eq!(r.get(0), Some(int(5)));
        assert_eq!(r.get(1), Some(int(10)));
    }

    #[test]
    fn fractional_step_stays_exact() {
        let half = Expr::number(Num::fraction(1, 2).unwrap());
        let r = EvalRange::new(&int(0), &int(2), Some(&half), None, None).unwrap();
        assert_eq!(r.len(), 5);
        assert_eq!(r.get(1), Some(Expr::number(Num::Fraction(1, 2))));
        assert_eq!(r.get(3), Some(Expr::number(Num::Fraction(3, 2))));
    }

    #[test]
    fn char_range_steps_code_points() {
        let r = EvalRange::new(&Expr::string("a"), &Expr::string("e"), None, None, None).unwrap();
        assert_eq!(r.len(), 5);
        assert_eq!(r.get(2), Some(Expr::string("c")));
    }

    #[test]
    fn zero_step_is_rejected() {
        let err = EvalRange::new(&int(1), &int(5), Some(&int(0)), None, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn mixed_bound_kinds_are_rejected() {
        let err = EvalRange::new(&int(1), &Expr::string("z"), None, None, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn materialize_honors_the_limit() {
        let r = EvalRange::new(&int(1), &int(1_000_000), None, None, None).unwrap();
        assert!(r.materialize(1000, 0, 0).is_err());
        let small = EvalRange::new(&int(1), &int(3), None, None, None).unwrap();
        assert_eq!(small.materialize(1000, 0, 0).unwrap(), vec![int(1), int(2), int(3)]);
    }
}
