//! Unit and currency conversion.
//!
//! A `ConversionContext` is passed explicitly to the interpreter -- no
//! module-level statics -- so tests and concurrent interpreter instances
//! stay isolated. Dimensional units convert through exact rational factors
//! relative to a base unit per dimension; currency codes convert through an
//! injected `RateStore`, refreshed at most once per UTC day.

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use slate_core::{ErrorKind, Num, SlateError, UnitRegistry, UnitValue};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use time::{Date, OffsetDateTime};

/// Injected source of exchange rates, all expressed against a single
/// reference currency. `resolve` fetches fresh rates with ordered fallback
/// across providers; the context calls it at most once per UTC day.
#[async_trait(?Send)]
pub trait RateStore {
    /// Provider identity (API key or table name), for diagnostics.
    fn key(&self) -> String;
    fn read(&self, code: &str) -> Option<f64>;
    fn write(&mut self, code: &str, rate: f64);
    fn exists(&self, code: &str) -> bool;
    async fn resolve(&mut self) -> Result<(), SlateError>;
}

/// Fixed in-memory rates; the default store for tests and offline use.
pub struct StaticRates {
    rates: HashMap<String, f64>,
}

impl StaticRates {
    pub fn new(rates: &[(&str, f64)]) -> StaticRates {
        StaticRates {
            rates: rates.iter().map(|(c, r)| (c.to_string(), *r)).collect(),
        }
    }
}

impl Default for StaticRates {
    fn default() -> StaticRates {
        // Reference currency is USD at 1.0.
        StaticRates::new(&[
            ("USD", 1.0),
            ("EUR", 0.92),
            ("GBP", 0.79),
            ("JPY", 147.0),
            ("MXN", 18.7),
            ("CAD", 1.36),
        ])
    }
}

#[async_trait(?Send)]
impl RateStore for StaticRates {
    fn key(&self) -> String {
        "static".to_string()
    }

    fn read(&self, code: &str) -> Option<f64> {
        self.rates.get(code).copied()
    }

    fn write(&mut self, code: &str, rate: f64) {
        self.rates.insert(code.to_string(), rate);
    }

    fn exists(&self, code: &str) -> bool {
        self.rates.contains_key(code)
    }

    async fn resolve(&mut self) -> Result<(), SlateError> {
        Ok(())
    }
}

/// Dimension of a measurement unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Length,
    Mass,
    Time,
    Data,
}

/// Conversion factor to the dimension's base unit, kept as an exact
/// rational so `1cm - 35mm` stays exact.
#[derive(Debug, Clone, Copy)]
struct Factor {
    dim: Dim,
    num: i64,
    den: i64,
}

pub struct ConversionContext {
    dims: HashMap<String, Factor>,
    rates: RefCell<Box<dyn RateStore>>,
    /// UTC day of the last rate refresh.
    refreshed: Cell<Option<Date>>,
}

impl Default for ConversionContext {
    fn default() -> ConversionContext {
        ConversionContext::new(Box::<StaticRates>::default())
    }
}

impl ConversionContext {
    pub fn new(rates: Box<dyn RateStore>) -> ConversionContext {
        let mut dims = HashMap::new();
        let mut put = |unit: &str, dim: Dim, num: i64, den: i64| {
            dims.insert(unit.to_string(), Factor { dim, num, den });
        };
        // Length, base meter.
        put("mm", Dim::Length, 1, 1000);
        put("cm", Dim::Length, 1, 100);
        put("m", Dim::Length, 1, 1);
        put("km", Dim::Length, 1000, 1);
        put("in", Dim::Length, 254, 10000);
        put("ft", Dim::Length, 3048, 10000);
        put("yd", Dim::Length, 9144, 10000);
        put("mi", Dim::Length, 1609344, 1000);
        // Mass, base gram.
        put("mg", Dim::Mass, 1, 1000);
        put("g", Dim::Mass, 1, 1);
        put("kg", Dim::Mass, 1000, 1);
        put("t", Dim::Mass, 1_000_000, 1);
        put("oz", Dim::Mass, 28_349_523_125, 1_000_000_000);
        put("lb", Dim::Mass, 45_359_237, 100_000);
        // Time, base second.
        put("ms", Dim::Time, 1, 1000);
        put("s", Dim::Time, 1, 1);
        put("min", Dim::Time, 60, 1);
        put("hour", Dim::Time, 3600, 1);
        put("day", Dim::Time, 86_400, 1);
        put("week", Dim::Time, 604_800, 1);
        // Data, base byte.
        put("b", Dim::Data, 1, 1);
        put("kb", Dim::Data, 1000, 1);
        put("mb", Dim::Data, 1_000_000, 1);
        put("gb", Dim::Data, 1_000_000_000, 1);
        ConversionContext {
            dims,
            rates: RefCell::new(rates),
            refreshed: Cell::new(None),
        }
    }

    /// Whether a word names a known measurement unit or currency code.
    pub fn is_unit(&self, word: &str) -> bool {
        self.dims.contains_key(word) || self.rates.borrow().exists(word)
    }

    /// Build the scanner's registration-callback chain: one callback over
    /// this context's full unit vocabulary.
    pub fn scanner_units(&self) -> UnitRegistry {
        let mut known: Vec<String> = self.dims.keys().cloned().collect();
        for code in ["USD", "EUR", "GBP", "JPY", "MXN", "CAD", "AUD", "CHF"] {
            if self.rates.borrow().exists(code) {
                known.push(code.to_string());
            }
        }
        let mut reg = UnitRegistry::new();
        reg.register(move |value, unit| {
            known
                .iter()
                .any(|k| k == unit)
                .then(|| UnitValue { value, unit: unit.to_string() })
        });
        reg
    }

    /// Refresh exchange rates if the stored stamp is from an earlier UTC day.
    pub async fn refresh_rates(&self) -> Result<(), SlateError> {
        let today = OffsetDateTime::now_utc().date();
        if self.refreshed.get() == Some(today) {
            return Ok(());
        }
        self.rates.borrow_mut().resolve().await?;
        self.refreshed.set(Some(today));
        Ok(())
    }

    /// Convert between two units of the same dimension or two currency
    /// codes. Incompatible or unknown pairs raise `Unit` errors.
    pub fn convert(&self, value: &Num, from: &str, to: &str) -> Result<Num, SlateError> {
        if from == to {
            return Ok(*value);
        }
        match (self.dims.get(from), self.dims.get(to)) {
            (Some(f), Some(t)) if f.dim == t.dim => {
                // value * (f.num / f.den) / (t.num / t.den), in decimal so
                // converted quantities read as measurements, not fractions.
                let num = Decimal::from(f.num) * Decimal::from(t.den);
                let den = Decimal::from(f.den) * Decimal::from(t.num);
                num.checked_div(den)
                    .and_then(|factor| value.to_decimal().checked_mul(factor))
                    .map(Num::from_decimal)
                    .ok_or_else(|| self.unit_err(from, to, "conversion overflow"))
            }
            (Some(_), Some(_)) => {
                Err(self.unit_err(from, to, "units measure different dimensions"))
            }
            _ => {
                let rates = self.rates.borrow();
                match (rates.read(from), rates.read(to)) {
                    (Some(rf), Some(rt)) => {
                        let ratio = Decimal::from_f64(rt / rf)
                            .ok_or_else(|| self.unit_err(from, to, "bad exchange rate"))?;
                        value
                            .mul(&Num::Decimal(ratio))
                            .ok_or_else(|| self.unit_err(from, to, "conversion overflow"))
                    }
                    _ => Err(self.unit_err(from, to, "unknown unit")),
                }
            }
        }
    }

    fn unit_err(&self, from: &str, to: &str, why: &str) -> SlateError {
        SlateError::new(
            ErrorKind::Unit,
            0,
            0,
            format!("cannot convert {} to {}: {}", from, to, why),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_conversion_is_exact() {
        let ctx = ConversionContext::default();
        let got = ctx.convert(&Num::Int(35), "mm", "cm").unwrap();
        assert_eq!(got.to_string(), "3.5");
        let whole = ctx.convert(&Num::Int(2000), "m", "km").unwrap();
        assert_eq!(whole, Num::Int(2));
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let ctx = ConversionContext::default();
        let err = ctx.convert(&Num::Int(1), "cm", "kg").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unit);
        assert!(err.message.contains("different dimensions"));
    }

    #[test]
    fn unknown_unit_is_rejected() {
        let ctx = ConversionContext::default();
        let err = ctx.convert(&Num::Int(1), "cm", "parsec").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unit);
    }

    #[test]
    fn currency_goes_through_the_rate_store() {
        let ctx = ConversionContext::new(Box::new(StaticRates::new(&[
            ("USD", 1.0),
            ("MXN", 20.0),
        ])));
        let got = ctx.convert(&Num::Int(5), "USD", "MXN").unwrap();
        assert_eq!(got.to_string(), "100");
    }

    #[test]
    fn scanner_chain_knows_units_and_currencies() {
        let ctx = ConversionContext::default();
        let reg = ctx.scanner_units();
        assert!(reg.lookup(1.0, "cm").is_some());
        assert!(reg.lookup(1.0, "MXN").is_some());
        assert!(reg.lookup(1.0, "furlong").is_none());
    }

    #[tokio::test]
    async fn refresh_is_once_per_day() {
        let ctx = ConversionContext::default();
        ctx.refresh_rates().await.unwrap();
        let first = ctx.refreshed.get();
        assert!(first.is_some());
        ctx.refresh_rates().await.unwrap();
        assert_eq!(ctx.refreshed.get(), first);
    }
}
