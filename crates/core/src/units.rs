//! Unit-registration seam between the scanner and the host.
//!
//! The scanner does not know any units. While assembling a number token it
//! offers the trailing word to a caller-supplied chain of registration
//! callbacks; the first callback that recognizes the word wins and the word
//! is captured into the token's unit field. An empty chain means `3x` is
//! always implicit multiplication.

/// A number tagged with a recognized unit word, as produced by a
/// registration callback.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitValue {
    pub value: f64,
    pub unit: String,
}

/// One registration callback: recognize `unit_text` or decline.
pub type UnitFn = dyn Fn(f64, &str) -> Option<UnitValue>;

/// Ordered chain of unit-registration callbacks; first non-`None` wins.
#[derive(Default)]
pub struct UnitRegistry {
    chain: Vec<Box<UnitFn>>,
}

impl UnitRegistry {
    pub fn new() -> UnitRegistry {
        UnitRegistry { chain: Vec::new() }
    }

    /// Append a callback to the chain. Earlier registrations take priority.
    pub fn register(&mut self, f: impl Fn(f64, &str) -> Option<UnitValue> + 'static) {
        self.chain.push(Box::new(f));
    }

    pub fn lookup(&self, value: f64, unit_text: &str) -> Option<UnitValue> {
        self.chain.iter().find_map(|f| f(value, unit_text))
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_wins() {
        let mut reg = UnitRegistry::new();
        reg.register(|v, u| {
            (u == "cm").then(|| UnitValue {
                value: v,
                unit: "cm".into(),
            })
        });
        reg.register(|v, u| {
            (u == "cm" || u == "mm").then(|| UnitValue {
                value: v * 10.0,
                unit: "shadowed".into(),
            })
        });
        assert_eq!(reg.lookup(1.0, "cm").unwrap().unit, "cm");
        assert_eq!(reg.lookup(1.0, "mm").unwrap().unit, "shadowed");
        assert_eq!(reg.lookup(1.0, "parsec"), None);
    }
}
