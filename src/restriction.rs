//! Typed constraints attached to Keyvals (value restrictions) and Sections (cardinality)

use crate::error::{Error, Result};
use crate::value::{Value, ValueType};
use crate::version::Version;

/// Which family and exact constraint a [`Restriction`] enforces.
#[derive(Debug, Clone, PartialEq)]
pub enum RestrictionKind {
    /// Minimum number of occurrences of a named child slot
    IncEntryMin(u32),
    /// Maximum number of occurrences of a named child slot; `0` means unbounded
    IncEntryMax(u32),
    /// Exact numeric value a Keyval's value must equal
    ExcValueNumeric(f64),
    /// Inclusive closed numeric interval a Keyval's value must fall within
    ExcValueRange(f64, f64),
    /// Permitted enum token
    ExcValueEnum(String),
}

impl RestrictionKind {
    /// True for the cardinality family (`IncEntry*`), false for the value family (`ExcValue*`).
    pub fn is_inclusive(&self) -> bool {
        matches!(self, RestrictionKind::IncEntryMin(_) | RestrictionKind::IncEntryMax(_))
    }

    /// Whether this restriction kind is legal to attach to a Keyval of the given value type.
    /// String and Boolean keyvals accept no exclusive-value restrictions at all (§4.5).
    pub fn compatible_with(&self, value_type: ValueType) -> bool {
        match self {
            RestrictionKind::IncEntryMin(_) | RestrictionKind::IncEntryMax(_) => true,
            RestrictionKind::ExcValueNumeric(_) | RestrictionKind::ExcValueRange(_, _) => {
                matches!(value_type, ValueType::Integer | ValueType::Float)
            }
            RestrictionKind::ExcValueEnum(_) => matches!(value_type, ValueType::Enum),
        }
    }
}

/// A restriction's (introduced, deprecated) version window, plus its kind.
#[derive(Debug, Clone)]
pub struct Restriction {
    /// The kind and bound(s) of this restriction
    pub kind: RestrictionKind,
    /// Version this restriction became active
    pub introduced: Version,
    /// Version this restriction stopped applying, if any
    pub deprecated: Option<Version>,
}

impl Restriction {
    /// Construct a restriction active from `introduced` with no deprecation.
    pub fn new(kind: RestrictionKind, introduced: Version) -> Self {
        Self { kind, introduced, deprecated: None }
    }

    /// Set the version this restriction is deprecated at.
    pub fn with_deprecated(mut self, deprecated: Version) -> Self {
        self.deprecated = Some(deprecated);
        self
    }

    /// Finalize-time self-consistency check (§4.3 Restriction finalize rule).
    pub fn validate_self(&self) -> Result<()> {
        if let Some(dep) = self.deprecated {
            if self.introduced >= dep {
                return Err(Error::RestrictionViolated(format!(
                    "restriction introduced {} must precede deprecated {}",
                    self.introduced, dep
                )));
            }
        }
        Ok(())
    }

    /// A restriction `R` applies at version `V` iff `R.introduced <= V` and either
    /// `R.deprecated` is unset or `V < R.deprecated` (§4.4).
    pub fn applies_at(&self, version: Version) -> bool {
        if self.introduced > version {
            return false;
        }
        match self.deprecated {
            Some(dep) => version < dep,
            None => true,
        }
    }

    /// Exclusive-value acceptance test for a concrete value at a version.
    /// Only meaningful for `ExcValue*` kinds; callers should pre-filter by `applies_at`.
    pub fn accepts(&self, value: &Value) -> Result<bool> {
        match &self.kind {
            RestrictionKind::ExcValueNumeric(n) => Ok(value.as_numeric()? == *n),
            RestrictionKind::ExcValueRange(lo, hi) => {
                let v = value.as_numeric()?;
                Ok(v >= *lo && v <= *hi)
            }
            RestrictionKind::ExcValueEnum(token) => Ok(value.as_enum()? == token),
            RestrictionKind::IncEntryMin(_) | RestrictionKind::IncEntryMax(_) => {
                Err(Error::InternalError("accepts() called on an inclusive restriction".into()))
            }
        }
    }
}

/// Cardinality bounds resolved from a Section's child-slot restrictions (§4.5 defaults: min=1, max=1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    /// Minimum occurrences required
    pub min: u32,
    /// Maximum occurrences allowed; `0` means unbounded
    pub max: u32,
}

impl Default for Cardinality {
    fn default() -> Self {
        Cardinality { min: 1, max: 1 }
    }
}

impl Cardinality {
    /// Whether `max` permits an unbounded number of occurrences.
    pub fn is_unbounded(&self) -> bool {
        self.max == 0
    }

    /// Whether `count` occurrences satisfy this cardinality.
    pub fn accepts(&self, count: u32) -> bool {
        count >= self.min && (self.is_unbounded() || count <= self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applies_at_version_window() {
        let r = Restriction::new(RestrictionKind::ExcValueEnum("beta".into()), Version::new(1, 1, 0))
            .with_deprecated(Version::new(2, 0, 0));
        assert!(!r.applies_at(Version::new(1, 0, 5)));
        assert!(r.applies_at(Version::new(1, 5, 0)));
        assert!(!r.applies_at(Version::new(2, 0, 0)));
    }

    #[test]
    fn test_exc_value_numeric_accepts_exact_match_only() {
        let r = Restriction::new(RestrictionKind::ExcValueNumeric(42.0), Version::default());
        assert!(r.accepts(&Value::Integer(42)).unwrap());
        assert!(!r.accepts(&Value::Integer(43)).unwrap());
    }

    #[test]
    fn test_exc_value_range_inclusive_bounds() {
        let r = Restriction::new(RestrictionKind::ExcValueRange(1.0, 10.0), Version::default());
        assert!(r.accepts(&Value::Integer(1)).unwrap());
        assert!(r.accepts(&Value::Integer(10)).unwrap());
        assert!(!r.accepts(&Value::Integer(11)).unwrap());
    }

    #[test]
    fn test_validate_self_rejects_inverted_window() {
        let r = Restriction::new(RestrictionKind::ExcValueEnum("x".into()), Version::new(2, 0, 0))
            .with_deprecated(Version::new(1, 0, 0));
        assert!(r.validate_self().is_err());
    }

    #[test]
    fn test_compatible_with_rejects_exclusive_on_string_and_boolean() {
        let numeric = RestrictionKind::ExcValueNumeric(1.0);
        assert!(!numeric.compatible_with(ValueType::String));
        assert!(!numeric.compatible_with(ValueType::Boolean));
        assert!(numeric.compatible_with(ValueType::Integer));
    }

    #[test]
    fn test_cardinality_defaults_and_unbounded() {
        let default = Cardinality::default();
        assert_eq!(default, Cardinality { min: 1, max: 1 });
        assert!(!default.accepts(0));
        assert!(default.accepts(1));
        assert!(!default.accepts(2));

        let unbounded = Cardinality { min: 1, max: 0 };
        assert!(unbounded.is_unbounded());
        assert!(unbounded.accepts(1000));
    }
}
