//! Resource kinds and the fixed-dimension resource vector.
//!
//! Every stock and every flow in the simulation is a [`ResourceVector`]: one
//! [`Fixed64`] slot per [`ResourceKind`]. Vectors are plain `Copy` values;
//! every operation returns a new vector and nothing is mutated in place.
//!
//! Arithmetic saturates at the Q32.32 range (about ±2.1e9) instead of
//! wrapping or panicking. Within range it is exact.

use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, NumericContext, checked_f64_to_fixed64, fixed64_to_f64};

// ---------------------------------------------------------------------------
// Resource kinds
// ---------------------------------------------------------------------------

/// Number of resource kinds, and so the dimension of every vector.
pub const RESOURCE_KIND_COUNT: usize = 7;

/// The closed set of quantity dimensions tracked by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Storage reservoir capacity (aquifers, tanks).
    Reservoir,
    Water,
    Electricity,
    Oil,
    /// Extractable reserves still in the ground.
    Reserves,
    Population,
    Currency,
}

impl ResourceKind {
    /// All kinds in slot order.
    pub const ALL: [ResourceKind; RESOURCE_KIND_COUNT] = [
        ResourceKind::Reservoir,
        ResourceKind::Water,
        ResourceKind::Electricity,
        ResourceKind::Oil,
        ResourceKind::Reserves,
        ResourceKind::Population,
        ResourceKind::Currency,
    ];

    /// Slot index of this kind inside a vector.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Reservoir => "reservoir",
            ResourceKind::Water => "water",
            ResourceKind::Electricity => "electricity",
            ResourceKind::Oil => "oil",
            ResourceKind::Reserves => "reserves",
            ResourceKind::Population => "population",
            ResourceKind::Currency => "currency",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ResourceError::UnknownKind(wanted.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Construction-time failures for resource values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("dimension mismatch: expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("cannot parse resource quantity '{0}'")]
    Parse(String),
    #[error("unknown resource kind '{0}'")]
    UnknownKind(String),
    #[error("quantity {0} is not finite or outside the representable range")]
    OutOfRange(String),
}

// ---------------------------------------------------------------------------
// Resource vector
// ---------------------------------------------------------------------------

/// An immutable quantity per resource kind.
///
/// Equality is exact and component-wise. Use [`ResourceVector::is_zero`] or
/// [`ResourceVector::approx_eq`] with a [`NumericContext`] for tolerant
/// comparisons.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourceVector {
    values: [Fixed64; RESOURCE_KIND_COUNT],
}

impl ResourceVector {
    pub const ZERO: ResourceVector = ResourceVector {
        values: [Fixed64::ZERO; RESOURCE_KIND_COUNT],
    };

    /// Build a vector from a dense value list in [`ResourceKind::ALL`] order.
    pub fn from_values(values: &[Fixed64]) -> Result<Self, ResourceError> {
        let values: [Fixed64; RESOURCE_KIND_COUNT] =
            values
                .try_into()
                .map_err(|_| ResourceError::DimensionMismatch {
                    expected: RESOURCE_KIND_COUNT,
                    actual: values.len(),
                })?;
        Ok(Self { values })
    }

    /// Build a vector from floats. Use only for initialization.
    pub fn from_f64s(values: &[f64]) -> Result<Self, ResourceError> {
        let converted = values
            .iter()
            .map(|&v| {
                checked_f64_to_fixed64(v).ok_or_else(|| ResourceError::OutOfRange(v.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_values(&converted)
    }

    /// A vector holding `value` at `kind` and zero elsewhere.
    pub fn of(kind: ResourceKind, value: Fixed64) -> Self {
        let mut values = [Fixed64::ZERO; RESOURCE_KIND_COUNT];
        values[kind.index()] = value;
        Self { values }
    }

    #[inline]
    pub fn get(&self, kind: ResourceKind) -> Fixed64 {
        self.values[kind.index()]
    }

    pub fn values(&self) -> &[Fixed64; RESOURCE_KIND_COUNT] {
        &self.values
    }

    /// Iterate `(kind, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, Fixed64)> + '_ {
        ResourceKind::ALL.into_iter().zip(self.values.iter().copied())
    }

    fn zip_with(&self, other: &Self, f: impl Fn(Fixed64, Fixed64) -> Fixed64) -> Self {
        let mut values = self.values;
        for (v, o) in values.iter_mut().zip(other.values.iter()) {
            *v = f(*v, *o);
        }
        Self { values }
    }

    fn map(&self, f: impl Fn(Fixed64) -> Fixed64) -> Self {
        Self {
            values: self.values.map(f),
        }
    }

    pub fn add(&self, other: &Self) -> Self {
        self.zip_with(other, Fixed64::saturating_add)
    }

    pub fn subtract(&self, other: &Self) -> Self {
        self.zip_with(other, Fixed64::saturating_sub)
    }

    pub fn negate(&self) -> Self {
        self.map(Fixed64::saturating_neg)
    }

    /// Scale every component by `scalar`.
    pub fn multiply(&self, scalar: Fixed64) -> Self {
        self.map(|v| v.saturating_mul(scalar))
    }

    /// Component-wise product.
    pub fn multiply_vector(&self, other: &Self) -> Self {
        self.zip_with(other, Fixed64::saturating_mul)
    }

    /// Divide every component by `divisor`; `None` if it is zero.
    pub fn checked_divide(&self, divisor: Fixed64) -> Option<Self> {
        let mut values = self.values;
        for v in &mut values {
            *v = v.checked_div(divisor)?;
        }
        Some(Self { values })
    }

    /// Keep only `kind`; every other component becomes zero.
    pub fn project(&self, kind: ResourceKind) -> Self {
        Self::of(kind, self.get(kind))
    }

    /// Exchange the values held at two kinds.
    pub fn swap(&self, a: ResourceKind, b: ResourceKind) -> Self {
        let mut values = self.values;
        values.swap(a.index(), b.index());
        Self { values }
    }

    /// Sum of all components.
    pub fn total(&self) -> Fixed64 {
        self.values
            .iter()
            .copied()
            .fold(Fixed64::ZERO, Fixed64::saturating_add)
    }

    /// Largest absolute component, used to report violation magnitudes.
    pub fn magnitude(&self) -> Fixed64 {
        self.values
            .iter()
            .map(|v| v.saturating_abs())
            .fold(Fixed64::ZERO, |acc, v| acc.max(v))
    }

    /// True iff every component lies within the context's epsilon of zero.
    pub fn is_zero(&self, ctx: &NumericContext) -> bool {
        self.values.iter().all(|&v| ctx.is_negligible(v))
    }

    /// True iff `self - other` is zero under `ctx`.
    pub fn approx_eq(&self, other: &Self, ctx: &NumericContext) -> bool {
        self.subtract(other).is_zero(ctx)
    }
}

impl fmt::Debug for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", fixed64_to_f64(*v))?;
        }
        f.write_str("]")
    }
}

/// Parses `"1, 2.5, 0, 0, 0, 0, 0"`, with or without surrounding brackets.
impl FromStr for ResourceVector {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
        let values = inner
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<Fixed64>()
                    .map_err(|_| ResourceError::Parse(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_values(&values)
    }
}

impl Sum for ResourceVector {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ResourceVector::ZERO, |acc, v| acc.add(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64;

    fn fx(v: f64) -> Fixed64 {
        f64_to_fixed64(v)
    }

    fn sample() -> ResourceVector {
        ResourceVector::from_f64s(&[1.0, 2.0, -3.0, 4.5, 0.0, 10.0, -0.25]).unwrap()
    }

    #[test]
    fn from_values_rejects_wrong_dimension() {
        let err = ResourceVector::from_values(&[fx(1.0); 3]).unwrap_err();
        assert_eq!(
            err,
            ResourceError::DimensionMismatch {
                expected: 7,
                actual: 3
            }
        );
    }

    #[test]
    fn single_kind_constructor_zeroes_others() {
        let v = ResourceVector::of(ResourceKind::Water, fx(5.0));
        assert_eq!(v.get(ResourceKind::Water), fx(5.0));
        assert_eq!(v.total(), fx(5.0));
    }

    #[test]
    fn add_then_subtract_is_identity() {
        let a = sample();
        let b = ResourceVector::of(ResourceKind::Oil, fx(7.75));
        assert_eq!(a.add(&b).subtract(&b), a);
    }

    #[test]
    fn double_negation_is_identity() {
        assert_eq!(sample().negate().negate(), sample());
    }

    #[test]
    fn scaling_by_two_then_half_is_exact() {
        let a = sample();
        assert_eq!(a.multiply(fx(2.0)).multiply(fx(0.5)), a);
    }

    #[test]
    fn component_wise_multiply() {
        let a = sample();
        let mask = ResourceVector::of(ResourceKind::Electricity, fx(2.0));
        assert_eq!(
            a.multiply_vector(&mask),
            ResourceVector::of(ResourceKind::Electricity, fx(-6.0))
        );
    }

    #[test]
    fn project_keeps_single_kind() {
        let p = sample().project(ResourceKind::Population);
        assert_eq!(p, ResourceVector::of(ResourceKind::Population, fx(10.0)));
    }

    #[test]
    fn swap_exchanges_two_slots() {
        let s = sample().swap(ResourceKind::Reservoir, ResourceKind::Water);
        assert_eq!(s.get(ResourceKind::Reservoir), fx(2.0));
        assert_eq!(s.get(ResourceKind::Water), fx(1.0));
        assert_eq!(s.get(ResourceKind::Oil), fx(4.5));
    }

    #[test]
    fn is_zero_respects_epsilon() {
        let tiny = ResourceVector::of(ResourceKind::Water, Fixed64::DELTA);
        assert!(tiny.is_zero(&NumericContext::default()));
        assert!(!tiny.is_zero(&NumericContext::new(Fixed64::ZERO)));
        assert!(!sample().is_zero(&NumericContext::default()));
        assert!(ResourceVector::ZERO.is_zero(&NumericContext::new(Fixed64::ZERO)));
    }

    #[test]
    fn from_f64s_rejects_unrepresentable_values() {
        assert_eq!(
            ResourceVector::from_f64s(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0e9]).unwrap_err(),
            ResourceError::OutOfRange("5000000000".to_string())
        );
        assert!(matches!(
            ResourceVector::from_f64s(&[f64::NAN; 7]),
            Err(ResourceError::OutOfRange(_))
        ));
    }

    #[test]
    fn arithmetic_saturates_instead_of_overflowing() {
        let big = ResourceVector::of(ResourceKind::Currency, Fixed64::MAX);
        assert_eq!(big.add(&big).get(ResourceKind::Currency), Fixed64::MAX);
        assert_eq!(big.multiply(fx(3.0)).get(ResourceKind::Currency), Fixed64::MAX);
        assert_eq!(
            big.negate().subtract(&big).get(ResourceKind::Currency),
            Fixed64::MIN
        );
        let min = ResourceVector::of(ResourceKind::Currency, Fixed64::MIN);
        assert_eq!(min.magnitude(), Fixed64::MAX);
    }

    #[test]
    fn checked_divide_by_zero_is_none() {
        assert_eq!(sample().checked_divide(Fixed64::ZERO), None);
        assert_eq!(sample().multiply(fx(4.0)).checked_divide(fx(4.0)), Some(sample()));
    }

    #[test]
    fn parses_bracketed_list() {
        let v: ResourceVector = "[1, 2, -3, 4.5, 0, 10, -0.25]".parse().unwrap();
        assert_eq!(v, sample());
    }

    #[test]
    fn parse_reports_bad_number_and_dimension() {
        assert_eq!(
            "1, x, 0".parse::<ResourceVector>().unwrap_err(),
            ResourceError::Parse("x".to_string())
        );
        assert!(matches!(
            "1, 2".parse::<ResourceVector>(),
            Err(ResourceError::DimensionMismatch { actual: 2, .. })
        ));
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Electricity".parse::<ResourceKind>(), Ok(ResourceKind::Electricity));
        assert!("steam".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn iterator_sum_matches_fold() {
        let parts = vec![sample(), sample().negate(), ResourceVector::of(ResourceKind::Oil, fx(1.0))];
        let total: ResourceVector = parts.into_iter().sum();
        assert_eq!(total, ResourceVector::of(ResourceKind::Oil, fx(1.0)));
    }
}
