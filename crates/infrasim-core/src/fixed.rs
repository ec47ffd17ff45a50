use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Every resource quantity in the kernel is a `Fixed64`. Addition and
/// subtraction are exact, so quantities moved between elements cancel
/// bit-for-bit.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
///
/// Panics if `v` is not finite or lies outside the Q32.32 range; loaders
/// should use [`checked_f64_to_fixed64`].
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert an f64 to Fixed64, or `None` if it is not finite or does not fit
/// in Q32.32 (roughly ±2.1e9).
#[inline]
pub fn checked_f64_to_fixed64(v: f64) -> Option<Fixed64> {
    Fixed64::checked_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Convert an elapsed duration in ticks to a Fixed64 scale factor.
#[inline]
pub fn ticks_to_fixed64(duration: Ticks) -> Fixed64 {
    Fixed64::saturating_from_num(duration)
}

/// Checked division for Fixed64 that returns None on zero divisor.
#[inline]
pub fn checked_div_64(a: Fixed64, b: Fixed64) -> Option<Fixed64> {
    a.checked_div(b)
}

// ---------------------------------------------------------------------------
// Numeric context
// ---------------------------------------------------------------------------

/// Tolerance settings shared by every vector comparison in one simulation.
///
/// Passed explicitly to zero/approximate-equality checks so that two
/// simulations with different tolerances can coexist in one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericContext {
    /// A component is treated as zero when its absolute value is at most
    /// this much.
    pub epsilon: Fixed64,
}

impl NumericContext {
    /// One unit in the last place of Q32.32, the tightest non-zero tolerance.
    pub const DEFAULT_EPSILON: Fixed64 = Fixed64::DELTA;

    pub fn new(epsilon: Fixed64) -> Self {
        Self {
            epsilon: epsilon.saturating_abs(),
        }
    }

    /// Whether `v` lies within epsilon of zero.
    #[inline]
    pub fn is_negligible(&self, v: Fixed64) -> bool {
        v.saturating_abs() <= self.epsilon
    }
}

impl Default for NumericContext {
    fn default() -> Self {
        Self {
            epsilon: Self::DEFAULT_EPSILON,
        }
    }
}
