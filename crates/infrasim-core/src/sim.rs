//! Run configuration, lifecycle phase, and report types.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, NumericContext, Ticks};
use crate::resource::ResourceVector;
use crate::validation::{VerificationReport, Violation};

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// How long to run, how finely to step, and how hard to negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Total simulated time, in ticks.
    pub duration: Ticks,
    /// Ticks per committed step. Must be non-zero.
    pub time_step: Ticks,
    /// Negotiation rounds before each commit. Transport links need two.
    pub rounds_per_step: u32,
    /// Tolerances used by verification.
    pub numeric: NumericContext,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            duration: 10,
            time_step: 1,
            rounds_per_step: 2,
            numeric: NumericContext::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Lifecycle of a single simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimPhase {
    NotStarted,
    Running,
    Completed,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one committed step.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Clock value the step started at.
    pub time: Ticks,
    /// Ticks the step covered.
    pub time_step: Ticks,
    pub verification: VerificationReport,
}

/// Outcome of a full run. Verification failures never stop a run; they are
/// collected here with the time of the step they occurred in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub steps_run: u64,
    pub start_time: Ticks,
    pub end_time: Ticks,
    pub violations: Vec<(Ticks, Violation)>,
}

impl RunReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of simulation state for comparing runs.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn write_vector(&mut self, v: &ResourceVector) {
        for &value in v.values() {
            self.write_fixed64(value);
        }
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64;
    use crate::resource::ResourceKind;

    #[test]
    fn default_config_negotiates_twice_per_tick() {
        let config = SimConfig::default();
        assert_eq!(config.time_step, 1);
        assert_eq!(config.rounds_per_step, 2);
        assert_eq!(config.numeric, NumericContext::default());
    }

    #[test]
    fn state_hash_deterministic() {
        let v = ResourceVector::of(ResourceKind::Oil, f64_to_fixed64(2.5));
        let mut h1 = StateHash::new();
        h1.write_u64(42);
        h1.write_vector(&v);

        let mut h2 = StateHash::new();
        h2.write_u64(42);
        h2.write_vector(&v);

        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn state_hash_differs_for_different_vectors() {
        let mut h1 = StateHash::new();
        h1.write_vector(&ResourceVector::of(ResourceKind::Oil, f64_to_fixed64(1.0)));

        let mut h2 = StateHash::new();
        h2.write_vector(&ResourceVector::of(ResourceKind::Water, f64_to_fixed64(1.0)));

        assert_ne!(h1.finish(), h2.finish());
    }

    #[test]
    fn run_report_consistency() {
        assert!(RunReport::default().is_consistent());
    }
}
