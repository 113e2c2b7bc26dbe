//! Reusable tendency-kernel fixtures.
//!
//! - [`ZeroTendency`]: every field is steady.
//! - [`ConstantTendency`]: a fixed rate per field name.
//! - [`DecayTendency`]: `G = −λφ`, linear relaxation toward zero.
//! - [`FailingTendency`]: fails deterministically after N calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use swell_core::{Field, FieldSource, TendencyError, TendencyKernel};

/// Writes zero for every field.
pub struct ZeroTendency;

impl TendencyKernel for ZeroTendency {
    fn compute(
        &self,
        _name: &str,
        _state: &dyn FieldSource,
        out: &mut Field,
    ) -> Result<(), TendencyError> {
        out.map_interior(|_, _| 0.0);
        Ok(())
    }
}

/// Writes a constant rate per field. Fields without an entry get zero.
pub struct ConstantTendency {
    rates: HashMap<String, f64>,
}

impl ConstantTendency {
    pub fn new() -> Self {
        Self {
            rates: HashMap::new(),
        }
    }

    /// Set the rate for `name`.
    pub fn with_rate(mut self, name: impl Into<String>, rate: f64) -> Self {
        self.rates.insert(name.into(), rate);
        self
    }
}

impl Default for ConstantTendency {
    fn default() -> Self {
        Self::new()
    }
}

impl TendencyKernel for ConstantTendency {
    fn compute(
        &self,
        name: &str,
        _state: &dyn FieldSource,
        out: &mut Field,
    ) -> Result<(), TendencyError> {
        let rate = self.rates.get(name).copied().unwrap_or(0.0);
        out.map_interior(|_, _| rate);
        Ok(())
    }
}

/// `G = −λφ` read from the current state.
pub struct DecayTendency {
    pub rate: f64,
}

impl TendencyKernel for DecayTendency {
    fn compute(
        &self,
        name: &str,
        state: &dyn FieldSource,
        out: &mut Field,
    ) -> Result<(), TendencyError> {
        let phi = state.field(name).ok_or_else(|| TendencyError::UnknownField {
            name: name.to_string(),
        })?;
        out.map_interior(|[i, j, k], _| {
            -self.rate * phi.get(i as isize, j as isize, k as isize)
        });
        Ok(())
    }
}

/// Succeeds `fail_after` times, then fails on every later call.
///
/// The call counter is shared across fields, so with two fields and
/// `fail_after = 3` the second step fails.
pub struct FailingTendency {
    fail_after: usize,
    calls: AtomicUsize,
}

impl FailingTendency {
    pub fn new(fail_after: usize) -> Self {
        Self {
            fail_after,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `compute` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl TendencyKernel for FailingTendency {
    fn compute(
        &self,
        _name: &str,
        _state: &dyn FieldSource,
        out: &mut Field,
    ) -> Result<(), TendencyError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        if n >= self.fail_after {
            return Err(TendencyError::ExecutionFailed {
                reason: format!("failing after {} calls", self.fail_after),
            });
        }
        out.map_interior(|_, _| 0.0);
        Ok(())
    }
}
