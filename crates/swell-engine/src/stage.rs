//! Kernel stages: independent per-field tasks joined before returning.
//!
//! Each stage fans out one task per prognostic field on the rayon pool
//! and returns only when every task has finished, which is the barrier
//! between `tendencies → ab2 → free surface`. Stages never communicate;
//! all message passing happens on the calling thread between stages.

use rayon::prelude::*;
use swell_core::{Field, FieldSource, StepError, TendencyKernel};

use crate::ab2::{ab2_update, Ab2Coefficients};
use crate::tendency::TendencyState;

/// Rotate and recompute `Gⁿ` for every field, concurrently.
///
/// `names[i]` is the field whose tendency lives in `tendencies[i]`. If
/// any kernel fails, every rotation is undone so `Gⁿ` is what it was
/// before the call, and the first failure in field order is returned.
pub(crate) fn compute_tendencies(
    kernel: &dyn TendencyKernel,
    state: &dyn FieldSource,
    names: &[&str],
    tendencies: &mut [TendencyState],
) -> Result<(), StepError> {
    let results: Vec<Result<(), StepError>> = tendencies
        .par_iter_mut()
        .zip(names.par_iter())
        .map(|(t, name)| {
            t.rotate();
            kernel
                .compute(name, state, t.current_mut())
                .map_err(|reason| StepError::Tendency {
                    field: name.to_string(),
                    reason,
                })
        })
        .collect();
    if let Some(err) = results.iter().find_map(|r| r.as_ref().err()) {
        let err = err.clone();
        tendencies.par_iter_mut().for_each(TendencyState::unrotate);
        return Err(err);
    }
    Ok(())
}

/// AB2-update every field from its tendency pair, concurrently.
pub(crate) fn advance<'a>(
    fields: impl Iterator<Item = &'a mut Field>,
    tendencies: &[TendencyState],
    dt: f64,
    coefficients: Ab2Coefficients,
) {
    let fields: Vec<&mut Field> = fields.collect();
    fields
        .into_par_iter()
        .zip(tendencies.par_iter())
        .for_each(|(phi, t)| ab2_update(phi, t, dt, coefficients));
}
