//! Seams to external collaborators: state access and tendency kernels.

use crate::error::TendencyError;
use crate::field::Field;
use crate::grid::Grid;

/// Read-only access to model state during a time step.
///
/// Implemented by the model's state view and by test mocks. `Sync` is
/// required because tendency kernels for different fields run
/// concurrently against the same view.
pub trait FieldSource: Sync {
    /// Look up a field by name (`"u"`, `"v"`, `"eta"`, tracer names).
    ///
    /// Returns `None` if the field does not exist.
    fn field(&self, name: &str) -> Option<&Field>;

    /// The local grid all fields live on.
    fn grid(&self) -> &Grid;

    /// Model time at the start of the current step, in seconds.
    fn time(&self) -> f64;
}

/// Computes the time tendency `Gⁿ` of one prognostic field.
///
/// Advection, diffusion, Coriolis, and forcing live behind this trait;
/// the integrator only combines the results.
///
/// # Contract
///
/// - `compute()` writes every interior cell of `out`. Halo cells of `out`
///   are ignored.
/// - It may be called concurrently for different fields, hence `Sync`.
/// - Fields read from `state` have up-to-date halos.
pub trait TendencyKernel: Send + Sync {
    /// Fill `out` with the tendency of field `name` given `state`.
    fn compute(
        &self,
        name: &str,
        state: &dyn FieldSource,
        out: &mut Field,
    ) -> Result<(), TendencyError>;
}
