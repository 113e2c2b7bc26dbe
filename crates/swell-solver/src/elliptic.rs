//! The common interface of the distributed elliptic solvers.

use swell_comm::{RankContext, Transport};
use swell_core::{Field, SolverError};

/// Outcome of a successful solve.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolveReport {
    /// Iterations performed. Direct solvers report 1.
    pub iterations: usize,
    /// Final residual norm, where the solver measures one.
    pub residual: f64,
}

/// Solves a linear elliptic problem `A x = rhs` across all ranks.
///
/// Every rank calls `solve` collectively with its local part of `rhs`.
/// On entry `x` holds the initial guess (iterative solvers) or is ignored
/// (direct solvers); on success its interior holds the solution. Halo
/// cells of `x` are unspecified afterwards.
///
/// Solvers own reusable workspace and are not reentrant.
pub trait EllipticSolver {
    /// Solve on this rank's subdomain.
    fn solve<T: Transport>(
        &mut self,
        ctx: &RankContext<T>,
        rhs: &Field,
        x: &mut Field,
    ) -> Result<SolveReport, SolverError>;
}
