//! Jacobi-preconditioned conjugate gradients across ranks.
//!
//! ```text
//! r₀ = b − A x₀,  z₀ = M⁻¹ r₀,  p₀ = z₀
//! αₖ = (rₖ·zₖ) / (pₖ·A pₖ)
//! xₖ₊₁ = xₖ + αₖ pₖ,   rₖ₊₁ = rₖ − αₖ A pₖ
//! stop when ‖rₖ₊₁‖ ≤ max(rtol·‖b‖, atol)
//! βₖ = (rₖ₊₁·zₖ₊₁) / (rₖ·zₖ),   pₖ₊₁ = zₖ₊₁ + βₖ pₖ
//! ```
//!
//! `M = diag(A)`. Dot products are local sums followed by a global
//! reduction; the operator exchanges halos of its input itself.

use swell_comm::{RankContext, Transport};
use swell_core::{CommError, ConfigError, Field, SolverError};

use crate::elliptic::{EllipticSolver, SolveReport};

/// Convergence controls for [`ConjugateGradientSolver`].
#[derive(Clone, Debug, PartialEq)]
pub struct PcgConfig {
    /// Tolerance relative to the right-hand-side norm.
    pub rtol: f64,
    /// Absolute residual tolerance.
    pub atol: f64,
    /// Iteration budget.
    pub max_iter: usize,
}

impl Default for PcgConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            atol: 1e-14,
            max_iter: 1000,
        }
    }
}

impl PcgConfig {
    /// Check that tolerances and budget are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rtol.is_finite() && self.rtol >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "rtol",
                reason: format!("must be finite and non-negative, got {}", self.rtol),
            });
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "atol",
                reason: format!("must be finite and non-negative, got {}", self.atol),
            });
        }
        if self.rtol == 0.0 && self.atol == 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "rtol",
                reason: "rtol and atol cannot both be zero".into(),
            });
        }
        if self.max_iter == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_iter",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// A symmetric positive-definite operator on one field layout.
pub trait LinearOperator {
    /// `out ← A x` over interior cells. Halos of `x` are exchanged first,
    /// hence the mutable borrow.
    fn apply<T: Transport>(
        &self,
        ctx: &RankContext<T>,
        x: &mut Field,
        out: &mut Field,
    ) -> Result<(), CommError>;

    /// Diagonal entry of `A` at a local interior cell. Must be positive.
    fn diagonal(&self, index: [usize; 3]) -> f64;
}

struct Workspace {
    r: Field,
    z: Field,
    p: Field,
    ap: Field,
}

impl Workspace {
    fn for_layout(template: &Field) -> Self {
        Self {
            r: template.zeros_like("pcg_r"),
            z: template.zeros_like("pcg_z"),
            p: template.zeros_like("pcg_p"),
            ap: template.zeros_like("pcg_ap"),
        }
    }

    fn fits(&self, f: &Field) -> bool {
        self.r.same_layout(f)
    }
}

/// Conjugate gradients with a Jacobi preconditioner.
///
/// Workspace fields are allocated on the first solve and reused while the
/// layout stays the same.
pub struct ConjugateGradientSolver<A> {
    operator: A,
    config: PcgConfig,
    workspace: Option<Workspace>,
}

impl<A: LinearOperator> ConjugateGradientSolver<A> {
    /// Build a solver for `operator`.
    pub fn new(operator: A, config: PcgConfig) -> Self {
        Self {
            operator,
            config,
            workspace: None,
        }
    }

    /// The operator being inverted.
    pub fn operator(&self) -> &A {
        &self.operator
    }

    /// Mutable access to the operator, e.g. to update its time step.
    pub fn operator_mut(&mut self) -> &mut A {
        &mut self.operator
    }

    /// Convergence controls.
    pub fn config(&self) -> &PcgConfig {
        &self.config
    }
}

fn local_dot(a: &Field, b: &Field) -> f64 {
    let mut s = 0.0;
    a.for_each_interior(|[i, j, k], v| s += v * b.get(i as isize, j as isize, k as isize));
    s
}

fn precondition<A: LinearOperator>(op: &A, r: &Field, z: &mut Field) {
    z.map_interior(|idx, _| {
        r.get(idx[0] as isize, idx[1] as isize, idx[2] as isize) / op.diagonal(idx)
    });
}

impl<A: LinearOperator> EllipticSolver for ConjugateGradientSolver<A> {
    fn solve<T: Transport>(
        &mut self,
        ctx: &RankContext<T>,
        rhs: &Field,
        x: &mut Field,
    ) -> Result<SolveReport, SolverError> {
        if !rhs.same_layout(x) {
            return Err(SolverError::ShapeMismatch {
                expected: rhs.size(),
                actual: x.size(),
            });
        }
        if !self.workspace.as_ref().is_some_and(|w| w.fits(rhs)) {
            self.workspace = None;
        }
        let ws = self
            .workspace
            .get_or_insert_with(|| Workspace::for_layout(rhs));
        let op = &self.operator;

        // r = b - A x
        op.apply(ctx, x, &mut ws.ap)?;
        ws.r.map_interior(|[i, j, k], _| {
            let (i, j, k) = (i as isize, j as isize, k as isize);
            rhs.get(i, j, k) - ws.ap.get(i, j, k)
        });
        let norms = ctx.all_reduce_sum_vec(&[local_dot(rhs, rhs), local_dot(&ws.r, &ws.r)])?;
        let target = (self.config.rtol * norms[0].sqrt()).max(self.config.atol);
        let mut residual = norms[1].sqrt();
        if residual <= target {
            return Ok(SolveReport {
                iterations: 0,
                residual,
            });
        }

        precondition(op, &ws.r, &mut ws.z);
        ws.p.copy_interior_from(&ws.z);
        let mut rz = ctx.all_reduce_sum(local_dot(&ws.r, &ws.z))?;

        for iteration in 1..=self.config.max_iter {
            op.apply(ctx, &mut ws.p, &mut ws.ap)?;
            let pap = ctx.all_reduce_sum(local_dot(&ws.p, &ws.ap))?;
            if !(pap > 0.0) {
                tracing::warn!(iteration, pap, "conjugate gradient breakdown");
                return Err(SolverError::Breakdown { iteration });
            }
            let alpha = rz / pap;
            let (p, ap) = (&ws.p, &ws.ap);
            x.map_interior(|[i, j, k], v| v + alpha * p.get(i as isize, j as isize, k as isize));
            ws.r.map_interior(|[i, j, k], v| v - alpha * ap.get(i as isize, j as isize, k as isize));

            precondition(op, &ws.r, &mut ws.z);
            let sums = ctx.all_reduce_sum_vec(&[local_dot(&ws.r, &ws.r), local_dot(&ws.r, &ws.z)])?;
            residual = sums[0].sqrt();
            if residual <= target {
                tracing::debug!(iterations = iteration, residual, "conjugate gradient converged");
                return Ok(SolveReport {
                    iterations: iteration,
                    residual,
                });
            }
            let beta = sums[1] / rz;
            rz = sums[1];
            let z = &ws.z;
            ws.p.map_interior(|[i, j, k], v| z.get(i as isize, j as isize, k as isize) + beta * v);
        }

        tracing::warn!(
            iterations = self.config.max_iter,
            residual,
            tolerance = target,
            "conjugate gradient did not converge"
        );
        Err(SolverError::NotConverged {
            iterations: self.config.max_iter,
            residual,
            tolerance: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swell_comm::LocalTransport;
    use swell_core::{Grid, Topology};

    /// `A = a·I`, trivially SPD.
    struct Scaled(f64);

    impl LinearOperator for Scaled {
        fn apply<T: Transport>(
            &self,
            _ctx: &RankContext<T>,
            x: &mut Field,
            out: &mut Field,
        ) -> Result<(), CommError> {
            let x: &Field = x;
            out.map_interior(|[i, j, k], _| self.0 * x.get(i as isize, j as isize, k as isize));
            Ok(())
        }

        fn diagonal(&self, _index: [usize; 3]) -> f64 {
            self.0
        }
    }

    /// Negative definite, so CG must report a breakdown.
    struct Negative;

    impl LinearOperator for Negative {
        fn apply<T: Transport>(
            &self,
            _ctx: &RankContext<T>,
            x: &mut Field,
            out: &mut Field,
        ) -> Result<(), CommError> {
            let x: &Field = x;
            out.map_interior(|[i, j, k], _| -x.get(i as isize, j as isize, k as isize));
            Ok(())
        }

        fn diagonal(&self, _index: [usize; 3]) -> f64 {
            1.0
        }
    }

    fn setup() -> (RankContext<LocalTransport>, Grid) {
        let g = Grid::new(
            [4, 4, 1],
            [Topology::Periodic, Topology::Periodic, Topology::Flat],
            1,
            [1.0, 1.0, 1.0],
        )
        .unwrap();
        (RankContext::new(LocalTransport::single(), [1, 1, 1], &g).unwrap(), g)
    }

    #[test]
    fn diagonal_system_converges_in_one_iteration() {
        let (ctx, g) = setup();
        let mut rhs = Field::new("b", &g);
        rhs.map_interior(|[i, j, _], _| (i + 4 * j) as f64);
        let mut x = Field::new("x", &g);
        let mut solver = ConjugateGradientSolver::new(Scaled(2.0), PcgConfig::default());
        let report = solver.solve(&ctx, &rhs, &mut x).unwrap();
        assert_eq!(report.iterations, 1);
        x.for_each_interior(|[i, j, _], v| assert!((v - (i + 4 * j) as f64 / 2.0).abs() < 1e-12));
    }

    #[test]
    fn exact_initial_guess_needs_no_iterations() {
        let (ctx, g) = setup();
        let mut rhs = Field::new("b", &g);
        rhs.fill(3.0);
        let mut x = Field::new("x", &g);
        x.fill(1.0);
        let mut solver = ConjugateGradientSolver::new(Scaled(3.0), PcgConfig::default());
        assert_eq!(solver.solve(&ctx, &rhs, &mut x).unwrap().iterations, 0);
    }

    #[test]
    fn indefinite_operator_breaks_down() {
        let (ctx, g) = setup();
        let mut rhs = Field::new("b", &g);
        rhs.fill(1.0);
        let mut x = Field::new("x", &g);
        let mut solver = ConjugateGradientSolver::new(Negative, PcgConfig::default());
        assert_eq!(
            solver.solve(&ctx, &rhs, &mut x).unwrap_err(),
            SolverError::Breakdown { iteration: 1 }
        );
    }

    #[test]
    fn config_validation() {
        assert!(PcgConfig::default().validate().is_ok());
        let bad = PcgConfig {
            max_iter: 0,
            ..PcgConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidParameter { name: "max_iter", .. })
        ));
    }
}
