//! Free-surface height and the two ways of advancing it.
//!
//! Both variants share [`FreeSurfaceState`]: the height `η` on the
//! horizontal grid and the barotropic transports
//!
//! ```text
//! U = Σₖ u Δy Δz,   V = Σₖ v Δx Δz
//! ```
//!
//! which are volume fluxes through the west and south faces of each
//! water column. Column volume changes by the net inflow, so
//! `Az ∂η/∂t = −(δx U + δy V)`.
//!
//! - [`FreeSurface::Explicit`] advances `η` by AB2 with its own tendency
//!   pair `Gη = −(δx U + δy V) / Az`.
//! - [`FreeSurface::Implicit`] solves
//!   `Az η/Δt − gHΔt[(Δy/Δx)δx² + (Δx/Δy)δy²]η = Az ηⁿ/Δt − (δx U* + δy V*)`
//!   for the new height, after which velocities are corrected by
//!   `u ← u − gΔt δxη/Δx`, `v ← v − gΔt δyη/Δy`.

use swell_comm::{
    exchange_halos, exchange_halos_many, ExchangeStats, FieldBoundaryConditions, RankContext,
    Transport,
};
use swell_core::{ConfigError, Field, Grid, Location, StepError};
use swell_solver::{
    ConjugateGradientSolver, EllipticSolver, ImplicitFreeSurfaceOperator, SolveReport,
    SpectralPoissonSolver,
};

use crate::ab2::{ab2_update, Ab2Coefficients};
use crate::config::{FreeSurfaceConfig, ImplicitSolverMethod, ETA};
use crate::tendency::TendencyState;

/// Staggering of the zonal velocity and transport.
pub const U_LOCATION: [Location; 3] = [Location::Face, Location::Center, Location::Center];
/// Staggering of the meridional velocity and transport.
pub const V_LOCATION: [Location; 3] = [Location::Center, Location::Face, Location::Center];

/// The 3-D velocity components handed to the free-surface stage.
pub struct Velocities<'a> {
    /// Zonal velocity.
    pub u: &'a mut Field,
    /// Its regularized boundary conditions.
    pub u_bcs: &'a FieldBoundaryConditions,
    /// Meridional velocity.
    pub v: &'a mut Field,
    /// Its regularized boundary conditions.
    pub v_bcs: &'a FieldBoundaryConditions,
}

// ── FreeSurfaceState ───────────────────────────────────────────────

/// `η`, the barotropic transports, and their boundary conditions.
///
/// `η` persists across steps; the transports are recomputed each time
/// they are needed.
#[derive(Clone, Debug)]
pub struct FreeSurfaceState {
    grid: Grid,
    eta: Field,
    eta_bcs: FieldBoundaryConditions,
    transport_u: Field,
    transport_v: Field,
    transport_bcs: [FieldBoundaryConditions; 2],
}

impl FreeSurfaceState {
    /// Zero height on the local horizontal `grid`. All boundary
    /// conditions must already be regularized.
    pub fn new(
        grid: Grid,
        eta_bcs: FieldBoundaryConditions,
        transport_bcs: [FieldBoundaryConditions; 2],
    ) -> Self {
        Self {
            eta: Field::new(ETA, &grid),
            transport_u: Field::with_location("U", &grid, U_LOCATION),
            transport_v: Field::with_location("V", &grid, V_LOCATION),
            grid,
            eta_bcs,
            transport_bcs,
        }
    }

    /// Free-surface height.
    pub fn eta(&self) -> &Field {
        &self.eta
    }

    /// Mutable height, for initialization.
    pub fn eta_mut(&mut self) -> &mut Field {
        &mut self.eta
    }

    /// Boundary conditions of `η`.
    pub fn eta_bcs(&self) -> &FieldBoundaryConditions {
        &self.eta_bcs
    }

    /// `η` together with its conditions, for batched exchanges.
    pub(crate) fn eta_with_bcs(&mut self) -> (&mut Field, &FieldBoundaryConditions) {
        (&mut self.eta, &self.eta_bcs)
    }

    /// Most recently computed transports `(U, V)`.
    pub fn transports(&self) -> (&Field, &Field) {
        (&self.transport_u, &self.transport_v)
    }

    /// The horizontal grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Column-integrate `u`, `v` into `(U, V)` and exchange their halos.
    ///
    /// Velocity halos must be current.
    fn update_transports<T: Transport>(
        &mut self,
        ctx: &RankContext<T>,
        u: &Field,
        v: &Field,
    ) -> Result<ExchangeStats, StepError> {
        let [dx, dy, dz] = ctx.grid().spacing();
        let nz = u.size()[2];
        column_sum(u, nz, dy * dz, &mut self.transport_u);
        column_sum(v, nz, dx * dz, &mut self.transport_v);
        let [bu, bv] = &self.transport_bcs;
        let stats = exchange_halos_many(
            &mut [(&mut self.transport_u, bu), (&mut self.transport_v, bv)],
            ctx,
        )?;
        Ok(stats)
    }

    /// `out ← δx U + δy V` over the interior, on active horizontal axes.
    fn flux_divergence(&self, out: &mut Field) {
        let (tu, tv) = (&self.transport_u, &self.transport_v);
        let halo = self.grid.halo();
        out.map_interior(|[i, j, _], _| {
            let (i, j) = (i as isize, j as isize);
            let mut d = 0.0;
            if halo[0] > 0 {
                d += tu.get(i + 1, j, 0) - tu.get(i, j, 0);
            }
            if halo[1] > 0 {
                d += tv.get(i, j + 1, 0) - tv.get(i, j, 0);
            }
            d
        });
    }
}

fn column_sum(velocity: &Field, nz: usize, face_area: f64, out: &mut Field) {
    out.map_interior(|[i, j, _], _| {
        let (i, j) = (i as isize, j as isize);
        (0..nz as isize).map(|k| velocity.get(i, j, k)).sum::<f64>() * face_area
    });
}

// ── Variants ───────────────────────────────────────────────────────

/// AB2 on `η` with its own tendency pair.
pub struct ExplicitFreeSurface {
    state: FreeSurfaceState,
    gravity: f64,
    tendency: TendencyState,
}

enum ImplicitSolver {
    ConjugateGradient(Box<ConjugateGradientSolver<ImplicitFreeSurfaceOperator>>),
    Spectral(Box<SpectralPoissonSolver>),
}

/// Elliptic solve for `η` followed by a barotropic velocity correction.
pub struct ImplicitFreeSurface {
    state: FreeSurfaceState,
    gravity: f64,
    solver: ImplicitSolver,
    rhs: Field,
    x: Field,
}

impl ImplicitFreeSurface {
    fn solve<T: Transport>(
        &mut self,
        ctx: &RankContext<T>,
        dt: f64,
    ) -> Result<SolveReport, StepError> {
        let grid = &self.state.grid;
        let area = grid.cell_area();
        let gh_dt = self.gravity * grid.depth() * dt;
        self.x.copy_interior_from(&self.state.eta);
        let report = match &mut self.solver {
            ImplicitSolver::ConjugateGradient(cg) => {
                cg.operator_mut().set_time_step(dt);
                cg.operator().subtract_boundary_forcing(ctx, &mut self.rhs);
                cg.solve(ctx, &self.rhs, &mut self.x)?
            }
            ImplicitSolver::Spectral(fft) => {
                // A = −Az·gHΔt (∇² − σ) with σ = 1/(gHΔt²).
                fft.set_shift(1.0 / (gh_dt * dt));
                let scale = -area * gh_dt;
                self.rhs.map_interior(|_, v| v / scale);
                fft.solve(ctx, &self.rhs, &mut self.x)?
            }
        };
        Ok(report)
    }
}

// ── FreeSurface ────────────────────────────────────────────────────

/// The free-surface treatment, dispatched once per stage.
pub enum FreeSurface {
    /// See [`ExplicitFreeSurface`].
    Explicit(ExplicitFreeSurface),
    /// See [`ImplicitFreeSurface`].
    Implicit(ImplicitFreeSurface),
}

impl FreeSurface {
    /// Build the configured variant around `state`.
    pub fn new<T: Transport>(
        config: &FreeSurfaceConfig,
        ctx: &RankContext<T>,
        state: FreeSurfaceState,
    ) -> Result<Self, ConfigError> {
        Ok(match config {
            FreeSurfaceConfig::Explicit { gravity } => Self::Explicit(ExplicitFreeSurface {
                tendency: TendencyState::for_field(&state.eta),
                state,
                gravity: *gravity,
            }),
            FreeSurfaceConfig::Implicit { gravity, solver } => {
                let grid = state.grid.clone();
                let solver = match solver {
                    ImplicitSolverMethod::ConjugateGradient(pcg) => {
                        let op = ImplicitFreeSurfaceOperator::new(
                            grid.clone(),
                            state.eta_bcs.clone(),
                            *gravity,
                        );
                        ImplicitSolver::ConjugateGradient(Box::new(ConjugateGradientSolver::new(
                            op,
                            pcg.clone(),
                        )))
                    }
                    ImplicitSolverMethod::Spectral => ImplicitSolver::Spectral(Box::new(
                        SpectralPoissonSolver::new(ctx, &grid, 0.0)?,
                    )),
                };
                Self::Implicit(ImplicitFreeSurface {
                    rhs: state.eta.zeros_like("eta_rhs"),
                    x: state.eta.zeros_like("eta_x"),
                    state,
                    gravity: *gravity,
                    solver,
                })
            }
        })
    }

    /// Shared state of either variant.
    pub fn state(&self) -> &FreeSurfaceState {
        match self {
            Self::Explicit(e) => &e.state,
            Self::Implicit(i) => &i.state,
        }
    }

    /// Mutable shared state.
    pub fn state_mut(&mut self) -> &mut FreeSurfaceState {
        match self {
            Self::Explicit(e) => &mut e.state,
            Self::Implicit(i) => &mut i.state,
        }
    }

    /// Gravitational acceleration.
    pub fn gravity(&self) -> f64 {
        match self {
            Self::Explicit(e) => e.gravity,
            Self::Implicit(i) => i.gravity,
        }
    }

    /// Whether `η` is obtained by an elliptic solve.
    pub fn is_implicit(&self) -> bool {
        matches!(self, Self::Implicit(_))
    }

    /// Tendency stage. Explicit: rotate and recompute `Gη` from the
    /// current (halo-valid) velocities. Implicit: nothing to do.
    pub fn compute_tendency<T: Transport>(
        &mut self,
        ctx: &RankContext<T>,
        u: &Field,
        v: &Field,
    ) -> Result<ExchangeStats, StepError> {
        let Self::Explicit(e) = self else {
            return Ok(ExchangeStats::default());
        };
        let stats = e.state.update_transports(ctx, u, v)?;
        e.tendency.rotate();
        let area = e.state.grid.cell_area();
        let g = e.tendency.current_mut();
        e.state.flux_divergence(g);
        g.map_interior(|_, d| -d / area);
        Ok(stats)
    }

    /// Advance `η` by one step.
    ///
    /// Explicit: AB2 on `η`. Implicit: exchange velocity halos, build
    /// transports and the right-hand side, solve, and store the new `η`
    /// with current halos. Velocities are not corrected here; see
    /// [`correct_velocities`](Self::correct_velocities).
    pub fn step<T: Transport>(
        &mut self,
        ctx: &RankContext<T>,
        velocities: Velocities<'_>,
        dt: f64,
        coefficients: Ab2Coefficients,
    ) -> Result<(Option<SolveReport>, ExchangeStats), StepError> {
        match self {
            Self::Explicit(e) => {
                ab2_update(&mut e.state.eta, &e.tendency, dt, coefficients);
                Ok((None, ExchangeStats::default()))
            }
            Self::Implicit(imp) => {
                let Velocities { u, u_bcs, v, v_bcs } = velocities;
                let mut stats =
                    exchange_halos_many(&mut [(&mut *u, u_bcs), (&mut *v, v_bcs)], ctx)?;
                stats += imp.state.update_transports(ctx, u, v)?;

                let area = imp.state.grid.cell_area();
                imp.state.flux_divergence(&mut imp.rhs);
                let eta = &imp.state.eta;
                imp.rhs.map_interior(|[i, j, _], d| {
                    area * eta.get(i as isize, j as isize, 0) / dt - d
                });

                let report = imp.solve(ctx, dt)?;
                imp.state.eta.copy_interior_from(&imp.x);
                stats += exchange_halos(&mut imp.state.eta, &imp.state.eta_bcs, ctx)?;
                tracing::debug!(
                    iterations = report.iterations,
                    residual = report.residual,
                    "free surface solved"
                );
                Ok((Some(report), stats))
            }
        }
    }

    /// Barotropic correction `u ← u − gΔt δxη/Δx`, `v ← v − gΔt δyη/Δy`
    /// over interior faces. No-op for the explicit variant, whose
    /// pressure gradient enters through the tendencies.
    ///
    /// `η` halos must be current, which [`step`](Self::step) guarantees.
    pub fn correct_velocities(&self, u: &mut Field, v: &mut Field, dt: f64) {
        let Self::Implicit(imp) = self else {
            return;
        };
        let eta = &imp.state.eta;
        let halo = imp.state.grid.halo();
        let [dx, dy, _] = imp.state.grid.spacing();
        let g_dt = imp.gravity * dt;
        if halo[0] > 0 {
            u.map_interior(|[i, j, _], val| {
                let (i, j) = (i as isize, j as isize);
                val - g_dt * (eta.get(i, j, 0) - eta.get(i - 1, j, 0)) / dx
            });
        }
        if halo[1] > 0 {
            v.map_interior(|[i, j, _], val| {
                let (i, j) = (i as isize, j as isize);
                val - g_dt * (eta.get(i, j, 0) - eta.get(i, j - 1, 0)) / dy
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swell_comm::LocalTransport;
    use swell_core::Topology;

    fn setup(
        config: FreeSurfaceConfig,
    ) -> (RankContext<LocalTransport>, FreeSurface, Field, Field, [FieldBoundaryConditions; 2]) {
        let global = Grid::new(
            [8, 6, 3],
            [Topology::Periodic, Topology::Periodic, Topology::Bounded],
            1,
            [100.0, 50.0, 10.0],
        )
        .unwrap();
        let ctx = RankContext::new(LocalTransport::single(), [1, 1, 1], &global).unwrap();
        let t = ctx.grid().topologies();
        let h = ctx.grid().horizontal();
        let ht = h.topologies();
        let reg = |name: &str, topo, loc| {
            FieldBoundaryConditions::default_for(topo, loc)
                .regularize(name, topo, ctx.connectivity())
                .unwrap()
        };
        let state = FreeSurfaceState::new(
            h.clone(),
            reg("eta", ht, [Location::Center; 3]),
            [reg("U", ht, U_LOCATION), reg("V", ht, V_LOCATION)],
        );
        let vel_bcs = [reg("u", t, U_LOCATION), reg("v", t, V_LOCATION)];
        let fs = FreeSurface::new(&config, &ctx, state).unwrap();
        let u = Field::with_location("u", ctx.grid(), U_LOCATION);
        let v = Field::with_location("v", ctx.grid(), V_LOCATION);
        (ctx, fs, u, v, vel_bcs)
    }

    #[test]
    fn transports_integrate_columns() {
        let (ctx, mut fs, mut u, mut v, [bu, bv]) =
            setup(FreeSurfaceConfig::Explicit { gravity: 9.81 });
        u.map_interior(|[i, _, k], _| (i + k) as f64);
        v.fill(2.0);
        exchange_halos_many(&mut [(&mut u, &bu), (&mut v, &bv)], &ctx).unwrap();
        fs.compute_tendency(&ctx, &u, &v).unwrap();
        let (tu, tv) = fs.state().transports();
        // Σₖ (i + k) Δy Δz = (3i + 3) · 500
        assert_eq!(tu.get(2, 1, 0), 9.0 * 500.0);
        assert_eq!(tv.get(0, 0, 0), 6.0 * 1000.0);
    }

    #[test]
    fn explicit_tendency_is_negative_flux_divergence() {
        let (ctx, mut fs, mut u, mut v, [bu, bv]) =
            setup(FreeSurfaceConfig::Explicit { gravity: 9.81 });
        // Converging flow into column i = 3 from its west face only.
        u.map_interior(|[i, _, _], _| if i == 3 { 1.0 } else { 0.0 });
        exchange_halos_many(&mut [(&mut u, &bu), (&mut v, &bv)], &ctx).unwrap();
        fs.compute_tendency(&ctx, &u, &v).unwrap();
        let FreeSurface::Explicit(e) = &fs else {
            panic!("explicit variant expected");
        };
        let g = e.tendency.current();
        let inflow = 3.0 * 50.0 * 10.0 / (100.0 * 50.0);
        assert!((g.get(3, 0, 0) - inflow).abs() < 1e-12);
        assert!((g.get(2, 0, 0) + inflow).abs() < 1e-12);
        assert!(g.interior_sum().abs() < 1e-12);
    }

    #[test]
    fn implicit_step_at_rest_stays_at_rest() {
        let (ctx, mut fs, mut u, mut v, [bu, bv]) = setup(FreeSurfaceConfig::default());
        assert!(fs.is_implicit());
        let vel = Velocities {
            u: &mut u,
            u_bcs: &bu,
            v: &mut v,
            v_bcs: &bv,
        };
        let (report, _) = fs.step(&ctx, vel, 30.0, Ab2Coefficients::new(0.1)).unwrap();
        assert_eq!(report.map(|r| r.iterations), Some(0));
        assert_eq!(fs.state().eta().interior_sum(), 0.0);
    }

    #[test]
    fn correction_follows_height_gradient() {
        let (_ctx, mut fs, mut u, mut v, _) = setup(FreeSurfaceConfig::default());
        let eta = fs.state_mut().eta_mut();
        eta.set(3, 2, 0, 1.0);
        fs.correct_velocities(&mut u, &mut v, 2.0);
        // West face of (3, 2) sees η rise: u = −gΔt (1 − 0)/Δx.
        assert!((u.get(3, 2, 1) + 9.81 * 2.0 / 100.0).abs() < 1e-12);
        assert!((u.get(4, 2, 0) - 9.81 * 2.0 / 100.0).abs() < 1e-12);
        assert!((v.get(3, 3, 2) - 9.81 * 2.0 / 50.0).abs() < 1e-12);
        assert_eq!(u.get(0, 0, 0), 0.0);
    }
}
