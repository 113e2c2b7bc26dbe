//! Finite-volume stencils on halo-padded fields.
//!
//! All stencils act on axes with a nonzero halo; flat axes contribute
//! nothing. Public entry points exchange halos first, so callers only need
//! current interiors.

use swell_comm::{
    exchange_halos, exchange_halos_many, BoundaryCondition, ExchangeStats,
    FieldBoundaryConditions, RankContext, Transport,
};
use swell_core::{Axis, CommError, Face, Field, Grid};

use crate::pcg::LinearOperator;

fn step(idx: [usize; 3], axis: usize, by: isize) -> (isize, isize, isize) {
    let mut p = idx.map(|v| v as isize);
    p[axis] += by;
    (p[0], p[1], p[2])
}

fn second_difference(f: &Field, idx: [usize; 3], axis: usize) -> f64 {
    let (i, j, k) = step(idx, axis, 0);
    let (ip, jp, kp) = step(idx, axis, 1);
    let (im, jm, km) = step(idx, axis, -1);
    f.get(ip, jp, kp) - 2.0 * f.get(i, j, k) + f.get(im, jm, km)
}

fn active_axes(f: &Field) -> impl Iterator<Item = usize> + '_ {
    Axis::ALL
        .iter()
        .map(|a| a.index())
        .filter(move |&a| f.halo()[a] > 0)
}

/// `out ← ∇²field` with current halos.
pub(crate) fn apply_laplacian(field: &Field, spacing: [f64; 3], out: &mut Field) {
    out.map_interior(|idx, _| {
        active_axes(field)
            .map(|a| second_difference(field, idx, a) / (spacing[a] * spacing[a]))
            .sum()
    });
}

/// `out ← ∇²field` using the second-order centered Laplacian.
///
/// Halos of `field` are exchanged first under `bcs`.
pub fn laplacian<T: Transport>(
    ctx: &RankContext<T>,
    field: &mut Field,
    bcs: &FieldBoundaryConditions,
    out: &mut Field,
) -> Result<ExchangeStats, CommError> {
    let stats = exchange_halos(field, bcs, ctx)?;
    apply_laplacian(field, ctx.grid().spacing(), out);
    Ok(stats)
}

/// `out ← ∇·(c_x, c_y[, c_z])` for face-located velocity components.
///
/// `components[a]` is the component normal to axis `a`; component `a`
/// at index `i` sits on the low face of cell `i`, so the divergence of
/// cell `i` is `(c[i+1] - c[i]) / Δ`. Components beyond the number of
/// active axes of `out` are ignored.
pub fn divergence<T: Transport>(
    ctx: &RankContext<T>,
    components: &mut [(&mut Field, &FieldBoundaryConditions)],
    out: &mut Field,
) -> Result<ExchangeStats, CommError> {
    let stats = exchange_halos_many(components, ctx)?;
    let spacing = ctx.grid().spacing();
    let halo = out.halo();
    out.map_interior(|idx, _| {
        components
            .iter()
            .enumerate()
            .take(3)
            .filter(|(a, _)| halo[*a] > 0)
            .map(|(a, (c, _))| {
                let (i, j, k) = step(idx, a, 0);
                let (ip, jp, kp) = step(idx, a, 1);
                (c.get(ip, jp, kp) - c.get(i, j, k)) / spacing[a]
            })
            .sum()
    });
    Ok(stats)
}

/// The implicit free-surface operator
///
/// ```text
/// A η = Az η / Δt − g H Δt [ (Δy/Δx) δx²η + (Δx/Δy) δy²η ]
/// ```
///
/// on a horizontal grid, where `Az = ΔxΔy` and `H` is the uniform
/// water-column depth. Symmetric positive definite for `Δt > 0`.
///
/// [`LinearOperator::apply`] fills halos with every prescribed boundary
/// value zeroed, so the operator stays linear. The prescribed values
/// enter through [`subtract_boundary_forcing`](Self::subtract_boundary_forcing)
/// on the right-hand side.
#[derive(Clone, Debug)]
pub struct ImplicitFreeSurfaceOperator {
    grid: Grid,
    bcs: FieldBoundaryConditions,
    homogeneous: FieldBoundaryConditions,
    gravity: f64,
    dt: f64,
}

impl ImplicitFreeSurfaceOperator {
    /// Build the operator on the local horizontal `grid` with regularized
    /// free-surface boundary conditions `bcs`.
    pub fn new(grid: Grid, bcs: FieldBoundaryConditions, gravity: f64) -> Self {
        Self {
            grid,
            homogeneous: bcs.homogeneous(),
            bcs,
            gravity,
            dt: 1.0,
        }
    }

    /// Set the time step the operator is built for.
    pub fn set_time_step(&mut self, dt: f64) {
        self.dt = dt;
    }

    /// Current time step.
    pub fn time_step(&self) -> f64 {
        self.dt
    }

    /// Gravitational acceleration.
    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    /// Boundary conditions applied to the operand.
    pub fn bcs(&self) -> &FieldBoundaryConditions {
        &self.bcs
    }

    /// The diagonal term `Az / Δt`.
    pub fn center(&self) -> f64 {
        self.grid.cell_area() / self.dt
    }

    /// Off-diagonal weights `(gHΔt·Δy/Δx, gHΔt·Δx/Δy)`.
    pub fn weights(&self) -> [f64; 2] {
        let [dx, dy, _] = self.grid.spacing();
        let c = self.gravity * self.grid.depth() * self.dt;
        [c * dy / dx, c * dx / dy]
    }

    /// `rhs ← rhs − A(0)`, moving prescribed boundary values of `η` to the
    /// right-hand side.
    ///
    /// `A(0)` is nonzero only next to faces with a nonzero
    /// [`BoundaryCondition::Value`]. Halos shared with other ranks hold
    /// zero for a zero operand, so no messages are sent.
    pub fn subtract_boundary_forcing<T: Transport>(&self, ctx: &RankContext<T>, rhs: &mut Field) {
        if self.bcs.is_homogeneous() {
            return;
        }
        let mut zero = rhs.zeros_like("eta_boundary");
        for face in Face::ALL {
            let bc = self.bcs.get(face);
            if zero.halo()[face.axis().index()] > 0 && matches!(bc, BoundaryCondition::Value(_)) {
                ctx.evaluator().fill(&mut zero, face, &bc);
            }
        }
        let w = self.weights();
        let halo = zero.halo();
        rhs.map_interior(|idx, r| {
            let mut forcing = 0.0;
            for a in 0..2 {
                if halo[a] > 0 {
                    forcing -= w[a] * second_difference(&zero, idx, a);
                }
            }
            r - forcing
        });
    }

    /// How strongly the cell at local index `i` along `axis` couples to
    /// itself through the second difference, given the faces' conditions.
    fn self_coupling(&self, axis: usize, i: usize) -> f64 {
        let n = self.grid.local_size()[axis];
        let [low, high] = Axis::ALL[axis].faces();
        let edge = |face: Face| match self.bcs.get(face) {
            BoundaryCondition::NoFlux | BoundaryCondition::Flux(_) => -1.0,
            BoundaryCondition::Value(_) => 1.0,
            BoundaryCondition::Periodic | BoundaryCondition::HaloCommunication { .. } => 0.0,
        };
        let mut c = 2.0;
        if i == 0 {
            c += edge(low);
        }
        if i + 1 == n {
            c += edge(high);
        }
        c
    }
}

impl LinearOperator for ImplicitFreeSurfaceOperator {
    fn apply<T: Transport>(
        &self,
        ctx: &RankContext<T>,
        x: &mut Field,
        out: &mut Field,
    ) -> Result<(), CommError> {
        exchange_halos(x, &self.homogeneous, ctx)?;
        let x: &Field = x;
        let center = self.center();
        let w = self.weights();
        let halo = x.halo();
        out.map_interior(|idx, _| {
            let (i, j, k) = step(idx, 0, 0);
            let mut v = center * x.get(i, j, k);
            for a in 0..2 {
                if halo[a] > 0 {
                    v -= w[a] * second_difference(x, idx, a);
                }
            }
            v
        });
        Ok(())
    }

    fn diagonal(&self, index: [usize; 3]) -> f64 {
        let w = self.weights();
        let halo = self.grid.halo();
        let mut d = self.center();
        for a in 0..2 {
            if halo[a] > 0 {
                d += w[a] * self.self_coupling(a, index[a]);
            }
        }
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swell_comm::LocalTransport;
    use swell_core::{Location, Topology};

    fn ctx(topology: [Topology; 3], size: [usize; 3]) -> RankContext<LocalTransport> {
        let g = Grid::new(size, topology, 1, [2.0, 0.5, 1.0]).unwrap();
        RankContext::new(LocalTransport::single(), [1, 1, 1], &g).unwrap()
    }

    fn bcs(c: &RankContext<LocalTransport>, location: [Location; 3]) -> FieldBoundaryConditions {
        let t = c.grid().topologies();
        FieldBoundaryConditions::default_for(t, location)
            .regularize("f", t, c.connectivity())
            .unwrap()
    }

    #[test]
    fn laplacian_of_periodic_cosine() {
        let c = ctx([Topology::Periodic, Topology::Periodic, Topology::Flat], [16, 8, 1]);
        let g = c.grid().clone();
        let mut f = Field::new("f", &g);
        let kx = 2.0 * std::f64::consts::PI / 16.0;
        f.map_interior(|[i, _, _], _| (kx * i as f64).cos());
        let mut out = Field::new("lap", &g);
        laplacian(&c, &mut f, &bcs(&c, [Location::Center; 3]), &mut out).unwrap();
        let eig = 2.0 * (kx.cos() - 1.0) / 4.0;
        out.for_each_interior(|[i, _, _], v| {
            assert!((v - eig * (kx * i as f64).cos()).abs() < 1e-12);
        });
    }

    #[test]
    fn divergence_of_uniform_flow_vanishes() {
        let c = ctx([Topology::Periodic, Topology::Bounded, Topology::Bounded], [6, 6, 3]);
        let g = c.grid().clone();
        let lu = [Location::Face, Location::Center, Location::Center];
        let lv = [Location::Center, Location::Face, Location::Center];
        let mut u = Field::with_location("u", &g, lu);
        let mut v = Field::with_location("v", &g, lv);
        u.map_interior(|_, _| 1.5);
        let (bu, bv) = (bcs(&c, lu), bcs(&c, lv));
        let mut div = Field::new("div", &g);
        divergence(&c, &mut [(&mut u, &bu), (&mut v, &bv)], &mut div).unwrap();
        div.for_each_interior(|_, d| assert_eq!(d, 0.0));
    }

    #[test]
    fn free_surface_operator_diagonal_matches_unit_response() {
        let c = ctx([Topology::Bounded, Topology::Periodic, Topology::Flat], [5, 4, 1]);
        let g = c.grid().horizontal();
        let mut op = ImplicitFreeSurfaceOperator::new(g.clone(), bcs(&c, [Location::Center; 3]), 9.81);
        op.set_time_step(0.3);
        for probe in [[0usize, 1, 0], [2, 2, 0], [4, 3, 0]] {
            let mut e = Field::new("e", &g);
            e.set(probe[0] as isize, probe[1] as isize, 0, 1.0);
            let mut out = Field::new("out", &g);
            op.apply(&c, &mut e, &mut out).unwrap();
            let got = out.get(probe[0] as isize, probe[1] as isize, 0);
            assert!((got - op.diagonal(probe)).abs() < 1e-12 * got.abs());
        }
    }
}
