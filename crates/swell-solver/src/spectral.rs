//! Direct Poisson and Helmholtz solves by eigen-decomposition.
//!
//! The second-order Laplacian on a uniform grid is diagonalized by the
//! discrete Fourier transform along periodic axes and by the type-II
//! cosine transform along bounded axes with no-flux walls. In transform
//! space the solve is a pointwise division by
//!
//! ```text
//! λ(k) = Σₐ 2 (cos θₐ(k) − 1) / Δₐ²  − σ
//! θ = 2πk/n (periodic),  θ = πk/n (bounded)
//! ```
//!
//! The cosine transform of length `n` is computed from a complex FFT of
//! length `2n` over the even extension of the data.
//!
//! Data starts in the z pencil (the ordinary subdomain), is transformed
//! along z, transposed to the y pencil, transformed along y, transposed
//! to the x pencil, transformed along x, divided, and then walked back.
//!
//! The reported residual is `‖(∇² − σ)x − rhs‖₂` measured with the
//! finite-difference stencil after the solve. It stays at rounding level
//! unless the problem is singular and the right-hand side has a mean.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use swell_comm::{exchange_halos, FieldBoundaryConditions, RankContext, Transport};
use swell_core::{Axis, CommError, ConfigError, Field, Grid, Location, RankId, SolverError, Topology};

use crate::elliptic::{EllipticSolver, SolveReport};
use crate::operators::apply_laplacian;
use crate::pencil::{redistribute, Orientation, PencilLayout};

const ZERO: Complex<f64> = Complex { re: 0.0, im: 0.0 };

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TransformKind {
    Fourier,
    Cosine,
}

/// Plans and scratch for the transform along one axis.
struct AxisTransform {
    kind: TransformKind,
    n: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    /// `e^{-iπk/2n}` for the cosine transform.
    twiddle: Vec<Complex<f64>>,
    line: Vec<Complex<f64>>,
    extended: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl AxisTransform {
    fn new(planner: &mut FftPlanner<f64>, kind: TransformKind, n: usize) -> Self {
        let len = match kind {
            TransformKind::Fourier => n,
            TransformKind::Cosine => 2 * n,
        };
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let twiddle = (0..n)
            .map(|k| Complex::from_polar(1.0, -std::f64::consts::PI * k as f64 / (2 * n) as f64))
            .collect();
        Self {
            kind,
            n,
            forward,
            inverse,
            twiddle,
            line: vec![ZERO; n],
            extended: vec![ZERO; len],
            scratch: vec![ZERO; scratch_len],
        }
    }

    fn forward_line(&mut self) {
        match self.kind {
            TransformKind::Fourier => {
                self.forward
                    .process_with_scratch(&mut self.line, &mut self.scratch);
            }
            TransformKind::Cosine => {
                let n = self.n;
                for m in 0..n {
                    self.extended[m] = self.line[m];
                    self.extended[2 * n - 1 - m] = self.line[m];
                }
                self.forward
                    .process_with_scratch(&mut self.extended, &mut self.scratch);
                for k in 0..n {
                    self.line[k] = self.twiddle[k] * self.extended[k] * 0.5;
                }
            }
        }
    }

    fn inverse_line(&mut self) {
        let n = self.n;
        match self.kind {
            TransformKind::Fourier => {
                self.inverse
                    .process_with_scratch(&mut self.line, &mut self.scratch);
                let scale = 1.0 / n as f64;
                self.line.iter_mut().for_each(|c| *c *= scale);
            }
            TransformKind::Cosine => {
                self.extended[0] = self.line[0] * 2.0;
                self.extended[n] = ZERO;
                for k in 1..n {
                    self.extended[k] = self.twiddle[k].conj() * self.line[k] * 2.0;
                    self.extended[2 * n - k] = self.twiddle[k] * self.line[k] * 2.0;
                }
                self.inverse
                    .process_with_scratch(&mut self.extended, &mut self.scratch);
                let scale = 1.0 / (2 * n) as f64;
                for m in 0..n {
                    self.line[m] = self.extended[m] * scale;
                }
            }
        }
    }

    /// Transform every line along `axis` of a box with `shape`.
    fn apply(&mut self, data: &mut [Complex<f64>], shape: [usize; 3], axis: usize, forward: bool) {
        if data.is_empty() {
            return;
        }
        let stride = [1, shape[0], shape[0] * shape[1]];
        let (o1, o2) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        for c2 in 0..shape[o2] {
            for c1 in 0..shape[o1] {
                let base = c1 * stride[o1] + c2 * stride[o2];
                for m in 0..self.n {
                    self.line[m] = data[base + m * stride[axis]];
                }
                if forward {
                    self.forward_line();
                } else {
                    self.inverse_line();
                }
                for m in 0..self.n {
                    data[base + m * stride[axis]] = self.line[m];
                }
            }
        }
    }
}

fn eigenvalues(topology: Topology, n: usize, spacing: f64) -> Vec<f64> {
    let inv2 = 1.0 / (spacing * spacing);
    (0..n)
        .map(|k| match topology {
            Topology::Flat => 0.0,
            Topology::Periodic => {
                2.0 * ((2.0 * std::f64::consts::PI * k as f64 / n as f64).cos() - 1.0) * inv2
            }
            Topology::Bounded => {
                2.0 * ((std::f64::consts::PI * k as f64 / n as f64).cos() - 1.0) * inv2
            }
        })
        .collect()
}

/// Distributed FFT-based solver for `(∇² − σ) x = rhs`.
///
/// Bounded axes are treated as no-flux walls. With `σ = 0` the problem is
/// singular on fully periodic or fully walled domains; the mean mode of
/// the solution is pinned to zero, so the result is the zero-mean
/// solution for a zero-mean right-hand side.
///
/// Plans, transpose buffers, and line scratch are allocated once and
/// reused by every solve.
pub struct SpectralPoissonSolver {
    layout: PencilLayout,
    transforms: [Option<AxisTransform>; 3],
    eigenvalues: [Vec<f64>; 3],
    shift: f64,
    spacing: [f64; 3],
    bcs: FieldBoundaryConditions,
    work: Vec<Complex<f64>>,
    spare: Vec<Complex<f64>>,
    lap: Field,
}

impl SpectralPoissonSolver {
    /// Set up a solver for fields on the local `grid` of `ctx`'s
    /// decomposition with Helmholtz shift `shift` (σ ≥ 0).
    ///
    /// `grid` may differ from `ctx.grid()` in the vertical (for example a
    /// horizontal grid), but must share its horizontal decomposition.
    /// Fails unless the vertical axis lives on a single rank.
    pub fn new<T: Transport>(
        ctx: &RankContext<T>,
        grid: &Grid,
        shift: f64,
    ) -> Result<Self, ConfigError> {
        if !shift.is_finite() || shift < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "shift",
                reason: format!("must be finite and non-negative, got {shift}"),
            });
        }
        let global = grid.global_size();
        let layout = PencilLayout::new(global, ctx.topology().ranks())?;
        let own = layout.pencil(Orientation::Z, ctx.rank());
        let offset = grid.offset();
        let local = grid.local_size();
        let expected_hi = [
            offset[0] + local[0],
            offset[1] + local[1],
            offset[2] + local[2],
        ];
        if own.lo() != offset || own.hi() != expected_hi {
            return Err(ConfigError::UnsupportedDecomposition {
                reason: format!(
                    "grid window {offset:?}+{local:?} does not match pencil {:?}..{:?}",
                    own.lo(),
                    own.hi()
                ),
            });
        }

        let mut planner = FftPlanner::new();
        let spacing = grid.spacing();
        let transforms = Axis::ALL.map(|axis| {
            let a = axis.index();
            let n = global[a];
            match grid.topology(axis) {
                _ if n == 1 => None,
                Topology::Flat => None,
                Topology::Periodic => Some(AxisTransform::new(&mut planner, TransformKind::Fourier, n)),
                Topology::Bounded => Some(AxisTransform::new(&mut planner, TransformKind::Cosine, n)),
            }
        });
        let eigenvalues =
            Axis::ALL.map(|axis| eigenvalues(grid.topology(axis), global[axis.index()], spacing[axis.index()]));

        let topologies = grid.topologies();
        let bcs = FieldBoundaryConditions::default_for(topologies, [Location::Center; 3])
            .regularize("spectral_x", topologies, ctx.connectivity())?;

        tracing::info!(
            rank = ctx.rank().0,
            global = ?global,
            shift,
            "spectral solver planned"
        );
        Ok(Self {
            layout,
            transforms,
            eigenvalues,
            shift,
            spacing,
            bcs,
            work: Vec::new(),
            spare: Vec::new(),
            lap: Field::new("spectral_lap", grid),
        })
    }

    /// Current Helmholtz shift σ.
    pub fn shift(&self) -> f64 {
        self.shift
    }

    /// Change the Helmholtz shift σ.
    pub fn set_shift(&mut self, shift: f64) {
        self.shift = shift;
    }

    fn transform(&mut self, orientation: Orientation, axis: usize, rank: RankId, forward: bool) {
        let shape = self.layout.pencil(orientation, rank).shape();
        if let Some(t) = self.transforms[axis].as_mut() {
            t.apply(&mut self.work, shape, axis, forward);
        }
    }

    fn transpose<T: Transport>(
        &mut self,
        ctx: &RankContext<T>,
        from: Orientation,
        to: Orientation,
    ) -> Result<(), SolverError> {
        redistribute(ctx, &self.layout, from, to, &self.work, &mut self.spare)?;
        std::mem::swap(&mut self.work, &mut self.spare);
        Ok(())
    }

    /// `‖(∇² − σ)x − rhs‖₂` over all ranks. Fills the halos of `x`.
    fn residual<T: Transport>(
        &mut self,
        ctx: &RankContext<T>,
        rhs: &Field,
        x: &mut Field,
    ) -> Result<f64, CommError> {
        exchange_halos(x, &self.bcs, ctx)?;
        apply_laplacian(x, self.spacing, &mut self.lap);
        let shift = self.shift;
        let mut local = 0.0;
        self.lap.for_each_interior(|[i, j, k], l| {
            let (i, j, k) = (i as isize, j as isize, k as isize);
            let r = l - shift * x.get(i, j, k) - rhs.get(i, j, k);
            local += r * r;
        });
        Ok(ctx.all_reduce_sum(local)?.sqrt())
    }

    fn divide(&mut self, rank: RankId) {
        let pencil = self.layout.pencil(Orientation::X, rank);
        let [ex, ey, ez] = &self.eigenvalues;
        let shift = self.shift;
        let work = &mut self.work;
        pencil.for_each(|g| {
            let lambda = ex[g[0]] + ey[g[1]] + ez[g[2]] - shift;
            let o = pencil.offset_of(g);
            work[o] = if lambda == 0.0 { ZERO } else { work[o] / lambda };
        });
    }
}

impl EllipticSolver for SpectralPoissonSolver {
    fn solve<T: Transport>(
        &mut self,
        ctx: &RankContext<T>,
        rhs: &Field,
        x: &mut Field,
    ) -> Result<SolveReport, SolverError> {
        let me = ctx.rank();
        let shape = self.layout.pencil(Orientation::Z, me).shape();
        for f in [rhs, &*x] {
            if f.size() != shape {
                return Err(SolverError::ShapeMismatch {
                    expected: shape,
                    actual: f.size(),
                });
            }
        }

        self.work.clear();
        rhs.for_each_interior(|_, v| self.work.push(Complex::new(v, 0.0)));

        self.transform(Orientation::Z, 2, me, true);
        self.transpose(ctx, Orientation::Z, Orientation::Y)?;
        self.transform(Orientation::Y, 1, me, true);
        self.transpose(ctx, Orientation::Y, Orientation::X)?;
        self.transform(Orientation::X, 0, me, true);

        self.divide(me);

        self.transform(Orientation::X, 0, me, false);
        self.transpose(ctx, Orientation::X, Orientation::Y)?;
        self.transform(Orientation::Y, 1, me, false);
        self.transpose(ctx, Orientation::Y, Orientation::Z)?;
        self.transform(Orientation::Z, 2, me, false);

        let values: Vec<f64> = self.work.iter().map(|c| c.re).collect();
        let interior = x.interior();
        x.unpack(interior, &values);
        let residual = self.residual(ctx, rhs, x)?;
        tracing::trace!(rank = me.0, residual, "spectral solve complete");
        Ok(SolveReport {
            iterations: 1,
            residual,
        })
    }
}
