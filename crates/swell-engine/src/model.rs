//! The hydrostatic model on one rank.
//!
//! [`HydrostaticModel`] owns this rank's prognostic fields, their
//! tendency history, and the free surface. Each
//! [`time_step()`](HydrostaticModel::time_step) runs the stages
//!
//! ```text
//! tendencies → ab2 → free surface → correction → halo
//! ```
//!
//! joined at explicit barriers, and must be called collectively by every
//! rank with the same `dt`.
//!
//! # Ownership model
//!
//! All mutating methods take `&mut self`, and
//! [`snapshot()`](HydrostaticModel::snapshot) returns a view that
//! borrows from `self`. A snapshot therefore cannot be held across a
//! step; the borrow checker enforces it.
//!
//! # Failure
//!
//! A tendency failure or a non-converged implicit solve leaves the
//! fields and each `Gⁿ` as they were before the call, so the caller may
//! retry (for example with a smaller step). `Gⁿ⁻¹` is not preserved; the
//! next rotation overwrites it anyway. Communication failures are fatal
//! and leave the model in an unspecified state.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use smallvec::SmallVec;
use swell_comm::{
    exchange_halos_many, BoundaryCondition, ExchangeStats, FieldBoundaryConditions, RankContext,
    Transport,
};
use swell_core::{
    CommError, ConfigError, Face, Field, Grid, Location, StepError, TendencyKernel, Topology,
};

use crate::ab2::Ab2Coefficients;
use crate::clock::Clock;
use crate::config::{BoundaryOverride, FreeSurfaceConfig, ModelConfig, ETA, U, V};
use crate::free_surface::{FreeSurface, FreeSurfaceState, Velocities, U_LOCATION, V_LOCATION};
use crate::metrics::StepMetrics;
use crate::snapshot::ModelSnapshot;
use crate::stage;
use crate::tendency::TendencyState;

// Compile-time assertion: a model can be moved onto its rank's thread.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<HydrostaticModel<swell_comm::LocalTransport>>();
    }
};

fn with_overrides(
    mut bcs: FieldBoundaryConditions,
    field: &str,
    overrides: &[BoundaryOverride],
) -> FieldBoundaryConditions {
    for o in overrides.iter().filter(|o| o.field == field) {
        bcs = bcs.with_face(o.face, o.condition);
    }
    bcs
}

/// Horizontal faces of a transport follow its velocity; prescribed
/// velocities become prescribed volume fluxes through the column face.
fn transport_bcs(
    velocity: &FieldBoundaryConditions,
    topologies: [Topology; 3],
    location: [Location; 3],
    column_face_area: f64,
) -> FieldBoundaryConditions {
    let mut bcs = FieldBoundaryConditions::default_for(topologies, location);
    for face in [Face::West, Face::East, Face::South, Face::North] {
        let bc = match velocity.get(face) {
            BoundaryCondition::Value(v) => BoundaryCondition::Value(v * column_face_area),
            other => other,
        };
        bcs = bcs.with_face(face, bc);
    }
    bcs
}

fn fill_interior(field: &mut Field, grid: &Grid, f: impl Fn([usize; 3], [f64; 3]) -> f64) {
    let offset = grid.offset();
    let spacing = grid.spacing();
    let shift = field
        .location()
        .map(|l| if l == Location::Center { 0.5 } else { 0.0 });
    field.map_interior(|local, _| {
        let g = [0, 1, 2].map(|a| offset[a] + local[a]);
        let x = [0, 1, 2].map(|a| (g[a] as f64 + shift[a]) * spacing[a]);
        f(g, x)
    });
}

/// A hydrostatic free-surface model on one rank.
pub struct HydrostaticModel<T> {
    ctx: RankContext<T>,
    kernel: Arc<dyn TendencyKernel>,
    u: Field,
    v: Field,
    velocity_bcs: [FieldBoundaryConditions; 2],
    tracers: IndexMap<String, Field>,
    tracer_bcs: Vec<FieldBoundaryConditions>,
    /// `[u, v, tracers…]`, matching [`Self::prognostic_names`].
    tendencies: Vec<TendencyState>,
    /// Pre-step copies for rolling back a failed implicit solve.
    backup: Vec<Field>,
    free_surface: FreeSurface,
    chi: f64,
    clock: Clock,
    halos_stale: bool,
}

impl<T: Transport> HydrostaticModel<T> {
    /// Validate `config`, set up this rank's context over `transport`,
    /// and allocate all fields at rest.
    pub fn new(
        config: ModelConfig,
        transport: T,
        kernel: Arc<dyn TendencyKernel>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let ctx = RankContext::new(transport, config.ranks, &config.grid)?;
        Self::from_context(config, ctx, kernel)
    }

    /// Build on an existing rank context, for example one with a custom
    /// boundary evaluator. The context must decompose `config.grid` over
    /// `config.ranks`.
    pub fn from_context(
        config: ModelConfig,
        ctx: RankContext<T>,
        kernel: Arc<dyn TendencyKernel>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = ctx.grid().clone();
        if ctx.topology().ranks() != config.ranks
            || grid.global_size() != config.grid.global_size()
            || grid.topologies() != config.grid.topologies()
        {
            return Err(ConfigError::UnsupportedDecomposition {
                reason: "rank context was built for a different grid or rank layout".into(),
            });
        }
        let topologies = grid.topologies();
        let horizontal = grid.horizontal();
        let overrides = &config.boundary_conditions;
        let raw = |name: &str, location: [Location; 3]| {
            with_overrides(
                FieldBoundaryConditions::default_for(topologies, location),
                name,
                overrides,
            )
        };
        let regularize = |bcs: FieldBoundaryConditions, name: &str, t: [Topology; 3]| {
            bcs.regularize(name, t, ctx.connectivity())
        };

        let raw_u = raw(U, U_LOCATION);
        let raw_v = raw(V, V_LOCATION);
        let h_topologies = horizontal.topologies();
        let [dx, dy, _] = grid.spacing();
        let depth = grid.depth();
        let transport = [
            regularize(
                transport_bcs(&raw_u, h_topologies, U_LOCATION, dy * depth),
                "U",
                h_topologies,
            )?,
            regularize(
                transport_bcs(&raw_v, h_topologies, V_LOCATION, dx * depth),
                "V",
                h_topologies,
            )?,
        ];
        let eta_bcs = regularize(
            with_overrides(
                FieldBoundaryConditions::default_for(h_topologies, [Location::Center; 3]),
                ETA,
                overrides,
            ),
            ETA,
            h_topologies,
        )?;
        let velocity_bcs = [
            regularize(raw_u, U, topologies)?,
            regularize(raw_v, V, topologies)?,
        ];

        let mut tracers = IndexMap::with_capacity(config.tracers.len());
        let mut tracer_bcs = Vec::with_capacity(config.tracers.len());
        for name in config.tracers.iter().map(String::as_str) {
            tracer_bcs.push(regularize(raw(name, [Location::Center; 3]), name, topologies)?);
            tracers.insert(name.to_string(), Field::new(name, &grid));
        }

        let u = Field::with_location(U, &grid, U_LOCATION);
        let v = Field::with_location(V, &grid, V_LOCATION);
        let tendencies: Vec<TendencyState> = [&u, &v]
            .into_iter()
            .chain(tracers.values())
            .map(TendencyState::for_field)
            .collect();
        let backup = match config.free_surface {
            FreeSurfaceConfig::Implicit { .. } => {
                [&u, &v].into_iter().chain(tracers.values()).cloned().collect()
            }
            FreeSurfaceConfig::Explicit { .. } => Vec::new(),
        };

        let state = FreeSurfaceState::new(horizontal, eta_bcs, transport);
        let free_surface = FreeSurface::new(&config.free_surface, &ctx, state)?;

        tracing::info!(
            rank = ctx.rank().0,
            tracers = tracers.len(),
            implicit = free_surface.is_implicit(),
            chi = config.chi,
            "model ready"
        );
        Ok(Self {
            ctx,
            kernel,
            u,
            v,
            velocity_bcs,
            tracers,
            tracer_bcs,
            tendencies,
            backup,
            free_surface,
            chi: config.chi,
            clock: Clock::default(),
            halos_stale: true,
        })
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// This rank's communication context.
    pub fn context(&self) -> &RankContext<T> {
        &self.ctx
    }

    /// This rank's local grid.
    pub fn grid(&self) -> &Grid {
        self.ctx.grid()
    }

    /// Current time and iteration.
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// The free surface.
    pub fn free_surface(&self) -> &FreeSurface {
        &self.free_surface
    }

    /// Names of the AB2-stepped fields: `u`, `v`, then tracers.
    pub fn prognostic_names(&self) -> impl Iterator<Item = &str> {
        [U, V]
            .into_iter()
            .chain(self.tracers.keys().map(String::as_str))
    }

    /// Look up any field, including `eta`.
    pub fn field(&self, name: &str) -> Option<&Field> {
        match name {
            U => Some(&self.u),
            V => Some(&self.v),
            ETA => Some(self.free_surface.state().eta()),
            tracer => self.tracers.get(tracer),
        }
    }

    /// Tendency history of a prognostic field.
    pub fn tendency(&self, name: &str) -> Option<&TendencyState> {
        self.prognostic_names()
            .position(|n| n == name)
            .map(|i| &self.tendencies[i])
    }

    /// A read-only view of the current state.
    ///
    /// Between steps every halo is current.
    pub fn snapshot(&self) -> ModelSnapshot<'_> {
        ModelSnapshot::new(
            self.ctx.grid(),
            [&self.u, &self.v],
            &self.tracers,
            self.free_surface.state().eta(),
            self.clock,
        )
    }

    // ── Initialization ─────────────────────────────────────────────

    fn field_and_grid_mut(&mut self, name: &str) -> Result<(&mut Field, Grid), ConfigError> {
        let grid = if name == ETA {
            self.free_surface.state().grid().clone()
        } else {
            self.ctx.grid().clone()
        };
        let field = match name {
            U => Some(&mut self.u),
            V => Some(&mut self.v),
            ETA => Some(self.free_surface.state_mut().eta_mut()),
            tracer => self.tracers.get_mut(tracer),
        };
        let field = field.ok_or_else(|| ConfigError::UnknownField {
            name: name.to_string(),
        })?;
        Ok((field, grid))
    }

    /// Set the interior of `name` from a function of global position.
    ///
    /// Positions are in metres from the domain origin, at the field's
    /// staggered location: cell centres, or the low face along axes where
    /// the field is face-located. Halos are refreshed before the next
    /// step, or by [`initialize`](Self::initialize).
    pub fn set_field(
        &mut self,
        name: &str,
        f: impl Fn([f64; 3]) -> f64,
    ) -> Result<(), ConfigError> {
        let (field, grid) = self.field_and_grid_mut(name)?;
        fill_interior(field, &grid, |_, x| f(x));
        self.halos_stale = true;
        Ok(())
    }

    /// Set the interior of `name` from a function of global cell index.
    pub fn set_field_by_index(
        &mut self,
        name: &str,
        f: impl Fn([usize; 3]) -> f64,
    ) -> Result<(), ConfigError> {
        let (field, grid) = self.field_and_grid_mut(name)?;
        fill_interior(field, &grid, |g, _| f(g));
        self.halos_stale = true;
        Ok(())
    }

    /// Exchange the halos of every field. Collective.
    ///
    /// [`time_step`](Self::time_step) does this itself when fields were
    /// set since the last exchange.
    pub fn initialize(&mut self) -> Result<ExchangeStats, CommError> {
        self.fill_halos()
    }

    fn fill_halos(&mut self) -> Result<ExchangeStats, CommError> {
        let [bu, bv] = &self.velocity_bcs;
        let mut batch: SmallVec<[(&mut Field, &FieldBoundaryConditions); 8]> =
            SmallVec::with_capacity(3 + self.tracers.len());
        batch.push((&mut self.u, bu));
        batch.push((&mut self.v, bv));
        batch.extend(self.tracers.values_mut().zip(self.tracer_bcs.iter()));
        batch.push(self.free_surface.state_mut().eta_with_bcs());
        let stats = exchange_halos_many(&mut batch, &self.ctx)?;
        self.halos_stale = false;
        Ok(stats)
    }

    // ── Diagnostics ────────────────────────────────────────────────

    /// Sum of the interior of `name` over all ranks. Collective.
    ///
    /// `None` if no such field exists (on every rank alike).
    pub fn global_sum(&self, name: &str) -> Result<Option<f64>, CommError> {
        match self.field(name) {
            Some(f) => self.ctx.all_reduce_sum(f.interior_sum()).map(Some),
            None => Ok(None),
        }
    }

    // ── Stepping ───────────────────────────────────────────────────

    fn save_backup(&mut self) {
        let fields = [&self.u, &self.v].into_iter().chain(self.tracers.values());
        for (b, f) in self.backup.iter_mut().zip(fields) {
            b.as_mut_slice().copy_from_slice(f.as_slice());
        }
    }

    fn rollback(&mut self) {
        let fields = [&mut self.u, &mut self.v]
            .into_iter()
            .chain(self.tracers.values_mut());
        for (f, b) in fields.zip(&self.backup) {
            f.as_mut_slice().copy_from_slice(b.as_slice());
        }
        for t in &mut self.tendencies {
            t.unrotate();
        }
        tracing::warn!(iteration = self.clock.iteration, "step rolled back");
    }

    /// Advance every field by `dt` seconds. Collective.
    ///
    /// # Errors
    ///
    /// - [`StepError::InvalidTimeStep`] if `dt` is not finite and
    ///   positive. Nothing runs.
    /// - [`StepError::Tendency`] if a kernel fails. The model is
    ///   unchanged.
    /// - [`StepError::SolverConvergence`] if the implicit free-surface
    ///   solve fails. The model is unchanged.
    /// - [`StepError::Communication`] on any transport failure. Fatal.
    pub fn time_step(&mut self, dt: f64) -> Result<StepMetrics, StepError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(StepError::InvalidTimeStep { dt });
        }
        let step_start = Instant::now();
        let mut metrics = StepMetrics::default();

        if self.halos_stale {
            metrics.record_exchange(self.fill_halos()?);
        }
        let coefficients = Ab2Coefficients::for_step(self.clock.is_first_step(), self.chi);

        // 1. Tendencies (concurrent), then the explicit η tendency.
        let stage_start = Instant::now();
        {
            let snapshot = ModelSnapshot::new(
                self.ctx.grid(),
                [&self.u, &self.v],
                &self.tracers,
                self.free_surface.state().eta(),
                self.clock,
            );
            let names: Vec<&str> = [U, V]
                .into_iter()
                .chain(self.tracers.keys().map(String::as_str))
                .collect();
            stage::compute_tendencies(&*self.kernel, &snapshot, &names, &mut self.tendencies)?;
        }
        metrics.record_exchange(self.free_surface.compute_tendency(&self.ctx, &self.u, &self.v)?);
        metrics.tendency_us = stage_start.elapsed().as_micros() as u64;

        // 2. AB2 on every prognostic field (concurrent).
        let stage_start = Instant::now();
        if self.free_surface.is_implicit() {
            self.save_backup();
        }
        let fields = [&mut self.u, &mut self.v]
            .into_iter()
            .chain(self.tracers.values_mut());
        stage::advance(fields, &self.tendencies, dt, coefficients);
        metrics.ab2_us = stage_start.elapsed().as_micros() as u64;

        // 3. Free surface.
        let stage_start = Instant::now();
        let [bu, bv] = &self.velocity_bcs;
        let velocities = Velocities {
            u: &mut self.u,
            u_bcs: bu,
            v: &mut self.v,
            v_bcs: bv,
        };
        match self.free_surface.step(&self.ctx, velocities, dt, coefficients) {
            Ok((solve, stats)) => {
                metrics.solve = solve;
                metrics.record_exchange(stats);
            }
            Err(e) => {
                if !e.is_fatal() {
                    self.rollback();
                }
                return Err(e);
            }
        }
        metrics.free_surface_us = stage_start.elapsed().as_micros() as u64;

        // 4. Barotropic correction.
        let stage_start = Instant::now();
        self.free_surface.correct_velocities(&mut self.u, &mut self.v, dt);
        metrics.correction_us = stage_start.elapsed().as_micros() as u64;

        // 5. Trailing halo exchange of everything.
        let stage_start = Instant::now();
        metrics.record_exchange(self.fill_halos()?);
        metrics.halo_us = stage_start.elapsed().as_micros() as u64;

        self.clock.tick(dt);
        metrics.total_us = step_start.elapsed().as_micros() as u64;
        tracing::debug!(
            iteration = self.clock.iteration,
            time = self.clock.time,
            total_us = metrics.total_us,
            halo_messages = metrics.halo_messages,
            "step complete"
        );
        Ok(metrics)
    }
}
