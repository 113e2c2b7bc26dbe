//! The run loop: step a model to a stop condition, with scheduled
//! diagnostics and output.
//!
//! Every rank runs its own [`Simulation`] with identical settings. All
//! scheduling decisions depend only on the [`Clock`], which advances
//! identically on every rank, so collective calls stay in lockstep.

use std::error::Error;
use std::fmt;
use std::time::Instant;

use swell_comm::Transport;
use swell_core::{CommError, ConfigError, StepError};

use crate::clock::Clock;
use crate::model::HydrostaticModel;
use crate::output::{
    Diagnostic, DiagnosticError, OutputError, OutputWriter, Schedule, ScheduleState,
};

// ── Errors ─────────────────────────────────────────────────────────

/// Why a run stopped early.
#[derive(Debug)]
pub enum RunError {
    /// Invalid run settings.
    Config(ConfigError),
    /// A time step failed.
    Step(StepError),
    /// A diagnostic failed on this or another rank.
    Diagnostic(DiagnosticError),
    /// An output writer failed on this rank.
    Output {
        /// Writer name.
        writer: String,
        /// The failure.
        source: OutputError,
    },
    /// An output writer failed on another rank.
    RemoteOutput {
        /// Writer name.
        writer: String,
    },
    /// Agreeing on callback outcomes failed.
    Communication(CommError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid run: {e}"),
            Self::Step(e) => write!(f, "step failed: {e}"),
            Self::Diagnostic(e) => write!(f, "diagnostic failed: {e}"),
            Self::Output { writer, source } => write!(f, "writer '{writer}' failed: {source}"),
            Self::RemoteOutput { writer } => {
                write!(f, "writer '{writer}' failed on another rank")
            }
            Self::Communication(e) => write!(f, "communication failed: {e}"),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Step(e) => Some(e),
            Self::Diagnostic(e) => Some(e),
            Self::Output { source, .. } => Some(source),
            Self::RemoteOutput { .. } => None,
            Self::Communication(e) => Some(e),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<StepError> for RunError {
    fn from(e: StepError) -> Self {
        Self::Step(e)
    }
}

impl From<DiagnosticError> for RunError {
    fn from(e: DiagnosticError) -> Self {
        Self::Diagnostic(e)
    }
}

impl From<CommError> for RunError {
    fn from(e: CommError) -> Self {
        Self::Communication(e)
    }
}

// ── RunSummary ─────────────────────────────────────────────────────

/// What a completed run did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    /// Steps taken by this call.
    pub steps: u64,
    /// Model clock at the end.
    pub clock: Clock,
    /// Wall-clock time of the whole run, in microseconds.
    pub wall_us: u64,
    /// Sum of per-step times, in microseconds.
    pub step_us: u64,
    /// Halo messages sent, across all steps.
    pub halo_messages: usize,
    /// Elliptic solver iterations, across all steps.
    pub solver_iterations: usize,
    /// Writer actuations.
    pub outputs: u64,
}

// ── Simulation ─────────────────────────────────────────────────────

/// Steps a [`HydrostaticModel`] with a fixed `Δt` until a stop condition.
pub struct Simulation<T> {
    model: HydrostaticModel<T>,
    dt: f64,
    stop_iteration: Option<u64>,
    stop_time: Option<f64>,
    writers: Vec<(ScheduleState, Box<dyn OutputWriter>)>,
    diagnostics: Vec<(ScheduleState, Box<dyn Diagnostic>)>,
}

impl<T: Transport> Simulation<T> {
    /// A simulation with no stop condition yet.
    pub fn new(model: HydrostaticModel<T>, dt: f64) -> Result<Self, ConfigError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "dt",
                reason: format!("must be finite and positive, got {dt}"),
            });
        }
        Ok(Self {
            model,
            dt,
            stop_iteration: None,
            stop_time: None,
            writers: Vec::new(),
            diagnostics: Vec::new(),
        })
    }

    /// Stop once the model reaches this iteration.
    pub fn with_stop_iteration(mut self, iteration: u64) -> Self {
        self.stop_iteration = Some(iteration);
        self
    }

    /// Stop at this model time. The last step is shortened to land on it.
    pub fn with_stop_time(mut self, time: f64) -> Self {
        self.stop_time = Some(time);
        self
    }

    /// Add an output writer. Writers run after diagnostics, in the order
    /// added.
    pub fn add_writer(
        &mut self,
        schedule: Schedule,
        writer: Box<dyn OutputWriter>,
    ) -> Result<(), ConfigError> {
        self.writers.push((ScheduleState::new(schedule)?, writer));
        Ok(())
    }

    /// Add a diagnostic.
    pub fn add_diagnostic(
        &mut self,
        schedule: Schedule,
        diagnostic: Box<dyn Diagnostic>,
    ) -> Result<(), ConfigError> {
        self.diagnostics.push((ScheduleState::new(schedule)?, diagnostic));
        Ok(())
    }

    /// The model.
    pub fn model(&self) -> &HydrostaticModel<T> {
        &self.model
    }

    /// The model, for initialization between runs.
    pub fn model_mut(&mut self) -> &mut HydrostaticModel<T> {
        &mut self.model
    }

    /// The writers, in the order added.
    pub fn writers(&self) -> impl Iterator<Item = &dyn OutputWriter> {
        self.writers.iter().map(|(_, w)| w.as_ref())
    }

    /// Give back the model.
    pub fn into_model(self) -> HydrostaticModel<T> {
        self.model
    }

    fn finished(&self) -> bool {
        let clock = self.model.clock();
        if self.stop_iteration.is_some_and(|n| clock.iteration >= n) {
            return true;
        }
        self.stop_time
            .is_some_and(|t| t - clock.time <= 1e-12 * t.abs().max(1.0))
    }

    fn next_dt(&self) -> f64 {
        match self.stop_time {
            Some(t) => self.dt.min(t - self.model.clock().time),
            None => self.dt,
        }
    }

    /// Run scheduled diagnostics then writers on the current state.
    ///
    /// Outcomes are agreed across ranks so every rank stops together.
    fn actuate_callbacks(&mut self) -> Result<u64, RunError> {
        let snapshot = self.model.snapshot();
        let clock = snapshot.clock();
        let ctx = self.model.context();

        for (schedule, diagnostic) in &mut self.diagnostics {
            if !schedule.actuate(clock) {
                continue;
            }
            let local = diagnostic.check(&snapshot);
            let failed = ctx.all_reduce_max(if local.is_err() { 1.0 } else { 0.0 })?;
            local?;
            if failed > 0.0 {
                return Err(DiagnosticError::RemoteFailure {
                    diagnostic: diagnostic.name().to_string(),
                    iteration: clock.iteration,
                }
                .into());
            }
        }

        let mut outputs = 0;
        for (schedule, writer) in &mut self.writers {
            if !schedule.actuate(clock) {
                continue;
            }
            let local = writer.write(&snapshot);
            let failed = ctx.all_reduce_max(if local.is_err() { 1.0 } else { 0.0 })?;
            if let Err(source) = local {
                return Err(RunError::Output {
                    writer: writer.name().to_string(),
                    source,
                });
            }
            if failed > 0.0 {
                return Err(RunError::RemoteOutput {
                    writer: writer.name().to_string(),
                });
            }
            outputs += 1;
        }
        Ok(outputs)
    }

    /// Step until a stop condition holds. Collective.
    ///
    /// Fills halos, offers the initial state to every schedule, then
    /// steps and offers each new state. Calling `run` again after raising
    /// the stop condition continues from where it left off; schedules
    /// keep their history.
    pub fn run(&mut self) -> Result<RunSummary, RunError> {
        if self.stop_iteration.is_none() && self.stop_time.is_none() {
            return Err(ConfigError::InvalidParameter {
                name: "stop",
                reason: "set a stop iteration or a stop time".into(),
            }
            .into());
        }
        let start = Instant::now();
        let mut summary = RunSummary::default();
        tracing::info!(
            rank = self.model.context().rank().0,
            dt = self.dt,
            stop_iteration = ?self.stop_iteration,
            stop_time = ?self.stop_time,
            start = %self.model.clock(),
            "run starting"
        );

        self.model.initialize()?;
        summary.outputs += self.actuate_callbacks()?;
        while !self.finished() {
            let metrics = self.model.time_step(self.next_dt())?;
            summary.steps += 1;
            summary.step_us += metrics.total_us;
            summary.halo_messages += metrics.halo_messages;
            summary.solver_iterations += metrics.solve.map_or(0, |r| r.iterations);
            summary.outputs += self.actuate_callbacks()?;
        }

        summary.clock = self.model.clock();
        summary.wall_us = start.elapsed().as_micros() as u64;
        tracing::info!(
            steps = summary.steps,
            end = %summary.clock,
            wall_us = summary.wall_us,
            "run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FreeSurfaceConfig, ModelConfig};
    use crate::output::{FieldRecorder, NanCheck};
    use std::sync::Arc;
    use swell_comm::LocalTransport;
    use swell_core::{Field, FieldSource, Grid, TendencyError, TendencyKernel, Topology};

    struct Rate(f64);

    impl TendencyKernel for Rate {
        fn compute(
            &self,
            name: &str,
            _state: &dyn FieldSource,
            out: &mut Field,
        ) -> Result<(), TendencyError> {
            let r = if name == "T" { self.0 } else { 0.0 };
            out.map_interior(|_, _| r);
            Ok(())
        }
    }

    fn simulation(rate: f64, dt: f64) -> Simulation<LocalTransport> {
        let grid = Grid::new(
            [4, 4, 2],
            [Topology::Periodic, Topology::Periodic, Topology::Bounded],
            1,
            [1.0, 1.0, 1.0],
        )
        .unwrap();
        let config = ModelConfig::new(grid, [1, 1, 1])
            .with_tracer("T")
            .with_free_surface(FreeSurfaceConfig::Explicit { gravity: 9.81 });
        let model =
            HydrostaticModel::new(config, LocalTransport::single(), Arc::new(Rate(rate))).unwrap();
        Simulation::new(model, dt).unwrap()
    }

    #[test]
    fn run_without_stop_condition_rejected() {
        let mut sim = simulation(1.0, 1.0);
        assert!(matches!(sim.run(), Err(RunError::Config(_))));
    }

    #[test]
    fn last_step_lands_on_stop_time() {
        let mut sim = simulation(1.0, 0.4).with_stop_time(1.0);
        let summary = sim.run().unwrap();
        assert_eq!(summary.steps, 3);
        assert!((summary.clock.time - 1.0).abs() < 1e-12);
        assert!((summary.clock.last_dt - 0.2).abs() < 1e-12);
        // Constant tendency integrates exactly under any AB2 weights.
        sim.model()
            .field("T")
            .unwrap()
            .for_each_interior(|_, v| assert!((v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn writers_see_initial_and_scheduled_states() {
        let mut sim = simulation(1.0, 1.0).with_stop_iteration(4);
        sim.add_writer(
            Schedule::IterationInterval(2),
            Box::new(FieldRecorder::fields(["T"])),
        )
        .unwrap();
        let summary = sim.run().unwrap();
        assert_eq!(summary.outputs, 3);
        assert_eq!(summary.steps, 4);
        assert_eq!(sim.writers().count(), 1);
    }

    #[test]
    fn nan_check_stops_the_run() {
        let mut sim = simulation(f64::NAN, 1.0).with_stop_iteration(10);
        sim.add_diagnostic(Schedule::IterationInterval(1), Box::new(NanCheck::new()))
            .unwrap();
        match sim.run() {
            Err(RunError::Diagnostic(DiagnosticError::NonFinite { field, iteration })) => {
                assert_eq!(field, "T");
                assert_eq!(iteration, 1);
            }
            other => panic!("expected NonFinite, got {other:?}"),
        }
    }

    #[test]
    fn invalid_dt_rejected() {
        let grid = Grid::new(
            [4, 4, 1],
            [Topology::Periodic, Topology::Periodic, Topology::Bounded],
            1,
            [1.0; 3],
        )
        .unwrap();
        let model = HydrostaticModel::new(
            ModelConfig::new(grid, [1, 1, 1]),
            LocalTransport::single(),
            Arc::new(Rate(0.0)),
        )
        .unwrap();
        assert!(Simulation::new(model, 0.0).is_err());
    }
}
