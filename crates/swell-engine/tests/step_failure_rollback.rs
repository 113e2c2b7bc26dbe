//! Integration test: failed steps leave the model untouched.
//!
//! A tendency failure or a non-converged free-surface solve must surface
//! as a non-fatal `StepError`, keep every field and the latest tendency
//! as they were, and let the caller step again.

use std::sync::Arc;

use swell_comm::LocalTransport;
use swell_core::{Grid, SolverError, StepError, TendencyKernel, Topology};
use swell_engine::{FreeSurfaceConfig, HydrostaticModel, ImplicitSolverMethod, ModelConfig, ETA};
use swell_solver::PcgConfig;
use swell_test_utils::fixtures::{ConstantTendency, FailingTendency};

fn grid() -> Grid {
    Grid::new(
        [8, 6, 3],
        [Topology::Periodic, Topology::Bounded, Topology::Bounded],
        1,
        [500.0, 500.0, 20.0],
    )
    .unwrap()
}

fn model(
    free_surface: FreeSurfaceConfig,
    kernel: Arc<dyn TendencyKernel>,
) -> HydrostaticModel<LocalTransport> {
    let config = ModelConfig::new(grid(), [1, 1, 1])
        .with_tracer("T")
        .with_free_surface(free_surface);
    HydrostaticModel::new(config, LocalTransport::single(), kernel).unwrap()
}

/// Every field's full storage, halos included.
fn state(model: &HydrostaticModel<LocalTransport>) -> Vec<Vec<f64>> {
    model
        .snapshot()
        .arrays()
        .map(|(_, f)| f.as_slice().to_vec())
        .collect()
}

#[test]
fn tendency_failure_keeps_state() {
    // u, v and T each call the kernel once per step: the second step fails.
    let kernel = Arc::new(FailingTendency::new(3));
    let mut m = model(FreeSurfaceConfig::default(), kernel.clone());
    m.set_field("T", |[x, _, _]| x / 1000.0).unwrap();
    m.set_field(ETA, |[_, y, _]| 1e-3 * y / 3000.0).unwrap();
    m.time_step(10.0).unwrap();

    let before = state(&m);
    let latest = m.tendency("T").unwrap().current().clone();
    let clock = m.clock();

    let err = m.time_step(10.0).unwrap_err();
    assert!(matches!(err, StepError::Tendency { .. }));
    assert!(!err.is_fatal());
    assert_eq!(kernel.calls(), 6);
    assert_eq!(state(&m), before);
    assert_eq!(m.tendency("T").unwrap().current(), &latest);
    assert_eq!(m.clock(), clock);
}

#[test]
fn solver_failure_rolls_back_and_can_retry() {
    let starved = FreeSurfaceConfig::Implicit {
        gravity: 9.81,
        solver: ImplicitSolverMethod::ConjugateGradient(PcgConfig {
            max_iter: 1,
            ..PcgConfig::default()
        }),
    };
    let kernel = Arc::new(
        ConstantTendency::new()
            .with_rate("T", 1e-3)
            .with_rate("u", 1e-4),
    );
    let mut m = model(starved, kernel);
    m.set_field(ETA, |[x, y, _]| {
        0.1 * (-((x - 2000.0).powi(2) + (y - 1500.0).powi(2)) / 1e6).exp()
    })
    .unwrap();
    m.initialize().unwrap();

    let before = state(&m);
    let latest: Vec<_> = ["u", "v", "T"]
        .map(|n| m.tendency(n).unwrap().current().clone())
        .into();

    let err = m.time_step(60.0).unwrap_err();
    assert!(matches!(
        err,
        StepError::SolverConvergence(SolverError::NotConverged { .. })
    ));
    assert!(!err.is_fatal());
    assert_eq!(state(&m), before);
    for (name, g) in ["u", "v", "T"].into_iter().zip(&latest) {
        assert_eq!(m.tendency(name).unwrap().current(), g, "{name}");
    }
    assert_eq!(m.clock().iteration, 0);
    // The retry still counts as the first step.
    assert!(m.clock().is_first_step());
}

#[test]
fn explicit_model_survives_a_failed_step() {
    let kernel = Arc::new(FailingTendency::new(3));
    let mut m = model(FreeSurfaceConfig::Explicit { gravity: 9.81 }, kernel);
    m.time_step(1.0).unwrap();
    let before = state(&m);
    assert!(m.time_step(1.0).is_err());
    assert_eq!(state(&m), before);
    assert_eq!(m.clock().iteration, 1);
}
