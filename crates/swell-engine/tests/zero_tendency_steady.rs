//! Integration test: with zero tendencies and a flat free surface at
//! rest, stepping changes nothing, halos included.
//!
//! The spectral solve reproduces a flat surface only to rounding, so
//! fields are compared to a tight tolerance rather than bitwise.

use std::sync::Arc;

use swell_core::{Grid, Topology};
use swell_engine::{FreeSurfaceConfig, HydrostaticModel, ImplicitSolverMethod, ModelConfig};
use swell_test_utils::fixtures::ZeroTendency;
use swell_test_utils::run_ranks;

fn steady(free_surface: FreeSurfaceConfig) {
    let grid = Grid::new(
        [12, 10, 3],
        [Topology::Periodic, Topology::Bounded, Topology::Bounded],
        2,
        [750.0, 750.0, 30.0],
    )
    .unwrap();
    run_ranks(&grid, [2, 2, 1], |ctx| {
        let config = ModelConfig::new(grid.clone(), [2, 2, 1])
            .with_tracer("T")
            .with_tracer("S")
            .with_free_surface(free_surface.clone());
        let mut model =
            HydrostaticModel::from_context(config, ctx, Arc::new(ZeroTendency)).unwrap();
        model
            .set_field_by_index("T", |[i, j, k]| (i * 100 + j * 10 + k) as f64)
            .unwrap();
        model.set_field("S", |[x, _, z]| 35.0 + x * 1e-4 - z * 1e-3).unwrap();
        model.set_field("eta", |_| 0.3).unwrap();
        model.initialize().unwrap();

        let before: Vec<Vec<f64>> = model
            .snapshot()
            .arrays()
            .map(|(_, f)| f.as_slice().to_vec())
            .collect();
        for _ in 0..3 {
            model.time_step(120.0).unwrap();
        }
        let after: Vec<Vec<f64>> = model
            .snapshot()
            .arrays()
            .map(|(_, f)| f.as_slice().to_vec())
            .collect();
        for (b, a) in before.iter().flatten().zip(after.iter().flatten()) {
            assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0), "{b} became {a}");
        }
        assert_eq!(model.clock().iteration, 3);
    });
}

#[test]
fn steady_under_explicit_free_surface() {
    steady(FreeSurfaceConfig::Explicit { gravity: 9.81 });
}

#[test]
fn steady_under_implicit_pcg() {
    steady(FreeSurfaceConfig::default());
}

#[test]
fn steady_under_implicit_spectral() {
    steady(FreeSurfaceConfig::Implicit {
        gravity: 9.81,
        solver: ImplicitSolverMethod::Spectral,
    });
}
