//! Swell: distributed time stepping for hydrostatic free-surface models.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Swell sub-crates. For most users, adding `swell` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use swell::prelude::*;
//!
//! // Relaxes every field toward zero.
//! struct Relax;
//! impl TendencyKernel for Relax {
//!     fn compute(
//!         &self,
//!         name: &str,
//!         state: &dyn FieldSource,
//!         out: &mut Field,
//!     ) -> Result<(), TendencyError> {
//!         let phi = state.field(name).ok_or_else(|| TendencyError::UnknownField {
//!             name: name.to_string(),
//!         })?;
//!         out.map_interior(|[i, j, k], _| -1e-3 * phi.get(i as isize, j as isize, k as isize));
//!         Ok(())
//!     }
//! }
//!
//! // A 16×16×4 channel, periodic east-west, walled north-south.
//! let grid = Grid::new(
//!     [16, 16, 4],
//!     [Topology::Periodic, Topology::Bounded, Topology::Bounded],
//!     1,
//!     [1000.0, 1000.0, 25.0],
//! )
//! .unwrap();
//! let config = ModelConfig::new(grid, [1, 1, 1]).with_tracer("T");
//! let mut model = HydrostaticModel::new(config, LocalTransport::single(), Arc::new(Relax)).unwrap();
//! model.set_field("T", |[_, y, _]| 20.0 - y / 1000.0).unwrap();
//!
//! let mut sim = Simulation::new(model, 60.0).unwrap().with_stop_iteration(10);
//! sim.add_diagnostic(Schedule::IterationInterval(1), Box::new(NanCheck::new()))
//!     .unwrap();
//! let summary = sim.run().unwrap();
//! assert_eq!(summary.clock.iteration, 10);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `swell-core` | Grid, fields, errors, kernel traits |
//! | [`topology`] | `swell-topology` | Rank layout, decomposition, connectivity |
//! | [`comm`] | `swell-comm` | Transport, tags, boundary conditions, halo exchange |
//! | [`solver`] | `swell-solver` | Spectral and conjugate-gradient elliptic solvers |
//! | [`engine`] | `swell-engine` | The model, AB2 stepping, free surface, run loop |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and errors (`swell-core`).
///
/// Contains [`types::Grid`], [`types::Field`], the error taxonomy, and the
/// two seams to user code ([`types::FieldSource`],
/// [`types::TendencyKernel`]).
pub use swell_core as types;

/// Rank layout and domain decomposition (`swell-topology`).
pub use swell_topology as topology;

/// Inter-rank communication (`swell-comm`).
///
/// [`comm::Transport`] is the message-passing seam; [`comm::LocalGroup`]
/// runs a whole process group in one address space.
pub use swell_comm as comm;

/// Distributed elliptic solvers (`swell-solver`).
pub use swell_solver as solver;

/// Time stepping (`swell-engine`).
///
/// [`engine::HydrostaticModel`] steps one rank; [`engine::Simulation`]
/// drives it to a stop condition.
pub use swell_engine as engine;

/// Common imports for typical Swell usage.
///
/// ```rust
/// use swell::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use swell_core::{
        Axis, Face, Field, FieldSource, Grid, Location, TendencyKernel, Topology,
    };

    // Errors
    pub use swell_core::{CommError, ConfigError, SolverError, StepError, TendencyError};

    // Communication
    pub use swell_comm::{
        BoundaryCondition, LocalGroup, LocalTransport, RankContext, Transport,
    };

    // Solvers
    pub use swell_solver::{EllipticSolver, PcgConfig, SolveReport};

    // Engine
    pub use swell_engine::{
        Clock, FreeSurfaceConfig, HydrostaticModel, ImplicitSolverMethod, ModelConfig,
        ModelSnapshot, NanCheck, OutputWriter, RunError, RunSummary, Schedule, Simulation,
        StepMetrics,
    };
}
