//! Time-stepping engine for Swell.
//!
//! [`HydrostaticModel`] advances velocities, tracers, and the free
//! surface of one rank with an off-centered Adams–Bashforth scheme:
//!
//! 1. tendencies for every prognostic field, computed concurrently by a
//!    user [`TendencyKernel`](swell_core::TendencyKernel);
//! 2. the AB2 update of every field;
//! 3. the free surface, either explicit or an elliptic solve followed by
//!    a barotropic velocity correction;
//! 4. a batched trailing halo exchange.
//!
//! [`Simulation`] drives a model to a stop iteration or time, offering
//! the state to [`OutputWriter`]s and [`Diagnostic`]s on [`Schedule`]s.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod ab2;
pub mod clock;
pub mod config;
pub mod free_surface;
pub mod metrics;
pub mod model;
pub mod output;
pub mod simulation;
pub mod snapshot;
mod stage;
pub mod tendency;

pub use ab2::{ab2_update, Ab2Coefficients};
pub use clock::Clock;
pub use config::{
    BoundaryOverride, FreeSurfaceConfig, ImplicitSolverMethod, ModelConfig, ETA, U, V,
};
pub use free_surface::{
    ExplicitFreeSurface, FreeSurface, FreeSurfaceState, ImplicitFreeSurface, Velocities,
};
pub use metrics::StepMetrics;
pub use model::HydrostaticModel;
pub use output::{
    Diagnostic, DiagnosticError, FieldRecorder, NanCheck, OutputError, OutputWriter, Record,
    Schedule,
};
pub use simulation::{RunError, RunSummary, Simulation};
pub use snapshot::ModelSnapshot;
pub use tendency::TendencyState;
