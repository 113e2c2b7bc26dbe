//! Core types and traits for the Swell ocean solver.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Swell workspace:
//! rank and tag identifiers, the structured [`Grid`], halo-padded
//! [`Field`] storage, error types, and the tendency-kernel seam.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod field;
pub mod grid;
pub mod id;
pub mod traits;

pub use error::{CommError, ConfigError, SolverError, StepError, TendencyError};
pub use field::{Field, Location, SlabRegion};
pub use grid::{Axis, Face, Grid, Topology};
pub use id::{RankId, Tag};
pub use traits::{FieldSource, TendencyKernel};
