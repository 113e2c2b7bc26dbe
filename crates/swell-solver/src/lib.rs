//! Distributed elliptic solvers for Swell.
//!
//! Two solvers share the [`EllipticSolver`] interface:
//!
//! - [`SpectralPoissonSolver`] diagonalizes the discrete Laplacian with
//!   FFTs (periodic axes) and cosine transforms (bounded axes) over a
//!   pencil decomposition. Direct and exact to discretization error.
//! - [`ConjugateGradientSolver`] runs Jacobi-preconditioned conjugate
//!   gradients against any symmetric positive-definite
//!   [`LinearOperator`], such as the implicit free-surface operator.
//!
//! The [`operators`] module provides the halo-exchanged Laplacian and
//! divergence stencils used to build right-hand sides and check
//! residuals.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod elliptic;
pub mod operators;
pub mod pcg;
pub mod pencil;
pub mod spectral;

pub use elliptic::{EllipticSolver, SolveReport};
pub use operators::{divergence, laplacian, ImplicitFreeSurfaceOperator};
pub use pcg::{ConjugateGradientSolver, LinearOperator, PcgConfig};
pub use spectral::SpectralPoissonSolver;
