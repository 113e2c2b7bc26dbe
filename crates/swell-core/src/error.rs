//! Error types for the Swell solver core.
//!
//! Organized by subsystem: setup ([`ConfigError`]), inter-rank
//! communication ([`CommError`]), elliptic solves ([`SolverError`]),
//! external tendency kernels ([`TendencyError`]) and the time step
//! ([`StepError`]).
//!
//! Configuration and communication errors are fatal: a missed message
//! desynchronizes every rank, so nothing here retries. Solver convergence
//! failures are surfaced to the caller of the time-step API, which may
//! shrink the step and try again.

use std::error::Error;
use std::fmt;

use crate::grid::{Axis, Face};
use crate::id::{RankId, Tag};

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while building grids, rank topologies, or models.
///
/// Always raised at setup and never recovered.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// `Rx * Ry * Rz` does not equal the process-group size.
    RankCountMismatch {
        /// Requested rank counts per axis.
        ranks: [usize; 3],
        /// Size of the process group.
        group_size: usize,
    },
    /// A rank id is outside `[0, group_size)`.
    RankOutOfRange {
        /// The offending rank.
        rank: RankId,
        /// Size of the process group.
        group_size: usize,
    },
    /// An axis has zero cells or zero ranks.
    EmptyAxis {
        /// The empty axis.
        axis: Axis,
    },
    /// A `Flat` axis must have exactly one cell.
    FlatAxisExtent {
        /// The flat axis.
        axis: Axis,
        /// The configured number of cells.
        size: usize,
    },
    /// A `Flat` axis cannot be split across ranks.
    FlatAxisDecomposed {
        /// The flat axis.
        axis: Axis,
        /// The configured rank count.
        ranks: usize,
    },
    /// More ranks than cells along an axis.
    TooManyRanks {
        /// The axis being split.
        axis: Axis,
        /// Rank count along the axis.
        ranks: usize,
        /// Global cell count along the axis.
        cells: usize,
    },
    /// Halo width exceeds the local extent (or is zero on a non-flat axis).
    HaloTooWide {
        /// The axis.
        axis: Axis,
        /// Configured halo width.
        halo: usize,
        /// Local interior extent.
        local: usize,
    },
    /// Grid spacing is NaN, infinite, zero, or negative.
    InvalidSpacing {
        /// The axis.
        axis: Axis,
        /// The invalid spacing.
        value: f64,
    },
    /// The largest message tag does not fit the transport's tag range.
    TagOverflow {
        /// Size of the process group.
        group_size: usize,
        /// Largest tag the scheme would produce.
        max_tag: u64,
    },
    /// A boundary condition is incompatible with the grid topology.
    BoundaryMismatch {
        /// Field name.
        field: String,
        /// Offending face.
        face: Face,
        /// Description of the mismatch.
        reason: String,
    },
    /// The rank layout is not supported by the requested component.
    UnsupportedDecomposition {
        /// Description of the limitation.
        reason: String,
    },
    /// Two prognostic fields share a name.
    DuplicateField {
        /// The duplicated name.
        name: String,
    },
    /// A field name refers to nothing the model owns.
    UnknownField {
        /// The unknown name.
        name: String,
    },
    /// A numeric parameter is out of range.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Description of the violation.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RankCountMismatch { ranks, group_size } => write!(
                f,
                "rank layout {}x{}x{} needs {} ranks, process group has {group_size}",
                ranks[0],
                ranks[1],
                ranks[2],
                ranks[0] * ranks[1] * ranks[2]
            ),
            Self::RankOutOfRange { rank, group_size } => {
                write!(f, "rank {rank} out of range for group of {group_size}")
            }
            Self::EmptyAxis { axis } => write!(f, "axis {axis} has zero extent"),
            Self::FlatAxisExtent { axis, size } => {
                write!(f, "flat axis {axis} must have 1 cell, got {size}")
            }
            Self::FlatAxisDecomposed { axis, ranks } => {
                write!(f, "flat axis {axis} cannot be split across {ranks} ranks")
            }
            Self::TooManyRanks { axis, ranks, cells } => {
                write!(f, "cannot split {cells} cells on axis {axis} across {ranks} ranks")
            }
            Self::HaloTooWide { axis, halo, local } => write!(
                f,
                "halo width {halo} invalid for local extent {local} on axis {axis}"
            ),
            Self::InvalidSpacing { axis, value } => {
                write!(f, "spacing on axis {axis} must be finite and positive, got {value}")
            }
            Self::TagOverflow {
                group_size,
                max_tag,
            } => write!(
                f,
                "message tag {max_tag} for group of {group_size} exceeds i32::MAX"
            ),
            Self::BoundaryMismatch {
                field,
                face,
                reason,
            } => write!(f, "field '{field}' {face} boundary: {reason}"),
            Self::UnsupportedDecomposition { reason } => {
                write!(f, "unsupported decomposition: {reason}")
            }
            Self::DuplicateField { name } => write!(f, "duplicate field '{name}'"),
            Self::UnknownField { name } => write!(f, "no field named '{name}'"),
            Self::InvalidParameter { name, reason } => {
                write!(f, "invalid parameter '{name}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

// ── CommError ──────────────────────────────────────────────────────

/// Errors from point-to-point or collective communication.
///
/// Fatal: the run aborts rather than retrying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommError {
    /// The message could not be handed to the destination rank.
    SendFailed {
        /// Destination rank.
        dest: RankId,
        /// Message tag.
        tag: Tag,
    },
    /// The receive could not complete (peer gone).
    RecvFailed {
        /// Expected source rank.
        source: RankId,
        /// Message tag.
        tag: Tag,
    },
    /// No matching message arrived within the receive timeout.
    Timeout {
        /// Expected source rank.
        source: RankId,
        /// Message tag.
        tag: Tag,
        /// How long the receive waited, in milliseconds.
        waited_ms: u64,
    },
    /// A received buffer does not have the expected length.
    ShapeMismatch {
        /// Source rank.
        source: RankId,
        /// Message tag.
        tag: Tag,
        /// Expected number of values.
        expected: usize,
        /// Number of values received.
        actual: usize,
    },
    /// A peer rank id is outside the process group.
    InvalidPeer {
        /// The offending rank.
        rank: RankId,
        /// Size of the process group.
        group_size: usize,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendFailed { dest, tag } => {
                write!(f, "send to rank {dest} with tag {tag} failed")
            }
            Self::RecvFailed { source, tag } => {
                write!(f, "receive from rank {source} with tag {tag} failed")
            }
            Self::Timeout {
                source,
                tag,
                waited_ms,
            } => write!(
                f,
                "no message from rank {source} with tag {tag} after {waited_ms} ms"
            ),
            Self::ShapeMismatch {
                source,
                tag,
                expected,
                actual,
            } => write!(
                f,
                "message from rank {source} tag {tag}: expected {expected} values, got {actual}"
            ),
            Self::InvalidPeer { rank, group_size } => {
                write!(f, "peer rank {rank} outside group of {group_size}")
            }
        }
    }
}

impl Error for CommError {}

// ── SolverError ────────────────────────────────────────────────────

/// Errors from the distributed elliptic solvers.
#[derive(Clone, Debug, PartialEq)]
pub enum SolverError {
    /// The iterative solve did not reach tolerance within its budget.
    NotConverged {
        /// Iterations performed.
        iterations: usize,
        /// Final residual norm.
        residual: f64,
        /// Residual norm that was required.
        tolerance: f64,
    },
    /// The operator is not positive definite along a search direction.
    Breakdown {
        /// Iteration at which `p·Ap <= 0` was observed.
        iteration: usize,
    },
    /// Right-hand side and solution do not match the solver's grid.
    ShapeMismatch {
        /// Expected interior extent.
        expected: [usize; 3],
        /// Extent that was supplied.
        actual: [usize; 3],
    },
    /// Communication failed inside the solve.
    Communication(CommError),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConverged {
                iterations,
                residual,
                tolerance,
            } => write!(
                f,
                "solver did not converge after {iterations} iterations \
                 (residual {residual:e}, tolerance {tolerance:e})"
            ),
            Self::Breakdown { iteration } => {
                write!(f, "conjugate gradient breakdown at iteration {iteration}")
            }
            Self::ShapeMismatch { expected, actual } => {
                write!(f, "solver expects extent {expected:?}, got {actual:?}")
            }
            Self::Communication(e) => write!(f, "communication: {e}"),
        }
    }
}

impl Error for SolverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Communication(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CommError> for SolverError {
    fn from(e: CommError) -> Self {
        Self::Communication(e)
    }
}

// ── TendencyError ──────────────────────────────────────────────────

/// Errors returned by an external [`TendencyKernel`](crate::TendencyKernel).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TendencyError {
    /// The kernel has no formula for the requested field.
    UnknownField {
        /// The field that was requested.
        name: String,
    },
    /// The kernel failed while computing a tendency.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for TendencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownField { name } => write!(f, "no tendency for field '{name}'"),
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
        }
    }
}

impl Error for TendencyError {}

// ── StepError ──────────────────────────────────────────────────────

/// Errors from a single model time step.
#[derive(Clone, Debug, PartialEq)]
pub enum StepError {
    /// A tendency kernel failed for a field.
    Tendency {
        /// Name of the prognostic field.
        field: String,
        /// The underlying kernel error.
        reason: TendencyError,
    },
    /// A halo exchange or reduction failed. Fatal.
    Communication(CommError),
    /// The implicit free-surface solve did not converge.
    SolverConvergence(SolverError),
    /// The requested time step is not finite and positive.
    InvalidTimeStep {
        /// The rejected step.
        dt: f64,
    },
}

impl StepError {
    /// Whether the run must abort.
    ///
    /// Communication failures desynchronize ranks and are never
    /// recoverable. Everything else may be handled by the caller, for
    /// example by retrying with a smaller step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Communication(_))
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tendency { field, reason } => {
                write!(f, "tendency for '{field}' failed: {reason}")
            }
            Self::Communication(e) => write!(f, "communication failed: {e}"),
            Self::SolverConvergence(e) => write!(f, "free-surface solve failed: {e}"),
            Self::InvalidTimeStep { dt } => {
                write!(f, "time step must be finite and positive, got {dt}")
            }
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tendency { reason, .. } => Some(reason),
            Self::Communication(e) => Some(e),
            Self::SolverConvergence(e) => Some(e),
            Self::InvalidTimeStep { .. } => None,
        }
    }
}

impl From<CommError> for StepError {
    fn from(e: CommError) -> Self {
        Self::Communication(e)
    }
}

impl From<SolverError> for StepError {
    fn from(e: SolverError) -> Self {
        match e {
            SolverError::Communication(c) => Self::Communication(c),
            other => Self::SolverConvergence(other),
        }
    }
}
