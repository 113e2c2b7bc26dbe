//! Model configuration and validation.
//!
//! [`ModelConfig`] is the builder input for constructing a
//! [`HydrostaticModel`](crate::model::HydrostaticModel).
//! [`validate()`](ModelConfig::validate) checks structural invariants
//! before any rank communicates, so every rank fails the same way.

use swell_comm::BoundaryCondition;
use swell_core::{Axis, ConfigError, Face, Grid, Topology};
use swell_solver::PcgConfig;

/// Zonal velocity.
pub const U: &str = "u";
/// Meridional velocity.
pub const V: &str = "v";
/// Free-surface height.
pub const ETA: &str = "eta";

// ── FreeSurfaceConfig ──────────────────────────────────────────────

/// How the implicit free-surface system is inverted.
#[derive(Clone, Debug, PartialEq)]
pub enum ImplicitSolverMethod {
    /// Jacobi-preconditioned conjugate gradients. Works with any
    /// combination of periodic and walled horizontal boundaries.
    ConjugateGradient(PcgConfig),
    /// Direct FFT/cosine-transform Helmholtz solve. Requires periodic or
    /// no-flux free-surface boundaries.
    Spectral,
}

impl Default for ImplicitSolverMethod {
    fn default() -> Self {
        Self::ConjugateGradient(PcgConfig::default())
    }
}

/// Free-surface treatment.
#[derive(Clone, Debug, PartialEq)]
pub enum FreeSurfaceConfig {
    /// `η` advanced by AB2 from the divergence of the barotropic
    /// transport. Limited by the surface gravity-wave CFL.
    Explicit {
        /// Gravitational acceleration, m s⁻².
        gravity: f64,
    },
    /// `η` obtained from an elliptic solve each step, followed by a
    /// barotropic velocity correction.
    Implicit {
        /// Gravitational acceleration, m s⁻².
        gravity: f64,
        /// Linear solver for the free-surface system.
        solver: ImplicitSolverMethod,
    },
}

impl Default for FreeSurfaceConfig {
    fn default() -> Self {
        Self::Implicit {
            gravity: 9.81,
            solver: ImplicitSolverMethod::default(),
        }
    }
}

impl FreeSurfaceConfig {
    /// Gravitational acceleration of either variant.
    pub fn gravity(&self) -> f64 {
        match self {
            Self::Explicit { gravity } | Self::Implicit { gravity, .. } => *gravity,
        }
    }
}

// ── BoundaryOverride ───────────────────────────────────────────────

/// Replace the default condition of one field on one face.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryOverride {
    /// Field name (`"u"`, `"v"`, `"eta"` or a tracer).
    pub field: String,
    /// The face to override.
    pub face: Face,
    /// The new condition.
    pub condition: BoundaryCondition,
}

// ── ModelConfig ────────────────────────────────────────────────────

/// Complete configuration for constructing a model.
///
/// The same configuration must be given to every rank.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// The global grid.
    pub grid: Grid,
    /// Ranks per axis `(Rx, Ry, Rz)`. `Rz` must be 1.
    pub ranks: [usize; 3],
    /// Tracer names, in the order they are stepped.
    pub tracers: Vec<String>,
    /// Free-surface treatment.
    pub free_surface: FreeSurfaceConfig,
    /// AB2 off-centering χ for every step after the first. Default: 0.1.
    pub chi: f64,
    /// Per-field, per-face boundary overrides applied on top of the
    /// defaults (impenetrable walls for normal velocity, no-flux
    /// elsewhere, periodic on periodic axes).
    pub boundary_conditions: Vec<BoundaryOverride>,
}

impl ModelConfig {
    /// A configuration with no tracers, the default implicit free
    /// surface, and χ = 0.1.
    pub fn new(grid: Grid, ranks: [usize; 3]) -> Self {
        Self {
            grid,
            ranks,
            tracers: Vec::new(),
            free_surface: FreeSurfaceConfig::default(),
            chi: 0.1,
            boundary_conditions: Vec::new(),
        }
    }

    /// Add a tracer.
    pub fn with_tracer(mut self, name: impl Into<String>) -> Self {
        self.tracers.push(name.into());
        self
    }

    /// Choose the free-surface treatment.
    pub fn with_free_surface(mut self, free_surface: FreeSurfaceConfig) -> Self {
        self.free_surface = free_surface;
        self
    }

    /// Override one boundary condition.
    pub fn with_boundary(
        mut self,
        field: impl Into<String>,
        face: Face,
        condition: BoundaryCondition,
    ) -> Self {
        self.boundary_conditions.push(BoundaryOverride {
            field: field.into(),
            face,
            condition,
        });
        self
    }

    /// All field names the model owns: velocities, tracers, then `η`.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        [U, V]
            .into_iter()
            .chain(self.tracers.iter().map(String::as_str))
            .chain(std::iter::once(ETA))
    }

    /// Validate all structural invariants.
    ///
    /// Rank-count agreement with the process group is checked later,
    /// when the rank context is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. The vertical must live on one rank: transports are column sums.
        if self.ranks[2] != 1 {
            return Err(ConfigError::UnsupportedDecomposition {
                reason: format!(
                    "vertical columns must not be split, got Rz = {}",
                    self.ranks[2]
                ),
            });
        }
        if self.grid.topology(Axis::Z) == Topology::Periodic {
            return Err(ConfigError::UnsupportedDecomposition {
                reason: "the vertical axis cannot be periodic".into(),
            });
        }
        // 2. χ finite and no less than the forward-Euler value.
        if !self.chi.is_finite() || self.chi < -0.5 {
            return Err(ConfigError::InvalidParameter {
                name: "chi",
                reason: format!("must be finite and at least -0.5, got {}", self.chi),
            });
        }
        // 3. Free surface.
        let g = self.free_surface.gravity();
        if !g.is_finite() || g <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "gravity",
                reason: format!("must be finite and positive, got {g}"),
            });
        }
        if let FreeSurfaceConfig::Implicit {
            solver: ImplicitSolverMethod::ConjugateGradient(pcg),
            ..
        } = &self.free_surface
        {
            pcg.validate()?;
        }
        // 4. Tracer names are unique and do not shadow built-in fields.
        let mut seen: Vec<&str> = Vec::with_capacity(self.tracers.len() + 3);
        for name in self.field_names() {
            if name.is_empty() {
                return Err(ConfigError::InvalidParameter {
                    name: "tracers",
                    reason: "tracer names must not be empty".into(),
                });
            }
            if seen.contains(&name) {
                return Err(ConfigError::DuplicateField {
                    name: name.to_string(),
                });
            }
            seen.push(name);
        }
        // 5. Overrides name real fields; communication is never configured.
        for o in &self.boundary_conditions {
            if !seen.contains(&o.field.as_str()) {
                return Err(ConfigError::UnknownField {
                    name: o.field.clone(),
                });
            }
            if o.condition.peer().is_some() {
                return Err(ConfigError::BoundaryMismatch {
                    field: o.field.clone(),
                    face: o.face,
                    reason: "halo communication is derived from the decomposition".into(),
                });
            }
            if o.field == ETA && o.face.axis() == Axis::Z {
                return Err(ConfigError::BoundaryMismatch {
                    field: o.field.clone(),
                    face: o.face,
                    reason: "the free surface has no vertical boundaries".into(),
                });
            }
        }
        // 6. The spectral solve only diagonalizes periodic and no-flux edges.
        if let FreeSurfaceConfig::Implicit {
            solver: ImplicitSolverMethod::Spectral,
            ..
        } = &self.free_surface
        {
            for o in self.boundary_conditions.iter().filter(|o| o.field == ETA) {
                if matches!(o.condition, BoundaryCondition::Value(_)) {
                    return Err(ConfigError::BoundaryMismatch {
                        field: ETA.to_string(),
                        face: o.face,
                        reason: "spectral free-surface solve needs no-flux walls".into(),
                    });
                }
            }
        }
        Ok(())
    }
}
