//! Second-order Adams–Bashforth with off-centering.
//!
//! ```text
//! φⁿ⁺¹ = φⁿ + Δt [ (3/2 + χ) Gⁿ − (1/2 + χ) G⁻ ]
//! ```
//!
//! χ = −1/2 reduces to forward Euler, which is what the first step uses
//! since no previous tendency exists yet. A small positive χ damps the
//! computational mode of the two-level scheme.

use swell_core::Field;

use crate::tendency::TendencyState;

/// The weights applied to `Gⁿ` and `G⁻`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ab2Coefficients {
    /// Weight of `Gⁿ`, `3/2 + χ`.
    pub current: f64,
    /// Weight of `G⁻`, `1/2 + χ` (subtracted).
    pub previous: f64,
}

impl Ab2Coefficients {
    /// Coefficients for off-centering `chi`.
    pub fn new(chi: f64) -> Self {
        Self {
            current: 1.5 + chi,
            previous: 0.5 + chi,
        }
    }

    /// Forward Euler: `Gⁿ` only.
    pub fn forward_euler() -> Self {
        Self::new(-0.5)
    }

    /// Forward Euler on the first step, `chi` afterwards.
    pub fn for_step(first: bool, chi: f64) -> Self {
        if first {
            Self::forward_euler()
        } else {
            Self::new(chi)
        }
    }
}

/// Advance the interior of `phi` by one step. Halos are left stale.
pub fn ab2_update(phi: &mut Field, tendency: &TendencyState, dt: f64, c: Ab2Coefficients) {
    let (gn, gm) = (tendency.current(), tendency.previous());
    phi.map_interior(|[i, j, k], v| {
        let (i, j, k) = (i as isize, j as isize, k as isize);
        v + dt * (c.current * gn.get(i, j, k) - c.previous * gm.get(i, j, k))
    });
}
