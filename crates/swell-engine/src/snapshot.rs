//! Read-only views of model state.
//!
//! A [`ModelSnapshot`] borrows the model immutably, so it cannot outlive
//! the next `time_step()` call. The model only hands out snapshots
//! between steps (after the trailing halo exchange) and, internally, to
//! tendency kernels before any field is mutated.

use indexmap::IndexMap;
use swell_core::{Field, FieldSource, Grid};

use crate::clock::Clock;
use crate::config::{ETA, U, V};

/// Named fields of one rank at one instant.
#[derive(Clone, Copy)]
pub struct ModelSnapshot<'m> {
    grid: &'m Grid,
    u: &'m Field,
    v: &'m Field,
    tracers: &'m IndexMap<String, Field>,
    eta: &'m Field,
    clock: Clock,
}

impl<'m> ModelSnapshot<'m> {
    pub(crate) fn new(
        grid: &'m Grid,
        [u, v]: [&'m Field; 2],
        tracers: &'m IndexMap<String, Field>,
        eta: &'m Field,
        clock: Clock,
    ) -> Self {
        Self {
            grid,
            u,
            v,
            tracers,
            eta,
            clock,
        }
    }

    /// Time and iteration of this state.
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Every field by name: velocities, tracers, then `eta`.
    pub fn arrays(&self) -> impl Iterator<Item = (&'m str, &'m Field)> + 'm {
        let (u, v, tracers, eta) = (self.u, self.v, self.tracers, self.eta);
        [(U, u), (V, v)]
            .into_iter()
            .chain(tracers.iter().map(|(k, f)| (k.as_str(), f)))
            .chain(std::iter::once((ETA, eta)))
    }
}

impl FieldSource for ModelSnapshot<'_> {
    fn field(&self, name: &str) -> Option<&Field> {
        match name {
            U => Some(self.u),
            V => Some(self.v),
            ETA => Some(self.eta),
            tracer => self.tracers.get(tracer),
        }
    }

    fn grid(&self) -> &Grid {
        self.grid
    }

    fn time(&self) -> f64 {
        self.clock.time
    }
}
