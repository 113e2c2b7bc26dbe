//! Test utilities and mock types for Swell development.
//!
//! Provides a thread-per-rank harness ([`run_ranks`]), a mock
//! [`FieldSource`] for exercising tendency kernels in isolation, and
//! reusable kernels in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::HashMap;

use swell_comm::{LocalGroup, LocalTransport, RankContext};
use swell_core::{Field, FieldSource, Grid};

/// Run `f` once per rank of a `ranks` decomposition of `global`, each on
/// its own thread over an in-process [`LocalGroup`].
///
/// Results are returned in rank order. Panics in any rank propagate.
pub fn run_ranks<R: Send>(
    global: &Grid,
    ranks: [usize; 3],
    f: impl Fn(RankContext<LocalTransport>) -> R + Sync,
) -> Vec<R> {
    let n = ranks.iter().product();
    let transports = LocalGroup::new(n).into_transports();
    std::thread::scope(|s| {
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                let f = &f;
                s.spawn(move || {
                    let ctx = RankContext::new(t, ranks, global)
                        .unwrap_or_else(|e| panic!("rank setup failed: {e}"));
                    f(ctx)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
            .collect()
    })
}

/// Fill a field's interior from a function of the global cell index.
pub fn fill_global(field: &mut Field, grid: &Grid, f: impl Fn([usize; 3]) -> f64) {
    let off = grid.offset();
    field.map_interior(|[i, j, k], _| f([off[0] + i, off[1] + j, off[2] + k]));
}

/// Mock implementation of [`FieldSource`].
///
/// Backed by a `HashMap<String, Field>`. Pre-populate fields with
/// [`insert`](MockFieldSource::insert) before passing to a kernel.
pub struct MockFieldSource {
    grid: Grid,
    fields: HashMap<String, Field>,
    time: f64,
}

impl MockFieldSource {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            fields: HashMap::new(),
            time: 0.0,
        }
    }

    /// Add a field, keyed by its own name.
    pub fn insert(&mut self, field: Field) {
        self.fields.insert(field.name().to_string(), field);
    }

    /// Set the reported model time.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Returns the number of fields held.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl FieldSource for MockFieldSource {
    fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn time(&self) -> f64 {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swell_core::Topology;

    #[test]
    fn harness_returns_results_in_rank_order() {
        let g = Grid::new(
            [8, 4, 1],
            [Topology::Periodic, Topology::Bounded, Topology::Flat],
            1,
            [1.0; 3],
        )
        .unwrap();
        let offsets = run_ranks(&g, [2, 1, 1], |ctx| ctx.grid().offset()[0]);
        assert_eq!(offsets, vec![0, 4]);
    }

    #[test]
    fn mock_source_looks_up_by_name() {
        let g = Grid::new(
            [4, 4, 1],
            [Topology::Periodic, Topology::Periodic, Topology::Flat],
            1,
            [1.0; 3],
        )
        .unwrap();
        let mut src = MockFieldSource::new(g.clone());
        let mut u = Field::new("u", &g);
        fill_global(&mut u, &g, |[i, _, _]| i as f64);
        src.insert(u);
        src.set_time(2.5);
        assert_eq!(src.field_count(), 1);
        assert_eq!(src.field("u").map(|f| f.get(3, 0, 0)), Some(3.0));
        assert!(src.field("v").is_none());
        assert_eq!(src.time(), 2.5);
    }
}
