//! Per-rank communication context and deterministic collectives.

use std::sync::Arc;

use swell_core::{CommError, ConfigError, Grid, RankId, Tag};
use swell_topology::{decompose, RankConnectivity, RankTopology};

use crate::boundary::{BoundaryEvaluator, DefaultBoundaryEvaluator};
use crate::tag::{CollectiveKind, TagScheme};
use crate::transport::Transport;

const ROOT: RankId = RankId(0);

/// Everything one rank needs to talk to the rest of the group.
///
/// Built once at setup from a transport, the requested rank counts, and
/// the global grid. All derived data (topology, connectivity, tags, local
/// grid) is immutable afterwards.
///
/// # Examples
///
/// ```
/// use swell_comm::{LocalTransport, RankContext};
/// use swell_core::{Grid, Topology};
///
/// let global = Grid::new(
///     [8, 8, 1],
///     [Topology::Periodic, Topology::Periodic, Topology::Flat],
///     1,
///     [1.0, 1.0, 1.0],
/// )
/// .unwrap();
/// let ctx = RankContext::new(LocalTransport::single(), [1, 1, 1], &global).unwrap();
/// assert_eq!(ctx.all_reduce_sum(2.5).unwrap(), 2.5);
/// ```
pub struct RankContext<T> {
    transport: T,
    topology: RankTopology,
    connectivity: RankConnectivity,
    tags: TagScheme,
    grid: Grid,
    evaluator: Arc<dyn BoundaryEvaluator>,
}

impl<T: Transport> RankContext<T> {
    /// Set up this rank's view of a decomposition of `global` over
    /// `ranks = (Rx, Ry, Rz)`.
    pub fn new(transport: T, ranks: [usize; 3], global: &Grid) -> Result<Self, ConfigError> {
        let topology = RankTopology::new(ranks, transport.rank(), transport.size())?;
        let grid = decompose(global, &topology)?;
        let connectivity = RankConnectivity::new(&topology, global.topologies());
        let tags = TagScheme::new(transport.size())?;
        tracing::info!(
            rank = topology.rank().0,
            index = ?topology.index(),
            local = ?grid.local_size(),
            offset = ?grid.offset(),
            "rank context ready"
        );
        Ok(Self {
            transport,
            topology,
            connectivity,
            tags,
            grid,
            evaluator: Arc::new(DefaultBoundaryEvaluator),
        })
    }

    /// Replace the evaluator used for physical boundary faces.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn BoundaryEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// This rank's id.
    pub fn rank(&self) -> RankId {
        self.topology.rank()
    }

    /// Number of ranks in the group.
    pub fn size(&self) -> usize {
        self.topology.total()
    }

    /// This rank's place in the process grid.
    pub fn topology(&self) -> &RankTopology {
        &self.topology
    }

    /// Neighbour ranks.
    pub fn connectivity(&self) -> &RankConnectivity {
        &self.connectivity
    }

    /// Tag encoding for this group.
    pub fn tags(&self) -> &TagScheme {
        &self.tags
    }

    /// This rank's subdomain.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Evaluator for physical boundary faces.
    pub fn evaluator(&self) -> &dyn BoundaryEvaluator {
        self.evaluator.as_ref()
    }

    /// Element-wise sum of `values` over all ranks.
    ///
    /// Contributions are combined at rank 0 in rank order and broadcast,
    /// so every rank receives bit-identical results regardless of
    /// message timing.
    pub fn all_reduce_sum_vec(&self, values: &[f64]) -> Result<Vec<f64>, CommError> {
        self.all_reduce(values, CollectiveKind::Reduce, |a, b| a + b)
    }

    /// Sum of `value` over all ranks.
    pub fn all_reduce_sum(&self, value: f64) -> Result<f64, CommError> {
        Ok(self.all_reduce_sum_vec(&[value])?[0])
    }

    /// Maximum of `value` over all ranks. NaN propagates.
    pub fn all_reduce_max(&self, value: f64) -> Result<f64, CommError> {
        let out = self.all_reduce(&[value], CollectiveKind::Reduce, |a, b| {
            if a.is_nan() || b.is_nan() {
                f64::NAN
            } else {
                a.max(b)
            }
        })?;
        Ok(out[0])
    }

    /// Block until every rank has reached the barrier.
    pub fn barrier(&self) -> Result<(), CommError> {
        self.all_reduce(&[], CollectiveKind::Barrier, |a, _| a)
            .map(|_| ())
    }

    fn all_reduce(
        &self,
        values: &[f64],
        kind: CollectiveKind,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<Vec<f64>, CommError> {
        let n = self.size();
        if n == 1 {
            return Ok(values.to_vec());
        }
        let gather = self.tags.reserved_tag(kind);
        let scatter = self.tags.reserved_tag(CollectiveKind::Broadcast);
        if self.rank() == ROOT {
            let mut acc = values.to_vec();
            for r in 1..n {
                let part = self.recv_exact(RankId(r), gather, acc.len())?;
                for (a, b) in acc.iter_mut().zip(part) {
                    *a = op(*a, b);
                }
            }
            let mut pending = Vec::with_capacity(n - 1);
            for r in 1..n {
                pending.push(self.transport.isend(RankId(r), scatter, acc.clone())?);
            }
            for req in pending {
                req.wait()?;
            }
            Ok(acc)
        } else {
            self.transport
                .isend(ROOT, gather, values.to_vec())?
                .wait()?;
            self.recv_exact(ROOT, scatter, values.len())
        }
    }

    /// Receive from `source` and check the payload length.
    pub fn recv_exact(&self, source: RankId, tag: Tag, expected: usize) -> Result<Vec<f64>, CommError> {
        let data = self.transport.recv(source, tag)?;
        if data.len() != expected {
            return Err(CommError::ShapeMismatch {
                source,
                tag,
                expected,
                actual: data.len(),
            });
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{LocalGroup, LocalTransport};
    use swell_core::Topology;

    fn global() -> Grid {
        Grid::new(
            [12, 12, 4],
            [Topology::Periodic, Topology::Bounded, Topology::Bounded],
            1,
            [1.0, 1.0, 1.0],
        )
        .unwrap()
    }

    fn run<R: Send>(ranks: [usize; 3], f: impl Fn(RankContext<LocalTransport>) -> R + Sync) -> Vec<R> {
        let n = ranks.iter().product();
        let transports = LocalGroup::new(n).into_transports();
        let g = global();
        std::thread::scope(|s| {
            let handles: Vec<_> = transports
                .into_iter()
                .map(|t| {
                    let f = &f;
                    let g = &g;
                    s.spawn(move || f(RankContext::new(t, ranks, g).unwrap()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn group_size_must_match_rank_product() {
        let err = RankContext::new(LocalTransport::single(), [2, 1, 1], &global())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::RankCountMismatch { .. }));
    }

    #[test]
    fn sum_is_identical_on_every_rank() {
        let sums = run([2, 3, 1], |ctx| {
            let x = 0.1 * (ctx.rank().0 as f64 + 1.0);
            ctx.all_reduce_sum(x).unwrap().to_bits()
        });
        assert!(sums.windows(2).all(|w| w[0] == w[1]));
        let expected = (1..=6).fold(0.0, |acc, r| acc + 0.1 * r as f64);
        assert_eq!(f64::from_bits(sums[0]), expected);
    }

    #[test]
    fn max_and_vector_sum() {
        let out = run([3, 1, 1], |ctx| {
            let r = ctx.rank().0 as f64;
            let m = ctx.all_reduce_max(-r).unwrap();
            let v = ctx.all_reduce_sum_vec(&[r, 1.0]).unwrap();
            ctx.barrier().unwrap();
            (m, v)
        });
        for (m, v) in out {
            assert_eq!(m, 0.0);
            assert_eq!(v, vec![3.0, 3.0]);
        }
    }

    #[test]
    fn local_grids_tile_global() {
        let extents = run([2, 2, 1], |ctx| ctx.grid().local_size()[0] * ctx.grid().local_size()[1]);
        assert_eq!(extents.iter().sum::<usize>(), 144);
    }
}
