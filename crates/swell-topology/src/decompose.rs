//! Splitting a global grid into per-rank subdomains.

use swell_core::{Axis, ConfigError, Grid, Topology};

use crate::rank::RankTopology;

/// The `(start, len)` of part `index` (0-based) when `n` cells are split
/// into `parts` contiguous pieces.
///
/// Every part gets `n / parts` cells and the first `n % parts` parts get
/// one more, so the lengths differ by at most one and sum to `n`.
///
/// # Examples
///
/// ```
/// use swell_topology::partition;
///
/// assert_eq!(partition(10, 3, 0), (0, 4));
/// assert_eq!(partition(10, 3, 1), (4, 3));
/// assert_eq!(partition(10, 3, 2), (7, 3));
/// ```
pub fn partition(n: usize, parts: usize, index: usize) -> (usize, usize) {
    let base = n / parts;
    let extra = n % parts;
    let len = base + usize::from(index < extra);
    let start = index * base + index.min(extra);
    (start, len)
}

/// This rank's subdomain of `global`.
///
/// The local grid keeps the global topology, spacing, and halo width; only
/// its extent and offset change. Fails if an axis has more ranks than
/// cells, if a flat axis is split, or if a local extent ends up narrower
/// than the halo.
pub fn decompose(global: &Grid, topology: &RankTopology) -> Result<Grid, ConfigError> {
    let n = global.global_size();
    let index = topology.index();
    let mut local = [0usize; 3];
    let mut offset = [0usize; 3];
    for axis in Axis::ALL {
        let a = axis.index();
        let ranks = topology.rank_count(axis);
        if global.topology(axis) == Topology::Flat && ranks > 1 {
            return Err(ConfigError::FlatAxisDecomposed { axis, ranks });
        }
        if ranks > n[a] {
            return Err(ConfigError::TooManyRanks {
                axis,
                ranks,
                cells: n[a],
            });
        }
        let (start, len) = partition(n[a], ranks, index[a] - 1);
        offset[a] = start;
        local[a] = len;
    }
    global.with_local(local, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use swell_core::RankId;

    fn global(size: [usize; 3], halo: usize) -> Grid {
        Grid::new(
            size,
            [Topology::Periodic, Topology::Bounded, Topology::Bounded],
            halo,
            [1.0, 1.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn even_split_has_equal_extents() {
        let g = global([32, 32, 32], 1);
        let t = RankTopology::new([1, 2, 1], RankId(1), 2).unwrap();
        let local = decompose(&g, &t).unwrap();
        assert_eq!(local.local_size(), [32, 16, 32]);
        assert_eq!(local.offset(), [0, 16, 0]);
        assert_eq!(local.global_size(), [32, 32, 32]);
    }

    #[test]
    fn too_many_ranks_rejected() {
        let g = global([4, 4, 4], 1);
        let t = RankTopology::new([8, 1, 1], RankId(0), 8).unwrap();
        assert_eq!(
            decompose(&g, &t).unwrap_err(),
            ConfigError::TooManyRanks {
                axis: Axis::X,
                ranks: 8,
                cells: 4
            }
        );
    }

    #[test]
    fn split_flat_axis_rejected() {
        let g = Grid::new(
            [8, 8, 1],
            [Topology::Periodic, Topology::Periodic, Topology::Flat],
            1,
            [1.0, 1.0, 1.0],
        )
        .unwrap();
        let t = RankTopology::new([1, 1, 2], RankId(0), 2).unwrap();
        assert!(matches!(
            decompose(&g, &t),
            Err(ConfigError::FlatAxisDecomposed { axis: Axis::Z, .. })
        ));
    }

    #[test]
    fn local_narrower_than_halo_rejected() {
        let g = global([6, 8, 8], 2);
        let t = RankTopology::new([4, 1, 1], RankId(3), 4).unwrap();
        assert!(matches!(
            decompose(&g, &t),
            Err(ConfigError::HaloTooWide { axis: Axis::X, .. })
        ));
    }

    proptest! {
        #[test]
        fn partition_tiles_axis(n in 1usize..200, parts in 1usize..17) {
            prop_assume!(parts <= n);
            let mut next = 0;
            for p in 0..parts {
                let (start, len) = partition(n, parts, p);
                prop_assert_eq!(start, next);
                prop_assert!(len == n / parts || len == n / parts + 1);
                next = start + len;
            }
            prop_assert_eq!(next, n);
        }
    }
}
