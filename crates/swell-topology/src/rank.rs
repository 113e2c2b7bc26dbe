//! Mixed-radix mapping between linear rank ids and 1-based rank indices.

use swell_core::{Axis, ConfigError, RankId};

/// Decode a linear rank id into its 1-based `(i, j, k)` position.
///
/// `z` varies fastest: `i = r / (Ry·Rz)`, `j = (r mod Ry·Rz) / Rz`,
/// `k = r mod Rz`.
///
/// # Examples
///
/// ```
/// use swell_core::RankId;
/// use swell_topology::{index_to_rank, rank_to_index};
///
/// let ranks = [2, 3, 4];
/// assert_eq!(rank_to_index(RankId(0), ranks), [1, 1, 1]);
/// assert_eq!(rank_to_index(RankId(5), ranks), [1, 2, 2]);
/// assert_eq!(index_to_rank([1, 2, 2], ranks), RankId(5));
/// ```
pub fn rank_to_index(rank: RankId, ranks: [usize; 3]) -> [usize; 3] {
    let [_, ry, rz] = ranks;
    let r = rank.0;
    let i = r / (ry * rz);
    let rem = r % (ry * rz);
    let j = rem / rz;
    let k = rem % rz;
    [i + 1, j + 1, k + 1]
}

/// Encode a 1-based `(i, j, k)` position as a linear rank id.
///
/// Exact inverse of [`rank_to_index`].
pub fn index_to_rank(index: [usize; 3], ranks: [usize; 3]) -> RankId {
    let [_, ry, rz] = ranks;
    let [i, j, k] = index;
    RankId((i - 1) * ry * rz + (j - 1) * rz + (k - 1))
}

/// This rank's place in the `Rx × Ry × Rz` process grid.
///
/// # Invariants
///
/// - `Rx·Ry·Rz` equals the process-group size.
/// - `rank` and `index` correspond under [`rank_to_index`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankTopology {
    ranks: [usize; 3],
    index: [usize; 3],
    rank: RankId,
}

impl RankTopology {
    /// Place `rank` in a process grid of `ranks` within a group of
    /// `group_size` processes.
    ///
    /// Fails if any axis has zero ranks, if the rank counts do not
    /// multiply to `group_size`, or if `rank` is out of range.
    pub fn new(ranks: [usize; 3], rank: RankId, group_size: usize) -> Result<Self, ConfigError> {
        for axis in Axis::ALL {
            if ranks[axis.index()] == 0 {
                return Err(ConfigError::EmptyAxis { axis });
            }
        }
        let total: usize = ranks.iter().product();
        if total != group_size {
            return Err(ConfigError::RankCountMismatch { ranks, group_size });
        }
        if rank.0 >= total {
            return Err(ConfigError::RankOutOfRange { rank, group_size });
        }
        Ok(Self {
            ranks,
            index: rank_to_index(rank, ranks),
            rank,
        })
    }

    /// A single-rank topology.
    pub fn serial() -> Self {
        Self {
            ranks: [1, 1, 1],
            index: [1, 1, 1],
            rank: RankId(0),
        }
    }

    /// Rank counts `(Rx, Ry, Rz)`.
    pub fn ranks(&self) -> [usize; 3] {
        self.ranks
    }

    /// Rank count along one axis.
    pub fn rank_count(&self, axis: Axis) -> usize {
        self.ranks[axis.index()]
    }

    /// This rank's 1-based `(i, j, k)` position.
    pub fn index(&self) -> [usize; 3] {
        self.index
    }

    /// This rank's linear id.
    pub fn rank(&self) -> RankId {
        self.rank
    }

    /// Total number of ranks.
    pub fn total(&self) -> usize {
        self.ranks.iter().product()
    }

    /// Linear id of the rank at `index` in this process grid.
    pub fn rank_at(&self, index: [usize; 3]) -> RankId {
        index_to_rank(index, self.ranks)
    }

    /// Position of `rank` in this process grid.
    pub fn index_of(&self, rank: RankId) -> [usize; 3] {
        rank_to_index(rank, self.ranks)
    }
}
