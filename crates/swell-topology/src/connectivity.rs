//! Neighbour ranks across the six faces of a subdomain.

use smallvec::SmallVec;
use swell_core::{Axis, Face, RankId, Topology};

use crate::rank::RankTopology;

/// Resolve a 1-based rank index along one axis after stepping off it.
///
/// Returns `None` when the axis has a single rank (no self-communication,
/// even if periodic) or when the index leaves a non-periodic axis.
fn resolve_index(idx: isize, count: usize, topology: Topology) -> Option<usize> {
    if count == 1 {
        return None;
    }
    let n = count as isize;
    if (1..=n).contains(&idx) {
        return Some(idx as usize);
    }
    match topology {
        Topology::Periodic => Some(((idx - 1).rem_euclid(n) + 1) as usize),
        Topology::Bounded | Topology::Flat => None,
    }
}

/// The ranks owning the six neighbouring subdomains, if any.
///
/// `east`/`west` step along `x`, `north`/`south` along `y`, `top`/`bottom`
/// along `z`. `None` means the face has no rank neighbour: either a
/// physical wall, or an axis with a single rank where periodicity is a
/// local wrap rather than communication.
///
/// # Examples
///
/// ```
/// use swell_core::{RankId, Topology};
/// use swell_topology::{RankConnectivity, RankTopology};
///
/// let topo = RankTopology::new([4, 1, 1], RankId(0), 4).unwrap();
/// let periodic = [Topology::Periodic, Topology::Periodic, Topology::Flat];
/// let conn = RankConnectivity::new(&topo, periodic);
/// assert_eq!(conn.west(), Some(RankId(3)));
/// assert_eq!(conn.east(), Some(RankId(1)));
/// assert_eq!(conn.north(), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankConnectivity {
    neighbours: [Option<RankId>; 6],
}

impl RankConnectivity {
    /// Compute connectivity for `topology` on a grid with per-axis
    /// `topologies`.
    pub fn new(topology: &RankTopology, topologies: [Topology; 3]) -> Self {
        let mut neighbours = [None; 6];
        let ranks = topology.ranks();
        let index = topology.index();
        for face in Face::ALL {
            let a = face.axis().index();
            let step: isize = if face.is_high() { 1 } else { -1 };
            let stepped = index[a] as isize + step;
            if let Some(resolved) = resolve_index(stepped, ranks[a], topologies[a]) {
                let mut target = index;
                target[a] = resolved;
                neighbours[face.side_id() as usize] = Some(topology.rank_at(target));
            }
        }
        Self { neighbours }
    }

    /// Neighbour across `face`.
    pub fn neighbour(&self, face: Face) -> Option<RankId> {
        self.neighbours[face.side_id() as usize]
    }

    /// Neighbour at higher `x`.
    pub fn east(&self) -> Option<RankId> {
        self.neighbour(Face::East)
    }

    /// Neighbour at lower `x`.
    pub fn west(&self) -> Option<RankId> {
        self.neighbour(Face::West)
    }

    /// Neighbour at higher `y`.
    pub fn north(&self) -> Option<RankId> {
        self.neighbour(Face::North)
    }

    /// Neighbour at lower `y`.
    pub fn south(&self) -> Option<RankId> {
        self.neighbour(Face::South)
    }

    /// Neighbour at higher `z`.
    pub fn top(&self) -> Option<RankId> {
        self.neighbour(Face::Top)
    }

    /// Neighbour at lower `z`.
    pub fn bottom(&self) -> Option<RankId> {
        self.neighbour(Face::Bottom)
    }

    /// All faces that have a rank neighbour, in side-identifier order.
    pub fn connected_faces(&self) -> SmallVec<[(Face, RankId); 6]> {
        Face::ALL
            .iter()
            .filter_map(|&f| self.neighbour(f).map(|r| (f, r)))
            .collect()
    }

    /// Whether either face of `axis` has a rank neighbour.
    pub fn is_split(&self, axis: Axis) -> bool {
        axis.faces().iter().any(|&f| self.neighbour(f).is_some())
    }
}
