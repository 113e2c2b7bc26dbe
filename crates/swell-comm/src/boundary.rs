//! Boundary conditions and the evaluator that fills physical halos.

use std::fmt;

use swell_core::{ConfigError, Face, Field, Location, RankId, SlabRegion, Topology};
use swell_topology::RankConnectivity;

/// What happens at one face of one field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundaryCondition {
    /// The axis wraps. With a single rank on the axis the halo is a local
    /// copy of the opposite boundary.
    Periodic,
    /// Zero normal gradient: the halo mirrors the interior.
    NoFlux,
    /// The field takes value `v` on the boundary.
    Value(f64),
    /// A prescribed flux through the boundary. The flux itself enters
    /// through the tendencies; the halo is filled with zero gradient.
    Flux(f64),
    /// The face is shared with another rank and filled by message passing.
    HaloCommunication {
        /// Rank owning the neighbouring subdomain.
        peer: RankId,
    },
}

impl BoundaryCondition {
    /// The peer rank, if this face communicates.
    pub fn peer(&self) -> Option<RankId> {
        match self {
            Self::HaloCommunication { peer } => Some(*peer),
            _ => None,
        }
    }
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Periodic => f.write_str("periodic"),
            Self::NoFlux => f.write_str("no-flux"),
            Self::Value(v) => write!(f, "value({v})"),
            Self::Flux(q) => write!(f, "flux({q})"),
            Self::HaloCommunication { peer } => write!(f, "halo(rank {peer})"),
        }
    }
}

/// Boundary conditions for the six faces of one field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldBoundaryConditions {
    faces: [BoundaryCondition; 6],
}

impl FieldBoundaryConditions {
    /// The same condition on every face.
    pub fn uniform(bc: BoundaryCondition) -> Self {
        Self { faces: [bc; 6] }
    }

    /// Default conditions for a field with staggering `location` on a grid
    /// with per-axis `topologies`.
    ///
    /// Periodic axes get [`BoundaryCondition::Periodic`]. On a bounded
    /// axis, a field located on faces of that axis (the normal velocity)
    /// is impenetrable (`Value(0)`); everything else is `NoFlux`.
    pub fn default_for(topologies: [Topology; 3], location: [Location; 3]) -> Self {
        let faces = Face::ALL.map(|face| {
            let a = face.axis().index();
            match (topologies[a], location[a]) {
                (Topology::Periodic, _) => BoundaryCondition::Periodic,
                (Topology::Bounded, Location::Face) => BoundaryCondition::Value(0.0),
                _ => BoundaryCondition::NoFlux,
            }
        });
        Self { faces }
    }

    /// Replace the condition on one face.
    pub fn with_face(mut self, face: Face, bc: BoundaryCondition) -> Self {
        self.faces[face.side_id() as usize] = bc;
        self
    }

    /// Condition on `face`.
    pub fn get(&self, face: Face) -> BoundaryCondition {
        self.faces[face.side_id() as usize]
    }

    /// The same conditions with every prescribed value set to zero.
    ///
    /// A stencil filled under these conditions is linear in its operand;
    /// the original conditions differ from it by a constant forcing.
    pub fn homogeneous(&self) -> Self {
        Self {
            faces: self.faces.map(|bc| match bc {
                BoundaryCondition::Value(_) => BoundaryCondition::Value(0.0),
                other => other,
            }),
        }
    }

    /// Whether any face prescribes a nonzero value.
    pub fn is_homogeneous(&self) -> bool {
        self.faces
            .iter()
            .all(|bc| !matches!(bc, BoundaryCondition::Value(v) if *v != 0.0))
    }

    /// Check against the grid topology and substitute
    /// [`BoundaryCondition::HaloCommunication`] at every inter-rank face.
    ///
    /// Periodic conditions are only valid on periodic axes and vice versa.
    /// Flat axes are never exchanged and accept anything but
    /// communication.
    pub fn regularize(
        self,
        field: &str,
        topologies: [Topology; 3],
        connectivity: &RankConnectivity,
    ) -> Result<Self, ConfigError> {
        let mut faces = self.faces;
        for face in Face::ALL {
            let slot = face.side_id() as usize;
            let bc = faces[slot];
            let mismatch = |reason: &str| ConfigError::BoundaryMismatch {
                field: field.to_string(),
                face,
                reason: reason.to_string(),
            };
            match (topologies[face.axis().index()], bc) {
                (_, BoundaryCondition::HaloCommunication { .. }) => {
                    return Err(mismatch("halo communication is assigned from connectivity"));
                }
                (Topology::Periodic, BoundaryCondition::Periodic) => {}
                (Topology::Periodic, _) => {
                    return Err(mismatch("periodic axis requires a periodic condition"));
                }
                (_, BoundaryCondition::Periodic) => {
                    return Err(mismatch("periodic condition on a non-periodic axis"));
                }
                _ => {}
            }
            if let Some(peer) = connectivity.neighbour(face) {
                faces[slot] = BoundaryCondition::HaloCommunication { peer };
            }
        }
        Ok(Self { faces })
    }
}

/// Fills halo cells at faces without a neighbouring rank.
///
/// Called by the halo exchange for every face whose condition is not
/// [`BoundaryCondition::HaloCommunication`]. Implementations do no
/// network I/O.
pub trait BoundaryEvaluator: Send + Sync {
    /// Apply `bc` at `face` of `field`.
    fn fill(&self, field: &mut Field, face: Face, bc: &BoundaryCondition);
}

/// The reference boundary evaluator.
///
/// | Condition  | Center-located field        | Face-located field (normal) |
/// |------------|-----------------------------|-----------------------------|
/// | `Periodic` | copy of opposite boundary   | same                        |
/// | `NoFlux`   | mirror of the interior      | same                        |
/// | `Value(v)` | `2v - mirror`               | boundary face pinned to `v`, antisymmetric beyond |
/// | `Flux(_)`  | nearest interior value      | same                        |
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultBoundaryEvaluator;

impl BoundaryEvaluator for DefaultBoundaryEvaluator {
    fn fill(&self, field: &mut Field, face: Face, bc: &BoundaryCondition) {
        let a = face.axis().index();
        if field.halo()[a] == 0 {
            return;
        }
        let n = field.size()[a] as isize;
        let high = face.is_high();
        // Index of the interior cell mirrored onto ghost `c` about the face.
        let mirror = move |c: isize| if high { 2 * n - 1 - c } else { -c - 1 };
        match *bc {
            BoundaryCondition::HaloCommunication { .. } => {}
            BoundaryCondition::Periodic => {
                let from = field.boundary_slab(face.opposite());
                let to = field.halo_slab(face);
                field.copy_region(from, to);
            }
            BoundaryCondition::NoFlux => fill_ghosts(field, face, |f, idx| f.get_along(a, idx, mirror(idx[a]))),
            BoundaryCondition::Flux(_) => {
                let edge = if high { n - 1 } else { 0 };
                fill_ghosts(field, face, |f, idx| f.get_along(a, idx, edge));
            }
            BoundaryCondition::Value(v) => match field.location()[a] {
                Location::Center => {
                    fill_ghosts(field, face, |f, idx| 2.0 * v - f.get_along(a, idx, mirror(idx[a])));
                }
                Location::Face if high => {
                    // Ghost `n` is the boundary face itself.
                    fill_ghosts(field, face, |f, idx| {
                        if idx[a] == n {
                            v
                        } else {
                            2.0 * v - f.get_along(a, idx, 2 * n - idx[a])
                        }
                    });
                }
                Location::Face => {
                    // Interior index 0 is the boundary face itself.
                    let mut wall = field.boundary_slab(face);
                    let (mut lo, mut hi) = (wall.lo(), wall.hi());
                    lo[a] = 0;
                    hi[a] = 1;
                    wall = SlabRegion::new(lo, hi);
                    field.unpack(wall, &vec![v; wall.len()]);
                    fill_ghosts(field, face, |f, idx| 2.0 * v - f.get_along(a, idx, -idx[a]));
                }
            },
        }
    }
}

trait GetAlong {
    fn get_along(&self, axis: usize, idx: [isize; 3], at: isize) -> f64;
}

impl GetAlong for Field {
    fn get_along(&self, axis: usize, mut idx: [isize; 3], at: isize) -> f64 {
        idx[axis] = at;
        self.get(idx[0], idx[1], idx[2])
    }
}

/// Overwrite the halo slab at `face` with `rule(field, cell)`.
fn fill_ghosts(field: &mut Field, face: Face, rule: impl Fn(&Field, [isize; 3]) -> f64) {
    let region = field.halo_slab(face);
    let mut values = Vec::with_capacity(region.len());
    region.for_each(|i, j, k| values.push(rule(field, [i, j, k])));
    field.unpack(region, &values);
}

#[cfg(test)]
mod tests {
    use super::*;
    use swell_core::{Axis, Grid};
    use swell_topology::RankTopology;

    const PBB: [Topology; 3] = [Topology::Periodic, Topology::Bounded, Topology::Bounded];

    fn grid(halo: usize) -> Grid {
        Grid::new([4, 4, 2], PBB, halo, [1.0, 1.0, 1.0]).unwrap()
    }

    fn ramp(location: [Location; 3], halo: usize) -> Field {
        let mut f = Field::with_location("f", &grid(halo), location);
        f.map_interior(|[i, j, k], _| (1 + i + 10 * j + 100 * k) as f64);
        f
    }

    #[test]
    fn defaults_follow_topology_and_staggering() {
        let u = FieldBoundaryConditions::default_for(
            PBB,
            [Location::Center, Location::Face, Location::Center],
        );
        assert_eq!(u.get(Face::West), BoundaryCondition::Periodic);
        assert_eq!(u.get(Face::South), BoundaryCondition::Value(0.0));
        assert_eq!(u.get(Face::North), BoundaryCondition::Value(0.0));
        assert_eq!(u.get(Face::Top), BoundaryCondition::NoFlux);
    }

    #[test]
    fn homogeneous_zeroes_prescribed_values_only() {
        let bcs = FieldBoundaryConditions::default_for(PBB, [Location::Center; 3])
            .with_face(Face::North, BoundaryCondition::Value(2.5))
            .with_face(Face::Top, BoundaryCondition::Flux(1.0));
        assert!(!bcs.is_homogeneous());
        let h = bcs.homogeneous();
        assert!(h.is_homogeneous());
        assert_eq!(h.get(Face::North), BoundaryCondition::Value(0.0));
        assert_eq!(h.get(Face::Top), BoundaryCondition::Flux(1.0));
        assert_eq!(h.get(Face::West), BoundaryCondition::Periodic);
    }

    #[test]
    fn regularize_rejects_periodic_on_bounded_axis() {
        let conn = RankConnectivity::new(&RankTopology::serial(), PBB);
        let bcs = FieldBoundaryConditions::default_for(PBB, [Location::Center; 3])
            .with_face(Face::North, BoundaryCondition::Periodic);
        let err = bcs.regularize("c", PBB, &conn).unwrap_err();
        assert!(matches!(err, ConfigError::BoundaryMismatch { face: Face::North, .. }));
    }

    #[test]
    fn regularize_assigns_halo_communication() {
        let topo = RankTopology::new([2, 1, 1], RankId(0), 2).unwrap();
        let conn = RankConnectivity::new(&topo, PBB);
        let bcs = FieldBoundaryConditions::default_for(PBB, [Location::Center; 3])
            .regularize("c", PBB, &conn)
            .unwrap();
        assert_eq!(bcs.get(Face::East), BoundaryCondition::HaloCommunication { peer: RankId(1) });
        assert_eq!(bcs.get(Face::West), BoundaryCondition::HaloCommunication { peer: RankId(1) });
        assert_eq!(bcs.get(Face::South), BoundaryCondition::NoFlux);
    }

    #[test]
    fn periodic_fill_wraps_locally() {
        let mut f = ramp([Location::Center; 3], 2);
        DefaultBoundaryEvaluator.fill(&mut f, Face::West, &BoundaryCondition::Periodic);
        DefaultBoundaryEvaluator.fill(&mut f, Face::East, &BoundaryCondition::Periodic);
        assert_eq!(f.get(-1, 1, 0), f.get(3, 1, 0));
        assert_eq!(f.get(-2, 1, 0), f.get(2, 1, 0));
        assert_eq!(f.get(4, 2, 1), f.get(0, 2, 1));
        assert_eq!(f.get(5, 2, 1), f.get(1, 2, 1));
    }

    #[test]
    fn no_flux_mirrors() {
        let mut f = ramp([Location::Center; 3], 2);
        DefaultBoundaryEvaluator.fill(&mut f, Face::South, &BoundaryCondition::NoFlux);
        DefaultBoundaryEvaluator.fill(&mut f, Face::North, &BoundaryCondition::NoFlux);
        assert_eq!(f.get(1, -1, 0), f.get(1, 0, 0));
        assert_eq!(f.get(1, -2, 0), f.get(1, 1, 0));
        assert_eq!(f.get(1, 4, 0), f.get(1, 3, 0));
        assert_eq!(f.get(1, 5, 0), f.get(1, 2, 0));
    }

    #[test]
    fn center_value_is_met_at_face() {
        let mut f = ramp([Location::Center; 3], 1);
        DefaultBoundaryEvaluator.fill(&mut f, Face::Top, &BoundaryCondition::Value(3.0));
        // Average of last interior and first ghost equals the boundary value.
        let avg = 0.5 * (f.get(2, 2, 1) + f.get(2, 2, 2));
        assert!((avg - 3.0).abs() < 1e-12);
    }

    #[test]
    fn face_value_pins_boundary_faces() {
        let loc = [Location::Center, Location::Face, Location::Center];
        let mut f = ramp(loc, 2);
        DefaultBoundaryEvaluator.fill(&mut f, Face::South, &BoundaryCondition::Value(0.0));
        DefaultBoundaryEvaluator.fill(&mut f, Face::North, &BoundaryCondition::Value(0.0));
        assert_eq!(f.get(2, 0, 1), 0.0);
        assert_eq!(f.get(2, -1, 1), -f.get(2, 1, 1));
        assert_eq!(f.get(2, 4, 1), 0.0);
        assert_eq!(f.get(2, 5, 1), -f.get(2, 3, 1));
    }

    #[test]
    fn flux_is_zero_gradient() {
        let mut f = ramp([Location::Center; 3], 2);
        DefaultBoundaryEvaluator.fill(&mut f, Face::Bottom, &BoundaryCondition::Flux(1.0));
        assert_eq!(f.get(3, 3, -1), f.get(3, 3, 0));
        assert_eq!(f.get(3, 3, -2), f.get(3, 3, 0));
    }

    #[test]
    fn flat_axis_is_left_alone() {
        let g = Grid::new(
            [4, 4, 1],
            [Topology::Periodic, Topology::Periodic, Topology::Flat],
            1,
            [1.0, 1.0, 1.0],
        )
        .unwrap();
        let mut f = Field::new("eta", &g);
        f.fill(2.0);
        DefaultBoundaryEvaluator.fill(&mut f, Face::Top, &BoundaryCondition::Value(7.0));
        assert_eq!(f.interior_sum(), 32.0);
        assert_eq!(Axis::Z.faces()[1], Face::Top);
    }
}
