//! Every rank's subdomain, taken together, tiles the global grid exactly
//! once, and neighbouring subdomains are adjacent in global index space.

use proptest::prelude::*;
use swell_core::{Axis, Face, Grid, RankId, Topology};
use swell_topology::{decompose, RankConnectivity, RankTopology};

fn locals(global: &Grid, ranks: [usize; 3]) -> Vec<(RankTopology, Grid)> {
    let total: usize = ranks.iter().product();
    (0..total)
        .map(|r| {
            let t = RankTopology::new(ranks, RankId(r), total).unwrap();
            let g = decompose(global, &t).unwrap();
            (t, g)
        })
        .collect()
}

#[test]
fn subdomains_cover_every_cell_once() {
    let global = Grid::new(
        [10, 7, 5],
        [Topology::Periodic, Topology::Bounded, Topology::Bounded],
        1,
        [1.0, 1.0, 1.0],
    )
    .unwrap();
    let mut hits = vec![0u8; 10 * 7 * 5];
    for (_, g) in locals(&global, [3, 2, 2]) {
        let [ox, oy, oz] = g.offset();
        let [nx, ny, nz] = g.local_size();
        for k in oz..oz + nz {
            for j in oy..oy + ny {
                for i in ox..ox + nx {
                    hits[i + 10 * (j + 7 * k)] += 1;
                }
            }
        }
    }
    assert!(hits.iter().all(|&h| h == 1));
}

#[test]
fn single_rank_subdomain_is_global() {
    let global = Grid::new(
        [16, 16, 1],
        [Topology::Periodic, Topology::Periodic, Topology::Flat],
        2,
        [1.0, 1.0, 1.0],
    )
    .unwrap();
    let local = decompose(&global, &RankTopology::serial()).unwrap();
    assert_eq!(local, global);
    assert!(!local.is_partitioned());
}

proptest! {
    #[test]
    fn east_neighbour_starts_where_subdomain_ends(
        rx in 1usize..5,
        ry in 1usize..4,
        nx in 8usize..40,
        ny in 8usize..40,
    ) {
        let topo = [Topology::Periodic, Topology::Bounded, Topology::Flat];
        let global = Grid::new([nx, ny, 1], topo, 1, [1.0, 1.0, 1.0]).unwrap();
        let all = locals(&global, [rx, ry, 1]);
        for (t, g) in &all {
            let conn = RankConnectivity::new(t, topo);
            for face in [Face::East, Face::North] {
                let Some(n) = conn.neighbour(face) else { continue };
                let other = &all[n.0].1;
                let a = face.axis().index();
                let end = (g.offset()[a] + g.local_size()[a]) % global.global_size()[a];
                prop_assert_eq!(other.offset()[a], end);
                // The orthogonal window is shared.
                let b = if face.axis() == Axis::X { 1 } else { 0 };
                prop_assert_eq!(other.offset()[b], g.offset()[b]);
                prop_assert_eq!(other.local_size()[b], g.local_size()[b]);
            }
        }
    }
}
