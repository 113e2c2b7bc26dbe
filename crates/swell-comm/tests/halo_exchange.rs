//! Multi-rank halo exchange over an in-process group.
//!
//! Each rank fills its interior with a function of the *global* index.
//! After an exchange, every halo cell that faces another rank or a
//! periodic wrap must hold that same function evaluated at the wrapped
//! global index, including edge and corner halos.

use swell_comm::{
    exchange_halos, exchange_halos_many, FieldBoundaryConditions, LocalGroup, LocalTransport,
    RankContext, Transport,
};
use swell_core::{CommError, Face, Field, Grid, Location, RankId, Topology};

fn global_value(g: [isize; 3]) -> f64 {
    (g[0] + 100 * g[1] + 10_000 * g[2]) as f64
}

fn run<R: Send>(
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
                s.spawn(move || f(RankContext::new(t, ranks, global).unwrap()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

fn seeded_field(ctx: &RankContext<LocalTransport>) -> Field {
    let grid = ctx.grid();
    let offset = grid.offset();
    let mut f = Field::new("c", grid);
    f.map_interior(|[i, j, k], _| {
        global_value([
            (offset[0] + i) as isize,
            (offset[1] + j) as isize,
            (offset[2] + k) as isize,
        ])
    });
    f
}

fn bcs(ctx: &RankContext<LocalTransport>) -> FieldBoundaryConditions {
    let topo = ctx.grid().topologies();
    FieldBoundaryConditions::default_for(topo, [Location::Center; 3])
        .regularize("c", topo, ctx.connectivity())
        .unwrap()
}

/// Check every padded cell of a fully periodic field against the wrapped
/// global function.
fn assert_wrapped(field: &Field, grid: &Grid) -> usize {
    let n = grid.global_size().map(|v| v as isize);
    let off = grid.offset().map(|v| v as isize);
    let size = field.size().map(|v| v as isize);
    let h = field.halo().map(|v| v as isize);
    let mut checked = 0;
    for k in -h[2]..size[2] + h[2] {
        for j in -h[1]..size[1] + h[1] {
            for i in -h[0]..size[0] + h[0] {
                let g = [
                    (off[0] + i).rem_euclid(n[0]),
                    (off[1] + j).rem_euclid(n[1]),
                    (off[2] + k).rem_euclid(n[2]),
                ];
                assert_eq!(field.get(i, j, k), global_value(g), "cell ({i}, {j}, {k})");
                checked += 1;
            }
        }
    }
    checked
}

#[test]
fn triply_periodic_eight_ranks_fills_corners() {
    let global = Grid::new([8, 6, 4], [Topology::Periodic; 3], 2, [1.0, 1.0, 1.0]).unwrap();
    let checked = run(&global, [2, 2, 2], |ctx| {
        let mut f = seeded_field(&ctx);
        let stats = exchange_halos(&mut f, &bcs(&ctx), &ctx).unwrap();
        assert_eq!(stats.messages, 6);
        assert_eq!(stats.local_fills, 0);
        assert_wrapped(&f, ctx.grid())
    });
    assert_eq!(checked.len(), 8);
    // Padded local extent (4+4) × (3+4) × (2+4).
    assert!(checked.iter().all(|&c| c == 8 * 7 * 6));
}

#[test]
fn single_rank_periodic_is_local_copy() {
    let global = Grid::new([5, 4, 3], [Topology::Periodic; 3], 1, [1.0, 1.0, 1.0]).unwrap();
    run(&global, [1, 1, 1], |ctx| {
        let mut f = seeded_field(&ctx);
        let stats = exchange_halos(&mut f, &bcs(&ctx), &ctx).unwrap();
        assert_eq!(stats.messages, 0);
        assert_eq!(stats.local_fills, 6);
        assert_wrapped(&f, ctx.grid());
    });
}

#[test]
fn mixed_single_and_split_axes() {
    // x split over three ranks, y periodic on one rank.
    let global = Grid::new(
        [9, 4, 1],
        [Topology::Periodic, Topology::Periodic, Topology::Flat],
        1,
        [1.0, 1.0, 1.0],
    )
    .unwrap();
    run(&global, [3, 1, 1], |ctx| {
        let mut f = seeded_field(&ctx);
        let stats = exchange_halos(&mut f, &bcs(&ctx), &ctx).unwrap();
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.local_fills, 2);
        assert_wrapped(&f, ctx.grid());
    });
}

#[test]
fn bounded_walls_mirror_and_interior_faces_communicate() {
    let global = Grid::new(
        [4, 8, 1],
        [Topology::Bounded, Topology::Bounded, Topology::Flat],
        1,
        [1.0, 1.0, 1.0],
    )
    .unwrap();
    run(&global, [1, 2, 1], |ctx| {
        let mut f = seeded_field(&ctx);
        let stats = exchange_halos(&mut f, &bcs(&ctx), &ctx).unwrap();
        assert_eq!(stats.messages, 1);
        let oy = ctx.grid().offset()[1] as isize;
        for i in 0..4 {
            // x walls mirror.
            assert_eq!(f.get(-1, 0, 0), f.get(0, 0, 0));
            assert_eq!(f.get(4, 1, 0), f.get(3, 1, 0));
            if ctx.rank() == RankId(0) {
                // Shared face carries the neighbour's first row.
                assert_eq!(f.get(i, 4, 0), global_value([i, 4, 0]));
                assert_eq!(f.get(i, -1, 0), f.get(i, 0, 0));
            } else {
                assert_eq!(f.get(i, -1, 0), global_value([i, oy - 1, 0]));
                assert_eq!(f.get(i, 4, 0), f.get(i, 3, 0));
            }
        }
    });
}

#[test]
fn batched_exchange_matches_single_field_exchange() {
    let global = Grid::new([6, 6, 1], [Topology::Periodic, Topology::Periodic, Topology::Flat], 1, [1.0; 3])
        .unwrap();
    run(&global, [2, 2, 1], |ctx| {
        let b = bcs(&ctx);
        let mut a = seeded_field(&ctx);
        let mut c = seeded_field(&ctx);
        c.map_interior(|_, v| -v);
        let stats = exchange_halos_many(&mut [(&mut a, &b), (&mut c, &b)], &ctx).unwrap();
        assert_eq!(stats.messages, 8);
        assert_wrapped(&a, ctx.grid());
        c.map_interior(|_, v| -v);
        // Halo values of `c` are the negated wrapped function.
        assert_eq!(c.get(-1, -1, 0), -a.get(-1, -1, 0));
        assert_eq!(c.get(3, 3, 0), -a.get(3, 3, 0));
    });
}

#[test]
fn wrong_length_message_is_shape_mismatch() {
    let global = Grid::new([8, 4, 1], [Topology::Periodic, Topology::Bounded, Topology::Flat], 1, [1.0; 3])
        .unwrap();
    let mut transports = LocalGroup::new(2).into_transports();
    let other = transports.pop().unwrap();
    let mine = transports.pop().unwrap();
    let ctx = RankContext::new(mine, [2, 1, 1], &global).unwrap();
    // Rank 1 sends a truncated slab across its east face.
    let tag = ctx.tags().halo_tag(RankId(1), RankId(0), Face::East);
    other.isend(RankId(0), tag, vec![0.0; 2]).unwrap().wait().unwrap();
    let mut f = seeded_field(&ctx);
    let err = exchange_halos(&mut f, &bcs(&ctx), &ctx).unwrap_err();
    assert!(matches!(
        err,
        CommError::ShapeMismatch {
            source: RankId(1),
            expected: 6,
            actual: 2,
            ..
        }
    ));
}
