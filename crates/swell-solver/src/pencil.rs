//! Pencil decompositions and the all-to-all transposes between them.
//!
//! With ranks `(Rx, Ry, 1)` a rank at 0-based position `(i, j)` owns
//! three boxes of the global index space, each complete along one axis:
//!
//! | Pencil | x extent           | y extent             | z extent             |
//! |--------|--------------------|----------------------|----------------------|
//! | Z      | `part(nx, Rx, i)`  | `part(ny, Ry, j)`    | all                  |
//! | Y      | `part(nx, Rx, i)`  | all                  | `part(nz, Ry, j)`    |
//! | X      | all                | `part(ny, Rx, i)`    | `part(nz, Ry, j)`    |
//!
//! The Z pencil is the ordinary subdomain. Z→Y only moves data among ranks
//! sharing `i`, Y→X among ranks sharing `j`. Partitions may be empty when
//! an axis has fewer cells than ranks; such ranks simply hold no data in
//! that layout.
//!
//! A horizontal grid (`nz = 1`) has no vertical cells to share, so the Y
//! and X pencils instead split the remaining horizontal axis over all
//! `Rx·Ry` ranks by rank id `r`:
//!
//! | Pencil | x extent               | y extent               | z |
//! |--------|------------------------|------------------------|---|
//! | Y      | `part(nx, Rx·Ry, r)`   | all                    | 0 |
//! | X      | all                    | `part(ny, Rx·Ry, r)`   | 0 |

use rustfft::num_complex::Complex;
use swell_comm::{CollectiveKind, RankContext, Transport};
use swell_core::{CommError, ConfigError, RankId};
use swell_topology::{partition, rank_to_index};

/// A half-open box `[lo, hi)` of global cell indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pencil {
    lo: [usize; 3],
    hi: [usize; 3],
}

impl Pencil {
    /// Box from inclusive `lo` and exclusive `hi`.
    pub fn new(lo: [usize; 3], hi: [usize; 3]) -> Self {
        Self { lo, hi }
    }

    /// Inclusive low corner.
    pub fn lo(&self) -> [usize; 3] {
        self.lo
    }

    /// Exclusive high corner.
    pub fn hi(&self) -> [usize; 3] {
        self.hi
    }

    /// Extent per axis.
    pub fn shape(&self) -> [usize; 3] {
        [
            self.hi[0].saturating_sub(self.lo[0]),
            self.hi[1].saturating_sub(self.lo[1]),
            self.hi[2].saturating_sub(self.lo[2]),
        ]
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    /// Whether the box holds no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The overlap of two boxes (possibly empty).
    pub fn intersect(&self, other: &Pencil) -> Pencil {
        let mut lo = [0; 3];
        let mut hi = [0; 3];
        for a in 0..3 {
            lo[a] = self.lo[a].max(other.lo[a]);
            hi[a] = self.hi[a].min(other.hi[a]).max(lo[a]);
        }
        Pencil { lo, hi }
    }

    /// Offset of global cell `g` in this box's x-fastest storage.
    #[inline]
    pub fn offset_of(&self, g: [usize; 3]) -> usize {
        let s = self.shape();
        (g[0] - self.lo[0]) + s[0] * ((g[1] - self.lo[1]) + s[1] * (g[2] - self.lo[2]))
    }

    /// Visit every global cell in x-fastest order.
    pub fn for_each(&self, mut f: impl FnMut([usize; 3])) {
        for k in self.lo[2]..self.hi[2] {
            for j in self.lo[1]..self.hi[1] {
                for i in self.lo[0]..self.hi[0] {
                    f([i, j, k]);
                }
            }
        }
    }
}

/// Which axis a pencil is complete along.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// Complete along z (the input subdomain layout).
    Z,
    /// Complete along y.
    Y,
    /// Complete along x.
    X,
}

/// The pencils of every rank, indexed by rank id.
#[derive(Clone, Debug)]
pub struct PencilLayout {
    z: Vec<Pencil>,
    y: Vec<Pencil>,
    x: Vec<Pencil>,
}

impl PencilLayout {
    /// Lay out pencils for a `global` grid over `ranks`.
    ///
    /// Requires `Rz = 1`.
    pub fn new(global: [usize; 3], ranks: [usize; 3]) -> Result<Self, ConfigError> {
        if ranks[2] != 1 {
            return Err(ConfigError::UnsupportedDecomposition {
                reason: format!(
                    "pencil transforms need the vertical axis on one rank, got Rz = {}",
                    ranks[2]
                ),
            });
        }
        let [nx, ny, nz] = global;
        let [rx, ry, _] = ranks;
        let span = |n: usize, parts: usize, idx: usize| {
            let (start, len) = partition(n, parts, idx);
            (start, start + len)
        };
        let total = rx * ry;
        let mut layout = Self {
            z: Vec::with_capacity(total),
            y: Vec::with_capacity(total),
            x: Vec::with_capacity(total),
        };
        for r in 0..total {
            let [i, j, _] = rank_to_index(RankId(r), ranks).map(|v| v - 1);
            let (x0, x1) = span(nx, rx, i);
            let (y0, y1) = span(ny, ry, j);
            layout.z.push(Pencil::new([x0, y0, 0], [x1, y1, nz]));
            if nz == 1 {
                let (xs0, xs1) = span(nx, total, r);
                let (ys0, ys1) = span(ny, total, r);
                layout.y.push(Pencil::new([xs0, 0, 0], [xs1, ny, 1]));
                layout.x.push(Pencil::new([0, ys0, 0], [nx, ys1, 1]));
            } else {
                let (zy0, zy1) = span(nz, ry, j);
                let (yx0, yx1) = span(ny, rx, i);
                layout.y.push(Pencil::new([x0, 0, zy0], [x1, ny, zy1]));
                layout.x.push(Pencil::new([0, yx0, zy0], [nx, yx1, zy1]));
            }
        }
        Ok(layout)
    }

    /// The pencil of `rank` in `orientation`.
    pub fn pencil(&self, orientation: Orientation, rank: RankId) -> Pencil {
        let boxes = match orientation {
            Orientation::Z => &self.z,
            Orientation::Y => &self.y,
            Orientation::X => &self.x,
        };
        boxes[rank.0]
    }

    /// Number of ranks.
    pub fn ranks(&self) -> usize {
        self.z.len()
    }
}

/// Move `data`, laid out as this rank's `from` pencil, into `out`, laid
/// out as this rank's `to` pencil.
///
/// Each rank sends every partner the overlap of its own `from` box with
/// the partner's `to` box; overlaps are computed identically on both
/// sides, so empty exchanges are skipped by sender and receiver alike.
pub fn redistribute<T: Transport>(
    ctx: &RankContext<T>,
    layout: &PencilLayout,
    from: Orientation,
    to: Orientation,
    data: &[Complex<f64>],
    out: &mut Vec<Complex<f64>>,
) -> Result<(), CommError> {
    let me = ctx.rank();
    let tag = ctx.tags().reserved_tag(CollectiveKind::Transpose);
    let src = layout.pencil(from, me);
    let dst = layout.pencil(to, me);
    out.clear();
    out.resize(dst.len(), Complex::new(0.0, 0.0));

    let mut pending = Vec::new();
    for r in (0..layout.ranks()).map(RankId) {
        if r == me {
            continue;
        }
        let overlap = src.intersect(&layout.pencil(to, r));
        if overlap.is_empty() {
            continue;
        }
        let mut payload = Vec::with_capacity(2 * overlap.len());
        overlap.for_each(|g| {
            let c = data[src.offset_of(g)];
            payload.push(c.re);
            payload.push(c.im);
        });
        pending.push(ctx.transport().isend(r, tag, payload)?);
    }

    let own = src.intersect(&dst);
    own.for_each(|g| out[dst.offset_of(g)] = data[src.offset_of(g)]);

    for r in (0..layout.ranks()).map(RankId) {
        if r == me {
            continue;
        }
        let overlap = layout.pencil(from, r).intersect(&dst);
        if overlap.is_empty() {
            continue;
        }
        let payload = ctx.recv_exact(r, tag, 2 * overlap.len())?;
        let mut values = payload.chunks_exact(2);
        overlap.for_each(|g| {
            if let Some(pair) = values.next() {
                out[dst.offset_of(g)] = Complex::new(pair[0], pair[1]);
            }
        });
    }

    for req in pending {
        req.wait()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_tile_the_domain() {
        let global = [10, 7, 5];
        let layout = PencilLayout::new(global, [3, 2, 1]).unwrap();
        for o in [Orientation::Z, Orientation::Y, Orientation::X] {
            let cells: usize = (0..6).map(|r| layout.pencil(o, RankId(r)).len()).sum();
            assert_eq!(cells, 350);
        }
    }

    #[test]
    fn vertical_split_rejected() {
        assert!(matches!(
            PencilLayout::new([8, 8, 8], [2, 1, 2]),
            Err(ConfigError::UnsupportedDecomposition { .. })
        ));
    }

    #[test]
    fn horizontal_grid_spreads_pencils_over_every_rank() {
        for ranks in [[2, 2, 1], [1, 4, 1], [4, 1, 1], [1, 2, 1]] {
            let total = ranks[0] * ranks[1];
            let layout = PencilLayout::new([16, 16, 1], ranks).unwrap();
            for r in (0..total).map(RankId) {
                assert_eq!(layout.pencil(Orientation::Y, r).shape(), [16 / total, 16, 1]);
                assert_eq!(layout.pencil(Orientation::X, r).shape(), [16, 16 / total, 1]);
            }
        }
    }

    #[test]
    fn thin_vertical_axis_with_levels_leaves_empty_pencils() {
        let layout = PencilLayout::new([16, 16, 2], [1, 4, 1]).unwrap();
        // z part(2, 4, j) is empty for j >= 2.
        assert!(layout.pencil(Orientation::Y, RankId(3)).is_empty());
        assert_eq!(layout.pencil(Orientation::Y, RankId(0)).shape(), [16, 16, 1]);
    }

    #[test]
    fn intersection_of_disjoint_boxes_is_empty() {
        let a = Pencil::new([0, 0, 0], [4, 4, 4]);
        let b = Pencil::new([4, 0, 0], [8, 4, 4]);
        assert!(a.intersect(&b).is_empty());
        assert_eq!(a.intersect(&Pencil::new([2, 1, 0], [9, 9, 9])).shape(), [2, 3, 4]);
    }
}
