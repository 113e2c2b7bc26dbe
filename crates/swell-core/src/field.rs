//! Halo-padded scalar fields and slab regions.

use crate::grid::{Axis, Face, Grid};

/// Staggered position of a field's values along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    /// Values sit at cell centers.
    Center,
    /// Values sit on the low face of each cell (`i - 1/2`).
    Face,
}

/// A half-open box of cell indices, in interior coordinates.
///
/// Index 0 is the first interior cell; negative indices and indices at
/// or past the local extent address the halo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlabRegion {
    lo: [isize; 3],
    hi: [isize; 3],
}

impl SlabRegion {
    /// Create a region from inclusive `lo` and exclusive `hi` corners.
    pub fn new(lo: [isize; 3], hi: [isize; 3]) -> Self {
        Self { lo, hi }
    }

    /// Inclusive low corner.
    pub fn lo(&self) -> [isize; 3] {
        self.lo
    }

    /// Exclusive high corner.
    pub fn hi(&self) -> [isize; 3] {
        self.hi
    }

    /// Extent along each axis.
    pub fn shape(&self) -> [usize; 3] {
        [
            (self.hi[0] - self.lo[0]).max(0) as usize,
            (self.hi[1] - self.lo[1]).max(0) as usize,
            (self.hi[2] - self.lo[2]).max(0) as usize,
        ]
    }

    /// Number of cells in the region.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    /// Whether the region holds no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every cell in storage order (x fastest).
    pub fn for_each(&self, mut f: impl FnMut(isize, isize, isize)) {
        for k in self.lo[2]..self.hi[2] {
            for j in self.lo[1]..self.hi[1] {
                for i in self.lo[0]..self.hi[0] {
                    f(i, j, k);
                }
            }
        }
    }
}

/// Scalar values over one rank's subdomain plus halo padding.
///
/// Storage is a single contiguous `Vec<f64>` in x-fastest order over the
/// padded extent. Interior cells are addressed with `0..n` on each axis;
/// halo cells with `-h..0` and `n..n+h`.
///
/// A field exposes three views the halo-exchange protocol relies on:
/// the interior, six *boundary slabs* (the innermost `h` interior layers
/// next to each face), and six *halo slabs* (the padding itself). Slabs
/// span the full padded extent of the two orthogonal axes so that
/// exchanging axes in sequence also fills edge and corner halos.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    name: String,
    location: [Location; 3],
    size: [usize; 3],
    halo: [usize; 3],
    stride: [usize; 3],
    data: Vec<f64>,
}

impl Field {
    /// A zero-filled, cell-centered field on `grid`'s local subdomain.
    pub fn new(name: impl Into<String>, grid: &Grid) -> Self {
        Self::with_location(name, grid, [Location::Center; 3])
    }

    /// A zero-filled field with an explicit staggering.
    pub fn with_location(name: impl Into<String>, grid: &Grid, location: [Location; 3]) -> Self {
        let size = grid.local_size();
        let halo = grid.halo();
        let padded = grid.padded_size();
        Self {
            name: name.into(),
            location,
            size,
            halo,
            stride: [1, padded[0], padded[0] * padded[1]],
            data: vec![0.0; padded.iter().product()],
        }
    }

    /// A zero-filled field with this field's layout and staggering.
    pub fn zeros_like(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: self.location,
            size: self.size,
            halo: self.halo,
            stride: self.stride,
            data: vec![0.0; self.data.len()],
        }
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Staggering per axis.
    pub fn location(&self) -> [Location; 3] {
        self.location
    }

    /// Interior extent.
    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Halo width per axis.
    pub fn halo(&self) -> [usize; 3] {
        self.halo
    }

    /// Whether `other` has the same interior extent and halo width.
    pub fn same_layout(&self, other: &Field) -> bool {
        self.size == other.size && self.halo == other.halo
    }

    #[inline]
    fn offset(&self, i: isize, j: isize, k: isize) -> usize {
        let ii = (i + self.halo[0] as isize) as usize;
        let jj = (j + self.halo[1] as isize) as usize;
        let kk = (k + self.halo[2] as isize) as usize;
        ii + self.stride[1] * jj + self.stride[2] * kk
    }

    /// Value at `(i, j, k)`; halo cells use negative or past-the-end indices.
    #[inline]
    pub fn get(&self, i: isize, j: isize, k: isize) -> f64 {
        self.data[self.offset(i, j, k)]
    }

    /// Overwrite the value at `(i, j, k)`.
    #[inline]
    pub fn set(&mut self, i: isize, j: isize, k: isize, value: f64) {
        let o = self.offset(i, j, k);
        self.data[o] = value;
    }

    /// Raw padded storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Raw padded storage, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Set every value, halos included.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// The interior region `[0, n)` on every axis.
    pub fn interior(&self) -> SlabRegion {
        SlabRegion::new([0; 3], self.size.map(|n| n as isize))
    }

    /// Visit every interior cell with its local index.
    pub fn for_each_interior(&self, mut f: impl FnMut([usize; 3], f64)) {
        self.interior().for_each(|i, j, k| {
            f([i as usize, j as usize, k as usize], self.get(i, j, k));
        });
    }

    /// Replace every interior value with `f(index, old)`.
    pub fn map_interior(&mut self, mut f: impl FnMut([usize; 3], f64) -> f64) {
        let region = self.interior();
        region.for_each(|i, j, k| {
            let o = self.offset(i, j, k);
            self.data[o] = f([i as usize, j as usize, k as usize], self.data[o]);
        });
    }

    /// Interior values in storage order.
    pub fn interior_values(&self) -> Vec<f64> {
        self.pack(self.interior())
    }

    /// Sum over interior cells.
    pub fn interior_sum(&self) -> f64 {
        let mut sum = 0.0;
        self.for_each_interior(|_, v| sum += v);
        sum
    }

    /// Copy interior values from a field with the same layout.
    ///
    /// # Panics
    ///
    /// Panics if the interior extents differ.
    pub fn copy_interior_from(&mut self, other: &Field) {
        assert_eq!(self.size, other.size, "interior extent mismatch");
        let region = self.interior();
        region.for_each(|i, j, k| {
            let v = other.get(i, j, k);
            self.set(i, j, k, v);
        });
    }

    fn slab(&self, face: Face, halo_side: bool) -> SlabRegion {
        let a = face.axis().index();
        let mut lo = [0isize; 3];
        let mut hi = [0isize; 3];
        for axis in Axis::ALL {
            let b = axis.index();
            let h = self.halo[b] as isize;
            let n = self.size[b] as isize;
            if b == a {
                let (l, u) = match (face.is_high(), halo_side) {
                    (false, false) => (0, h),
                    (true, false) => (n - h, n),
                    (false, true) => (-h, 0),
                    (true, true) => (n, n + h),
                };
                lo[b] = l;
                hi[b] = u;
            } else {
                lo[b] = -h;
                hi[b] = n + h;
            }
        }
        SlabRegion::new(lo, hi)
    }

    /// The innermost halo-width layers of interior cells next to `face`.
    ///
    /// This is what a neighbour receives into its opposite halo slab.
    pub fn boundary_slab(&self, face: Face) -> SlabRegion {
        self.slab(face, false)
    }

    /// The halo padding beyond `face`.
    pub fn halo_slab(&self, face: Face) -> SlabRegion {
        self.slab(face, true)
    }

    /// Copy a region out in storage order.
    pub fn pack(&self, region: SlabRegion) -> Vec<f64> {
        let mut out = Vec::with_capacity(region.len());
        region.for_each(|i, j, k| out.push(self.get(i, j, k)));
        out
    }

    /// Write `values` into a region in storage order.
    ///
    /// # Panics
    ///
    /// Panics if `values.len() != region.len()`. Callers receiving data
    /// from other ranks validate the length first.
    pub fn unpack(&mut self, region: SlabRegion, values: &[f64]) {
        assert_eq!(values.len(), region.len(), "slab length mismatch");
        let mut it = values.iter();
        region.for_each(|i, j, k| {
            if let Some(&v) = it.next() {
                self.set(i, j, k, v);
            }
        });
    }

    /// Copy one region of this field onto another region of the same shape.
    pub fn copy_region(&mut self, from: SlabRegion, to: SlabRegion) {
        let values = self.pack(from);
        self.unpack(to, &values);
    }
}
