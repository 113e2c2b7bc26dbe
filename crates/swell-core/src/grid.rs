//! Structured grids, axis topology, and face naming.

use std::fmt;

use crate::error::ConfigError;

/// Boundary topology of one grid axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    /// The axis wraps around (torus).
    Periodic,
    /// The axis has physical walls at both ends.
    Bounded,
    /// The axis is collapsed to a single cell with no halo.
    Flat,
}

/// One of the three grid axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    /// Zonal axis, index `i`.
    X,
    /// Meridional axis, index `j`.
    Y,
    /// Vertical axis, index `k`.
    Z,
}

impl Axis {
    /// All axes in storage order (x fastest).
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Array index of this axis.
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// The two faces bounding this axis, low face first.
    pub fn faces(self) -> [Face; 2] {
        match self {
            Self::X => [Face::West, Face::East],
            Self::Y => [Face::South, Face::North],
            Self::Z => [Face::Bottom, Face::Top],
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        };
        f.write_str(s)
    }
}

/// One of the six faces of a subdomain.
///
/// The declaration order doubles as the side identifier encoded into
/// halo message tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Face {
    /// Low-`x` face.
    West,
    /// High-`x` face.
    East,
    /// Low-`y` face.
    South,
    /// High-`y` face.
    North,
    /// Low-`z` face.
    Bottom,
    /// High-`z` face.
    Top,
}

impl Face {
    /// All faces in side-identifier order.
    pub const ALL: [Face; 6] = [
        Face::West,
        Face::East,
        Face::South,
        Face::North,
        Face::Bottom,
        Face::Top,
    ];

    /// Axis normal to this face.
    pub fn axis(self) -> Axis {
        match self {
            Self::West | Self::East => Axis::X,
            Self::South | Self::North => Axis::Y,
            Self::Bottom | Self::Top => Axis::Z,
        }
    }

    /// `true` for the high-index face of its axis (east, north, top).
    pub fn is_high(self) -> bool {
        matches!(self, Self::East | Self::North | Self::Top)
    }

    /// The face on the other side of the same axis.
    pub fn opposite(self) -> Face {
        match self {
            Self::West => Self::East,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::North => Self::South,
            Self::Bottom => Self::Top,
            Self::Top => Self::Bottom,
        }
    }

    /// Side identifier in `0..6`, used in message tags.
    pub fn side_id(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::West => "west",
            Self::East => "east",
            Self::South => "south",
            Self::North => "north",
            Self::Bottom => "bottom",
            Self::Top => "top",
        };
        f.write_str(s)
    }
}

/// A structured 3-D grid, either global or one rank's subdomain.
///
/// A grid built with [`Grid::new`] describes the whole domain: its local
/// extent equals its global extent and its offset is zero. Domain
/// decomposition derives per-rank grids through [`Grid::with_local`],
/// which keeps topology, spacing, and halo width and only narrows the
/// local window.
///
/// Spacing is uniform per axis. Non-uniform metrics are the business of
/// the operators that consume the grid.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    topology: [Topology; 3],
    global_size: [usize; 3],
    local_size: [usize; 3],
    offset: [usize; 3],
    halo: [usize; 3],
    spacing: [f64; 3],
}

impl Grid {
    /// Create a global grid.
    ///
    /// `halo` applies to every non-flat axis; flat axes always have halo
    /// width 0 and exactly one cell.
    ///
    /// # Examples
    ///
    /// ```
    /// use swell_core::{Grid, Topology};
    ///
    /// let grid = Grid::new(
    ///     [16, 16, 1],
    ///     [Topology::Periodic, Topology::Periodic, Topology::Flat],
    ///     1,
    ///     [1.0, 1.0, 10.0],
    /// )
    /// .unwrap();
    /// assert_eq!(grid.padded_size(), [18, 18, 1]);
    /// ```
    pub fn new(
        size: [usize; 3],
        topology: [Topology; 3],
        halo: usize,
        spacing: [f64; 3],
    ) -> Result<Self, ConfigError> {
        let mut halos = [0usize; 3];
        for axis in Axis::ALL {
            let a = axis.index();
            if size[a] == 0 {
                return Err(ConfigError::EmptyAxis { axis });
            }
            let dx = spacing[a];
            if !dx.is_finite() || dx <= 0.0 {
                return Err(ConfigError::InvalidSpacing { axis, value: dx });
            }
            if topology[a] == Topology::Flat {
                if size[a] != 1 {
                    return Err(ConfigError::FlatAxisExtent {
                        axis,
                        size: size[a],
                    });
                }
            } else {
                halos[a] = halo;
            }
        }
        let grid = Self {
            topology,
            global_size: size,
            local_size: size,
            offset: [0; 3],
            halo: halos,
            spacing,
        };
        grid.check_halo()?;
        Ok(grid)
    }

    /// Derive a subdomain grid with the given local extent and offset.
    ///
    /// Fails if the window leaves the global domain or is narrower than
    /// the halo on a non-flat axis.
    pub fn with_local(&self, local_size: [usize; 3], offset: [usize; 3]) -> Result<Self, ConfigError> {
        for axis in Axis::ALL {
            let a = axis.index();
            if local_size[a] == 0 || offset[a] + local_size[a] > self.global_size[a] {
                return Err(ConfigError::EmptyAxis { axis });
            }
        }
        let grid = Self {
            local_size,
            offset,
            ..self.clone()
        };
        grid.check_halo()?;
        Ok(grid)
    }

    fn check_halo(&self) -> Result<(), ConfigError> {
        for axis in Axis::ALL {
            let a = axis.index();
            if self.topology[a] == Topology::Flat {
                continue;
            }
            let h = self.halo[a];
            if h == 0 || h > self.local_size[a] {
                return Err(ConfigError::HaloTooWide {
                    axis,
                    halo: h,
                    local: self.local_size[a],
                });
            }
        }
        Ok(())
    }

    /// The horizontal (single-level) counterpart of this grid.
    ///
    /// The vertical axis becomes flat with one cell; `Δz` is kept so that
    /// [`depth`](Self::depth) remains meaningful. Used for free-surface
    /// and barotropic-transport fields.
    pub fn horizontal(&self) -> Grid {
        let mut g = self.clone();
        g.topology[2] = Topology::Flat;
        g.global_size[2] = 1;
        g.local_size[2] = 1;
        g.offset[2] = 0;
        g.halo[2] = 0;
        g.spacing[2] = self.spacing[2] * self.global_size[2] as f64;
        g
    }

    /// Topology of one axis.
    pub fn topology(&self, axis: Axis) -> Topology {
        self.topology[axis.index()]
    }

    /// Topology of all three axes.
    pub fn topologies(&self) -> [Topology; 3] {
        self.topology
    }

    /// Global interior extent.
    pub fn global_size(&self) -> [usize; 3] {
        self.global_size
    }

    /// Local (this rank's) interior extent.
    pub fn local_size(&self) -> [usize; 3] {
        self.local_size
    }

    /// Global index of this subdomain's first interior cell.
    pub fn offset(&self) -> [usize; 3] {
        self.offset
    }

    /// Halo width per axis (0 on flat axes).
    pub fn halo(&self) -> [usize; 3] {
        self.halo
    }

    /// Uniform cell spacing `(Δx, Δy, Δz)`.
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Local extent including halo padding.
    pub fn padded_size(&self) -> [usize; 3] {
        [
            self.local_size[0] + 2 * self.halo[0],
            self.local_size[1] + 2 * self.halo[1],
            self.local_size[2] + 2 * self.halo[2],
        ]
    }

    /// Number of local interior cells.
    pub fn interior_len(&self) -> usize {
        self.local_size.iter().product()
    }

    /// Horizontal cell area `Δx·Δy`.
    pub fn cell_area(&self) -> f64 {
        self.spacing[0] * self.spacing[1]
    }

    /// Total water-column depth `Nz·Δz`.
    pub fn depth(&self) -> f64 {
        self.spacing[2] * self.global_size[2] as f64
    }

    /// Whether this grid covers only part of the global domain.
    pub fn is_partitioned(&self) -> bool {
        self.local_size != self.global_size
    }
}
