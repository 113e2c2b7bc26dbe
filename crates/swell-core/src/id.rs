//! Strongly-typed identifiers for ranks and message tags.

use std::fmt;

/// Identifies one rank of the distributed process group.
///
/// Rank ids are 0-based, matching the process-group convention used by
/// transports. The 1-based `(i, j, k)` position of a rank lives in
/// `RankTopology`, not here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RankId(pub usize);

impl fmt::Display for RankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for RankId {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

/// Integer message tag carried by every point-to-point message.
///
/// Sender and receiver must compute the same tag for a message to match.
/// Tags are produced by `TagScheme` in `swell-comm`; this type only
/// carries the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u32);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Tag {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
