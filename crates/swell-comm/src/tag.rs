//! Message tag encoding.
//!
//! A halo message from rank `from` to rank `to` carrying the slab of the
//! sender's face `side` is tagged
//!
//! ```text
//! from · 10^(d+1) + to · 10 + side
//! ```
//!
//! where `d` is the number of decimal digits of `group_size - 1`. The
//! low digit holds the side (0..6), the next `d` digits hold `to`, and
//! everything above holds `from`, so distinct `(from, to, side)` triples
//! never share a tag. Collective operations use a small block of tags
//! directly above the largest halo tag.

use swell_core::{ConfigError, Face, RankId, Tag};

/// Largest tag a transport is required to accept.
pub const MAX_TAG: u64 = i32::MAX as u64;

/// Collective operations that need their own tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollectiveKind {
    /// Contributions gathered to the root of a reduction.
    Reduce,
    /// Results fanned out from the root.
    Broadcast,
    /// Barrier tokens.
    Barrier,
    /// Pencil transposes in the spectral solver.
    Transpose,
}

impl CollectiveKind {
    const ALL: [CollectiveKind; 4] = [
        CollectiveKind::Reduce,
        CollectiveKind::Broadcast,
        CollectiveKind::Barrier,
        CollectiveKind::Transpose,
    ];

    fn offset(self) -> u64 {
        match self {
            Self::Reduce => 0,
            Self::Broadcast => 1,
            Self::Barrier => 2,
            Self::Transpose => 3,
        }
    }
}

/// Tag encoding for one process group.
///
/// A pure value: built once at setup, after which every tag it produces
/// is known to fit the transport's tag range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagScheme {
    group_size: usize,
    rank_digits: u32,
}

impl TagScheme {
    /// Build the scheme for a group of `group_size` ranks.
    ///
    /// Fails with [`ConfigError::TagOverflow`] if the largest tag, halo or
    /// collective, would exceed [`MAX_TAG`].
    pub fn new(group_size: usize) -> Result<Self, ConfigError> {
        let group_size = group_size.max(1);
        let scheme = Self {
            group_size,
            rank_digits: decimal_digits(group_size - 1),
        };
        let max_tag = scheme.raw_reserved(CollectiveKind::Transpose);
        match max_tag {
            Some(t) if t <= MAX_TAG => Ok(scheme),
            _ => Err(ConfigError::TagOverflow {
                group_size,
                max_tag: max_tag.unwrap_or(u64::MAX),
            }),
        }
    }

    /// Number of ranks in the group.
    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Decimal digits reserved for the destination rank.
    pub fn rank_digits(&self) -> u32 {
        self.rank_digits
    }

    fn from_scale(&self) -> u64 {
        10u64.pow(self.rank_digits + 1)
    }

    /// One past the largest halo tag.
    fn halo_limit(&self) -> Option<u64> {
        self.from_scale().checked_mul(self.group_size as u64)
    }

    fn raw_reserved(&self, kind: CollectiveKind) -> Option<u64> {
        self.halo_limit()?.checked_add(kind.offset())
    }

    /// Tag for the halo slab that `from` sends to `to` across its `side`.
    ///
    /// The receiver of that message computes the same tag as
    /// `halo_tag(peer, me, my_face.opposite())`.
    pub fn halo_tag(&self, from: RankId, to: RankId, side: Face) -> Tag {
        let raw = from.0 as u64 * self.from_scale() + to.0 as u64 * 10 + u64::from(side.side_id());
        // In range for valid ranks: checked against MAX_TAG in `new`.
        Tag(raw as u32)
    }

    /// Tag for a collective operation.
    pub fn reserved_tag(&self, kind: CollectiveKind) -> Tag {
        Tag(self.raw_reserved(kind).unwrap_or(MAX_TAG) as u32)
    }

    /// Every reserved tag, for checks that no halo tag collides with them.
    pub fn reserved_tags(&self) -> impl Iterator<Item = Tag> + '_ {
        CollectiveKind::ALL.iter().map(|&k| self.reserved_tag(k))
    }
}

fn decimal_digits(mut n: usize) -> u32 {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn digits_of_largest_rank() {
        assert_eq!(TagScheme::new(1).unwrap().rank_digits(), 1);
        assert_eq!(TagScheme::new(10).unwrap().rank_digits(), 1);
        assert_eq!(TagScheme::new(11).unwrap().rank_digits(), 2);
        assert_eq!(TagScheme::new(101).unwrap().rank_digits(), 3);
    }

    #[test]
    fn layout_of_small_group() {
        let s = TagScheme::new(4).unwrap();
        assert_eq!(s.halo_tag(RankId(2), RankId(3), Face::North), Tag(233));
        assert_eq!(s.halo_tag(RankId(0), RankId(1), Face::West), Tag(10));
        assert_eq!(s.reserved_tag(CollectiveKind::Reduce), Tag(400));
    }

    #[test]
    fn huge_group_overflows() {
        let err = TagScheme::new(100_000).unwrap_err();
        assert!(matches!(err, ConfigError::TagOverflow { group_size: 100_000, .. }));
    }

    #[test]
    fn largest_group_that_fits() {
        // 10 000 ranks: d = 4, from-scale 10^5, limit 10^9 < i32::MAX.
        assert!(TagScheme::new(10_000).is_ok());
    }

    proptest! {
        #[test]
        fn halo_tags_are_unique(group in 1usize..24) {
            let s = TagScheme::new(group).unwrap();
            let mut seen = HashSet::new();
            for from in 0..group {
                for to in 0..group {
                    for side in Face::ALL {
                        let t = s.halo_tag(RankId(from), RankId(to), side);
                        prop_assert!(seen.insert(t));
                        prop_assert!(u64::from(t.0) <= MAX_TAG);
                    }
                }
            }
            for t in s.reserved_tags() {
                prop_assert!(seen.insert(t));
            }
        }
    }
}
