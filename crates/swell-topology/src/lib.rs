//! Rank topology and domain decomposition for Swell.
//!
//! This crate answers three setup-time questions for a distributed run:
//!
//! - where this rank sits in the `Rx × Ry × Rz` process grid
//!   ([`RankTopology`]),
//! - which ranks own the six neighbouring subdomains
//!   ([`RankConnectivity`]),
//! - which slice of the global grid this rank owns ([`decompose`]).
//!
//! Everything here is computed once, deterministically, and is immutable
//! afterwards. Every halo exchange consults the results.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod connectivity;
pub mod decompose;
pub mod rank;

pub use connectivity::RankConnectivity;
pub use decompose::{decompose, partition};
pub use rank::{index_to_rank, rank_to_index, RankTopology};
