//! Inter-rank communication for Swell.
//!
//! Ranks talk to each other through a [`Transport`]: non-blocking sends
//! and blocking receives of `f64` payloads identified by `(source, tag)`.
//! On top of that this crate builds:
//!
//! - [`TagScheme`]: the collision-free tag encoding for halo messages and
//!   collectives, validated once at setup.
//! - [`RankContext`]: everything a rank needs to communicate (transport,
//!   topology, connectivity, tags, local grid) plus deterministic
//!   reductions and a barrier.
//! - [`BoundaryCondition`] and [`BoundaryEvaluator`]: what happens at the
//!   faces that have no neighbouring rank.
//! - [`exchange_halos`] / [`exchange_halos_many`]: the halo-exchange
//!   protocol itself.
//!
//! [`LocalGroup`] runs a whole process group inside one address space,
//! one thread per rank.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod boundary;
pub mod context;
pub mod halo;
pub mod local;
pub mod tag;
pub mod transport;

pub use boundary::{
    BoundaryCondition, BoundaryEvaluator, DefaultBoundaryEvaluator, FieldBoundaryConditions,
};
pub use context::RankContext;
pub use halo::{exchange_halos, exchange_halos_many, ExchangeStats};
pub use local::{LocalGroup, LocalTransport};
pub use tag::{CollectiveKind, TagScheme};
pub use transport::{SendRequest, Transport};
