//! The halo-exchange protocol.
//!
//! After an exchange every halo cell of a field holds either the
//! neighbouring rank's corresponding interior value (faces with
//! [`BoundaryCondition::HaloCommunication`]) or the value produced by the
//! context's [`BoundaryEvaluator`](crate::BoundaryEvaluator) (all other
//! faces).
//!
//! Faces are processed in three axis passes, x then y then z. Within a
//! pass every communicating face posts its send before any receive is
//! issued, so the two faces of an axis never wait on each other. Slabs
//! span the full padded extent of the orthogonal axes; by the time the
//! y pass runs, the x halos it carries are already current, which fills
//! edge and corner halos without diagonal messages.
//!
//! Every rank executes the same sequence of passes, so matching sends
//! and receives always exist.

use std::ops::AddAssign;

use smallvec::SmallVec;
use swell_core::{Axis, CommError, Face, Field};

use crate::boundary::{BoundaryCondition, FieldBoundaryConditions};
use crate::context::RankContext;
use crate::transport::{SendRequest, Transport};

/// Counters describing one exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    /// Messages sent.
    pub messages: usize,
    /// Values sent.
    pub values: usize,
    /// Faces filled by a local periodic copy.
    pub local_fills: usize,
    /// Faces filled by the boundary evaluator with a physical condition.
    pub physical_fills: usize,
}

impl AddAssign for ExchangeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.messages += rhs.messages;
        self.values += rhs.values;
        self.local_fills += rhs.local_fills;
        self.physical_fills += rhs.physical_fills;
    }
}

/// Synchronize the halos of one field.
///
/// `bcs` must have been regularized against the context's connectivity
/// so that inter-rank faces carry
/// [`BoundaryCondition::HaloCommunication`].
pub fn exchange_halos<T: Transport>(
    field: &mut Field,
    bcs: &FieldBoundaryConditions,
    ctx: &RankContext<T>,
) -> Result<ExchangeStats, CommError> {
    exchange_halos_many(&mut [(field, bcs)], ctx)
}

/// Synchronize the halos of several fields in one set of passes.
///
/// Within each pass all fields post their sends, then all fields receive
/// in the same order. Messages for different fields share a tag; the
/// transport's per-`(source, tag)` ordering pairs them up.
pub fn exchange_halos_many<T: Transport>(
    fields: &mut [(&mut Field, &FieldBoundaryConditions)],
    ctx: &RankContext<T>,
) -> Result<ExchangeStats, CommError> {
    let mut stats = ExchangeStats::default();
    for axis in Axis::ALL {
        stats += exchange_axis(fields, axis, ctx)?;
    }
    tracing::trace!(
        rank = ctx.rank().0,
        fields = fields.len(),
        messages = stats.messages,
        values = stats.values,
        "halo exchange complete"
    );
    Ok(stats)
}

fn exchange_axis<T: Transport>(
    fields: &mut [(&mut Field, &FieldBoundaryConditions)],
    axis: Axis,
    ctx: &RankContext<T>,
) -> Result<ExchangeStats, CommError> {
    let me = ctx.rank();
    let tags = ctx.tags();
    let mut stats = ExchangeStats::default();
    let mut pending: SmallVec<[SendRequest; 8]> = SmallVec::new();

    for (field, bcs) in fields.iter() {
        if field.halo()[axis.index()] == 0 {
            continue;
        }
        for face in axis.faces() {
            if let Some(peer) = bcs.get(face).peer() {
                let payload = field.pack(field.boundary_slab(face));
                stats.messages += 1;
                stats.values += payload.len();
                pending.push(ctx.transport().isend(peer, tags.halo_tag(me, peer, face), payload)?);
            }
        }
    }

    for (field, bcs) in fields.iter_mut() {
        if field.halo()[axis.index()] == 0 {
            continue;
        }
        for face in axis.faces() {
            let bc = bcs.get(face);
            match bc {
                BoundaryCondition::HaloCommunication { peer } => {
                    receive_face(field, face, peer, ctx)?;
                }
                BoundaryCondition::Periodic => {
                    ctx.evaluator().fill(field, face, &bc);
                    stats.local_fills += 1;
                }
                _ => {
                    ctx.evaluator().fill(field, face, &bc);
                    stats.physical_fills += 1;
                }
            }
        }
    }

    for req in pending {
        req.wait()?;
    }
    Ok(stats)
}

fn receive_face<T: Transport>(
    field: &mut Field,
    face: Face,
    peer: swell_core::RankId,
    ctx: &RankContext<T>,
) -> Result<(), CommError> {
    let region = field.halo_slab(face);
    let tag = ctx.tags().halo_tag(peer, ctx.rank(), face.opposite());
    let data = ctx.recv_exact(peer, tag, region.len())?;
    field.unpack(region, &data);
    Ok(())
}
