//! The point-to-point message-passing seam.

use swell_core::{CommError, RankId, Tag};

/// Handle for an in-flight non-blocking send.
///
/// The payload buffer has been handed to the transport; callers wait on
/// the request before relying on delivery. Buffered transports complete
/// sends eagerly, so `wait()` returns immediately for them.
#[derive(Debug)]
#[must_use = "a send is only known to be complete after wait()"]
pub struct SendRequest {
    dest: RankId,
    tag: Tag,
    len: usize,
}

impl SendRequest {
    /// A request for a send the transport has already buffered.
    pub fn completed(dest: RankId, tag: Tag, len: usize) -> Self {
        Self { dest, tag, len }
    }

    /// Destination rank.
    pub fn dest(&self) -> RankId {
        self.dest
    }

    /// Message tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Number of values sent.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the payload was empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Block until the send has completed.
    pub fn wait(self) -> Result<(), CommError> {
        Ok(())
    }
}

/// Point-to-point transport for one rank of a process group.
///
/// # Contract
///
/// - Messages from one source with one tag are received in the order
///   they were sent. No ordering holds across different tags.
/// - `isend` never blocks waiting for the receiver.
/// - `recv` blocks until a matching message arrives. A transport that
///   determines the peer is gone returns [`CommError::RecvFailed`]; one
///   that gives up waiting returns [`CommError::Timeout`].
pub trait Transport: Send + Sync {
    /// This rank's id in `[0, size)`.
    fn rank(&self) -> RankId;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Start sending `payload` to `dest` under `tag`.
    fn isend(&self, dest: RankId, tag: Tag, payload: Vec<f64>) -> Result<SendRequest, CommError>;

    /// Receive the next message from `source` under `tag`.
    fn recv(&self, source: RankId, tag: Tag) -> Result<Vec<f64>, CommError>;
}
