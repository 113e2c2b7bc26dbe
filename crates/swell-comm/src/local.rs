//! In-process process groups: one thread per rank over crossbeam channels.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use swell_core::{CommError, RankId, Tag};

use crate::transport::{SendRequest, Transport};

/// How long a receive waits before the peer is declared gone.
const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Envelope {
    source: RankId,
    tag: Tag,
    payload: Vec<f64>,
}

/// Factory for the transports of an in-process process group.
///
/// # Examples
///
/// ```
/// use swell_comm::{LocalGroup, Transport};
/// use swell_core::{RankId, Tag};
///
/// let mut ranks = LocalGroup::new(2).into_transports();
/// let b = ranks.pop().unwrap();
/// let a = ranks.pop().unwrap();
/// a.isend(RankId(1), Tag(7), vec![1.0, 2.0]).unwrap().wait().unwrap();
/// assert_eq!(b.recv(RankId(0), Tag(7)).unwrap(), vec![1.0, 2.0]);
/// ```
pub struct LocalGroup {
    transports: Vec<LocalTransport>,
}

impl LocalGroup {
    /// Build a group of `size` ranks.
    pub fn new(size: usize) -> Self {
        Self::with_timeout(size, DEFAULT_RECV_TIMEOUT)
    }

    /// Build a group whose receives give up after `timeout`.
    pub fn with_timeout(size: usize, timeout: Duration) -> Self {
        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();
        let transports = receivers
            .into_iter()
            .enumerate()
            .map(|(r, inbox)| LocalTransport {
                rank: RankId(r),
                peers: senders.clone(),
                inbox,
                unmatched: Mutex::new(VecDeque::new()),
                timeout,
            })
            .collect();
        Self { transports }
    }

    /// Number of ranks.
    pub fn size(&self) -> usize {
        self.transports.len()
    }

    /// Hand out the per-rank transports, in rank order.
    pub fn into_transports(self) -> Vec<LocalTransport> {
        self.transports
    }
}

/// One rank's endpoint in a [`LocalGroup`].
///
/// Sends are buffered in the destination's unbounded inbox and complete
/// eagerly. Receives drain the inbox, parking messages for other
/// `(source, tag)` pairs until they are asked for.
pub struct LocalTransport {
    rank: RankId,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    unmatched: Mutex<VecDeque<Envelope>>,
    timeout: Duration,
}

impl LocalTransport {
    /// A transport for a group of one.
    pub fn single() -> Self {
        let mut transports = LocalGroup::new(1).into_transports();
        // A group of one always yields exactly one transport.
        transports.remove(0)
    }

    fn take_unmatched(&self, source: RankId, tag: Tag) -> Result<Option<Vec<f64>>, CommError> {
        let mut parked = self
            .unmatched
            .lock()
            .map_err(|_| CommError::RecvFailed { source, tag })?;
        let pos = parked
            .iter()
            .position(|e| e.source == source && e.tag == tag);
        Ok(pos.and_then(|p| parked.remove(p)).map(|e| e.payload))
    }

    fn park(&self, envelope: Envelope) -> Result<(), CommError> {
        let (source, tag) = (envelope.source, envelope.tag);
        self.unmatched
            .lock()
            .map_err(|_| CommError::RecvFailed { source, tag })?
            .push_back(envelope);
        Ok(())
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> RankId {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn isend(&self, dest: RankId, tag: Tag, payload: Vec<f64>) -> Result<SendRequest, CommError> {
        let peer = self.peers.get(dest.0).ok_or(CommError::InvalidPeer {
            rank: dest,
            group_size: self.peers.len(),
        })?;
        let len = payload.len();
        peer.send(Envelope {
            source: self.rank,
            tag,
            payload,
        })
        .map_err(|_| CommError::SendFailed { dest, tag })?;
        Ok(SendRequest::completed(dest, tag, len))
    }

    fn recv(&self, source: RankId, tag: Tag) -> Result<Vec<f64>, CommError> {
        if source.0 >= self.peers.len() {
            return Err(CommError::InvalidPeer {
                rank: source,
                group_size: self.peers.len(),
            });
        }
        if let Some(payload) = self.take_unmatched(source, tag)? {
            return Ok(payload);
        }
        loop {
            match self.inbox.recv_timeout(self.timeout) {
                Ok(envelope) if envelope.source == source && envelope.tag == tag => {
                    return Ok(envelope.payload);
                }
                Ok(envelope) => self.park(envelope)?,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CommError::Timeout {
                        source,
                        tag,
                        waited_ms: self.timeout.as_millis() as u64,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CommError::RecvFailed { source, tag });
                }
            }
        }
    }
}
