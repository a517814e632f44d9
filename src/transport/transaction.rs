//! The unit of work linking one logical request to one connection.

use crate::core::types::TxnId;
use super::event::{ConnId, Request};

/// Which collection currently holds a transaction.
///
/// Exactly one of: the dispatcher backlog, a connection's queued set, or a
/// connection's sent set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Place {
    /// In the dispatcher backlog, bound to no connection.
    Backlog,
    /// Written to a connection's queue, not yet on the wire.
    Queued,
    /// On the wire, awaiting a reply or retransmission.
    Sent,
}

/// One logical request in flight.
#[derive(Debug)]
pub(crate) struct Transaction {
    /// Stable handle.
    pub id: TxnId,
    /// The request as submitted by the host; re-encoded on every write
    /// attempt.
    pub request: Request,
    /// Owning connection; `None` while backlogged.
    pub conn: Option<ConnId>,
    /// Identifier slot on the owning connection's tracker.
    pub entry: Option<u8>,
    /// Encoded bytes retained while a retransmission may need them.
    pub packet: Option<Vec<u8>>,
    /// Current membership.
    pub place: Place,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, request: Request) -> Self {
        Self {
            id,
            request,
            conn: None,
            entry: None,
            packet: None,
            place: Place::Backlog,
        }
    }

    /// Detach from a terminating connection so the transaction can be
    /// reassigned from the backlog.
    pub(crate) fn unlink(&mut self) {
        self.conn = None;
        self.entry = None;
        self.packet = None;
        self.place = Place::Backlog;
    }
}
