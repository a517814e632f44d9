//! Host-facing types shared across layers.

use std::fmt;

/// Stable handle for one logical request in flight.
///
/// Allocated by the caller (the client driver uses a counter); the dispatcher
/// never reuses a live id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Result category of a completed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The peer accepted the request (Access-Accept, Accounting-Response,
    /// Disconnect-ACK, CoA-ACK).
    Success,
    /// The peer rejected the request (Access-Reject, Disconnect-NAK, CoA-NAK).
    Rejected,
    /// The peer answered with a challenge (Access-Challenge).
    Updated,
    /// The reply was authentic but its code is unknown, unsupported, or
    /// inconsistent with the request's code family.
    Invalid,
    /// Retransmissions were exhausted without any reply.
    NoResponse,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Rejected => "rejected",
            Outcome::Updated => "updated",
            Outcome::Invalid => "invalid",
            Outcome::NoResponse => "no-response",
        };
        f.write_str(s)
    }
}

/// How a transaction finished, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The transaction resolved to a result category.
    Resolved(Outcome),
    /// The transaction could not be written and was abandoned.
    Failed,
}

/// Synchronous result of submitting a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The transaction is in flight; completion arrives asynchronously.
    Yield,
    /// Fire-and-forget write completed; no reply will be awaited.
    Ok,
    /// The request could not be encoded or written.
    Fail,
}
