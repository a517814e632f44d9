//! Events into and effects out of the dispatcher.
//!
//! The event loop callbacks of the original module are remodeled as value
//! dispatch: the driver feeds [`Event`]s into the single-threaded
//! [`Dispatcher`](super::Dispatcher) and executes the [`Effect`]s it emits.
//! Every handler is then exercisable without a real socket or timer wheel.

use std::fmt;
use std::time::Instant;

use crate::core::types::{Completion, TxnId};
use crate::packet::{Attribute, PacketCode};

/// Stable handle for one connection in the dispatcher's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identity of a one-shot timer owned by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Idle teardown timer for a connection.
    Idle(ConnId),
    /// Retransmission timer for a sent transaction.
    Retry(TxnId),
    /// Delayed re-open after a failed connection attempt.
    Reconnect,
}

/// One logical request as submitted by the host.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request packet code.
    pub code: PacketCode,
    /// Attributes to encode, in order.
    pub attributes: Vec<Attribute>,
}

impl Request {
    /// Create a request.
    pub fn new(code: PacketCode, attributes: Vec<Attribute>) -> Self {
        Self { code, attributes }
    }
}

/// Input to the dispatcher.
#[derive(Debug)]
pub enum Event {
    /// The driver finished opening a connection's socket.
    Opened(ConnId),
    /// The driver failed to open a connection's socket.
    OpenFailed(ConnId),
    /// The connection's socket has readable data.
    Readable(ConnId),
    /// The connection's socket became writable.
    Writable(ConnId),
    /// A previously scheduled timer fired.
    TimerFired(TimerKey),
    /// The driver observed a socket-level error on this connection.
    SocketError(ConnId),
}

/// Side effect requested by the dispatcher; executed by the driver.
#[derive(Debug)]
pub enum Effect {
    /// Create and connect the socket for a new connection, then feed back
    /// [`Event::Opened`] or [`Event::OpenFailed`].
    OpenSocket(ConnId),
    /// Close and forget the connection's socket.
    CloseSocket(ConnId),
    /// Start or stop watching the socket for write readiness. Read
    /// readiness is always watched while the socket is open.
    SetWriteInterest {
        /// Connection whose registration changes.
        conn: ConnId,
        /// Whether write readiness should be watched.
        enabled: bool,
    },
    /// Arm (or re-arm) a one-shot timer.
    SetTimer {
        /// Timer identity; re-arming replaces any pending instance.
        key: TimerKey,
        /// Absolute deadline.
        deadline: Instant,
    },
    /// Cancel a pending timer, if armed.
    CancelTimer(TimerKey),
    /// Notify the host that an awaited transaction finished.
    Complete {
        /// The finished transaction.
        txn: TxnId,
        /// How it finished.
        completion: Completion,
    },
}
