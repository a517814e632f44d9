//! Transport core: ID tracking, connection lifecycle, and dispatch.
//!
//! This is the heart of the crate. It provides:
//!
//! - **Identifier tracking**: [`IdTracker`] with the 256-slot per-connection
//!   ID space and retransmission bookkeeping
//! - **Connection lifecycle**: `Opening → Active ⇄ Full`, idle teardown,
//!   failure requeueing
//! - **Dispatch**: [`Dispatcher`], the single-threaded per-worker core that
//!   selects connections, drains the backlog, and matches replies
//! - **Event model**: [`Event`] in, [`Effect`] out, with socket access
//!   behind [`PacketIo`] so the whole core runs under tests with scripted
//!   I/O
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Host / client driver            │
//! ├─────────────────────────────────────────┤
//! │         Dispatcher (this module)        │  ← submit/release + events
//! │   selection, backlog, retry, replies    │
//! ├─────────────────────────────────────────┤
//! │         Packet codec                    │
//! ├─────────────────────────────────────────┤
//! │         Connected UDP sockets           │
//! └─────────────────────────────────────────┘
//! ```

mod connection;
mod dispatcher;
mod event;
mod io;
mod track;
mod transaction;

pub use connection::ConnState;
pub use dispatcher::Dispatcher;
pub use event::{ConnId, Effect, Event, Request, TimerKey};
pub use io::{PacketIo, RecvStatus, SendStatus};
pub use track::{IdTracker, RetryDecision, TrackEntry};
