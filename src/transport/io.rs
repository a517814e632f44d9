//! Non-blocking socket access used by the dispatcher.
//!
//! The dispatcher never touches a socket directly: reads and writes go
//! through [`PacketIo`], keyed by connection handle. The tokio driver
//! implements it over connected UDP sockets; tests inject a scripted fake.

use std::io;

use super::event::ConnId;

/// Result of a non-blocking send.
#[derive(Debug)]
pub enum SendStatus {
    /// The whole datagram was written.
    Sent,
    /// The socket is not writable right now.
    WouldBlock,
    /// Hard socket error.
    Err(io::Error),
}

/// Result of a non-blocking receive.
#[derive(Debug)]
pub enum RecvStatus {
    /// One datagram of this length was read into the buffer.
    Data(usize),
    /// No datagram is waiting.
    WouldBlock,
    /// Hard socket error.
    Err(io::Error),
}

/// Non-blocking datagram I/O on a pool of connected sockets.
pub trait PacketIo {
    /// Send one datagram on the given connection's socket.
    fn send(&mut self, conn: ConnId, buf: &[u8]) -> SendStatus;

    /// Receive one datagram from the given connection's socket.
    fn recv(&mut self, conn: ConnId, buf: &mut [u8]) -> RecvStatus;
}
