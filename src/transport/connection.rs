//! One UDP connection to the home server.
//!
//! A connection owns its socket (by handle), its shared encode/receive
//! buffer, its identifier tracker, and the transactions queued or sent on
//! it. Lifecycle: `Unused → Opening → Active ⇄ Full`, with any state
//! terminating on idle timeout, fatal socket error, or shutdown.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use tracing::{error, trace, warn};

use super::event::ConnId;
use super::io::{PacketIo, SendStatus};
use super::track::IdTracker;
use super::transaction::Transaction;
use crate::core::config::TransportConfig;
use crate::core::constants::{
    AUTHENTICATOR_LEN, HEADER_LEN, MESSAGE_AUTHENTICATOR_OVERHEAD, PROXY_STATE_OVERHEAD,
};
use crate::core::types::TxnId;
use crate::packet::{PacketCode, attr, codec};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Allocated, socket not yet requested.
    Unused,
    /// Socket setup in progress.
    Opening,
    /// Eligible for selection.
    Active,
    /// Identifier space exhausted; not selectable, still serves its sent
    /// transactions.
    Full,
}

/// Result of one write attempt.
#[derive(Debug)]
pub(crate) enum WriteStatus {
    /// Encoding failed; the transaction cannot be sent.
    Failed,
    /// Signing failed; the connection must be treated as errored.
    SignFailed,
    /// The socket is not writable; the caller stops dequeueing.
    Blocked,
    /// Hard socket error; the caller stops dequeueing and reconnects. The
    /// transaction itself stays queued for retry on a replacement
    /// connection.
    ConnError,
    /// Written; a reply is awaited within `retry_in`.
    Sent {
        /// Initial retransmission interval from the code's policy.
        retry_in: Duration,
    },
    /// Written in replicate mode; no reply will be awaited.
    Replicated,
}

/// State for one UDP socket bound to the (local, remote) address pair.
#[derive(Debug)]
pub(crate) struct Connection {
    /// Arena handle.
    pub id: ConnId,
    /// Lifecycle state.
    pub state: ConnState,
    /// Shared encode/receive buffer, sized to the maximum packet size.
    pub buf: Vec<u8>,
    /// Send time of the most recent request that got a confirmed reply.
    pub mrs_time: Instant,
    /// In-flight (sent, unanswered) transaction count.
    pub num_requests: usize,
    /// Opaque nonce tagging outgoing packets via Proxy-State.
    pub proxy_state: u32,
    /// Whether the socket is registered for write readiness.
    pub pending: bool,
    /// Deadline of the armed idle timer, if any.
    pub idle_deadline: Option<Instant>,
    /// Transactions written to this connection but not yet on the wire.
    pub queued: VecDeque<TxnId>,
    /// Transactions on the wire awaiting a reply or retransmission.
    pub sent: HashSet<TxnId>,
    /// Identifier allocation and retry bookkeeping.
    pub tracker: IdTracker,
}

impl Connection {
    pub(crate) fn new(id: ConnId, max_packet_size: usize, now: Instant) -> Self {
        Self {
            id,
            state: ConnState::Unused,
            buf: vec![0u8; max_packet_size],
            mrs_time: now,
            num_requests: 0,
            proxy_state: 0,
            pending: false,
            idle_deadline: None,
            queued: VecDeque::new(),
            sent: HashSet::new(),
            tracker: IdTracker::new(),
        }
    }

    /// Record a confirmed reply whose request was sent at `sent_at`.
    pub(crate) fn mark_reply(&mut self, sent_at: Option<Instant>) {
        if let Some(at) = sent_at {
            if at > self.mrs_time {
                self.mrs_time = at;
            }
        }
    }

    /// Encode, tag, sign, and write one request.
    ///
    /// The transaction must already hold an identifier slot on this
    /// connection's tracker. Queue/sent membership and in-flight counting
    /// are the dispatcher's job; this only touches the wire image and the
    /// tracker's retry clock.
    pub(crate) fn write_request(
        &mut self,
        txn: &mut Transaction,
        io: &mut dyn PacketIo,
        config: &TransportConfig,
        now: Instant,
    ) -> WriteStatus {
        let Some(slot) = txn.entry else {
            error!(conn = %self.id, txn = %txn.id, "write attempted without an identifier");
            return WriteStatus::Failed;
        };
        let code = txn.request.code;

        let authenticator: [u8; AUTHENTICATOR_LEN] = if code == PacketCode::AccessRequest {
            rand::random()
        } else {
            [0u8; AUTHENTICATOR_LEN]
        };

        let mut len =
            match codec::encode(&mut self.buf, code, slot, &authenticator, &txn.request.attributes)
            {
                Ok(len) => len,
                Err(e) => {
                    warn!(conn = %self.id, txn = %txn.id, error = %e, "failed encoding request");
                    return WriteStatus::Failed;
                }
            };

        // A previous attempt may have retained bytes; they are stale now.
        txn.packet = None;

        // Tag the packet with this connection's nonce. Added here and not by
        // the host: several connections may carry requests for the same
        // logical session concurrently.
        if len + PROXY_STATE_OVERHEAD <= self.buf.len() {
            let nonce = self.proxy_state.to_be_bytes();
            codec::append_attr(&mut self.buf, &mut len, attr::types::PROXY_STATE, &nonce);
        }

        // Reserve a zero-filled Message-Authenticator for Access-Requests
        // that do not carry one; signing fills it in.
        if code == PacketCode::AccessRequest
            && attr::find_attr(&self.buf, len, attr::types::MESSAGE_AUTHENTICATOR).is_none()
            && len + MESSAGE_AUTHENTICATOR_OVERHEAD <= self.buf.len()
        {
            codec::append_attr(
                &mut self.buf,
                &mut len,
                attr::types::MESSAGE_AUTHENTICATOR,
                &[0u8; AUTHENTICATOR_LEN],
            );
        }

        if let Err(e) = codec::sign(&mut self.buf[..len], None, config.secret.as_bytes()) {
            error!(conn = %self.id, error = %e, "failed signing packet");
            return WriteStatus::SignFailed;
        }

        let mut vector = [0u8; AUTHENTICATOR_LEN];
        vector.copy_from_slice(&self.buf[4..HEADER_LEN]);

        match io.send(self.id, &self.buf[..len]) {
            SendStatus::WouldBlock => {
                txn.packet = Some(self.buf[..len].to_vec());
                WriteStatus::Blocked
            }
            SendStatus::Err(e) => {
                warn!(conn = %self.id, error = %e, "write failed");
                WriteStatus::ConnError
            }
            SendStatus::Sent => {
                if config.replicate {
                    return WriteStatus::Replicated;
                }
                txn.packet = Some(self.buf[..len].to_vec());
                let policy = config.retry.for_code(code);
                let retry_in = self.tracker.start(slot, vector, now, &policy);
                trace!(
                    conn = %self.id,
                    txn = %txn.id,
                    ?retry_in,
                    "proxying request, expecting response"
                );
                WriteStatus::Sent { retry_in }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TransportConfig;
    use crate::packet::Attribute;
    use crate::transport::event::Request;
    use crate::transport::io::RecvStatus;

    struct SinkIo {
        sent: Vec<Vec<u8>>,
        block: bool,
    }

    impl PacketIo for SinkIo {
        fn send(&mut self, _conn: ConnId, buf: &[u8]) -> SendStatus {
            if self.block {
                return SendStatus::WouldBlock;
            }
            self.sent.push(buf.to_vec());
            SendStatus::Sent
        }

        fn recv(&mut self, _conn: ConnId, _buf: &mut [u8]) -> RecvStatus {
            RecvStatus::WouldBlock
        }
    }

    fn config() -> TransportConfig {
        TransportConfig::builder("127.0.0.1:1812".parse().unwrap())
            .secret("s3cr3t")
            .build()
            .unwrap()
    }

    fn conn_with_txn(now: Instant) -> (Connection, Transaction) {
        let mut conn = Connection::new(ConnId(0), 4096, now);
        conn.proxy_state = 0xdead_beef;
        let request = Request::new(
            PacketCode::AccessRequest,
            vec![Attribute::text(attr::types::USER_NAME, "steve")],
        );
        let mut txn = Transaction::new(TxnId(1), request);
        txn.entry = Some(
            conn.tracker
                .alloc(txn.id, PacketCode::AccessRequest)
                .unwrap(),
        );
        txn.conn = Some(conn.id);
        (conn, txn)
    }

    #[test]
    fn test_write_appends_proxy_state_and_message_authenticator() {
        let now = Instant::now();
        let (mut conn, mut txn) = conn_with_txn(now);
        let mut io = SinkIo { sent: Vec::new(), block: false };

        let status = conn.write_request(&mut txn, &mut io, &config(), now);
        assert!(matches!(status, WriteStatus::Sent { .. }));

        let wire = &io.sent[0];
        let len = wire.len();
        assert!(codec::is_well_formed(wire));

        let ps = attr::find_attr(wire, len, attr::types::PROXY_STATE).unwrap();
        assert_eq!(&wire[ps + 2..ps + 6], &0xdead_beefu32.to_be_bytes());

        let ma = attr::find_attr(wire, len, attr::types::MESSAGE_AUTHENTICATOR).unwrap();
        assert_ne!(&wire[ma + 2..ma + 18], &[0u8; 16]);

        // Retained for retransmission, retry clock started.
        assert_eq!(txn.packet.as_deref(), Some(&wire[..]));
        let entry = conn.tracker.find(wire[1]).unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(&entry.authenticator[..], &wire[4..HEADER_LEN]);
    }

    #[test]
    fn test_write_would_block_retains_packet() {
        let now = Instant::now();
        let (mut conn, mut txn) = conn_with_txn(now);
        let mut io = SinkIo { sent: Vec::new(), block: true };

        let status = conn.write_request(&mut txn, &mut io, &config(), now);
        assert!(matches!(status, WriteStatus::Blocked));
        assert!(txn.packet.is_some());

        // Nothing hit the wire, so the retry clock has not started.
        let slot = txn.entry.unwrap();
        assert_eq!(conn.tracker.find(slot).unwrap().count, 0);
    }

    #[test]
    fn test_replicate_write_skips_retry_bookkeeping() {
        let now = Instant::now();
        let (mut conn, mut txn) = conn_with_txn(now);
        let mut io = SinkIo { sent: Vec::new(), block: false };
        let config = TransportConfig::builder("127.0.0.1:1812".parse().unwrap())
            .secret("s3cr3t")
            .replicate(true)
            .build()
            .unwrap();

        let status = conn.write_request(&mut txn, &mut io, &config, now);
        assert!(matches!(status, WriteStatus::Replicated));
        assert!(txn.packet.is_none());

        let slot = txn.entry.unwrap();
        assert_eq!(conn.tracker.find(slot).unwrap().count, 0);
    }
}
