//! Per-worker dispatcher: connection selection, backlog, and event handling.
//!
//! One dispatcher owns a disjoint pool of connections and is touched only
//! from the event-loop thread that owns it; no locking anywhere. The driver
//! feeds it [`Event`]s and executes the [`Effect`]s it emits, so every
//! handler runs the same under tests with scripted I/O.
//!
//! Connection selection prefers the connection that has gone longest
//! without a confirmed reply, tie-broken toward the one with fewer free
//! identifiers. Both criteria point the same way; this matches the
//! long-standing proxy ordering and must not be "fixed" casually.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, trace, warn};

use super::connection::{ConnState, Connection, WriteStatus};
use super::event::{ConnId, Effect, Event, Request, TimerKey};
use super::io::{PacketIo, RecvStatus, SendStatus};
use super::track::RetryDecision;
use super::transaction::{Place, Transaction};
use crate::core::config::TransportConfig;
use crate::core::types::{Completion, Outcome, SubmitOutcome, TxnId};
use crate::packet::{OriginalHeader, classify_reply, codec};

/// Single-threaded transport core for one worker.
///
/// Drive it with [`submit`](Self::submit), [`release`](Self::release), and
/// [`handle`](Self::handle); execute the effects each call appends.
#[derive(Debug)]
pub struct Dispatcher {
    config: Arc<TransportConfig>,
    conns: HashMap<ConnId, Connection>,
    txns: HashMap<TxnId, Transaction>,
    /// Selectable connections (state Active).
    active: Vec<ConnId>,
    /// Connections with an exhausted identifier space.
    full: Vec<ConnId>,
    /// Connections whose socket is still being set up.
    opening: Vec<ConnId>,
    /// Transactions not yet bound to any connection, oldest first.
    backlog: VecDeque<TxnId>,
    /// Mirrors `!backlog.is_empty()`.
    pending: bool,
    next_conn: u64,
}

impl Dispatcher {
    /// Create a dispatcher for one worker thread.
    pub fn new(config: Arc<TransportConfig>) -> Self {
        Self {
            config,
            conns: HashMap::new(),
            txns: HashMap::new(),
            active: Vec::new(),
            full: Vec::new(),
            opening: Vec::new(),
            backlog: VecDeque::new(),
            pending: false,
            next_conn: 0,
        }
    }

    /// Open the first connection eagerly so early submissions do not all
    /// stack up behind a cold start.
    pub fn bootstrap(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        self.open_connection(now, effects);
    }

    /// Transactions submitted and not yet completed or released.
    pub fn outstanding(&self) -> usize {
        self.txns.len()
    }

    /// Submit one logical request.
    ///
    /// `id` must be fresh; the caller allocates it and correlates the
    /// eventual [`Effect::Complete`] by it.
    pub fn submit(
        &mut self,
        id: TxnId,
        request: Request,
        io: &mut dyn PacketIo,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) -> SubmitOutcome {
        if !request.code.is_request() {
            error!(txn = %id, code = %request.code, "refusing to send a non-request code");
            return SubmitOutcome::Fail;
        }

        // Older backlogged work gets first shot at freed capacity.
        if self.pending {
            self.drain_backlog(now, effects);
        }

        self.txns.insert(id, Transaction::new(id, request));

        let Some(cid) = self.acquire(id) else {
            // Nothing selectable: open a connection unless one is already on
            // its way, and park the request.
            if self.opening.is_empty() {
                self.open_connection(now, effects);
            }
            self.backlog.push_back(id);
            self.pending = true;
            trace!(txn = %id, "parked awaiting connection capacity");
            return SubmitOutcome::Yield;
        };

        // The socket is write-blocked: preserve ordering behind the queue
        // and let the writable handler drain it.
        let queue_busy = self
            .conns
            .get(&cid)
            .map(|c| !c.queued.is_empty())
            .unwrap_or(false);
        if queue_busy {
            self.enqueue(cid, id, now, effects);
            return SubmitOutcome::Yield;
        }

        match self.write_txn(cid, id, io, now) {
            WriteStatus::Failed => {
                self.destroy(id);
                SubmitOutcome::Fail
            }
            WriteStatus::SignFailed => {
                self.destroy(id);
                self.fail_connection(cid, now, effects);
                SubmitOutcome::Fail
            }
            WriteStatus::ConnError => {
                // The transaction is not at fault; park it on the dying
                // connection so the teardown re-homes it.
                if let Some(txn) = self.txns.get_mut(&id) {
                    txn.place = Place::Queued;
                }
                if let Some(conn) = self.conns.get_mut(&cid) {
                    conn.queued.push_back(id);
                }
                self.fail_connection(cid, now, effects);
                SubmitOutcome::Yield
            }
            WriteStatus::Blocked => {
                self.enqueue(cid, id, now, effects);
                SubmitOutcome::Yield
            }
            WriteStatus::Sent { retry_in } => {
                self.mark_sent(cid, id, retry_in, now, effects);
                SubmitOutcome::Yield
            }
            WriteStatus::Replicated => {
                self.destroy(id);
                SubmitOutcome::Ok
            }
        }
    }

    /// Release a transaction regardless of where it currently lives.
    pub fn release(&mut self, id: TxnId, now: Instant, effects: &mut Vec<Effect>) {
        let Some(txn) = self.txns.remove(&id) else {
            return;
        };
        trace!(txn = %id, "released by host");
        match txn.place {
            Place::Backlog => {
                self.backlog.retain(|t| *t != id);
                self.pending = !self.backlog.is_empty();
            }
            Place::Queued => {
                if let Some(cid) = txn.conn {
                    if let Some(conn) = self.conns.get_mut(&cid) {
                        conn.queued.retain(|t| *t != id);
                        if let Some(slot) = txn.entry {
                            conn.tracker.free_entry(slot);
                        }
                    }
                    self.reactivate_if_full(cid);
                    let queued = self
                        .conns
                        .get(&cid)
                        .map(|c| !c.queued.is_empty())
                        .unwrap_or(false);
                    if !queued {
                        self.set_pending(cid, false, now, effects);
                    }
                }
            }
            Place::Sent => {
                effects.push(Effect::CancelTimer(TimerKey::Retry(id)));
                if let Some(cid) = txn.conn {
                    if let Some(conn) = self.conns.get_mut(&cid) {
                        conn.sent.remove(&id);
                        conn.num_requests = conn.num_requests.saturating_sub(1);
                        if let Some(slot) = txn.entry {
                            conn.tracker.free_entry(slot);
                        }
                    }
                    self.reactivate_if_full(cid);
                    self.schedule_idle(cid, now, effects);
                }
            }
        }
    }

    /// Dispatch one event from the driver.
    pub fn handle(
        &mut self,
        event: Event,
        io: &mut dyn PacketIo,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        match event {
            Event::Opened(cid) => self.on_opened(cid, now, effects),
            Event::OpenFailed(cid) => self.on_open_failed(cid, now, effects),
            Event::Readable(cid) => self.read_replies(cid, io, now, effects),
            Event::Writable(cid) => self.drain_queue(cid, io, now, effects),
            Event::TimerFired(TimerKey::Idle(cid)) => self.on_idle_timeout(cid, effects),
            Event::TimerFired(TimerKey::Retry(id)) => self.on_retry_timer(id, io, now, effects),
            Event::TimerFired(TimerKey::Reconnect) => self.on_reconnect_timer(now, effects),
            Event::SocketError(cid) => {
                error!(conn = %cid, "socket error reported");
                self.fail_connection(cid, now, effects);
            }
        }
    }

    /// Terminate everything. Outstanding transactions complete as failed.
    pub fn shutdown(&mut self, effects: &mut Vec<Effect>) {
        let ids: Vec<ConnId> = self.conns.keys().copied().collect();
        for cid in ids {
            self.terminate(cid, effects);
        }
        while let Some(id) = self.backlog.pop_front() {
            if self.txns.remove(&id).is_some() {
                effects.push(Effect::Complete {
                    txn: id,
                    completion: Completion::Failed,
                });
            }
        }
        self.pending = false;
        debug!("transport shut down");
    }

    // ------------------------------------------------------------------
    // Connection selection & capacity
    // ------------------------------------------------------------------

    fn peek_active(&self) -> Option<ConnId> {
        self.active
            .iter()
            .filter_map(|id| {
                self.conns
                    .get(id)
                    .map(|c| (*id, c.mrs_time, c.tracker.free_slots()))
            })
            .min_by_key(|&(_, mrs, free)| (mrs, free))
            .map(|(id, _, _)| id)
    }

    /// Bind a transaction to the best Active connection, moving the
    /// connection to Full if that used its last identifier.
    fn acquire(&mut self, txn_id: TxnId) -> Option<ConnId> {
        let cid = self.peek_active()?;
        let code = self.txns.get(&txn_id)?.request.code;
        let conn = self.conns.get_mut(&cid)?;
        let slot = match conn.tracker.alloc(txn_id, code) {
            Ok(slot) => slot,
            Err(e) => {
                // An Active connection always has free identifiers.
                error!(conn = %cid, error = %e, "selection invariant violated");
                return None;
            }
        };
        let free = conn.tracker.free_slots();
        if free == 0 {
            conn.state = ConnState::Full;
        }
        if let Some(txn) = self.txns.get_mut(&txn_id) {
            txn.conn = Some(cid);
            txn.entry = Some(slot);
        }
        self.active.retain(|c| *c != cid);
        if free > 0 {
            self.active.push(cid);
        } else {
            self.full.push(cid);
            trace!(conn = %cid, "identifier space exhausted, connection full");
        }
        Some(cid)
    }

    /// Move a Full connection back to Active after an identifier freed.
    fn reactivate_if_full(&mut self, cid: ConnId) {
        let Some(conn) = self.conns.get_mut(&cid) else {
            return;
        };
        if conn.state == ConnState::Full && conn.tracker.free_slots() > 0 {
            conn.state = ConnState::Active;
            self.full.retain(|c| *c != cid);
            self.active.push(cid);
            trace!(conn = %cid, "identifier freed, connection selectable again");
        }
    }

    fn open_connection(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        let cid = ConnId(self.next_conn);
        self.next_conn += 1;
        let mut conn = Connection::new(cid, self.config.max_packet_size, now);
        conn.state = ConnState::Opening;
        self.conns.insert(cid, conn);
        self.opening.push(cid);
        effects.push(Effect::OpenSocket(cid));
        debug!(conn = %cid, server = %self.config.server_addr, "opening new connection");
    }

    // ------------------------------------------------------------------
    // Backlog
    // ------------------------------------------------------------------

    /// Move backlogged transactions onto connections while capacity lasts.
    fn drain_backlog(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        while let Some(&head) = self.backlog.front() {
            if !self.txns.contains_key(&head) {
                self.backlog.pop_front();
                continue;
            }
            if self.acquire(head).is_none() {
                break;
            }
            self.backlog.pop_front();
            let cid = self.txns.get(&head).and_then(|t| t.conn);
            if let Some(cid) = cid {
                self.enqueue(cid, head, now, effects);
            }
        }
        self.pending = !self.backlog.is_empty();
    }

    fn enqueue(&mut self, cid: ConnId, id: TxnId, now: Instant, effects: &mut Vec<Effect>) {
        if let Some(txn) = self.txns.get_mut(&id) {
            txn.place = Place::Queued;
        }
        if let Some(conn) = self.conns.get_mut(&cid) {
            conn.queued.push_back(id);
        }
        self.set_pending(cid, true, now, effects);
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    fn write_txn(&mut self, cid: ConnId, id: TxnId, io: &mut dyn PacketIo, now: Instant) -> WriteStatus {
        let config = Arc::clone(&self.config);
        let Some(conn) = self.conns.get_mut(&cid) else {
            return WriteStatus::Failed;
        };
        let Some(txn) = self.txns.get_mut(&id) else {
            return WriteStatus::Failed;
        };
        conn.write_request(txn, io, &config, now)
    }

    fn mark_sent(
        &mut self,
        cid: ConnId,
        id: TxnId,
        retry_in: std::time::Duration,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        if let Some(txn) = self.txns.get_mut(&id) {
            txn.place = Place::Sent;
        }
        if let Some(conn) = self.conns.get_mut(&cid) {
            conn.sent.insert(id);
            conn.num_requests += 1;
        }
        effects.push(Effect::SetTimer {
            key: TimerKey::Retry(id),
            deadline: now + retry_in,
        });
        // New in-flight work cancels any pending idle teardown.
        self.schedule_idle(cid, now, effects);
    }

    /// Writable notification: pop and write queued transactions until the
    /// socket blocks or the queue empties, then match write-interest to
    /// what is left.
    fn drain_queue(&mut self, cid: ConnId, io: &mut dyn PacketIo, now: Instant, effects: &mut Vec<Effect>) {
        loop {
            let Some(&head) = self.conns.get(&cid).and_then(|c| c.queued.front()) else {
                break;
            };
            match self.write_txn(cid, head, io, now) {
                WriteStatus::Sent { retry_in } => {
                    if let Some(conn) = self.conns.get_mut(&cid) {
                        conn.queued.pop_front();
                    }
                    self.mark_sent(cid, head, retry_in, now, effects);
                }
                WriteStatus::Replicated => {
                    if let Some(conn) = self.conns.get_mut(&cid) {
                        conn.queued.pop_front();
                    }
                    self.destroy(head);
                    effects.push(Effect::Complete {
                        txn: head,
                        completion: Completion::Resolved(Outcome::Success),
                    });
                }
                WriteStatus::Failed => {
                    // Unencodable request: complete it as failed so the rest
                    // of the queue keeps moving.
                    if let Some(conn) = self.conns.get_mut(&cid) {
                        conn.queued.pop_front();
                    }
                    self.destroy(head);
                    effects.push(Effect::Complete {
                        txn: head,
                        completion: Completion::Failed,
                    });
                }
                WriteStatus::Blocked => break,
                WriteStatus::SignFailed | WriteStatus::ConnError => {
                    self.fail_connection(cid, now, effects);
                    return;
                }
            }
        }
        let queued = self
            .conns
            .get(&cid)
            .map(|c| !c.queued.is_empty())
            .unwrap_or(false);
        self.set_pending(cid, queued, now, effects);
    }

    /// Toggle write-readiness registration, idempotently.
    fn set_pending(&mut self, cid: ConnId, enabled: bool, now: Instant, effects: &mut Vec<Effect>) {
        let Some(conn) = self.conns.get_mut(&cid) else {
            return;
        };
        if conn.pending == enabled {
            return;
        }
        conn.pending = enabled;
        effects.push(Effect::SetWriteInterest { conn: cid, enabled });
        if enabled {
            // Writing means not idle.
            if conn.idle_deadline.take().is_some() {
                effects.push(Effect::CancelTimer(TimerKey::Idle(cid)));
            }
        } else {
            self.schedule_idle(cid, now, effects);
        }
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Readable notification: drain every buffered datagram.
    fn read_replies(&mut self, cid: ConnId, io: &mut dyn PacketIo, now: Instant, effects: &mut Vec<Effect>) {
        let config = Arc::clone(&self.config);
        loop {
            let status = {
                let Some(conn) = self.conns.get_mut(&cid) else {
                    return;
                };
                io.recv(cid, &mut conn.buf)
            };
            let packet = match status {
                RecvStatus::WouldBlock | RecvStatus::Data(0) => return,
                RecvStatus::Err(e) => {
                    warn!(conn = %cid, error = %e, "read failed");
                    self.fail_connection(cid, now, effects);
                    return;
                }
                RecvStatus::Data(len) => match self.conns.get(&cid) {
                    Some(conn) => conn.buf[..len].to_vec(),
                    None => return,
                },
            };

            // Replicating: drain the socket but ignore all content.
            if config.replicate {
                continue;
            }

            if !codec::is_well_formed(&packet) {
                debug!(conn = %cid, "ignoring malformed packet");
                continue;
            }

            let id = packet[1];
            let Some((txn_id, req_code, vector, sent_at)) = self.conns.get(&cid).and_then(|c| {
                c.tracker
                    .find(id)
                    .map(|e| (e.txn, e.code, e.authenticator, e.start))
            }) else {
                debug!(conn = %cid, id, "ignoring response to a request we did not send");
                continue;
            };
            if sent_at.is_none() {
                debug!(conn = %cid, id, "ignoring response to a request not yet on the wire");
                continue;
            }

            let original = OriginalHeader {
                code: req_code,
                id,
                authenticator: vector,
            };
            if let Err(e) = codec::verify(&packet, &original, config.secret.as_bytes()) {
                // Possibly hostile traffic: stop draining this burst.
                warn!(conn = %cid, error = %e, "ignoring response with invalid signature");
                return;
            }

            self.rerank_after_reply(cid, sent_at);

            let outcome = classify_reply(packet[0], req_code);
            if outcome == Outcome::Invalid {
                debug!(
                    conn = %cid,
                    code = packet[0],
                    request = %req_code,
                    "reply code invalid for request"
                );
            }
            self.finish(cid, txn_id, Completion::Resolved(outcome), now, effects);
        }
    }

    /// A reply always puts its connection back into Active ranking, with an
    /// updated confirmed-reply timestamp.
    fn rerank_after_reply(&mut self, cid: ConnId, sent_at: Option<Instant>) {
        let Some(conn) = self.conns.get_mut(&cid) else {
            return;
        };
        match conn.state {
            ConnState::Active => self.active.retain(|c| *c != cid),
            ConnState::Full => self.full.retain(|c| *c != cid),
            ConnState::Unused | ConnState::Opening => {}
        }
        conn.mark_reply(sent_at);
        conn.state = ConnState::Active;
        self.active.push(cid);
    }

    // ------------------------------------------------------------------
    // Completion & teardown
    // ------------------------------------------------------------------

    /// Finish an awaited transaction and notify the host.
    fn finish(
        &mut self,
        cid: ConnId,
        id: TxnId,
        completion: Completion,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        if let Some(conn) = self.conns.get_mut(&cid) {
            if let Some(slot) = self.txns.get(&id).and_then(|t| t.entry) {
                conn.tracker.free_entry(slot);
            }
            if conn.sent.remove(&id) {
                conn.num_requests = conn.num_requests.saturating_sub(1);
            }
        }
        self.txns.remove(&id);
        effects.push(Effect::CancelTimer(TimerKey::Retry(id)));
        self.reactivate_if_full(cid);
        self.schedule_idle(cid, now, effects);
        effects.push(Effect::Complete { txn: id, completion });
    }

    /// Drop a transaction without notifying the host.
    fn destroy(&mut self, id: TxnId) {
        let Some(txn) = self.txns.remove(&id) else {
            return;
        };
        if let (Some(cid), Some(slot)) = (txn.conn, txn.entry) {
            if let Some(conn) = self.conns.get_mut(&cid) {
                conn.tracker.free_entry(slot);
            }
            self.reactivate_if_full(cid);
        }
    }

    /// (Re)arm or cancel the idle-teardown timer to match in-flight work.
    fn schedule_idle(&mut self, cid: ConnId, now: Instant, effects: &mut Vec<Effect>) {
        let idle_timeout = self.config.idle_timeout;
        let Some(conn) = self.conns.get_mut(&cid) else {
            return;
        };
        if conn.num_requests > 0 {
            if conn.idle_deadline.take().is_some() {
                effects.push(Effect::CancelTimer(TimerKey::Idle(cid)));
            }
            return;
        }
        if idle_timeout.is_zero() {
            return;
        }
        let when = now + idle_timeout;
        // Only push the deadline forward; re-arming replaces any pending
        // instance, so at most one idle timer is ever live.
        if conn.idle_deadline.map_or(true, |d| when > d) {
            conn.idle_deadline = Some(when);
            trace!(conn = %cid, "resetting idle timeout");
            effects.push(Effect::SetTimer {
                key: TimerKey::Idle(cid),
                deadline: when,
            });
        }
    }

    fn on_opened(&mut self, cid: ConnId, now: Instant, effects: &mut Vec<Effect>) {
        let Some(conn) = self.conns.get_mut(&cid) else {
            return;
        };
        conn.proxy_state = rand::random();
        // A fresh connection ranks as just-confirmed.
        conn.mrs_time = now;
        conn.state = ConnState::Active;
        self.opening.retain(|c| *c != cid);
        self.active.push(cid);
        debug!(conn = %cid, "opened new connection");

        if self.pending {
            self.drain_backlog(now, effects);
        }

        let queued = self
            .conns
            .get(&cid)
            .map(|c| !c.queued.is_empty())
            .unwrap_or(false);
        if queued {
            self.set_pending(cid, true, now, effects);
        } else {
            self.schedule_idle(cid, now, effects);
        }
    }

    fn on_open_failed(&mut self, cid: ConnId, now: Instant, effects: &mut Vec<Effect>) {
        warn!(conn = %cid, "failed opening connection");
        self.opening.retain(|c| *c != cid);
        self.conns.remove(&cid);
        if self.pending && self.opening.is_empty() {
            effects.push(Effect::SetTimer {
                key: TimerKey::Reconnect,
                deadline: now + self.config.reconnect_delay,
            });
        }
    }

    fn on_reconnect_timer(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        if !self.pending {
            return;
        }
        self.drain_backlog(now, effects);
        if self.pending && self.opening.is_empty() && self.active.is_empty() {
            self.open_connection(now, effects);
        }
    }

    fn on_idle_timeout(&mut self, cid: ConnId, effects: &mut Vec<Effect>) {
        let Some(conn) = self.conns.get_mut(&cid) else {
            return;
        };
        conn.idle_deadline = None;
        if conn.num_requests > 0 || !conn.queued.is_empty() {
            // Raced with new work; ignore the stale firing.
            return;
        }
        debug!(conn = %cid, "idle timeout for connection");
        self.terminate(cid, effects);
    }

    fn on_retry_timer(&mut self, id: TxnId, io: &mut dyn PacketIo, now: Instant, effects: &mut Vec<Effect>) {
        let Some(txn) = self.txns.get(&id) else {
            return;
        };
        let (Some(cid), Some(slot)) = (txn.conn, txn.entry) else {
            return;
        };
        let policy = self.config.retry.for_code(txn.request.code);

        let decision = match self.conns.get_mut(&cid) {
            Some(conn) => conn.tracker.retry_or_expire(slot, &policy, now),
            None => return,
        };
        match decision {
            RetryDecision::Expired => {
                debug!(txn = %id, "no response to proxied request");
                self.finish(cid, id, Completion::Resolved(Outcome::NoResponse), now, effects);
            }
            RetryDecision::Retry(next) => {
                // Same identifier, same bytes, same socket.
                if let Some(packet) = self.txns.get(&id).and_then(|t| t.packet.as_deref()) {
                    match io.send(cid, packet) {
                        SendStatus::Sent => {
                            trace!(txn = %id, ?next, "retransmitting request");
                        }
                        SendStatus::WouldBlock => {
                            trace!(txn = %id, "retransmission skipped, socket blocked");
                        }
                        SendStatus::Err(e) => {
                            warn!(conn = %cid, error = %e, "retransmission failed");
                            self.fail_connection(cid, now, effects);
                            return;
                        }
                    }
                }
                effects.push(Effect::SetTimer {
                    key: TimerKey::Retry(id),
                    deadline: now + next,
                });
            }
        }
    }

    /// Tear a connection down, returning every queued and sent transaction
    /// to the backlog with cleared linkage.
    fn terminate(&mut self, cid: ConnId, effects: &mut Vec<Effect>) {
        let Some(mut conn) = self.conns.remove(&cid) else {
            return;
        };
        self.active.retain(|c| *c != cid);
        self.full.retain(|c| *c != cid);
        self.opening.retain(|c| *c != cid);
        if conn.idle_deadline.take().is_some() {
            effects.push(Effect::CancelTimer(TimerKey::Idle(cid)));
        }

        let mut displaced: Vec<TxnId> = conn.sent.drain().collect();
        for id in &displaced {
            effects.push(Effect::CancelTimer(TimerKey::Retry(*id)));
        }
        displaced.extend(conn.queued.drain(..));
        let count = displaced.len();
        for id in displaced {
            if let Some(txn) = self.txns.get_mut(&id) {
                txn.unlink();
                self.backlog.push_back(id);
            }
        }
        self.pending = !self.backlog.is_empty();
        effects.push(Effect::CloseSocket(cid));
        debug!(conn = %cid, displaced = count, "closing connection");
    }

    /// Socket-fatal error: tear down and rebuild capacity for the
    /// displaced work.
    fn fail_connection(&mut self, cid: ConnId, now: Instant, effects: &mut Vec<Effect>) {
        self.terminate(cid, effects);
        if self.pending {
            self.drain_backlog(now, effects);
            if self.pending && self.opening.is_empty() && self.active.is_empty() {
                self.open_connection(now, effects);
            }
        }
    }
}
