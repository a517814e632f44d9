//! Tokio driver and host-facing client API.
//!
//! One spawned task owns the [`Dispatcher`] plus the real sockets and
//! timers, turning readiness and timer callbacks into events and executing
//! the effects that come back. The host talks to it over channels:
//! [`RadiusClient::submit`] returns an [`InFlight`] handle whose outcome
//! resolves when the transport completes the transaction.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::Poll;
use std::time::Instant;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::core::config::TransportConfig;
use crate::core::types::{Completion, Outcome, SubmitOutcome, TxnId};
use crate::packet::{Attribute, PacketCode};
use crate::transport::{
    ConnId, Dispatcher, Effect, Event, PacketIo, RecvStatus, Request, SendStatus, TimerKey,
};

/// Errors surfaced to the host by the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The request could not be encoded or written.
    #[error("request could not be delivered")]
    RequestFailed,

    /// The transport was shut down before the transaction completed.
    #[error("transport is shut down")]
    Closed,
}

enum Command {
    Submit {
        id: TxnId,
        request: Request,
        reply: oneshot::Sender<Result<Outcome, ClientError>>,
    },
    Release(TxnId),
    Shutdown,
}

/// Handle to one submitted transaction.
///
/// Await [`outcome`](Self::outcome) for the completion category, or
/// [`release`](Self::release) to abandon the transaction. Dropping an
/// unresolved handle releases it as well.
pub struct InFlight {
    id: TxnId,
    rx: Option<oneshot::Receiver<Result<Outcome, ClientError>>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    settled: bool,
}

impl InFlight {
    /// The transaction's handle, for logging and correlation.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Wait for the transaction to complete.
    pub async fn outcome(mut self) -> Result<Outcome, ClientError> {
        let Some(rx) = self.rx.take() else {
            return Err(ClientError::Closed);
        };
        let result = match rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Closed),
        };
        self.settled = true;
        result
    }

    /// Abandon the transaction. Safe at any point of its lifecycle.
    pub fn release(mut self) {
        self.settled = true;
        let _ = self.cmd_tx.send(Command::Release(self.id));
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled {
            let _ = self.cmd_tx.send(Command::Release(self.id));
        }
    }
}

/// Async RADIUS client bound to one home server.
///
/// Cheap to clone; all clones feed the same driver task. Must be created
/// from within a tokio runtime.
#[derive(Clone)]
pub struct RadiusClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    next_txn: Arc<AtomicU64>,
}

impl RadiusClient {
    /// Spawn the driver task for a validated configuration.
    pub fn connect(config: TransportConfig) -> Self {
        let config = Arc::new(config);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            dispatcher: Dispatcher::new(Arc::clone(&config)),
            config,
            io: SocketTable::default(),
            write_interest: HashSet::new(),
            timers: HashMap::new(),
            timer_seq: 0,
            timer_tx,
            timer_rx,
            cmd_rx,
            waiters: HashMap::new(),
            queued_events: VecDeque::new(),
        };
        tokio::spawn(driver.run());

        Self {
            cmd_tx,
            next_txn: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Submit one request.
    pub fn submit(&self, code: PacketCode, attributes: Vec<Attribute>) -> InFlight {
        let id = TxnId(self.next_txn.fetch_add(1, Ordering::Relaxed));
        let (reply, rx) = oneshot::channel();
        // If the driver is gone the receiver resolves as Closed.
        let _ = self.cmd_tx.send(Command::Submit {
            id,
            request: Request::new(code, attributes),
            reply,
        });
        InFlight {
            id,
            rx: Some(rx),
            cmd_tx: self.cmd_tx.clone(),
            settled: false,
        }
    }

    /// Shut the transport down. Outstanding transactions resolve as
    /// [`ClientError::Closed`] or [`ClientError::RequestFailed`].
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

#[derive(Debug, Default)]
struct SocketTable {
    socks: HashMap<ConnId, UdpSocket>,
}

impl PacketIo for SocketTable {
    fn send(&mut self, conn: ConnId, buf: &[u8]) -> SendStatus {
        let Some(sock) = self.socks.get(&conn) else {
            return SendStatus::Err(std::io::Error::other("socket closed"));
        };
        match sock.try_send(buf) {
            Ok(_) => SendStatus::Sent,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => SendStatus::WouldBlock,
            Err(e) => SendStatus::Err(e),
        }
    }

    fn recv(&mut self, conn: ConnId, buf: &mut [u8]) -> RecvStatus {
        let Some(sock) = self.socks.get(&conn) else {
            return RecvStatus::Err(std::io::Error::other("socket closed"));
        };
        match sock.try_recv(buf) {
            Ok(len) => RecvStatus::Data(len),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => RecvStatus::WouldBlock,
            Err(e) => RecvStatus::Err(e),
        }
    }
}

enum Wake {
    Cmd(Option<Command>),
    Timer(TimerKey, u64),
    Io(Event),
}

struct Driver {
    config: Arc<TransportConfig>,
    dispatcher: Dispatcher,
    io: SocketTable,
    write_interest: HashSet<ConnId>,
    timers: HashMap<TimerKey, u64>,
    timer_seq: u64,
    timer_tx: mpsc::UnboundedSender<(TimerKey, u64)>,
    timer_rx: mpsc::UnboundedReceiver<(TimerKey, u64)>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    waiters: HashMap<TxnId, oneshot::Sender<Result<Outcome, ClientError>>>,
    queued_events: VecDeque<Event>,
}

impl Driver {
    async fn run(mut self) {
        let mut effects = Vec::new();
        self.dispatcher.bootstrap(Instant::now(), &mut effects);
        self.apply(effects);
        self.pump();

        loop {
            let wake = tokio::select! {
                cmd = self.cmd_rx.recv() => Wake::Cmd(cmd),
                Some((key, seq)) = self.timer_rx.recv() => Wake::Timer(key, seq),
                event = io_ready(&self.io, &self.write_interest) => Wake::Io(event),
            };
            match wake {
                Wake::Cmd(None) | Wake::Cmd(Some(Command::Shutdown)) => {
                    let mut effects = Vec::new();
                    self.dispatcher.shutdown(&mut effects);
                    self.apply(effects);
                    debug!("client driver stopped");
                    return;
                }
                Wake::Cmd(Some(Command::Submit { id, request, reply })) => {
                    let mut effects = Vec::new();
                    let outcome =
                        self.dispatcher
                            .submit(id, request, &mut self.io, Instant::now(), &mut effects);
                    match outcome {
                        SubmitOutcome::Yield => {
                            self.waiters.insert(id, reply);
                        }
                        SubmitOutcome::Ok => {
                            let _ = reply.send(Ok(Outcome::Success));
                        }
                        SubmitOutcome::Fail => {
                            let _ = reply.send(Err(ClientError::RequestFailed));
                        }
                    }
                    self.apply(effects);
                    self.pump();
                }
                Wake::Cmd(Some(Command::Release(id))) => {
                    self.waiters.remove(&id);
                    let mut effects = Vec::new();
                    self.dispatcher.release(id, Instant::now(), &mut effects);
                    self.apply(effects);
                    self.pump();
                }
                Wake::Timer(key, seq) => {
                    // Stale firings of cancelled or replaced timers.
                    if self.timers.get(&key) == Some(&seq) {
                        self.timers.remove(&key);
                        self.dispatch(Event::TimerFired(key));
                    }
                }
                Wake::Io(event) => self.dispatch(event),
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        let mut effects = Vec::new();
        self.dispatcher
            .handle(event, &mut self.io, Instant::now(), &mut effects);
        self.apply(effects);
        self.pump();
    }

    /// Run internally generated events (socket open results) to quiescence.
    fn pump(&mut self) {
        while let Some(event) = self.queued_events.pop_front() {
            let mut effects = Vec::new();
            self.dispatcher
                .handle(event, &mut self.io, Instant::now(), &mut effects);
            self.apply(effects);
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenSocket(conn) => match open_socket(&self.config) {
                    Ok(sock) => {
                        self.io.socks.insert(conn, sock);
                        self.queued_events.push_back(Event::Opened(conn));
                    }
                    Err(e) => {
                        warn!(conn = %conn, error = %e, "failed opening socket");
                        self.queued_events.push_back(Event::OpenFailed(conn));
                    }
                },
                Effect::CloseSocket(conn) => {
                    self.io.socks.remove(&conn);
                    self.write_interest.remove(&conn);
                }
                Effect::SetWriteInterest { conn, enabled } => {
                    if enabled {
                        self.write_interest.insert(conn);
                    } else {
                        self.write_interest.remove(&conn);
                    }
                }
                Effect::SetTimer { key, deadline } => {
                    self.timer_seq += 1;
                    let seq = self.timer_seq;
                    self.timers.insert(key, seq);
                    let tx = self.timer_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep_until(deadline.into()).await;
                        let _ = tx.send((key, seq));
                    });
                }
                Effect::CancelTimer(key) => {
                    self.timers.remove(&key);
                }
                Effect::Complete { txn, completion } => {
                    if let Some(reply) = self.waiters.remove(&txn) {
                        let result = match completion {
                            Completion::Resolved(outcome) => Ok(outcome),
                            Completion::Failed => Err(ClientError::RequestFailed),
                        };
                        let _ = reply.send(result);
                    }
                }
            }
        }
    }
}

/// Readiness across the socket pool: readable always, writable only where
/// the dispatcher asked for it.
async fn io_ready(io: &SocketTable, write_interest: &HashSet<ConnId>) -> Event {
    if io.socks.is_empty() {
        return std::future::pending::<Event>().await;
    }
    std::future::poll_fn(|cx| {
        for (conn, sock) in &io.socks {
            match sock.poll_recv_ready(cx) {
                Poll::Ready(Ok(())) => return Poll::Ready(Event::Readable(*conn)),
                Poll::Ready(Err(_)) => return Poll::Ready(Event::SocketError(*conn)),
                Poll::Pending => {}
            }
            if write_interest.contains(conn) {
                match sock.poll_send_ready(cx) {
                    Poll::Ready(Ok(())) => return Poll::Ready(Event::Writable(*conn)),
                    Poll::Ready(Err(_)) => return Poll::Ready(Event::SocketError(*conn)),
                    Poll::Pending => {}
                }
            }
        }
        Poll::Pending
    })
    .await
}

/// Bind, connect, and register a non-blocking UDP socket for one
/// connection.
fn open_socket(config: &TransportConfig) -> std::io::Result<UdpSocket> {
    let local = match config.local_addr {
        Some(ip) => SocketAddr::new(ip, 0),
        None if config.server_addr.is_ipv4() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        }
        None => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let sock = std::net::UdpSocket::bind(local)?;
    sock.set_nonblocking(true)?;
    sock.connect(config.server_addr)?;
    UdpSocket::from_std(sock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_shutdown() {
        // A bound but silent peer, so nothing answers and nothing refuses.
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = TransportConfig::builder(server.local_addr().unwrap())
            .secret("s3cr3t")
            .build()
            .unwrap();

        let client = RadiusClient::connect(config);
        let pending = client.submit(
            PacketCode::AccessRequest,
            vec![Attribute::text(crate::packet::attr::types::USER_NAME, "steve")],
        );

        client.shutdown();
        // Shutdown fails the in-flight transaction.
        let result = pending.outcome().await;
        assert!(matches!(
            result,
            Err(ClientError::RequestFailed) | Err(ClientError::Closed)
        ));
    }
}
