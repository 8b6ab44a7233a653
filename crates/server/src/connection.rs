//! Per-connection plumbing: reader/writer tasks and the hub's view of a
//! connection.
//!
//! A reader task decodes frames and forwards typed events into the hub's
//! single event channel; a writer task drains a bounded per-connection
//! queue. The queue bound is the backpressure high-water mark: a client too
//! slow to drain it is dropped rather than allowed to pile up memory.

use std::time::Instant;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use draftden_net::frame::{read_frame, write_frame};
use draftden_net::protocol::{ClientToServer, ServerToClient};
use draftden_net::Error as NetError;

/// Identity of one client connection.
pub type ConnId = Uuid;

/// Write-queue high-water mark, in messages.
pub const WRITE_QUEUE_CAPACITY: usize = 256;

/// A connection with no inbound traffic for this long is presumed dead.
pub const IDLE_TIMEOUT_SECS: u64 = 90;

/// Events flowing from connection tasks into the hub loop.
#[derive(Debug)]
pub enum HubEvent {
    /// A decoded message from a client.
    Inbound { conn: ConnId, msg: ClientToServer },
    /// The connection ended: clean close, transport error, or an
    /// unparsable/oversized frame (protocol errors close the connection).
    ConnectionClosed { conn: ConnId },
}

/// The hub's record of one connection.
pub struct ConnCtx {
    pub tx: mpsc::Sender<ServerToClient>,
    /// Logged-in user name, once login succeeds.
    pub user: Option<String>,
    /// Room this connection currently occupies.
    pub room: Option<u32>,
    pub last_seen: Instant,
    /// Set when a send overflowed the write queue; the hub tears the
    /// connection down at the end of the current event.
    pub dead: bool,
    pub reader: Option<JoinHandle<()>>,
}

impl ConnCtx {
    pub fn new(tx: mpsc::Sender<ServerToClient>, reader: Option<JoinHandle<()>>) -> Self {
        Self {
            tx,
            user: None,
            room: None,
            last_seen: Instant::now(),
            dead: false,
            reader,
        }
    }
}

/// Mutable view of the connection table handed to message handlers. Sends
/// never block: a connection whose write queue is full is marked dead and
/// torn down at the end of the current event.
pub struct Outbox<'a> {
    conns: &'a mut std::collections::HashMap<ConnId, ConnCtx>,
    /// Milliseconds until the hub's next 1 Hz tick, for client-side timer
    /// interpolation.
    pub millis_until_next_sec: u32,
}

impl<'a> Outbox<'a> {
    pub fn new(
        conns: &'a mut std::collections::HashMap<ConnId, ConnCtx>,
        millis_until_next_sec: u32,
    ) -> Self {
        Self {
            conns,
            millis_until_next_sec,
        }
    }

    pub fn send(&mut self, conn: ConnId, msg: ServerToClient) {
        let Some(ctx) = self.conns.get_mut(&conn) else {
            return;
        };
        if ctx.dead {
            return;
        }
        match ctx.tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn = %conn, "write queue overflow, dropping connection");
                ctx.dead = true;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                ctx.dead = true;
            }
        }
    }

    pub fn broadcast(&mut self, conns: &[ConnId], msg: &ServerToClient) {
        for &conn in conns {
            self.send(conn, msg.clone());
        }
    }
}

/// Spawn reader and writer tasks for an accepted socket. Returns the new
/// connection id, the write-queue sender, and the reader handle (aborted
/// when the hub drops the connection; the writer exits by draining its
/// closed queue).
pub fn spawn_connection(
    stream: TcpStream,
    hub_tx: mpsc::Sender<HubEvent>,
) -> (ConnId, mpsc::Sender<ServerToClient>, JoinHandle<()>) {
    let conn = Uuid::new_v4();
    let (reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);

    tokio::spawn(writer_task(conn, writer, rx));
    let reader_handle = tokio::spawn(reader_task(conn, reader, hub_tx));

    (conn, tx, reader_handle)
}

async fn reader_task(
    conn: ConnId,
    mut reader: tokio::io::ReadHalf<TcpStream>,
    hub_tx: mpsc::Sender<HubEvent>,
) {
    loop {
        match read_frame::<_, ClientToServer>(&mut reader).await {
            Ok(msg) => {
                if hub_tx.send(HubEvent::Inbound { conn, msg }).await.is_err() {
                    return;
                }
            }
            Err(NetError::ConnectionClosed) => {
                debug!(conn = %conn, "connection closed");
                break;
            }
            Err(e) => {
                warn!(conn = %conn, error = %e, "protocol error, closing connection");
                break;
            }
        }
    }
    let _ = hub_tx.send(HubEvent::ConnectionClosed { conn }).await;
}

async fn writer_task(
    conn: ConnId,
    mut writer: tokio::io::WriteHalf<TcpStream>,
    mut rx: mpsc::Receiver<ServerToClient>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(conn = %conn, error = %e, "write failed");
            break;
        }
    }
    debug!(conn = %conn, "writer done");
}
