//! Session transport contract
//!
//! A transport owns the sockets. It hands each accepted connection to a
//! registered [`SessionListener`] as a [`Session`] and executes the write and
//! close commands the listener issues back through [`SessionService`].
//!
//! For a single session the transport delivers callbacks in order, never
//! concurrently: `on_session_opened`, then one `on_message_sent` per
//! acknowledged write, then `on_session_closed`. Callbacks for different
//! sessions may run in parallel on different worker threads.

pub mod tcp;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

pub use tcp::TcpSessionService;

/// Transport-assigned identity of an accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Identifies one outbound message within its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Open,
            1 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionState::Open => 0,
            SessionState::Closing => 1,
            SessionState::Closed => 2,
        }
    }
}

/// Outbound bytes for a single write.
///
/// Moved into [`SessionService::write`], so a buffer can never be touched
/// again once it is in flight.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Append `text` as US-ASCII, one byte per character.
    ///
    /// Characters outside the 7-bit range are written as `?`.
    pub fn write_ascii(&mut self, text: &str) -> &mut Self {
        self.bytes
            .extend(text.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    Write { id: MessageId, buf: Buffer },
    Close,
}

/// Handle to one accepted connection.
///
/// Cloning is cheap. Listeners should only use the handle for the duration of
/// a callback; the transport invalidates it once the session closes.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    peer_addr: Option<SocketAddr>,
    tcp_nodelay: Option<bool>,
    state: Arc<AtomicU8>,
    next_message: Arc<AtomicU64>,
    commands: mpsc::UnboundedSender<Command>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("tcp_nodelay", &self.tcp_nodelay)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        peer_addr: Option<SocketAddr>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            tcp_nodelay: None,
            state: Arc::new(AtomicU8::new(SessionState::Open.as_u8())),
            next_message: Arc::new(AtomicU64::new(0)),
            commands,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// `TCP_NODELAY` as read back from the accepted socket, if known
    pub fn tcp_nodelay(&self) -> Option<bool> {
        self.tcp_nodelay
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Allocate an empty buffer for this session's next write
    pub fn create_buffer(&self) -> Buffer {
        Buffer::with_capacity(64)
    }

    pub(crate) fn with_tcp_nodelay(mut self, nodelay: Option<bool>) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn enqueue_write(&self, buf: Buffer) -> MessageId {
        let id = MessageId(self.next_message.fetch_add(1, Ordering::Relaxed));
        if !self.is_open() {
            debug!("{}: dropping write to non-open session", self.id);
        } else if self.commands.send(Command::Write { id, buf }).is_err() {
            debug!("{}: session task gone, write dropped", self.id);
        }
        id
    }

    pub(crate) fn enqueue_close(&self) {
        if self.state() == SessionState::Closed {
            return;
        }
        self.set_state(SessionState::Closing);
        if self.commands.send(Command::Close).is_err() {
            debug!("{}: session task gone, close dropped", self.id);
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(id: u64) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self::new(SessionId(id), None, tx)
    }
}

/// Commands a listener may issue against a session
pub trait SessionService: Send + Sync {
    /// Queue `buf` for delivery; `on_message_sent` follows once it is flushed.
    fn write(&self, session: &Session, buf: Buffer) -> MessageId;

    /// Close the connection once earlier writes have been processed.
    fn close_session(&self, session: &Session);
}

/// Observer of session lifecycle events.
///
/// Called on transport worker tasks; implementations must not block.
pub trait SessionListener: Send + Sync + 'static {
    fn on_session_opened(&self, service: &dyn SessionService, session: &Session);

    fn on_message_sent(&self, service: &dyn SessionService, session: &Session, msg: MessageId);

    fn on_session_closed(&self, _session: &Session) {}

    fn on_session_error(&self, _session: &Session, _error: &std::io::Error) {}
}
