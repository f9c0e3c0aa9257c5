//! TCP implementation of the session transport

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::{Buffer, Command, MessageId, Session, SessionId, SessionListener, SessionService, SessionState};
use crate::config::DaytimeConfig;
use crate::error::{DaytimeError, Result};

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// How long a closing session keeps draining unread input after its FIN.
/// Closing with unread bytes would send RST and could discard the reply.
const CLOSE_LINGER: Duration = Duration::from_secs(1);

/// Routes commands to the session task owning the socket.
struct Dispatcher;

impl SessionService for Dispatcher {
    fn write(&self, session: &Session, buf: Buffer) -> MessageId {
        session.enqueue_write(buf)
    }

    fn close_session(&self, session: &Session) {
        session.enqueue_close();
    }
}

/// Listening TCP server that drives each connection on its own task.
pub struct TcpSessionService {
    config: DaytimeConfig,
    listener: Option<Arc<dyn SessionListener>>,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl TcpSessionService {
    #[must_use]
    pub fn new(config: DaytimeConfig) -> Self {
        Self {
            config,
            listener: None,
            accept_task: None,
            local_addr: None,
        }
    }

    pub fn config(&self) -> &DaytimeConfig {
        &self.config
    }

    /// Register the observer for every session this service accepts.
    pub fn set_session_listener(&mut self, listener: Arc<dyn SessionListener>) {
        self.listener = Some(listener);
    }

    /// Bind the configured address and start accepting connections.
    ///
    /// # Errors
    /// Fails if no listener is registered, the service is already running, or
    /// the address cannot be bound.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.accept_task.is_some() {
            return Err(DaytimeError::AlreadyStarted);
        }
        let observer = self.listener.clone().ok_or(DaytimeError::NoListener)?;
        let addr = self.config.socket_addr()?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| DaytimeError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!("Session service listening on {}", local_addr);
        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            observer,
            self.config.tcp_nodelay,
        )));
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Address actually bound, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.accept_task.is_some()
    }

    /// Stop accepting and sever every open session.
    ///
    /// Returns once the listening socket has been released.
    pub async fn dispose(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            // Cancelled is the expected outcome; a panic in the loop is only worth a log.
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("Accept loop panicked: {}", e);
                }
            }
            if let Some(addr) = self.local_addr.take() {
                info!("Session service on {} disposed", addr);
            }
        }
    }
}

impl Drop for TcpSessionService {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, observer: Arc<dyn SessionListener>, nodelay: bool) {
    // Dropping the set (on abort) aborts every session task with it.
    let mut sessions = JoinSet::new();
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(nodelay) {
                        warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                    }
                    let id = SessionId(next_id);
                    next_id += 1;
                    sessions.spawn(run_session(stream, id, peer, Arc::clone(&observer)));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }
}

async fn run_session(
    stream: TcpStream,
    id: SessionId,
    peer: SocketAddr,
    observer: Arc<dyn SessionListener>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = Session::new(id, Some(peer), tx).with_tcp_nodelay(stream.nodelay().ok());
    let (mut reader, mut writer) = stream.into_split();
    let mut scratch = [0u8; 256];

    debug!("{}: opened from {}", id, peer);
    observer.on_session_opened(&Dispatcher, &session);

    loop {
        tokio::select! {
            biased;

            cmd = rx.recv() => match cmd {
                Some(Command::Write { id: msg, buf }) => {
                    let written = async {
                        writer.write_all(buf.as_bytes()).await?;
                        writer.flush().await
                    }
                    .await;
                    match written {
                        Ok(()) => {
                            debug!("{}: sent {} bytes", id, buf.len());
                            observer.on_message_sent(&Dispatcher, &session, msg);
                        }
                        Err(e) => {
                            debug!("{}: write failed: {}", id, e);
                            observer.on_session_error(&session, &e);
                            break;
                        }
                    }
                }
                Some(Command::Close) | None => break,
            },
            read = reader.read(&mut scratch) => match read {
                Ok(0) => {
                    debug!("{}: peer closed", id);
                    break;
                }
                // Inbound bytes carry no meaning here.
                Ok(_) => {}
                Err(e) => {
                    debug!("{}: read failed: {}", id, e);
                    observer.on_session_error(&session, &e);
                    break;
                }
            },
        }
    }

    session.set_state(SessionState::Closing);
    if let Err(e) = writer.shutdown().await {
        debug!("{}: shutdown failed: {}", id, e);
    } else {
        let drained = tokio::time::timeout(CLOSE_LINGER, async {
            loop {
                match reader.read(&mut scratch).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("{}: read failed while draining: {}", id, e);
                        break;
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            debug!("{}: peer still open after linger, dropping", id);
        }
    }
    drop(writer);
    drop(reader);
    session.set_state(SessionState::Closed);
    debug!("{}: closed", id);
    observer.on_session_closed(&session);
}
