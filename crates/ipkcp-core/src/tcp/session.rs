//! Per-connection state machine.
//!
//! ```text
//!   INIT ──HELLO──▶ READ ──SOLVE──▶ WRITE
//!    │               │  ▲             │
//!    │               │  └──RESULT─────┘
//!    ▼               ▼                │
//!   TERM ◀───────────┴────────────────┘
//! ```
//!
//! Every failure, a peer `BYE`, and shutdown all route through TERM, which
//! sends `BYE\n` and closes the stream. Reads and writes both give way to
//! shutdown, and TERM's own write is bounded by [`TERM_TIMEOUT`], so a peer
//! that stops reading cannot hold the server open. The session owns its stream and
//! buffer and shares nothing with other sessions.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::codec;
use crate::expr::{self, SolveError};
use crate::parser::{self, ParseError};
use crate::shutdown::ShutdownListener;

/// Handshake line, sent by the client and echoed by the server.
pub const HELLO: &[u8] = b"HELLO\n";

/// Close request, answered in kind.
pub const BYE: &[u8] = b"BYE\n";

/// Anything shorter cannot be a legal query.
pub const SHORTEST_QUERY: &[u8] = b"SOLVE (+ 1 1)\n";

const READ_CHUNK: usize = 1024;

/// Upper bound on sending the final `BYE` and closing the stream.
pub const TERM_TIMEOUT: Duration = Duration::from_secs(1);

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Read,
    Write,
    Term,
}

/// Reasons a session ends other than a peer `BYE`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("shutdown requested")]
    Shutdown,

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("handshake failed: expected HELLO")]
    Handshake,

    #[error("query shorter than {} bytes", SHORTEST_QUERY.len())]
    QueryTooShort,

    #[error("malformed query: {0}")]
    Query(#[from] ParseError),

    #[error("calculation failed: {0}")]
    Solve(#[from] SolveError),
}

impl SessionError {
    /// Transport failures, as opposed to protocol or computation failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::PeerClosed)
    }
}

/// What happened over a session's lifetime.
#[derive(Debug)]
pub struct SessionReport {
    /// Number of `RESULT` lines written.
    pub answered: usize,
    /// `None` when the peer said `BYE`.
    pub ended_by: Option<SessionError>,
}

/// One connection's protocol state.
pub struct Session<S> {
    stream: S,
    state: SessionState,
    buffer: Vec<u8>,
    query: Vec<u8>,
    max_line_len: usize,
    answered: usize,
    shutdown: ShutdownListener,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, max_line_len: usize, shutdown: ShutdownListener) -> Self {
        Self {
            stream,
            state: SessionState::Init,
            buffer: Vec::with_capacity(max_line_len),
            query: Vec::new(),
            max_line_len,
            answered: 0,
            shutdown,
        }
    }

    /// Drive the state machine until TERM has run.
    pub async fn run(mut self) -> SessionReport {
        let mut ended_by = None;

        loop {
            if self.state != SessionState::Term && self.shutdown.is_shutdown() {
                ended_by = Some(SessionError::Shutdown);
                self.state = SessionState::Term;
            }

            let step = match self.state {
                SessionState::Init => self.init().await,
                SessionState::Read => self.read().await,
                SessionState::Write => self.write().await,
                SessionState::Term => {
                    self.term().await;
                    return SessionReport {
                        answered: self.answered,
                        ended_by,
                    };
                }
            };

            match step {
                Ok(next) => {
                    debug!(from = ?self.state, to = ?next, "session transition");
                    self.state = next;
                }
                Err(e) => {
                    match &e {
                        SessionError::Shutdown | SessionError::PeerClosed => {
                            info!(state = ?self.state, reason = %e, "session ending")
                        }
                        e if e.is_transport() => {
                            tracing::error!(state = ?self.state, error = %e, "session transport failure")
                        }
                        _ => warn!(state = ?self.state, error = %e, "session terminated"),
                    }
                    ended_by = Some(e);
                    self.state = SessionState::Term;
                }
            }
        }
    }

    async fn init(&mut self) -> Result<SessionState, SessionError> {
        let line = self.read_line().await?;
        if line != HELLO {
            return Err(SessionError::Handshake);
        }
        self.send(HELLO).await?;
        Ok(SessionState::Read)
    }

    async fn read(&mut self) -> Result<SessionState, SessionError> {
        let line = self.read_line().await?;
        if line == BYE {
            info!("peer said BYE");
            return Ok(SessionState::Term);
        }
        if line.len() < SHORTEST_QUERY.len() {
            return Err(SessionError::QueryTooShort);
        }
        parser::validate_query(&line)?;
        self.query = line;
        Ok(SessionState::Write)
    }

    async fn write(&mut self) -> Result<SessionState, SessionError> {
        let expression = &self.query[parser::SOLVE_PREFIX.len()..];
        let value = expr::solve(expression)?;
        let reply = format!("RESULT {value}\n");
        self.send(reply.as_bytes()).await?;
        self.answered += 1;
        debug!(value, "answered query");
        Ok(SessionState::Read)
    }

    async fn term(&mut self) {
        match tokio::time::timeout(TERM_TIMEOUT, self.stream.write_all(BYE)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to send BYE"),
            Err(_) => warn!(timeout = ?TERM_TIMEOUT, "peer not reading, BYE dropped"),
        }
        match tokio::time::timeout(TERM_TIMEOUT, self.stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "failed to close stream"),
            Err(_) => debug!("stream close timed out"),
        }
        info!(answered = self.answered, "session closed");
    }

    /// Write a whole reply unless shutdown comes first.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        tokio::select! {
            biased;
            written = self.stream.write_all(bytes) => Ok(written?),
            _ = self.shutdown.recv() => Err(SessionError::Shutdown),
        }
    }

    /// Take the next `\n`-terminated line, reading more as needed.
    ///
    /// Bytes after the boundary stay buffered for the next frame.
    async fn read_line(&mut self) -> Result<Vec<u8>, SessionError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(end) = codec::line_boundary(&self.buffer) {
                if end > self.max_line_len {
                    return Err(SessionError::LineTooLong(self.max_line_len));
                }
                return Ok(self.buffer.drain(..end).collect());
            }
            if self.buffer.len() >= self.max_line_len {
                return Err(SessionError::LineTooLong(self.max_line_len));
            }

            let n = tokio::select! {
                biased;
                _ = self.shutdown.recv() => return Err(SessionError::Shutdown),
                read = self.stream.read(&mut chunk) => read?,
            };
            if n == 0 {
                return Err(SessionError::PeerClosed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}
