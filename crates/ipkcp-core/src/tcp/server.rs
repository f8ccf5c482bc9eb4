//! TCP accept loop and session supervisor.
//!
//! One task per admitted connection, tracked in a [`JoinSet`]. A connection
//! is only accepted once the [`SessionPool`] has a free slot; while it is
//! full, pending connections wait in the listen backlog. On shutdown the
//! loop stops accepting and waits for every session to finish its TERM.

use ipkcp_config::LimitsConfig;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, error, info, info_span, warn};

use super::pool::{SessionPermit, SessionPool};
use super::session::{Session, SessionReport};
use crate::shutdown::ShutdownListener;

/// Totals for one run of the accept loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeSummary {
    /// Connections admitted into a session.
    pub accepted: u64,
    /// `RESULT` lines written across all sessions.
    pub answered: usize,
}

impl ServeSummary {
    fn reap(&mut self, joined: Result<SessionReport, JoinError>) {
        match joined {
            Ok(report) => self.answered += report.answered,
            Err(e) => error!(error = %e, "session task failed"),
        }
    }
}

/// Serve TCP sessions on `listener` until shutdown.
///
/// Returns once all sessions have closed.
pub async fn serve(
    listener: TcpListener,
    limits: LimitsConfig,
    mut shutdown: ShutdownListener,
) -> ServeSummary {
    let pool = SessionPool::new(limits.max_sessions);
    let mut sessions = JoinSet::new();
    let mut summary = ServeSummary::default();

    match listener.local_addr() {
        Ok(addr) => info!(%addr, capacity = pool.capacity(), "TCP server listening"),
        Err(e) => warn!(error = %e, "TCP server listening on unknown address"),
    }

    loop {
        while let Some(joined) = sessions.try_join_next() {
            summary.reap(joined);
        }

        let permit = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            permit = wait_for_slot(&pool) => match permit {
                Some(permit) => permit,
                None => break,
            },
        };

        let (stream, peer) = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            },
        };

        summary.accepted += 1;
        let id = summary.accepted;
        info!(
            id,
            %peer,
            active = pool.capacity() - pool.available(),
            "connection accepted"
        );

        let session = Session::new(stream, limits.max_line_len, shutdown.clone());
        sessions.spawn(
            async move {
                let _permit = permit;
                session.run().await
            }
            .instrument(info_span!("session", id, %peer)),
        );
    }

    drop(listener);
    pool.close();
    info!(remaining = sessions.len(), "TCP server draining sessions");
    while let Some(joined) = sessions.join_next().await {
        summary.reap(joined);
    }
    info!(
        accepted = summary.accepted,
        answered = summary.answered,
        "TCP server stopped"
    );
    summary
}

async fn wait_for_slot(pool: &SessionPool) -> Option<SessionPermit> {
    match pool.try_admit() {
        Ok(permit) => Some(permit),
        Err(exhausted) => {
            warn!(%exhausted, "deferring new connections until a session ends");
            pool.admit().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::Shutdown;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    async fn line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn test_serves_concurrent_sessions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server = tokio::spawn(serve(listener, LimitsConfig::default(), shutdown.listener()));

        let mut a = BufReader::new(TcpStream::connect(addr).await.unwrap());
        let mut b = BufReader::new(TcpStream::connect(addr).await.unwrap());
        a.get_mut().write_all(b"HELLO\n").await.unwrap();
        b.get_mut().write_all(b"HELLO\n").await.unwrap();
        assert_eq!(line(&mut a).await, "HELLO\n");
        assert_eq!(line(&mut b).await, "HELLO\n");

        b.get_mut().write_all(b"SOLVE (* 3 3)\n").await.unwrap();
        a.get_mut().write_all(b"SOLVE (+ 2 2)\n").await.unwrap();
        assert_eq!(line(&mut a).await, "RESULT 4\n");
        assert_eq!(line(&mut b).await, "RESULT 9\n");

        a.get_mut().write_all(b"BYE\n").await.unwrap();
        assert_eq!(line(&mut a).await, "BYE\n");

        shutdown.trigger();
        assert_eq!(line(&mut b).await, "BYE\n");

        let summary = tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server should drain")
            .unwrap();
        assert_eq!(summary, ServeSummary { accepted: 2, answered: 2 });
    }

    #[tokio::test]
    async fn test_full_pool_defers_new_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let limits = LimitsConfig {
            max_sessions: 1,
            ..LimitsConfig::default()
        };
        let server = tokio::spawn(serve(listener, limits, shutdown.listener()));

        let mut first = BufReader::new(TcpStream::connect(addr).await.unwrap());
        first.get_mut().write_all(b"HELLO\n").await.unwrap();
        assert_eq!(line(&mut first).await, "HELLO\n");

        // Connects at the TCP level (backlog) but is not admitted yet.
        let mut second = BufReader::new(TcpStream::connect(addr).await.unwrap());
        second.get_mut().write_all(b"HELLO\n").await.unwrap();
        let early = tokio::time::timeout(Duration::from_millis(200), line(&mut second)).await;
        assert!(early.is_err(), "second session must wait for a free slot");

        first.get_mut().write_all(b"BYE\n").await.unwrap();
        assert_eq!(line(&mut first).await, "BYE\n");

        let admitted = tokio::time::timeout(Duration::from_secs(2), line(&mut second))
            .await
            .expect("second session admitted after the first closed");
        assert_eq!(admitted, "HELLO\n");

        shutdown.trigger();
        assert_eq!(line(&mut second).await, "BYE\n");
        let summary = server.await.unwrap();
        assert_eq!(summary.accepted, 2);
    }

    #[tokio::test]
    async fn test_shutdown_with_no_sessions_returns_promptly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = Shutdown::new();
        let server = tokio::spawn(serve(listener, LimitsConfig::default(), shutdown.listener()));
        shutdown.trigger();
        let summary = tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("accept loop must observe shutdown")
            .unwrap();
        assert_eq!(summary, ServeSummary::default());
    }
}
