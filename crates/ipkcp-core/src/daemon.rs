//! Server runtime: bind, serve, shut down.

use std::net::SocketAddr;

use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, info, warn};

use ipkcp_config::{AppConfig, TransportMode};

use crate::shutdown::{Shutdown, ShutdownListener};
use crate::{tcp, udp};

/// A bound server socket, ready to serve.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Udp(UdpSocket),
}

impl Listener {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr(),
            Self::Udp(socket) => socket.local_addr(),
        }
    }

    pub fn mode(&self) -> TransportMode {
        match self {
            Self::Tcp(_) => TransportMode::Tcp,
            Self::Udp(_) => TransportMode::Udp,
        }
    }
}

/// What a finished serve loop accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    Tcp(tcp::ServeSummary),
    /// Number of datagrams answered.
    Udp(u64),
}

/// The IPKCP server process.
pub struct Daemon {
    config: AppConfig,
    shutdown: Shutdown,
}

impl Daemon {
    /// Create a new daemon instance with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            shutdown: Shutdown::new(),
        }
    }

    /// Bind the socket for the configured transport.
    pub async fn bind(&self) -> Result<Listener, DaemonError> {
        let target = self.config.bind_target();
        let listener = match self.config.server.mode {
            TransportMode::Tcp => TcpListener::bind(&target).await.map(Listener::Tcp),
            TransportMode::Udp => UdpSocket::bind(&target).await.map(Listener::Udp),
        };
        listener.map_err(|source| DaemonError::Bind { target, source })
    }

    /// Serve on an already bound listener until shutdown is requested.
    ///
    /// For TCP this returns only after every session has closed.
    pub async fn serve(&self, listener: Listener) -> Served {
        let limits = self.config.limits.clone();
        let shutdown = self.shutdown.listener();
        match listener {
            Listener::Tcp(listener) => Served::Tcp(tcp::serve(listener, limits, shutdown).await),
            Listener::Udp(socket) => Served::Udp(udp::serve(socket, limits, shutdown).await),
        }
    }

    /// Bind and serve until Ctrl-C or [`Daemon::shutdown`].
    pub async fn run(&self) -> Result<(), DaemonError> {
        info!(
            version = %crate::build_info::version_string(),
            target = %self.config.bind_target(),
            mode = %self.config.server.mode,
            "IPKCP server starting"
        );

        let listener = self.bind().await?;
        let serving = self.serve(listener);
        tokio::pin!(serving);

        let served = tokio::select! {
            served = &mut serving => served,
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => warn!("Ctrl-C received, initiating graceful shutdown"),
                    Err(e) => warn!(error = %e, "signal handler failed, shutting down"),
                }
                self.shutdown();
                serving.await
            }
        };

        match served {
            Served::Tcp(summary) => info!(
                accepted = summary.accepted,
                answered = summary.answered,
                "IPKCP server stopped"
            ),
            Served::Udp(handled) => info!(handled, "IPKCP server stopped"),
        }
        Ok(())
    }

    /// Request a graceful shutdown.
    pub fn shutdown(&self) {
        if self.shutdown.is_triggered() {
            debug!("shutdown already requested");
            return;
        }
        info!("shutdown requested");
        self.shutdown.trigger();
    }

    /// A handle that observes this daemon's shutdown.
    pub fn shutdown_listener(&self) -> ShutdownListener {
        self.shutdown.listener()
    }

    /// Get a reference to the daemon's configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to bind {target}: {source}")]
    Bind {
        target: String,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn loopback(mode: TransportMode) -> AppConfig {
        let mut config = AppConfig::default();
        config.server.port = 0;
        config.server.mode = mode;
        config
    }

    #[tokio::test]
    async fn test_daemon_creation() {
        let daemon = Daemon::new(AppConfig::default());
        assert_eq!(daemon.config().server.port, 2023);
        assert!(!daemon.shutdown_listener().is_shutdown());
    }

    #[tokio::test]
    async fn test_bind_follows_mode() {
        let tcp = Daemon::new(loopback(TransportMode::Tcp)).bind().await.unwrap();
        assert_eq!(tcp.mode(), TransportMode::Tcp);
        let udp = Daemon::new(loopback(TransportMode::Udp)).bind().await.unwrap();
        assert_eq!(udp.mode(), TransportMode::Udp);
        assert_ne!(udp.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = loopback(TransportMode::Tcp);
        config.server.port = taken.local_addr().unwrap().port();
        let err = Daemon::new(config).bind().await.unwrap_err();
        assert!(matches!(err, DaemonError::Bind { .. }));
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_shutdown_drains_tcp_sessions() {
        let daemon = std::sync::Arc::new(Daemon::new(loopback(TransportMode::Tcp)));
        let listener = daemon.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = {
            let daemon = std::sync::Arc::clone(&daemon);
            tokio::spawn(async move { daemon.serve(listener).await })
        };

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut stream = BufReader::new(stream);
        stream.get_mut().write_all(b"HELLO\n").await.unwrap();
        let mut line = String::new();
        stream.read_line(&mut line).await.unwrap();
        assert_eq!(line, "HELLO\n");

        daemon.shutdown();
        line.clear();
        stream.read_line(&mut line).await.unwrap();
        assert_eq!(line, "BYE\n");

        let served = tokio::time::timeout(Duration::from_secs(2), serving)
            .await
            .expect("serve returns after sessions close")
            .unwrap();
        assert_eq!(
            served,
            Served::Tcp(tcp::ServeSummary {
                accepted: 1,
                answered: 0
            })
        );
    }

    #[tokio::test]
    async fn test_udp_serve_reports_answered_datagrams() {
        let daemon = std::sync::Arc::new(Daemon::new(loopback(TransportMode::Udp)));
        let listener = daemon.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = {
            let daemon = std::sync::Arc::clone(&daemon);
            tokio::spawn(async move { daemon.serve(listener).await })
        };

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 64];
        for _ in 0..2 {
            socket
                .send_to(&crate::codec::encode_request("(+ 1 1)"), addr)
                .await
                .unwrap();
            tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
                .await
                .expect("datagram answered")
                .unwrap();
        }

        daemon.shutdown();
        daemon.shutdown();
        let served = tokio::time::timeout(Duration::from_secs(2), serving)
            .await
            .expect("serve returns after shutdown")
            .unwrap();
        assert_eq!(served, Served::Udp(2));
    }
}
