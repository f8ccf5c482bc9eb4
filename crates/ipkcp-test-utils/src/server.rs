//! Loopback server fixture.
//!
//! [`TestServer`] binds a [`Daemon`] on an ephemeral port and serves it on a
//! background task, so tests can talk to a real socket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ipkcp_config::AppConfig;
use ipkcp_core::{Daemon, Served};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// How long [`TestServer::stop`] waits for the serve loop to return.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running server with an owned temp directory for its config file.
///
/// The temp directory is deleted when this value is dropped.
pub struct TestServer {
    pub daemon: Arc<Daemon>,
    pub addr: SocketAddr,
    pub config_path: Option<PathBuf>,
    task: JoinHandle<Served>,
    _temp_dir: Option<TempDir>,
}

impl TestServer {
    /// Bind and serve `config` as-is.
    pub async fn start(config: AppConfig) -> Self {
        Self::spawn(config, None, None).await
    }

    /// Write `toml_content` to a temporary config file, load it, and serve.
    ///
    /// The loaded port is replaced with an ephemeral one.
    pub async fn with_toml(toml_content: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("ipkcp.toml");
        tokio::fs::write(&config_path, toml_content)
            .await
            .expect("failed to write test config");

        let mut config = AppConfig::load(&config_path)
            .await
            .expect("failed to parse test config");
        config.server.port = 0;

        Self::spawn(config, Some(config_path), Some(temp_dir)).await
    }

    async fn spawn(
        config: AppConfig,
        config_path: Option<PathBuf>,
        temp_dir: Option<TempDir>,
    ) -> Self {
        let daemon = Arc::new(Daemon::new(config));
        let listener = daemon.bind().await.expect("failed to bind test server");
        let addr = listener.local_addr().expect("bound socket has an address");

        let task = {
            let daemon = Arc::clone(&daemon);
            tokio::spawn(async move { daemon.serve(listener).await })
        };

        Self {
            daemon,
            addr,
            config_path,
            task,
            _temp_dir: temp_dir,
        }
    }

    /// Open a TCP connection and complete the `HELLO` handshake.
    pub async fn greet(&self) -> BufReader<TcpStream> {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("failed to connect to test server");
        let mut conn = BufReader::new(stream);
        conn.get_mut()
            .write_all(b"HELLO\n")
            .await
            .expect("failed to send HELLO");
        assert_eq!(read_line(&mut conn).await, "HELLO\n");
        conn
    }

    /// Trigger shutdown and wait for the serve loop to return.
    pub async fn stop(self) -> Served {
        self.daemon.shutdown();
        tokio::time::timeout(STOP_TIMEOUT, self.task)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }
}

/// Read one line, returning an empty string at EOF.
pub async fn read_line(conn: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    conn.read_line(&mut line)
        .await
        .expect("failed to read from test server");
    line
}
