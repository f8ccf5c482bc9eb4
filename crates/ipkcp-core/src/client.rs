//! Client drivers for both transports.
//!
//! Both read expressions line by line from an input stream, send them to the
//! server, and write what comes back to an output stream. They are generic
//! over the streams so the CLI can hand them stdin/stdout and tests can hand
//! them in-memory buffers.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tracing::{debug, info, warn};

use crate::codec::{self, Status};
use crate::shutdown::ShutdownListener;
use crate::tcp::BYE;

/// Largest UDP response the client accepts.
const MAX_RESPONSE_LEN: usize = codec::RESPONSE_HEADER_LEN + codec::MAX_PAYLOAD_LEN;

/// Errors from the client drivers.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        source: std::io::Error,
    },

    #[error("{0} did not resolve to any address")]
    NoAddress(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server closed the connection")]
    ServerClosed,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("malformed response ({0} bytes)")]
    MalformedResponse(usize),
}

/// Resolve `target` (`host:port`) to its first address.
pub async fn resolve(target: &str) -> Result<SocketAddr, ClientError> {
    lookup_host(target)
        .await
        .map_err(|source| ClientError::Resolve {
            target: target.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| ClientError::NoAddress(target.to_string()))
}

/// Open a TCP connection to the server.
pub async fn connect_tcp(addr: SocketAddr) -> Result<TcpStream, ClientError> {
    TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect { addr, source })
}

/// Bind an ephemeral UDP socket of the right family and fix its peer.
pub async fn connect_udp(addr: SocketAddr) -> Result<UdpSocket, ClientError> {
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket
        .connect(addr)
        .await
        .map_err(|source| ClientError::Connect { addr, source })?;
    Ok(socket)
}

/// Run an interactive TCP session.
///
/// Every non-empty input line is sent as-is and the server's reply line is
/// echoed to `output`. The session ends when the server says `BYE`; on input
/// EOF or shutdown the client says `BYE` itself and waits for the answer.
pub async fn run_tcp<I, O, S>(
    input: I,
    output: &mut O,
    stream: S,
    mut shutdown: ShutdownListener,
) -> Result<(), ClientError>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut server = BufReader::new(reader);
    let mut lines = input.lines();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.recv() => None,
            line = lines.next_line() => line?,
        };
        let Some(line) = next else { break };
        if line.is_empty() {
            continue;
        }

        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        let reply = read_reply(&mut server).await?;
        output.write_all(reply.as_bytes()).await?;
        output.flush().await?;
        if reply.as_bytes() == BYE {
            info!("server ended the session");
            return Ok(());
        }
    }

    debug!("sending BYE");
    writer.write_all(BYE).await?;
    let reply = read_reply(&mut server).await?;
    if reply.as_bytes() != BYE {
        warn!(reply = %reply.trim_end(), "expected BYE from server");
    }
    output.write_all(reply.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

async fn read_reply<R>(server: &mut BufReader<R>) -> Result<String, ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut reply = String::new();
    if server.read_line(&mut reply).await? == 0 {
        return Err(ClientError::ServerClosed);
    }
    Ok(reply)
}

/// Run the UDP request/response loop on a connected socket.
///
/// Each non-empty line becomes one request; the response is printed as
/// `OK:<payload>` or `ERR:<payload>`.
pub async fn run_udp<I, O>(
    input: I,
    output: &mut O,
    socket: &UdpSocket,
    timeout: Option<Duration>,
    mut shutdown: ShutdownListener,
) -> Result<(), ClientError>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut buffer = [0u8; MAX_RESPONSE_LEN];

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.recv() => None,
            line = lines.next_line() => line?,
        };
        let Some(line) = next else { break };
        if line.is_empty() {
            continue;
        }

        if line.len() > codec::MAX_PAYLOAD_LEN {
            warn!(len = line.len(), "expression truncated to {} bytes", codec::MAX_PAYLOAD_LEN);
        }
        socket.send(&codec::encode_request(&line)).await?;

        let received = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            received = recv_with_timeout(socket, &mut buffer, timeout) => received?,
        };
        let (status, payload) = codec::decode_response(&buffer[..received])
            .ok_or(ClientError::MalformedResponse(received))?;
        let rendered = match status {
            Status::Ok => format!("OK:{payload}\n"),
            Status::Error => format!("ERR:{payload}\n"),
        };
        output.write_all(rendered.as_bytes()).await?;
        output.flush().await?;
    }

    Ok(())
}

async fn recv_with_timeout(
    socket: &UdpSocket,
    buffer: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, ClientError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, socket.recv(buffer))
            .await
            .map_err(|_| ClientError::Timeout(limit))?
            .map_err(ClientError::from),
        None => Ok(socket.recv(buffer).await?),
    }
}
