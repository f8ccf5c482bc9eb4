//! UDP transport: one stateless transaction per datagram.
//!
//! Each request is decoded, validated, evaluated and answered on its own;
//! nothing is remembered between datagrams and responses go back to whichever
//! address sent the request.

use ipkcp_config::LimitsConfig;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::codec::{self, RequestFrame, Status};
use crate::expr::{self, BuildError, ComputeError, SolveError};
use crate::parser::{self, ParseError};
use crate::shutdown::ShutdownListener;

/// Error text for anything that is not a well-formed request.
pub const INVALID_REQUEST: &str = "Invalid request.";

/// Why a transaction was answered with an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("datagram shorter than the request header")]
    Truncated,

    #[error("opcode {0} is not a request")]
    NotARequest(u8),

    #[error("malformed expression: {0}")]
    Syntax(#[from] ParseError),

    #[error("malformed expression: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}

impl From<SolveError> for TransactionError {
    fn from(e: SolveError) -> Self {
        match e {
            SolveError::Build(e) => Self::Build(e),
            SolveError::Compute(e) => Self::Compute(e),
        }
    }
}

impl TransactionError {
    /// The payload of the error envelope sent back to the peer.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Compute(e) => e.message(),
            _ => INVALID_REQUEST,
        }
    }
}

/// Evaluate the expression carried by one request datagram.
pub fn answer(datagram: &[u8]) -> Result<i64, TransactionError> {
    let frame = RequestFrame::read(datagram).ok_or(TransactionError::Truncated)?;
    if !frame.is_request() {
        return Err(TransactionError::NotARequest(frame.opcode));
    }
    parser::validate_expr(frame.payload)?;
    Ok(expr::solve(frame.payload)?)
}

/// Build the response envelope for one request datagram.
pub fn handle_datagram(datagram: &[u8]) -> Vec<u8> {
    match answer(datagram) {
        Ok(value) => {
            debug!(value, "transaction answered");
            codec::encode_response(Status::Ok, &value.to_string())
        }
        Err(e) => {
            warn!(error = %e, "transaction rejected");
            codec::encode_response(Status::Error, e.message())
        }
    }
}

/// Answer datagrams on `socket` until shutdown. Returns how many were answered.
pub async fn serve(
    socket: UdpSocket,
    limits: LimitsConfig,
    mut shutdown: ShutdownListener,
) -> u64 {
    let mut buffer = vec![0u8; limits.max_datagram_len];
    let mut handled = 0u64;

    match socket.local_addr() {
        Ok(addr) => info!(%addr, "UDP server listening"),
        Err(e) => warn!(error = %e, "UDP server listening on unknown address"),
    }

    loop {
        let (len, peer) = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            received = socket.recv_from(&mut buffer) => match received {
                Ok(received) => received,
                Err(e) => {
                    error!(error = %e, "receive failed");
                    continue;
                }
            },
        };

        let response = handle_datagram(&buffer[..len]);
        match socket.send_to(&response, peer).await {
            Ok(_) => handled += 1,
            Err(e) => error!(%peer, error = %e, "send failed"),
        }
    }

    info!(handled, "UDP server stopped");
    handled
}
