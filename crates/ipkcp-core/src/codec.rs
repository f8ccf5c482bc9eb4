//! Wire framing for both transports.
//!
//! No I/O happens here. UDP messages are wrapped in a small binary envelope;
//! TCP messages are `\n`-terminated text lines whose content passes through
//! untouched, so the only TCP concern is finding the line boundary.
//!
//! # UDP envelopes
//!
//! ```text
//! request   +--------+--------+---------------------+
//!           | opcode | length | expression (length) |
//!           |   0    |   L    |                     |
//!           +--------+--------+---------------------+
//!
//! response  +--------+--------+--------+------------------+
//!           | opcode | status | length | payload (length) |
//!           |   1    | 0 / 1  |   L    |                  |
//!           +--------+--------+--------+------------------+
//! ```
//!
//! Payloads never carry a trailing newline and are truncated to
//! [`MAX_PAYLOAD_LEN`] bytes without signalling an error.
//!
//! The codec does not judge requests: [`RequestFrame::read`] only exposes the
//! fields, and the transaction handler decides whether they are acceptable.

/// Largest payload a one-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Size of the request header (opcode + length).
pub const REQUEST_HEADER_LEN: usize = 2;

/// Size of the response header (opcode + status + length).
pub const RESPONSE_HEADER_LEN: usize = 3;

/// Message type carried in the first byte of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Request = 0,
    Response = 1,
}

/// Outcome flag carried in the second byte of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Error = 1,
}

impl Status {
    /// Any non-zero status byte is an error.
    pub fn from_byte(byte: u8) -> Self {
        if byte == Status::Ok as u8 {
            Status::Ok
        } else {
            Status::Error
        }
    }
}

/// Render an expression as a request envelope.
pub fn encode_request(expression: &str) -> Vec<u8> {
    let payload = truncate(expression.as_bytes());
    let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + payload.len());
    frame.push(Opcode::Request as u8);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame
}

/// Fields read from an incoming request datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame<'a> {
    /// The raw opcode byte; a request carries [`Opcode::Request`].
    pub opcode: u8,
    /// The declared payload length.
    pub length: u8,
    /// Payload bytes, bounded by both the declared length and the datagram.
    pub payload: &'a [u8],
}

impl<'a> RequestFrame<'a> {
    /// Read the envelope fields, or `None` if the header itself is missing.
    pub fn read(datagram: &'a [u8]) -> Option<Self> {
        let (&opcode, rest) = datagram.split_first()?;
        let (&length, body) = rest.split_first()?;
        let end = body.len().min(length as usize);
        Some(Self {
            opcode,
            length,
            payload: &body[..end],
        })
    }

    /// Whether the opcode marks this datagram as a request.
    pub fn is_request(&self) -> bool {
        self.opcode == Opcode::Request as u8
    }
}

/// Inverse of [`encode_request`], used on the server side and in tests.
pub fn decode_request(datagram: &[u8]) -> Option<String> {
    RequestFrame::read(datagram).map(|frame| String::from_utf8_lossy(frame.payload).into_owned())
}

/// Render a response envelope around `payload`.
pub fn encode_response(status: Status, payload: &str) -> Vec<u8> {
    let payload = truncate(payload.as_bytes());
    let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + payload.len());
    frame.push(Opcode::Response as u8);
    frame.push(status as u8);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame
}

/// Strip a response envelope down to `(status, payload)` for display.
///
/// Returns `None` when the datagram is too short to hold a response header.
/// A declared length that overruns the datagram is clamped to what arrived.
pub fn decode_response(datagram: &[u8]) -> Option<(Status, String)> {
    if datagram.len() < RESPONSE_HEADER_LEN {
        return None;
    }
    let status = Status::from_byte(datagram[1]);
    let body = &datagram[RESPONSE_HEADER_LEN..];
    let end = body.len().min(datagram[2] as usize);
    Some((status, String::from_utf8_lossy(&body[..end]).into_owned()))
}

/// Position just past the first `\n` in `buffer`, if a full line is present.
pub fn line_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.iter().position(|&b| b == b'\n').map(|i| i + 1)
}

fn truncate(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len().min(MAX_PAYLOAD_LEN)]
}
