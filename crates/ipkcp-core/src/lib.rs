#![deny(unsafe_code)]

//! IPK Calculator Protocol engine.
//!
//! A line-oriented TCP dialogue and a binary UDP request/response exchange
//! that both carry prefix-notation arithmetic such as `(+ 1 (* 2 3))`. This
//! crate holds the wire codec, the expression grammar and evaluator, the
//! server loops for both transports, and the matching client drivers.

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Client drivers for TCP and UDP.
pub mod client;
/// Binary UDP envelope and TCP line framing.
pub mod codec;
/// Server runtime: binding, serving, graceful shutdown.
pub mod daemon;
/// Expression tree, builder and evaluator.
pub mod expr;
/// Grammar checks for queries and bare expressions.
pub mod parser;
/// Cooperative shutdown signal.
pub mod shutdown;
/// Stateful TCP sessions and their accept loop.
pub mod tcp;
/// Stateless UDP transactions.
pub mod udp;

pub use daemon::{Daemon, DaemonError, Listener, Served};
pub use expr::{ComputeError, Expr, Operator, solve};
pub use shutdown::{Shutdown, ShutdownListener};
