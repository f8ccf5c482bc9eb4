//! TCP transport: text lines, one stateful session per connection.
//!
//! ```text
//! client                         server
//!   │ HELLO\n ─────────────────────▶ │  INIT
//!   │ ◀───────────────────── HELLO\n │
//!   │ SOLVE (+ 1 2)\n ─────────────▶ │  READ → WRITE
//!   │ ◀──────────────────  RESULT 3\n │
//!   │ BYE\n ───────────────────────▶ │  READ → TERM
//!   │ ◀─────────────────────── BYE\n │
//! ```

pub mod pool;
pub mod server;
pub mod session;

pub use pool::{PoolExhausted, SessionPool};
pub use server::{ServeSummary, serve};
pub use session::{BYE, HELLO, Session, SessionError, SessionReport, SessionState};
