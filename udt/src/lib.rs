//! A reliable, connection-oriented, rate-paced transport over UDP.
//!
//! [`api`] is the process-facing surface: a socket table of `UDTSOCKET` ids over
//! [`connection::Connection`]s and listeners, backed by a [`multiplexer::Multiplexer`] per
//! bound local address. Everything below `api` — the wire codec, loss lists, windows, buffers,
//! congestion control, the handshake state machine — is exposed for callers that want to drive
//! the engine directly instead of through the socket-style facade.

pub mod api;
pub mod buffer;
pub mod cc;
pub mod channel;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod loss_list;
pub mod multiplexer;
pub mod options;
pub mod packet;
pub mod perf;
pub mod queue;
pub mod seq;
pub mod timer;
pub mod window;

#[cfg(feature = "cli")]
pub mod logging;

pub use api::{accept, bind, close, connect, default_runtime, getlasterror, getpeername, getsockname, getsockopt, listen, perfmon, recv, recvfile, recvmsg, select, send, sendfile, sendmsg, setsockopt, socket, OptValue, Runtime, UdtSocket};
pub use error::{Error, Result};
pub use options::{Options, SockOpt};
pub use perf::Snapshot;
