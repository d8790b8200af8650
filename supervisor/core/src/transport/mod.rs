//! Transport Layer for the supervisord RPC interface
//!
//! Provides the call channel abstraction and its concrete implementations:
//! - `HttpChannel`: XML-RPC over HTTP(S) to a network address
//! - `UnixSocketChannel`: XML-RPC over HTTP/1.1 on a local domain socket
//!
//! # Design Philosophy
//!
//! The typed client only ever sees [`CallChannel`]: "invoke a named method with
//! positional arguments, get back a dynamic value or a failure". Framing, body
//! encoding and fault reporting stay behind that trait, so the client can be
//! driven by any channel, including test doubles.
//!
//! ```text
//! SupervisorClient ──► CallChannel::call("supervisor.getState", [])
//!                           │
//!              ┌────────────┴─────────────┐
//!              ▼                          ▼
//!        HttpChannel              UnixSocketChannel
//!     (reqwest, http/https)     (tokio UnixStream, HTTP/1.1)
//!              └────────────┬─────────────┘
//!                           ▼
//!                   xmlrpc encode/decode
//! ```

pub mod factory;
pub mod http;
pub mod target;
#[cfg(unix)]
pub mod unix_socket;
pub mod xmlrpc;

use async_trait::async_trait;

use crate::error::CallError;
use crate::value::Value;

// Re-exports for convenience
pub use factory::create_channel;
pub use http::HttpChannel;
pub use target::{Target, TargetError};
#[cfg(unix)]
pub use unix_socket::UnixSocketChannel;

/// User agent sent by both channels
pub(crate) const USER_AGENT: &str = concat!("supervisor-core/", env!("CARGO_PKG_VERSION"));

/// Client-side RPC channel
///
/// Implementations must be safe to share between tasks; the client issues
/// calls through `&self` and never serializes them.
#[async_trait]
pub trait CallChannel: Send + Sync {
    /// Invoke `method` with positional `params` and return the dynamic reply
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, CallError>;

    /// Release the underlying connection resources
    ///
    /// Calls issued after this must fail with `CallError::Closed`.
    async fn close(&self) -> Result<(), CallError>;
}
