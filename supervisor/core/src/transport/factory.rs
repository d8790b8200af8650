//! Channel Factory
//!
//! Builds the call channel a resolved [`Target`] names. This keeps transport
//! selection out of the client.

use std::sync::Arc;
use std::time::Duration;

use super::{target::Target, CallChannel, HttpChannel};
use crate::error::CallError;

#[cfg(unix)]
use super::UnixSocketChannel;

/// Create a call channel for a resolved target
///
/// No connection is made here; channels dial on their first call.
///
/// # Arguments
///
/// * `target` - Resolved connect target
/// * `connect_timeout` - Optional bound on dialing, `None` waits indefinitely
///
/// # Errors
///
/// Returns `CallError::Transport` if the HTTP client cannot be built, or for a
/// domain socket target on a platform without Unix sockets.
pub fn create_channel(
    target: &Target,
    connect_timeout: Option<Duration>,
) -> Result<Arc<dyn CallChannel>, CallError> {
    match target {
        Target::Http { url } => Ok(Arc::new(HttpChannel::new(url.clone(), connect_timeout)?)),

        #[cfg(unix)]
        Target::UnixSocket {
            socket_path,
            request_path,
            ..
        } => Ok(Arc::new(UnixSocketChannel::new(
            socket_path.clone(),
            request_path,
            connect_timeout,
        )?)),

        #[cfg(not(unix))]
        Target::UnixSocket { .. } => Err(CallError::Transport(
            "Unix domain sockets are not supported on this platform".into(),
        )),
    }
}
