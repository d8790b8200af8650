//! Unix Socket Channel
//!
//! Domain socket transport. The reqwest client dials the socket file for every
//! connection, and requests are addressed to the placeholder host plus the
//! virtual sub-path.
//!
//! ```text
//! unix:///var/run/supervisor.sock/RPC2
//!          │                      │
//!          ▼                      ▼
//!     dialed socket     POST http://localhost:80/RPC2
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::http::{build_client, post_call};
use super::target::PLACEHOLDER_URL;
use super::CallChannel;
use crate::error::CallError;
use crate::value::Value;

/// XML-RPC channel over a Unix domain socket
pub struct UnixSocketChannel {
    /// Socket file to dial
    socket_path: PathBuf,
    /// Placeholder address plus virtual sub-path
    url: Url,
    client: reqwest::Client,
    closed: AtomicBool,
}

impl std::fmt::Debug for UnixSocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixSocketChannel")
            .field("socket_path", &self.socket_path)
            .field("url", &self.url.as_str())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl UnixSocketChannel {
    /// Create a channel for the given socket file
    ///
    /// No connection is made here.
    ///
    /// # Arguments
    ///
    /// * `socket_path` - Path to the daemon's socket file
    /// * `request_path` - Virtual HTTP path, e.g. `/RPC2`
    /// * `connect_timeout` - Optional bound on dialing the socket
    ///
    /// # Errors
    ///
    /// Returns `CallError::Transport` if the request path does not form a
    /// valid URL or the client cannot be built.
    pub fn new(
        socket_path: PathBuf,
        request_path: &str,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, CallError> {
        let url = Url::parse(&format!("{PLACEHOLDER_URL}{request_path}")).map_err(|e| {
            CallError::Transport(format!("Invalid request path '{request_path}': {e}"))
        })?;
        let client = build_client(
            reqwest::Client::builder().unix_socket(socket_path.clone()),
            connect_timeout,
        )?;

        Ok(Self {
            socket_path,
            url,
            client,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl CallChannel for UnixSocketChannel {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, CallError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CallError::Closed);
        }
        post_call(&self.client, &self.url, method, &params)
            .await
            .map_err(|e| match e {
                CallError::Transport(reason) => {
                    CallError::Transport(format!("{reason} (socket {:?})", self.socket_path))
                }
                other => other,
            })
    }

    async fn close(&self) -> Result<(), CallError> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!(path = ?self.socket_path, "Unix socket channel closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    /// Answer one connection with a canned raw response
    fn serve_raw(listener: UnixListener, response: &'static [u8]) {
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(response).await.unwrap();
            stream.shutdown().await.unwrap();
        });
    }

    #[test]
    fn test_request_url_uses_placeholder_host() {
        let channel =
            UnixSocketChannel::new(PathBuf::from("/tmp/sv.sock"), "/RPC2", None).unwrap();
        assert_eq!(channel.url.as_str(), "http://localhost/RPC2");
    }

    #[tokio::test]
    async fn test_missing_socket_is_transport_error() {
        let temp_dir = TempDir::new().unwrap();
        let channel =
            UnixSocketChannel::new(temp_dir.path().join("nonexistent.sock"), "/", None).unwrap();

        let result = channel.call("supervisor.getAPIVersion", Vec::new()).await;
        assert!(matches!(result, Err(CallError::Transport(_))));
    }

    #[tokio::test]
    async fn test_call_after_close() {
        let temp_dir = TempDir::new().unwrap();
        let channel =
            UnixSocketChannel::new(temp_dir.path().join("sv.sock"), "/", None).unwrap();

        channel.close().await.unwrap();
        let result = channel.call("supervisor.getAPIVersion", Vec::new()).await;
        assert_eq!(result, Err(CallError::Closed));
    }

    #[tokio::test]
    async fn test_chunked_reply_is_decoded() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sv.sock");
        serve_raw(
            UnixListener::bind(&path).unwrap(),
            b"HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nTransfer-Encoding: chunked\r\n\r\n\
              18\r\n<methodResponse><params>\r\n\
              3b\r\n<param><value>3.0</value></param></params></methodResponse>\r\n\
              0\r\n\r\n",
        );

        let channel = UnixSocketChannel::new(path, "/RPC2", None).unwrap();
        let result = channel.call("supervisor.getAPIVersion", Vec::new()).await;
        assert_eq!(result, Ok(Value::from("3.0")));
    }

    #[tokio::test]
    async fn test_oversized_chunk_length_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sv.sock");
        serve_raw(
            UnixListener::bind(&path).unwrap(),
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nabc\r\n0\r\n\r\n",
        );

        let channel = UnixSocketChannel::new(path, "/RPC2", None).unwrap();
        let result = channel.call("supervisor.getAPIVersion", Vec::new()).await;
        assert!(matches!(result, Err(CallError::Transport(_))));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sv.sock");
        serve_raw(
            UnixListener::bind(&path).unwrap(),
            b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n",
        );

        let channel = UnixSocketChannel::new(path, "/", None).unwrap();
        let result = channel.call("supervisor.getAPIVersion", Vec::new()).await;
        assert_eq!(result, Err(CallError::HttpStatus { status: 401 }));
    }
}
