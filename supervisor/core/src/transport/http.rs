//! HTTP Channel
//!
//! Network transport: XML-RPC bodies POSTed to the target URL with reqwest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use url::Url;

use super::{xmlrpc, CallChannel, USER_AGENT};
use crate::error::CallError;
use crate::value::Value;

/// Build the reqwest client shared by both channels
///
/// # Errors
///
/// Returns `CallError::Transport` if the client cannot be built.
pub(super) fn build_client(
    builder: reqwest::ClientBuilder,
    connect_timeout: Option<Duration>,
) -> Result<reqwest::Client, CallError> {
    let mut builder = builder.user_agent(USER_AGENT);
    if let Some(timeout) = connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| CallError::Transport(format!("Failed to build HTTP client: {e}")))
}

/// POST one encoded call to `url` and decode the reply
pub(super) async fn post_call(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: &[Value],
) -> Result<Value, CallError> {
    let body = xmlrpc::encode_call(method, params);
    let response = client
        .post(url.clone())
        .header(CONTENT_TYPE, "text/xml")
        .body(body)
        .send()
        .await
        .map_err(|e| CallError::Transport(format!("{method} to {url}: {e}")))?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(CallError::HttpStatus {
            status: status.as_u16(),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| CallError::Transport(format!("Failed to read response: {e}")))?;

    xmlrpc::decode_response(&bytes)
}

/// XML-RPC channel over HTTP or HTTPS
pub struct HttpChannel {
    url: Url,
    client: reqwest::Client,
    closed: AtomicBool,
}

impl std::fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChannel")
            .field("url", &self.url.as_str())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl HttpChannel {
    /// Create a channel posting to `url`
    ///
    /// # Arguments
    ///
    /// * `url` - Endpoint URL, e.g. `http://127.0.0.1:9001/RPC2`
    /// * `connect_timeout` - Optional bound on establishing the TCP connection
    ///
    /// # Errors
    ///
    /// Returns `CallError::Transport` if the HTTP client cannot be built.
    pub fn new(url: Url, connect_timeout: Option<Duration>) -> Result<Self, CallError> {
        let client = build_client(reqwest::Client::builder(), connect_timeout)?;

        Ok(Self {
            url,
            client,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl CallChannel for HttpChannel {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, CallError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CallError::Closed);
        }
        post_call(&self.client, &self.url, method, &params).await
    }

    async fn close(&self) -> Result<(), CallError> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!(url = %self.url, "HTTP channel closed");
        Ok(())
    }
}
