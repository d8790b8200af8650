//! Typed supervisord Client
//!
//! One async method per remote capability. Every method builds its positional
//! argument list explicitly, invokes the call channel, and decodes the dynamic
//! reply into a record or primitive.
//!
//! # Lifecycle
//!
//! ```text
//! connect(target) ──► resolve transport ──► getAPIVersion == "3.0"? ──► client
//!                                                  │ no
//!                                                  ▼
//!                                         IncompatibleVersion
//!
//! client.close() ──► channel released; every later call fails with Closed
//! ```
//!
//! The client holds no state besides the channel slot and the negotiated
//! version. It does not retry, reconnect, cache or serialize calls.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{CallError, DecodeError, SupervisorError};
use crate::records::{
    decode_scalar, ProcessInfo, ProcessStatus, ProcessTail, ReloadInfo, SupervisorState,
};
use crate::transport::{create_channel, CallChannel, Target};
use crate::value::Value;

/// The only API version this client speaks
pub const API_VERSION: &str = "3.0";

const GET_API_VERSION: &str = "supervisor.getAPIVersion";

/// Label used in errors for clients built on a caller-supplied channel
const CUSTOM_TARGET: &str = "<custom channel>";

/// Client for one supervisord instance
pub struct SupervisorClient {
    channel: RwLock<Option<Arc<dyn CallChannel>>>,
    api_version: String,
    target: String,
}

impl std::fmt::Debug for SupervisorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorClient")
            .field("target", &self.target)
            .field("api_version", &self.api_version)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SupervisorClient {
    /// Connect to `target` and verify the API version
    ///
    /// # Arguments
    ///
    /// * `target` - `http(s)://host:port/path` or `unix://<path>.sock[/path]`
    ///
    /// # Errors
    ///
    /// - `ConnectionFailed` if the target is unusable or unreachable
    /// - `IncompatibleVersion` if the peer does not report `"3.0"`
    /// - `RemoteCallFailed`/`DecodeFailed` if the version query itself faults
    ///   or returns a non-string
    pub async fn connect(target: &str) -> Result<Self, SupervisorError> {
        Self::connect_with_config(&ClientConfig::new(target)).await
    }

    /// Connect using a full [`ClientConfig`]
    ///
    /// # Errors
    ///
    /// Same as [`SupervisorClient::connect`].
    pub async fn connect_with_config(config: &ClientConfig) -> Result<Self, SupervisorError> {
        let connection_failed = |reason: String| SupervisorError::ConnectionFailed {
            target: config.url.clone(),
            reason,
        };

        let target = Target::parse(&config.url).map_err(|e| connection_failed(e.to_string()))?;
        let channel = create_channel(&target, config.connect_timeout())
            .map_err(|e| connection_failed(e.to_string()))?;

        debug!(target = %target, unix_socket = target.is_unix_socket(), "Resolved transport");
        Self::handshake(&config.url, channel).await
    }

    /// Build a client on an existing channel, verifying the API version
    ///
    /// # Errors
    ///
    /// Same as [`SupervisorClient::connect`].
    pub async fn with_channel(channel: Arc<dyn CallChannel>) -> Result<Self, SupervisorError> {
        Self::handshake(CUSTOM_TARGET, channel).await
    }

    async fn handshake(
        target: &str,
        channel: Arc<dyn CallChannel>,
    ) -> Result<Self, SupervisorError> {
        let reply = channel
            .call(GET_API_VERSION, Vec::new())
            .await
            .map_err(|source| match source {
                CallError::Transport(reason) => SupervisorError::ConnectionFailed {
                    target: target.to_string(),
                    reason,
                },
                source => SupervisorError::RemoteCallFailed {
                    method: GET_API_VERSION.to_string(),
                    source,
                },
            })?;

        let version: String =
            decode_scalar(&reply, "APIVersion").map_err(|source| SupervisorError::DecodeFailed {
                method: GET_API_VERSION.to_string(),
                source,
            })?;

        if version != API_VERSION {
            if let Err(e) = channel.close().await {
                warn!(error = %e, "Failed to release channel after version mismatch");
            }
            return Err(SupervisorError::IncompatibleVersion {
                expected: API_VERSION,
                actual: version,
            });
        }

        info!(target, api_version = %version, "Connected to supervisord");

        Ok(Self {
            channel: RwLock::new(Some(channel)),
            api_version: version,
            target: target.to_string(),
        })
    }

    /// The API version negotiated at connect time
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// The target this client was connected with
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Check if [`SupervisorClient::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.channel.read().is_none()
    }

    /// Release the channel
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the client was already closed, or `RemoteCallFailed`
    /// if the channel reports a failure while releasing.
    pub async fn close(&self) -> Result<(), SupervisorError> {
        let channel = self.channel.write().take().ok_or(SupervisorError::Closed)?;
        channel
            .close()
            .await
            .map_err(|source| SupervisorError::RemoteCallFailed {
                method: "close".to_string(),
                source,
            })?;
        info!(target = %self.target, "Closed supervisord client");
        Ok(())
    }

    // =========================================================================
    // Call plumbing
    // =========================================================================

    async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value, SupervisorError> {
        let channel = self.channel.read().clone().ok_or(SupervisorError::Closed)?;

        debug!(method, params = params.len(), "Calling supervisord");
        channel
            .call(method, params)
            .await
            .map_err(|source| SupervisorError::RemoteCallFailed {
                method: method.to_string(),
                source,
            })
    }

    async fn call_decode<T>(
        &self,
        method: &'static str,
        params: Vec<Value>,
        decode: impl FnOnce(&Value) -> Result<T, DecodeError>,
    ) -> Result<T, SupervisorError> {
        let reply = self.invoke(method, params).await?;
        decode(&reply).map_err(|source| SupervisorError::DecodeFailed {
            method: method.to_string(),
            source,
        })
    }

    async fn call_bool(&self, method: &'static str, params: Vec<Value>) -> Result<bool, SupervisorError> {
        self.call_decode(method, params, |v| decode_scalar(v, method))
            .await
    }

    async fn call_string(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<String, SupervisorError> {
        self.call_decode(method, params, |v| decode_scalar(v, method))
            .await
    }

    // =========================================================================
    // Daemon status and control
    // =========================================================================

    /// API version negotiated at connect time, without a round-trip
    ///
    /// # Errors
    ///
    /// Returns `Closed` once the client has been closed.
    pub fn get_api_version(&self) -> Result<&str, SupervisorError> {
        if self.is_closed() {
            return Err(SupervisorError::Closed);
        }
        Ok(&self.api_version)
    }

    /// Version of the supervisord package
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn get_supervisor_version(&self) -> Result<String, SupervisorError> {
        self.call_string("supervisor.getSupervisorVersion", Vec::new())
            .await
    }

    /// Identifier string configured for this daemon
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn get_identification(&self) -> Result<String, SupervisorError> {
        self.call_string("supervisor.getIdentification", Vec::new())
            .await
    }

    /// Current daemon state
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn get_state(&self) -> Result<SupervisorState, SupervisorError> {
        self.call_decode("supervisor.getState", Vec::new(), SupervisorState::from_value)
            .await
    }

    /// Process id of the daemon itself
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn get_pid(&self) -> Result<i64, SupervisorError> {
        self.call_decode("supervisor.getPID", Vec::new(), |v| {
            decode_scalar(v, "supervisor.getPID")
        })
        .await
    }

    /// Clear the daemon's main log
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn clear_log(&self) -> Result<bool, SupervisorError> {
        self.call_bool("supervisor.clearLog", Vec::new()).await
    }

    /// Shut the daemon down
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn shutdown(&self) -> Result<bool, SupervisorError> {
        self.call_bool("supervisor.shutdown", Vec::new()).await
    }

    /// Restart the daemon
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn restart(&self) -> Result<bool, SupervisorError> {
        self.call_bool("supervisor.restart", Vec::new()).await
    }

    /// Reload the configuration and report which process names changed
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn reload_config(&self) -> Result<ReloadInfo, SupervisorError> {
        self.call_decode("supervisor.reloadConfig", Vec::new(), ReloadInfo::from_value)
            .await
    }

    // =========================================================================
    // Process info
    // =========================================================================

    /// Info for one process
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` (e.g. `BAD_NAME`) or `DecodeFailed`.
    pub async fn get_process_info(&self, name: &str) -> Result<ProcessInfo, SupervisorError> {
        self.call_decode(
            "supervisor.getProcessInfo",
            vec![Value::from(name)],
            ProcessInfo::from_value,
        )
        .await
    }

    /// Info for every configured process, in daemon order
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn get_all_process_info(&self) -> Result<Vec<ProcessInfo>, SupervisorError> {
        self.call_decode(
            "supervisor.getAllProcessInfo",
            Vec::new(),
            ProcessInfo::list_from_value,
        )
        .await
    }

    // =========================================================================
    // Process control
    // =========================================================================

    /// Start a process
    ///
    /// # Arguments
    ///
    /// * `name` - Process name, or `group:name`
    /// * `wait` - Wait until the process is fully started
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn start_process(&self, name: &str, wait: bool) -> Result<bool, SupervisorError> {
        self.call_bool(
            "supervisor.startProcess",
            vec![Value::from(name), Value::from(wait)],
        )
        .await
    }

    /// Stop a process
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn stop_process(&self, name: &str, wait: bool) -> Result<bool, SupervisorError> {
        self.call_bool(
            "supervisor.stopProcess",
            vec![Value::from(name), Value::from(wait)],
        )
        .await
    }

    /// Start every stopped process, reporting per-process outcomes in reply order
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn start_all_processes(
        &self,
        wait: bool,
    ) -> Result<Vec<ProcessStatus>, SupervisorError> {
        self.call_decode(
            "supervisor.startAllProcesses",
            vec![Value::from(wait)],
            ProcessStatus::list_from_value,
        )
        .await
    }

    /// Stop every running process, reporting per-process outcomes in reply order
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn stop_all_processes(
        &self,
        wait: bool,
    ) -> Result<Vec<ProcessStatus>, SupervisorError> {
        self.call_decode(
            "supervisor.stopAllProcesses",
            vec![Value::from(wait)],
            ProcessStatus::list_from_value,
        )
        .await
    }

    /// Start every process in a group
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn start_process_group(
        &self,
        group: &str,
        wait: bool,
    ) -> Result<bool, SupervisorError> {
        self.call_bool(
            "supervisor.startProcessGroup",
            vec![Value::from(group), Value::from(wait)],
        )
        .await
    }

    /// Stop every process in a group
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn stop_process_group(
        &self,
        group: &str,
        wait: bool,
    ) -> Result<bool, SupervisorError> {
        self.call_bool(
            "supervisor.stopProcessGroup",
            vec![Value::from(group), Value::from(wait)],
        )
        .await
    }

    /// Write `data` to a running process's stdin
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn send_process_stdin(&self, name: &str, data: &str) -> Result<bool, SupervisorError> {
        self.call_bool(
            "supervisor.sendProcessStdin",
            vec![Value::from(name), Value::from(data)],
        )
        .await
    }

    /// Emit a remote communication event to listening event consumers
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn send_remote_comm_event(
        &self,
        event_type: &str,
        data: &str,
    ) -> Result<bool, SupervisorError> {
        self.call_bool(
            "supervisor.sendRemoteCommEvent",
            vec![Value::from(event_type), Value::from(data)],
        )
        .await
    }

    /// Activate a process group added to the configuration
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn add_process_group(&self, name: &str) -> Result<bool, SupervisorError> {
        self.call_bool("supervisor.addProcessGroup", vec![Value::from(name)])
            .await
    }

    /// Remove a stopped process group
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn remove_process_group(&self, name: &str) -> Result<bool, SupervisorError> {
        self.call_bool("supervisor.removeProcessGroup", vec![Value::from(name)])
            .await
    }

    // =========================================================================
    // Logs
    // =========================================================================

    /// Read `length` bytes of the daemon log from `offset`
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn read_log(&self, offset: i64, length: i64) -> Result<String, SupervisorError> {
        self.call_string(
            "supervisor.readLog",
            vec![Value::from(offset), Value::from(length)],
        )
        .await
    }

    /// Read a slice of a process's stdout log
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn read_process_stdout_log(
        &self,
        name: &str,
        offset: i64,
        length: i64,
    ) -> Result<String, SupervisorError> {
        self.call_string(
            "supervisor.readProcessStdoutLog",
            vec![Value::from(name), Value::from(offset), Value::from(length)],
        )
        .await
    }

    /// Read a slice of a process's stderr log
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn read_process_stderr_log(
        &self,
        name: &str,
        offset: i64,
        length: i64,
    ) -> Result<String, SupervisorError> {
        self.call_string(
            "supervisor.readProcessStderrLog",
            vec![Value::from(name), Value::from(offset), Value::from(length)],
        )
        .await
    }

    /// Tail a process's stdout log
    ///
    /// Pass the returned offset back in to continue from where this call ended.
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn tail_process_stdout_log(
        &self,
        name: &str,
        offset: i64,
        length: i64,
    ) -> Result<ProcessTail, SupervisorError> {
        self.call_decode(
            "supervisor.tailProcessStdoutLog",
            vec![Value::from(name), Value::from(offset), Value::from(length)],
            ProcessTail::from_value,
        )
        .await
    }

    /// Tail a process's stderr log
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn tail_process_stderr_log(
        &self,
        name: &str,
        offset: i64,
        length: i64,
    ) -> Result<ProcessTail, SupervisorError> {
        self.call_decode(
            "supervisor.tailProcessStderrLog",
            vec![Value::from(name), Value::from(offset), Value::from(length)],
            ProcessTail::from_value,
        )
        .await
    }

    /// Clear both logs of a process
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn clear_process_logs(&self, name: &str) -> Result<bool, SupervisorError> {
        self.call_bool("supervisor.clearProcessLogs", vec![Value::from(name)])
            .await
    }

    /// Clear the logs of all processes
    ///
    /// `name` is forwarded as the single positional argument.
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `RemoteCallFailed` or `DecodeFailed`.
    pub async fn clear_all_process_logs(&self, name: &str) -> Result<bool, SupervisorError> {
        self.call_bool("supervisor.clearAllProcessLogs", vec![Value::from(name)])
            .await
    }
}
