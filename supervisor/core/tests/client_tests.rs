//! Integration tests for the typed client
//!
//! Tests cover:
//! - Version handshake against scripted channels
//! - Argument order and method names for every operation family
//! - Fault and decode failure propagation
//! - Close semantics
//! - End-to-end calls over a Unix domain socket and over TCP

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio_test::{assert_err, assert_ok};
use url::Url;

use supervisor_core::transport::HttpChannel;
use supervisor_core::{
    CallChannel, CallError, ClientConfig, DecodeError, ProcessStatus, ProcessTail, ReloadInfo,
    SupervisorClient, SupervisorError, SupervisorState, Value,
};

// =============================================================================
// Scripted channel
// =============================================================================

/// Channel that answers from a reply table and records every call
struct MockChannel {
    replies: Mutex<HashMap<String, Result<Value, CallError>>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    closes: AtomicUsize,
}

impl MockChannel {
    fn new(api_version: &str) -> Arc<Self> {
        let channel = Arc::new(Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        });
        channel.reply("supervisor.getAPIVersion", Value::from(api_version));
        channel
    }

    fn reply(&self, method: &str, value: Value) {
        self.replies.lock().insert(method.to_string(), Ok(value));
    }

    fn fail(&self, method: &str, error: CallError) {
        self.replies.lock().insert(method.to_string(), Err(error));
    }

    fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().clone()
    }

    fn last_call(&self) -> (String, Vec<Value>) {
        self.calls.lock().last().cloned().unwrap()
    }
}

#[async_trait]
impl CallChannel for MockChannel {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, CallError> {
        self.calls.lock().push((method.to_string(), params));
        self.replies
            .lock()
            .get(method)
            .cloned()
            .unwrap_or_else(|| {
                Err(CallError::Fault {
                    code: 1,
                    message: "UNKNOWN_METHOD".to_string(),
                })
            })
    }

    async fn close(&self) -> Result<(), CallError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn status(name: &str, code: i64, description: &str) -> Value {
    let mut members = BTreeMap::new();
    members.insert("name".to_string(), Value::from(name));
    members.insert("group".to_string(), Value::from(name));
    members.insert("status".to_string(), Value::from(code));
    members.insert("description".to_string(), Value::from(description));
    Value::Struct(members)
}

async fn connected() -> (Arc<MockChannel>, SupervisorClient) {
    let channel = MockChannel::new("3.0");
    let client = SupervisorClient::with_channel(channel.clone()).await.unwrap();
    (channel, client)
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn test_handshake_accepts_matching_version() {
    let (channel, client) = connected().await;

    assert_eq!(client.api_version(), "3.0");
    assert_eq!(client.get_api_version().unwrap(), "3.0");
    assert!(!client.is_closed());
    assert_eq!(
        channel.calls(),
        vec![("supervisor.getAPIVersion".to_string(), Vec::new())]
    );
}

#[tokio::test]
async fn test_handshake_rejects_other_version() {
    let channel = MockChannel::new("2.0");

    let err = assert_err!(SupervisorClient::with_channel(channel.clone()).await);
    match err {
        SupervisorError::IncompatibleVersion { expected, actual } => {
            assert_eq!(expected, "3.0");
            assert_eq!(actual, "2.0");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(channel.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handshake_non_string_version() {
    let channel = MockChannel::new("3.0");
    channel.reply("supervisor.getAPIVersion", Value::Int(3));

    let err = assert_err!(SupervisorClient::with_channel(channel).await);
    assert!(matches!(
        err,
        SupervisorError::DecodeFailed {
            source: DecodeError::WrongType { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_handshake_transport_failure_is_connection_failed() {
    let channel = MockChannel::new("3.0");
    channel.fail(
        "supervisor.getAPIVersion",
        CallError::Transport("connection refused".to_string()),
    );

    let err = assert_err!(SupervisorClient::with_channel(channel).await);
    assert!(matches!(err, SupervisorError::ConnectionFailed { .. }));
}

#[tokio::test]
async fn test_handshake_fault_is_remote_call_failed() {
    let channel = MockChannel::new("3.0");
    channel.fail(
        "supervisor.getAPIVersion",
        CallError::Fault {
            code: 1,
            message: "UNKNOWN_METHOD".to_string(),
        },
    );

    let err = assert_err!(SupervisorClient::with_channel(channel).await);
    assert_eq!(err.fault_code(), Some(1));
}

// =============================================================================
// Operations
// =============================================================================

#[tokio::test]
async fn test_get_state() {
    let (channel, client) = connected().await;
    let mut members = BTreeMap::new();
    members.insert("statecode".to_string(), Value::Int(1));
    members.insert("statename".to_string(), Value::from("RUNNING"));
    channel.reply("supervisor.getState", Value::Struct(members));

    let state = assert_ok!(client.get_state().await);
    assert_eq!(
        state,
        SupervisorState {
            code: 1,
            name: "RUNNING".to_string()
        }
    );
}

#[tokio::test]
async fn test_process_info_missing_pid_defaults_to_zero() {
    let (channel, client) = connected().await;
    let mut members = BTreeMap::new();
    members.insert("name".to_string(), Value::from("cat"));
    members.insert("statename".to_string(), Value::from("STOPPED"));
    channel.reply("supervisor.getProcessInfo", Value::Struct(members.clone()));
    channel.reply(
        "supervisor.getAllProcessInfo",
        Value::Array(vec![Value::Struct(members)]),
    );

    let info = assert_ok!(client.get_process_info("cat").await);
    assert_eq!(info.pid, 0);
    assert_eq!(info.state_name, "STOPPED");
    assert_eq!(channel.last_call().1, vec![Value::from("cat")]);

    let all = assert_ok!(client.get_all_process_info().await);
    assert_eq!(all, vec![info]);
}

#[tokio::test]
async fn test_start_process_argument_order() {
    let (channel, client) = connected().await;
    channel.reply("supervisor.startProcess", Value::Bool(true));

    assert!(assert_ok!(client.start_process("web:web_00", false).await));
    assert_eq!(
        channel.last_call(),
        (
            "supervisor.startProcess".to_string(),
            vec![Value::from("web:web_00"), Value::Bool(false)]
        )
    );
}

#[tokio::test]
async fn test_bool_operations_method_names_and_arguments() {
    let (channel, client) = connected().await;
    for method in [
        "supervisor.startProcessGroup",
        "supervisor.stopProcessGroup",
        "supervisor.sendProcessStdin",
        "supervisor.sendRemoteCommEvent",
        "supervisor.addProcessGroup",
        "supervisor.removeProcessGroup",
        "supervisor.clearProcessLogs",
        "supervisor.clearAllProcessLogs",
        "supervisor.shutdown",
        "supervisor.restart",
    ] {
        channel.reply(method, Value::Bool(true));
    }

    assert_ok!(client.start_process_group("web", true).await);
    assert_ok!(client.stop_process_group("web", false).await);
    assert_ok!(client.send_process_stdin("cat", "hello\n").await);
    assert_ok!(client.send_remote_comm_event("deploy", "v2").await);
    assert_ok!(client.add_process_group("jobs").await);
    assert_ok!(client.remove_process_group("jobs").await);
    assert_ok!(client.clear_process_logs("cat").await);
    assert_ok!(client.clear_all_process_logs("cat").await);
    assert_ok!(client.shutdown().await);
    assert_ok!(client.restart().await);

    let calls = channel.calls();
    assert_eq!(
        calls[1..].to_vec(),
        vec![
            (
                "supervisor.startProcessGroup".to_string(),
                vec![Value::from("web"), Value::Bool(true)]
            ),
            (
                "supervisor.stopProcessGroup".to_string(),
                vec![Value::from("web"), Value::Bool(false)]
            ),
            (
                "supervisor.sendProcessStdin".to_string(),
                vec![Value::from("cat"), Value::from("hello\n")]
            ),
            (
                "supervisor.sendRemoteCommEvent".to_string(),
                vec![Value::from("deploy"), Value::from("v2")]
            ),
            (
                "supervisor.addProcessGroup".to_string(),
                vec![Value::from("jobs")]
            ),
            (
                "supervisor.removeProcessGroup".to_string(),
                vec![Value::from("jobs")]
            ),
            (
                "supervisor.clearProcessLogs".to_string(),
                vec![Value::from("cat")]
            ),
            (
                "supervisor.clearAllProcessLogs".to_string(),
                vec![Value::from("cat")]
            ),
            ("supervisor.shutdown".to_string(), Vec::new()),
            ("supervisor.restart".to_string(), Vec::new()),
        ]
    );
}

#[tokio::test]
async fn test_log_operations_argument_order() {
    let (channel, client) = connected().await;
    channel.reply("supervisor.readProcessStderrLog", Value::from("oops\n"));
    channel.reply(
        "supervisor.tailProcessStdoutLog",
        Value::Array(vec![
            Value::from("tail"),
            Value::Int(1024),
            Value::Bool(true),
        ]),
    );

    let text = assert_ok!(client.read_process_stderr_log("worker", 10, 200).await);
    assert_eq!(text, "oops\n");
    assert_eq!(
        channel.last_call().1,
        vec![Value::from("worker"), Value::Int(10), Value::Int(200)]
    );

    let tail = assert_ok!(client.tail_process_stdout_log("worker", 0, 1024).await);
    assert_eq!(
        tail,
        ProcessTail {
            log: "tail".to_string(),
            offset: 1024,
            overflow: true
        }
    );
}

#[tokio::test]
async fn test_start_all_processes_preserves_order() {
    let (channel, client) = connected().await;
    channel.reply(
        "supervisor.startAllProcesses",
        Value::Array(vec![
            status("cat", 80, "OK"),
            status("zeta", 60, "ALREADY_STARTED"),
            status("alpha", 80, "OK"),
        ]),
    );

    let statuses = assert_ok!(client.start_all_processes(true).await);
    let names: Vec<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["cat", "zeta", "alpha"]);
    assert_eq!(
        statuses[1],
        ProcessStatus {
            name: "zeta".to_string(),
            description: "ALREADY_STARTED".to_string(),
            group: "zeta".to_string(),
            status: 60,
        }
    );
    assert_eq!(channel.last_call().1, vec![Value::Bool(true)]);
}

#[tokio::test]
async fn test_reload_config() {
    let (channel, client) = connected().await;
    channel.reply(
        "supervisor.reloadConfig",
        Value::Array(vec![Value::Array(vec![
            Value::Array(vec![Value::from("new")]),
            Value::Array(Vec::new()),
            Value::Array(vec![Value::from("old")]),
        ])]),
    );

    let info = assert_ok!(client.reload_config().await);
    assert_eq!(
        info,
        ReloadInfo {
            added: vec!["new".to_string()],
            changed: Vec::new(),
            removed: vec!["old".to_string()],
        }
    );
}

#[tokio::test]
async fn test_fault_propagates_with_code() {
    let (channel, client) = connected().await;
    channel.fail(
        "supervisor.stopProcess",
        CallError::Fault {
            code: 10,
            message: "BAD_NAME: nope".to_string(),
        },
    );

    let err = assert_err!(client.stop_process("nope", true).await);
    assert_eq!(err.fault_code(), Some(10));
    match err {
        SupervisorError::RemoteCallFailed { method, .. } => {
            assert_eq!(method, "supervisor.stopProcess");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_wrong_reply_shape_is_decode_failure() {
    let (channel, client) = connected().await;
    channel.reply("supervisor.getState", Value::from("RUNNING"));
    channel.reply("supervisor.clearLog", Value::Int(1));

    let err = assert_err!(client.get_state().await);
    match err {
        SupervisorError::DecodeFailed { method, .. } => assert_eq!(method, "supervisor.getState"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(
        client.clear_log().await,
        Err(SupervisorError::DecodeFailed { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_calls_share_one_client() {
    let (channel, client) = connected().await;
    channel.reply("supervisor.getPID", Value::Int(4242));
    let client = Arc::new(client);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_pid().await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 4242);
    }
    // handshake + 8 calls
    assert_eq!(channel.calls().len(), 9);
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test]
async fn test_operations_after_close_do_not_touch_channel() {
    let (channel, client) = connected().await;
    channel.reply("supervisor.getIdentification", Value::from("supervisor"));

    assert_ok!(client.close().await);
    assert!(client.is_closed());
    let calls_before = channel.calls().len();

    assert!(matches!(
        client.get_identification().await,
        Err(SupervisorError::Closed)
    ));
    assert!(matches!(
        client.start_all_processes(false).await,
        Err(SupervisorError::Closed)
    ));
    assert!(matches!(
        client.get_api_version(),
        Err(SupervisorError::Closed)
    ));
    assert_eq!(channel.calls().len(), calls_before);
}

#[tokio::test]
async fn test_close_releases_channel_once() {
    let (channel, client) = connected().await;

    assert_ok!(client.close().await);
    assert!(matches!(client.close().await, Err(SupervisorError::Closed)));
    assert_eq!(channel.closes.load(Ordering::SeqCst), 1);
}

// =============================================================================
// End-to-end over real sockets
// =============================================================================

fn xml_reply(method_call: &str) -> String {
    let value = if method_call.contains("supervisor.getAPIVersion") {
        "<string>3.0</string>".to_string()
    } else if method_call.contains("supervisor.getState") {
        "<struct>\
         <member><name>statecode</name><value><int>1</int></value></member>\
         <member><name>statename</name><value><string>RUNNING</string></value></member>\
         </struct>"
            .to_string()
    } else if method_call.contains("supervisor.startProcess") {
        "<boolean>1</boolean>".to_string()
    } else {
        return "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
                <member><name>faultCode</name><value><int>1</int></value></member>\
                <member><name>faultString</name><value><string>UNKNOWN_METHOD</string></value></member>\
                </struct></value></fault></methodResponse>"
            .to_string();
    };
    format!(
        "<?xml version=\"1.0\"?><methodResponse><params><param><value>{value}</value></param></params></methodResponse>"
    )
}

/// Serve one HTTP request and record its request line
async fn serve_one<S>(stream: S, request_lines: Arc<Mutex<Vec<String>>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    serve_with_status(stream, request_lines, "200 OK").await;
}

/// Serve one HTTP request with the given status; non-200 replies carry no body
async fn serve_with_status<S>(
    mut stream: S,
    request_lines: Arc<Mutex<Vec<String>>>,
    status: &'static str,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let body_start = loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&raw[..body_start]).to_string();
    let content_length: usize = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0);

    while raw.len() < body_start + content_length {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed mid-body");
        raw.extend_from_slice(&buf[..n]);
    }

    request_lines
        .lock()
        .push(head.lines().next().unwrap_or_default().to_string());

    let call = String::from_utf8_lossy(&raw[body_start..body_start + content_length]).to_string();
    let body = if status.starts_with("200") {
        xml_reply(&call)
    } else {
        String::new()
    };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unix_socket_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("supervisor.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();
    let request_lines = Arc::new(Mutex::new(Vec::new()));

    let lines = Arc::clone(&request_lines);
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(serve_one(stream, Arc::clone(&lines)));
        }
    });

    let target = format!("unix://{}/RPC2", socket_path.display());
    let client = assert_ok!(SupervisorClient::connect(&target).await);

    let state = assert_ok!(client.get_state().await);
    assert_eq!(state.name, "RUNNING");
    assert!(assert_ok!(client.start_process("web", true).await));

    let err = assert_err!(client.get_pid().await);
    assert_eq!(err.fault_code(), Some(1));

    assert_ok!(client.close().await);

    let lines = request_lines.lock().clone();
    assert_eq!(lines.len(), 4);
    assert!(lines.iter().all(|line| line == "POST /RPC2 HTTP/1.1"));
}

#[tokio::test]
async fn test_unix_socket_without_subpath_uses_root() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("sv.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();
    let request_lines = Arc::new(Mutex::new(Vec::new()));

    let lines = Arc::clone(&request_lines);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve_one(stream, lines).await;
    });

    let target = format!("unix://{}", socket_path.display());
    assert_ok!(SupervisorClient::connect(&target).await);
    assert_eq!(request_lines.lock().clone(), vec!["POST / HTTP/1.1".to_string()]);
}

#[tokio::test]
async fn test_http_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let request_lines = Arc::new(Mutex::new(Vec::new()));

    let lines = Arc::clone(&request_lines);
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(serve_one(stream, Arc::clone(&lines)));
        }
    });

    let config = ClientConfig::new(format!("http://{addr}/RPC2")).with_connect_timeout_ms(2000);
    let client = assert_ok!(SupervisorClient::connect_with_config(&config).await);
    assert!(assert_ok!(client.start_process("web", false).await));

    let lines = request_lines.lock().clone();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|line| line == "POST /RPC2 HTTP/1.1"));
}

#[tokio::test]
async fn test_http_error_status_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let request_lines = Arc::new(Mutex::new(Vec::new()));

    let lines = Arc::clone(&request_lines);
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(serve_with_status(stream, Arc::clone(&lines), "401 Unauthorized"));
        }
    });

    let url = Url::parse(&format!("http://{addr}/RPC2")).unwrap();
    let channel = HttpChannel::new(url, None).unwrap();
    let result = channel.call("supervisor.getState", Vec::new()).await;
    assert_eq!(result, Err(CallError::HttpStatus { status: 401 }));

    let err = assert_err!(SupervisorClient::connect(&format!("http://{addr}/RPC2")).await);
    match err {
        SupervisorError::RemoteCallFailed { method, source } => {
            assert_eq!(method, "supervisor.getAPIVersion");
            assert_eq!(source, CallError::HttpStatus { status: 401 });
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(request_lines.lock().len(), 2);
}

#[tokio::test]
async fn test_connect_to_missing_socket_fails() {
    let temp_dir = TempDir::new().unwrap();
    let target = format!("unix://{}/missing.sock", temp_dir.path().display());

    let err = assert_err!(SupervisorClient::connect(&target).await);
    assert!(matches!(err, SupervisorError::ConnectionFailed { .. }));
}

#[tokio::test]
async fn test_connect_to_unsupported_scheme_fails() {
    let err = assert_err!(SupervisorClient::connect("ftp://localhost/RPC2").await);
    assert!(matches!(err, SupervisorError::ConnectionFailed { .. }));
}
