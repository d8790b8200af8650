//! Supervisor Core - Typed client for the supervisord RPC interface
//!
//! This crate talks to a running supervisord over its XML-RPC API, either on a
//! network address or on a local Unix domain socket, and exposes every remote
//! capability as a typed async method.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SupervisorClient                        │
//! │   connect ─ version handshake ─ typed operations ─ close      │
//! └───────────────┬─────────────────────────────┬────────────────┘
//!                 │ Vec<Value> params           │ Value reply
//!                 ▼                             │
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    CallChannel (transport)                    │
//! │   HttpChannel (reqwest)        UnixSocketChannel (tokio)      │
//! └───────────────┬─────────────────────────────┬────────────────┘
//!                 ▼                             ▼
//!        http://host:9001/RPC2        unix:///run/supervisor.sock
//!                 └──────────── supervisord ────┘
//!
//!   records: Value ──► SupervisorState / ProcessInfo / ProcessStatus /
//!                      ProcessTail / ReloadInfo
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use supervisor_core::SupervisorClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), supervisor_core::SupervisorError> {
//!     let client = SupervisorClient::connect("unix:///var/run/supervisor.sock").await?;
//!
//!     for info in client.get_all_process_info().await? {
//!         println!("{info}");
//!     }
//!
//!     client.close().await
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`client`]: The typed façade and connection lifecycle
//! - [`records`]: Decoded reply records
//! - [`transport`]: Call channels, target resolution, XML-RPC codec
//! - [`value`]: Dynamic value tree exchanged with the channel
//! - [`config`]: Target and timeout configuration (TOML + environment)
//! - [`error`]: Error taxonomy

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod records;
pub mod transport;
pub mod value;

// Re-exports for convenience
pub use client::{SupervisorClient, API_VERSION};
pub use error::{CallError, DecodeError, SupervisorError};
pub use records::{ProcessInfo, ProcessStatus, ProcessTail, ReloadInfo, SupervisorState};
pub use transport::{create_channel, CallChannel, Target, TargetError};
pub use value::Value;

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, read_config_file, ClientConfig,
    ConfigError, DEFAULT_URL,
};
