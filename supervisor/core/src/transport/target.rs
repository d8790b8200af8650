//! Connect Target Resolution
//!
//! Decides which transport a connect target names.
//!
//! # Target Syntax
//!
//! ```text
//! http://127.0.0.1:9001/RPC2           network transport, used as given
//! unix:///var/run/supervisor.sock      domain socket, virtual path "/"
//! unix:///tmp/sv.sock/RPC2             domain socket, virtual path "/RPC2"
//! ```
//!
//! For `unix://` targets the socket path runs up to and including the first
//! `.sock` in the string. Whatever follows is the virtual sub-path: it is never
//! dialed, but requests are framed against it on the placeholder address
//! `http://localhost:80`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Scheme prefix selecting the domain socket transport
pub const UNIX_SCHEME: &str = "unix://";

/// Suffix marking the end of the socket file name
pub const SOCKET_SUFFIX: &str = ".sock";

/// Network address used for request framing over a domain socket
pub const PLACEHOLDER_URL: &str = "http://localhost:80";

/// Errors from parsing a connect target
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    /// `unix://` with nothing after it
    #[error("Empty socket path")]
    EmptySocketPath,

    /// Not a parseable URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// Target as given
        url: String,
        /// Parser message
        reason: String,
    },

    /// A URL with a scheme other than http or https
    #[error("Unsupported scheme '{0}'")]
    UnsupportedScheme(String),
}

/// A resolved connect target
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Network transport against a URL
    Http {
        /// Endpoint URL, as given
        url: Url,
    },

    /// Domain socket transport
    UnixSocket {
        /// Socket file to dial
        socket_path: PathBuf,
        /// Placeholder URL plus virtual sub-path, for logical addressing
        url: String,
        /// Request path sent over the socket
        request_path: String,
    },
}

impl Target {
    /// Resolve a connect target string
    ///
    /// # Errors
    ///
    /// Returns a [`TargetError`] for an empty socket path, an unparseable URL
    /// or a scheme other than http/https.
    pub fn parse(target: &str) -> Result<Self, TargetError> {
        if let Some(rest) = target.strip_prefix(UNIX_SCHEME) {
            return Self::parse_unix(rest);
        }

        let url = Url::parse(target).map_err(|e| TargetError::InvalidUrl {
            url: target.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(Self::Http { url }),
            other => Err(TargetError::UnsupportedScheme(other.to_string())),
        }
    }

    fn parse_unix(rest: &str) -> Result<Self, TargetError> {
        if rest.is_empty() {
            return Err(TargetError::EmptySocketPath);
        }

        // First occurrence only, and never at index 0
        let (socket, sub_path) = match rest.find(SOCKET_SUFFIX) {
            Some(index) if index > 0 => rest.split_at(index + SOCKET_SUFFIX.len()),
            _ => (rest, ""),
        };

        let request_path = if sub_path.is_empty() {
            "/".to_string()
        } else if sub_path.starts_with('/') {
            sub_path.to_string()
        } else {
            format!("/{sub_path}")
        };

        Ok(Self::UnixSocket {
            socket_path: PathBuf::from(socket),
            url: format!("{PLACEHOLDER_URL}{sub_path}"),
            request_path,
        })
    }

    /// Check if this target uses the domain socket transport
    #[must_use]
    pub fn is_unix_socket(&self) -> bool {
        matches!(self, Self::UnixSocket { .. })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http { url } => write!(f, "{url}"),
            Self::UnixSocket {
                socket_path,
                request_path,
                ..
            } => write!(f, "unix:{}{}", socket_path.display(), request_path),
        }
    }
}
