//! Transport handle abstraction
//!
//! This module defines the connection contract shared by every backend and the
//! handle that enforces it.
//!
//! # Architecture
//!
//! The transport layer uses the same operations abstraction pattern as a
//! session-ops table, expressed with traits:
//!
//! - `Backend` opens sessions and owns any backend context (e.g. a TLS context)
//! - `Session` defines the I/O operations (read, write, poll, shutdown)
//! - `TransportHandle` owns one backend, one copy of `ConnectParams` and at
//!   most one live session, and enforces the lifecycle
//!
//! Messaging clients only talk to the handle, so the same client code runs
//! over plain TCP or TLS.
//!
//! # Examples
//!
//! ```no_run
//! use iot_tls_transport::{ConnectParams, CredentialRef, OpenSslBackend, TransportHandle};
//!
//! let params = ConnectParams::builder("broker.example.test", 8883)
//!     .root_ca(CredentialRef::file("certs/root-ca.pem"))
//!     .device_cert(CredentialRef::file("certs/device.pem"))
//!     .device_key(CredentialRef::file("certs/device.key"))
//!     .timeout_ms(5000)
//!     .build()
//!     .unwrap();
//!
//! let mut handle = TransportHandle::new(OpenSslBackend::new());
//! handle.initialize(params).unwrap();
//! handle.connect().unwrap();
//!
//! handle.write_all(b"PING").unwrap();
//! let mut buf = [0u8; 64];
//! let n = handle.read(&mut buf).unwrap();
//! println!("received {:?}", &buf[..n]);
//!
//! handle.disconnect().unwrap();
//! handle.destroy().unwrap();
//! ```

pub mod backend;
pub mod handle;
pub mod params;

pub use backend::{Backend, Session};
pub use handle::{ConnectionState, PartialWrite, TransportHandle};
pub use params::{ConnectParams, ConnectParamsBuilder, CredentialRef, TlsVersion};

pub use crate::net::PollEvents;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport errors
///
/// Every operation reports one of these kinds rather than a generic failure,
/// so callers can tell a transient handshake problem from bad credentials or
/// a peer that went away.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Already initialized")]
    AlreadyInitialized,

    #[error("Not initialized")]
    NotInitialized,

    #[error("Handle destroyed")]
    Destroyed,
}

/// Error kind without payload
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigInvalid,
    ConnectFailed,
    HandshakeFailed,
    Timeout,
    Io,
    ConnectionClosed,
    NotConnected,
    AlreadyConnected,
    AlreadyInitialized,
    NotInitialized,
    Destroyed,
}

impl ErrorKind {
    /// Stable negative code for integer error spaces (0 is success)
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::ConfigInvalid => -1,
            ErrorKind::ConnectFailed => -2,
            ErrorKind::HandshakeFailed => -3,
            ErrorKind::Timeout => -4,
            ErrorKind::Io => -5,
            ErrorKind::ConnectionClosed => -6,
            ErrorKind::NotConnected => -7,
            ErrorKind::AlreadyConnected => -8,
            ErrorKind::AlreadyInitialized => -9,
            ErrorKind::NotInitialized => -10,
            ErrorKind::Destroyed => -11,
        }
    }

    /// Get kind name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::ConnectFailed => "ConnectFailed",
            ErrorKind::HandshakeFailed => "HandshakeFailed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Io => "IOError",
            ErrorKind::ConnectionClosed => "ConnectionClosed",
            ErrorKind::NotConnected => "NotConnected",
            ErrorKind::AlreadyConnected => "AlreadyConnected",
            ErrorKind::AlreadyInitialized => "AlreadyInitialized",
            ErrorKind::NotInitialized => "NotInitialized",
            ErrorKind::Destroyed => "Destroyed",
        }
    }
}

impl Error {
    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            Error::ConnectFailed(_) => ErrorKind::ConnectFailed,
            Error::HandshakeFailed(_) => ErrorKind::HandshakeFailed,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Io(_) => ErrorKind::Io,
            Error::ConnectionClosed => ErrorKind::ConnectionClosed,
            Error::NotConnected => ErrorKind::NotConnected,
            Error::AlreadyConnected => ErrorKind::AlreadyConnected,
            Error::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            Error::NotInitialized => ErrorKind::NotInitialized,
            Error::Destroyed => ErrorKind::Destroyed,
        }
    }

    /// Integer code of this error's kind
    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    /// Whether the session is unusable after this error
    ///
    /// A fatal error on read/write moves the handle to `Closed`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io(_) | Error::ConnectionClosed)
    }

    /// Whether retrying (possibly after a reconnect) can succeed
    ///
    /// Configuration and lifecycle errors need the caller to change something
    /// first, so they are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectFailed(_)
                | Error::HandshakeFailed(_)
                | Error::Timeout(_)
                | Error::Io(_)
                | Error::ConnectionClosed
        )
    }
}
