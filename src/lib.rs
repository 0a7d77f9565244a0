//! iot-tls-transport - pluggable secure byte-stream transport
//!
//! This crate provides the connection layer used by IoT messaging clients
//! (HTTP, MQTT) to open, read from, write to and close a TLS-secured stream
//! without knowing which socket/TLS stack sits underneath.

pub mod net;
pub mod plain;
pub mod tls;
pub mod transport;

pub use plain::PlainSocketBackend;
pub use tls::OpenSslBackend;
pub use transport::{
    Backend, ConnectParams, ConnectionState, CredentialRef, Error, ErrorKind, PartialWrite,
    Result, Session, TransportHandle,
};
