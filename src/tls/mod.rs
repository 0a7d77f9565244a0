//! OpenSSL backend
//!
//! This module implements the transport contract over OpenSSL:
//!
//! 1. `TlsContext` is built from `ConnectParams` (root CA, device certificate
//!    and key, ALPN, minimum version) when the handle is initialized
//! 2. `OpenSslBackend::connect` opens TCP within the deadline and runs the
//!    client handshake, with SNI and hostname/IP verification when enabled
//! 3. `TlsSession` implements the `Session` operations on the encrypted stream
//!
//! # Examples
//!
//! ```no_run
//! use iot_tls_transport::tls::OpenSslBackend;
//! use iot_tls_transport::{ConnectParams, CredentialRef, TransportHandle};
//!
//! let params = ConnectParams::builder("example.test", 443)
//!     .root_ca(CredentialRef::file("root-ca.pem"))
//!     .alpn(&["x-amzn-mqtt-ca"])
//!     .build()
//!     .unwrap();
//!
//! let mut handle = TransportHandle::new(OpenSslBackend::new());
//! handle.initialize(params).unwrap();
//! handle.connect().unwrap();
//!
//! let info = handle.session().unwrap().info();
//! println!("{} {} alpn={:?}", info.version, info.cipher, info.alpn);
//! ```

pub mod cert;
pub mod config;
pub mod handshake;
pub mod info;
pub mod session;

pub use cert::CertInfo;
pub use config::TlsContext;
pub use info::TlsInfo;
pub use session::{OpenSslBackend, TlsSession};
