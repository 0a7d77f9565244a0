//! Connection parameters
//!
//! This module provides the immutable parameter bundle used to open a
//! secured connection, and its builder.

use super::{Error, Result};
use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Credential reference
///
/// An opaque locator for a PEM credential. Backends receive it unmodified.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialRef {
    /// PEM file on disk
    File(PathBuf),
    /// In-memory PEM buffer
    Pem(Bytes),
}

impl CredentialRef {
    /// Reference a PEM file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        CredentialRef::File(path.into())
    }

    /// Reference an in-memory PEM buffer
    pub fn pem(data: impl Into<Bytes>) -> Self {
        CredentialRef::Pem(data.into())
    }

    /// Load the PEM bytes behind this reference
    pub fn load(&self) -> Result<Bytes> {
        match self {
            CredentialRef::File(path) => std::fs::read(path).map(Bytes::from).map_err(|e| {
                Error::ConfigInvalid(format!("cannot read {}: {}", path.display(), e))
            }),
            CredentialRef::Pem(data) => Ok(data.clone()),
        }
    }

    fn check(&self, what: &str) -> Result<()> {
        let empty = match self {
            CredentialRef::File(path) => path.as_os_str().is_empty(),
            CredentialRef::Pem(data) => data.is_empty(),
        };
        if empty {
            return Err(Error::ConfigInvalid(format!("empty {} reference", what)));
        }
        Ok(())
    }
}

// Keep key material out of logs.
impl fmt::Debug for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialRef::File(path) => f.debug_tuple("File").field(path).finish(),
            CredentialRef::Pem(data) => write!(f, "Pem(<{} bytes>)", data.len()),
        }
    }
}

impl From<&Path> for CredentialRef {
    fn from(path: &Path) -> Self {
        CredentialRef::File(path.to_path_buf())
    }
}

impl From<PathBuf> for CredentialRef {
    fn from(path: PathBuf) -> Self {
        CredentialRef::File(path)
    }
}

/// Minimum TLS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Parse TLS version from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(Error::ConfigInvalid(format!("unsupported TLS version: {}", s))),
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// Connection parameters (immutable after building)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    root_ca: Option<CredentialRef>,
    device_cert: Option<CredentialRef>,
    device_key: Option<CredentialRef>,
    host: String,
    port: u16,
    timeout_ms: u32,
    server_verification: bool,
    io_timeout_ms: Option<u32>,
    alpn_protocols: Vec<String>,
    min_tls_version: Option<TlsVersion>,
}

impl ConnectParams {
    /// Create a builder for a destination
    pub fn builder(host: impl Into<String>, port: u16) -> ConnectParamsBuilder {
        ConnectParamsBuilder::new(host.into(), port)
    }

    pub fn root_ca(&self) -> Option<&CredentialRef> {
        self.root_ca.as_ref()
    }

    pub fn device_cert(&self) -> Option<&CredentialRef> {
        self.device_cert.as_ref()
    }

    pub fn device_key(&self) -> Option<&CredentialRef> {
        self.device_key.as_ref()
    }

    /// Destination host (DNS name or IP literal)
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Deadline for the whole connect sequence
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }

    /// Bound for each read/write on an established session
    ///
    /// Falls back to the handshake timeout.
    pub fn io_timeout(&self) -> Duration {
        let ms = self.io_timeout_ms.unwrap_or(self.timeout_ms);
        Duration::from_millis(u64::from(ms))
    }

    /// Whether the peer's chain and hostname are verified
    pub fn server_verification(&self) -> bool {
        self.server_verification
    }

    pub fn alpn_protocols(&self) -> &[String] {
        &self.alpn_protocols
    }

    pub fn min_tls_version(&self) -> Option<TlsVersion> {
        self.min_tls_version
    }

    /// Check the parameters for obvious mistakes
    ///
    /// Credential files are not opened here; backends load them and report
    /// unreadable files as `ConfigInvalid` too.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::ConfigInvalid("empty destination host".to_string()));
        }
        if self.host.chars().any(char::is_whitespace) {
            return Err(Error::ConfigInvalid(format!(
                "invalid destination host: {:?}",
                self.host
            )));
        }
        if self.port == 0 {
            return Err(Error::ConfigInvalid("destination port is 0".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::ConfigInvalid("timeout is 0".to_string()));
        }
        if self.io_timeout_ms == Some(0) {
            return Err(Error::ConfigInvalid("I/O timeout is 0".to_string()));
        }

        if let Some(ca) = &self.root_ca {
            ca.check("root CA")?;
        }
        match (&self.device_cert, &self.device_key) {
            (Some(cert), Some(key)) => {
                cert.check("device certificate")?;
                key.check("device private key")?;
            }
            (None, None) => {}
            (Some(_), None) => {
                return Err(Error::ConfigInvalid(
                    "device certificate given without private key".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(Error::ConfigInvalid(
                    "device private key given without certificate".to_string(),
                ))
            }
        }

        for proto in &self.alpn_protocols {
            if proto.is_empty() || proto.len() > 255 {
                return Err(Error::ConfigInvalid(format!(
                    "invalid ALPN protocol: {:?}",
                    proto
                )));
            }
        }

        Ok(())
    }
}

/// Connection parameters builder
pub struct ConnectParamsBuilder {
    params: ConnectParams,
}

impl ConnectParamsBuilder {
    fn new(host: String, port: u16) -> Self {
        ConnectParamsBuilder {
            params: ConnectParams {
                root_ca: None,
                device_cert: None,
                device_key: None,
                host,
                port,
                timeout_ms: DEFAULT_TIMEOUT_MS,
                server_verification: true,
                io_timeout_ms: None,
                alpn_protocols: Vec::new(),
                min_tls_version: None,
            },
        }
    }

    /// Set the root CA used to verify the server
    pub fn root_ca(mut self, ca: impl Into<CredentialRef>) -> Self {
        self.params.root_ca = Some(ca.into());
        self
    }

    /// Set the device (client) certificate
    pub fn device_cert(mut self, cert: impl Into<CredentialRef>) -> Self {
        self.params.device_cert = Some(cert.into());
        self
    }

    /// Set the device private key
    pub fn device_key(mut self, key: impl Into<CredentialRef>) -> Self {
        self.params.device_key = Some(key.into());
        self
    }

    /// Set the connect/handshake timeout in milliseconds
    pub fn timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.params.timeout_ms = timeout_ms;
        self
    }

    /// Set the per-operation read/write timeout in milliseconds
    pub fn io_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.params.io_timeout_ms = Some(timeout_ms);
        self
    }

    /// Enable/disable server certificate and hostname verification
    ///
    /// Disabling verification accepts any peer. Only use it against test
    /// endpoints.
    pub fn server_verification(mut self, verify: bool) -> Self {
        self.params.server_verification = verify;
        self
    }

    /// Set ALPN protocols offered during the handshake
    pub fn alpn(mut self, protocols: &[&str]) -> Self {
        self.params.alpn_protocols = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Set the minimum accepted TLS version
    pub fn min_tls_version(mut self, version: TlsVersion) -> Self {
        self.params.min_tls_version = Some(version);
        self
    }

    /// Validate and build the parameters
    pub fn build(self) -> Result<ConnectParams> {
        self.params.validate()?;
        Ok(self.params)
    }
}

/// Default connect/handshake timeout
pub const DEFAULT_TIMEOUT_MS: u32 = 5000;
