//! Negotiated session details
//!
//! Populated after a successful handshake so messaging clients can log or
//! check what was negotiated.

use super::cert::{peer_chain, CertInfo};
use openssl::ssl::{NameType, SslRef};

/// TLS session details available after handshake
#[derive(Debug, Clone)]
pub struct TlsInfo {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// SNI servername sent to the peer
    pub servername: Option<String>,

    /// Negotiated ALPN protocol
    pub alpn: Option<String>,

    /// Whether the peer's chain and hostname were verified
    pub verified: bool,

    /// Certificate chain (index 0 is peer cert)
    pub cert_chain: Vec<CertInfo>,
}

impl TlsInfo {
    /// Create session details from an SSL connection
    pub fn from_ssl(ssl: &SslRef, verified: bool) -> Self {
        TlsInfo {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl.servername(NameType::HOST_NAME).map(|s| s.to_string()),
            alpn: ssl
                .selected_alpn_protocol()
                .map(|p| String::from_utf8_lossy(p).to_string()),
            verified,
            cert_chain: peer_chain(ssl),
        }
    }

    /// Peer certificate, if the peer sent one
    pub fn peer_certificate(&self) -> Option<&CertInfo> {
        self.cert_chain.first()
    }
}

impl Default for TlsInfo {
    fn default() -> Self {
        TlsInfo {
            version: "<undef>".to_string(),
            cipher: "<undef>".to_string(),
            servername: None,
            alpn: None,
            verified: false,
            cert_chain: Vec::new(),
        }
    }
}
