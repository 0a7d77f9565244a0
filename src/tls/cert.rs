//! Certificate handling and parsing
//!
//! This module extracts the fields of peer certificates that are useful when
//! diagnosing verification failures.

use openssl::nid::Nid;
use openssl::ssl::SslRef;
use openssl::x509::{X509NameRef, X509Ref};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Certificate subject (Common Name)
    pub subject: String,
    /// Certificate issuer (Common Name)
    pub issuer: String,
    /// Subject Alternative Names (DNS names and IP addresses)
    pub subject_alt_names: Vec<String>,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: common_name(cert.subject_name()),
            issuer: common_name(cert.issuer_name()),
            subject_alt_names: subject_alt_names(cert),
        }
    }

    /// Whether the certificate names `host` in its SANs
    pub fn names(&self, host: &str) -> bool {
        let want_dns = format!("DNS:{}", host);
        let want_ip = format!("IP:{}", host);
        self.subject_alt_names
            .iter()
            .any(|san| san.eq_ignore_ascii_case(&want_dns) || *san == want_ip)
    }
}

fn common_name(name: &X509NameRef) -> String {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "<undef>".to_string())
}

fn subject_alt_names(cert: &X509Ref) -> Vec<String> {
    let mut names = Vec::new();

    if let Some(san_ext) = cert.subject_alt_names() {
        for name in san_ext {
            if let Some(dns) = name.dnsname() {
                names.push(format!("DNS:{}", dns));
            } else if let Some(ip) = name.ipaddress() {
                let addr = match ip.len() {
                    4 => <[u8; 4]>::try_from(ip).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
                    16 => <[u8; 16]>::try_from(ip).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
                    _ => None,
                };
                if let Some(addr) = addr {
                    names.push(format!("IP:{}", addr));
                }
            }
        }
    }

    names
}

/// Extract the peer's certificate chain (index 0 is the peer certificate)
pub fn peer_chain(ssl: &SslRef) -> Vec<CertInfo> {
    // On the client side the chain already starts with the peer certificate
    if let Some(chain) = ssl.peer_cert_chain() {
        return chain.iter().map(CertInfo::from_x509).collect();
    }

    ssl.peer_certificate()
        .map(|cert| vec![CertInfo::from_x509(&cert)])
        .unwrap_or_default()
}
