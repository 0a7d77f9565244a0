//! TLS context configuration
//!
//! This module turns `ConnectParams` into an OpenSSL client context: trust
//! anchors, device identity, ALPN and protocol floor.

use crate::transport::{ConnectParams, CredentialRef, Error, Result, TlsVersion};
use openssl::error::ErrorStack;
use openssl::pkey::PKey;
use openssl::ssl::{SslConnector, SslConnectorBuilder, SslMethod, SslVersion};
use openssl::x509::X509;

/// Configured client context
///
/// Holds the connector built from one set of parameters. Credentials are
/// loaded once, when the context is built.
pub struct TlsContext {
    pub(crate) connector: SslConnector,
    root_ca: Option<CredentialRef>,
    device_cert: Option<CredentialRef>,
    device_key: Option<CredentialRef>,
    alpn_protocols: Vec<String>,
    min_tls_version: Option<TlsVersion>,
}

impl TlsContext {
    /// Build a client context from the parameters
    pub fn build(params: &ConnectParams) -> Result<Self> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(config_err("cannot create TLS context"))?;

        let floor = params.min_tls_version().unwrap_or(TlsVersion::Tls12);
        builder
            .set_min_proto_version(Some(to_openssl_version(floor)))
            .map_err(config_err("cannot set minimum TLS version"))?;

        if let Some(ca) = params.root_ca() {
            load_root_ca(&mut builder, ca)?;
        }

        if let (Some(cert), Some(key)) = (params.device_cert(), params.device_key()) {
            load_identity(&mut builder, cert, key)?;
        }

        if !params.alpn_protocols().is_empty() {
            builder
                .set_alpn_protos(&encode_alpn(params.alpn_protocols()))
                .map_err(config_err("cannot set ALPN protocols"))?;
        }

        Ok(TlsContext {
            connector: builder.build(),
            root_ca: params.root_ca().cloned(),
            device_cert: params.device_cert().cloned(),
            device_key: params.device_key().cloned(),
            alpn_protocols: params.alpn_protocols().to_vec(),
            min_tls_version: params.min_tls_version(),
        })
    }

    /// Whether this context was built from the same TLS settings
    ///
    /// Destination and timeouts do not affect the context.
    pub fn matches(&self, params: &ConnectParams) -> bool {
        self.root_ca.as_ref() == params.root_ca()
            && self.device_cert.as_ref() == params.device_cert()
            && self.device_key.as_ref() == params.device_key()
            && self.alpn_protocols == params.alpn_protocols()
            && self.min_tls_version == params.min_tls_version()
    }
}

/// Get OpenSSL protocol version constant
pub fn to_openssl_version(version: TlsVersion) -> SslVersion {
    match version {
        TlsVersion::Tls12 => SslVersion::TLS1_2,
        TlsVersion::Tls13 => SslVersion::TLS1_3,
    }
}

/// Encode ALPN protocols (length-prefixed)
pub fn encode_alpn(protocols: &[String]) -> Vec<u8> {
    let mut alpn_bytes = Vec::new();
    for proto in protocols {
        alpn_bytes.push(proto.len() as u8);
        alpn_bytes.extend_from_slice(proto.as_bytes());
    }
    alpn_bytes
}

fn load_root_ca(builder: &mut SslConnectorBuilder, ca: &CredentialRef) -> Result<()> {
    let pem = ca.load()?;
    let certs = X509::stack_from_pem(&pem).map_err(config_err("cannot parse root CA"))?;
    if certs.is_empty() {
        return Err(Error::ConfigInvalid(format!("no certificate in root CA {:?}", ca)));
    }

    for cert in certs {
        builder
            .cert_store_mut()
            .add_cert(cert)
            .map_err(config_err("cannot add root CA"))?;
    }
    Ok(())
}

fn load_identity(
    builder: &mut SslConnectorBuilder,
    cert: &CredentialRef,
    key: &CredentialRef,
) -> Result<()> {
    let cert_pem = cert.load()?;
    let mut chain = X509::stack_from_pem(&cert_pem)
        .map_err(config_err("cannot parse device certificate"))?
        .into_iter();

    let leaf = chain.next().ok_or_else(|| {
        Error::ConfigInvalid(format!("no certificate in device certificate {:?}", cert))
    })?;
    builder
        .set_certificate(&leaf)
        .map_err(config_err("cannot use device certificate"))?;

    // Intermediates that follow the leaf are sent along with it
    for intermediate in chain {
        builder
            .add_extra_chain_cert(intermediate)
            .map_err(config_err("cannot add device certificate chain"))?;
    }

    let key_pem = key.load()?;
    let pkey = PKey::private_key_from_pem(&key_pem)
        .map_err(config_err("cannot parse device private key"))?;
    builder
        .set_private_key(&pkey)
        .map_err(config_err("cannot use device private key"))?;

    builder
        .check_private_key()
        .map_err(config_err("device certificate and private key do not match"))?;

    Ok(())
}

fn config_err(what: &'static str) -> impl Fn(ErrorStack) -> Error {
    move |e| Error::ConfigInvalid(format!("{}: {}", what, e))
}
