//! Shared fixtures for the integration tests
//!
//! A throwaway PKI generated per test (root CA, server and device
//! certificates written to a temp directory) and loopback TLS servers.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{select_next_proto, AlpnError, SslAcceptor, SslMethod, SslStream, SslVerifyMode};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::io::{Read, Write};
use std::net::{IpAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn serial() -> openssl::asn1::Asn1Integer {
    let mut bn = BigNum::new().unwrap();
    bn.rand(127, MsbOption::MAYBE_ZERO, false).unwrap();
    bn.to_asn1_integer().unwrap()
}

/// A certificate with its private key
pub struct Identity {
    pub cert: X509,
    pub key: PKey<Private>,
}

impl Identity {
    pub fn cert_pem(&self) -> Vec<u8> {
        self.cert.to_pem().unwrap()
    }

    pub fn key_pem(&self) -> Vec<u8> {
        self.key.private_key_to_pem_pkcs8().unwrap()
    }
}

/// Throwaway certificate authority
pub struct Pki {
    pub dir: TempDir,
    pub ca: Identity,
}

impl Pki {
    pub fn new(ca_name: &str) -> Self {
        let key = new_key();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, ca_name).unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial()).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .unwrap();
        builder.append_extension(ski).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        Pki {
            dir: tempfile::tempdir().unwrap(),
            ca: Identity {
                cert: builder.build(),
                key,
            },
        }
    }

    /// Issue a leaf certificate naming `sans` (DNS names or IP addresses)
    pub fn issue(&self, cn: &str, sans: &[&str]) -> Identity {
        let key = new_key();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial()).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(self.ca.cert.subject_name()).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
        builder
            .append_extension(BasicConstraints::new().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .digital_signature()
                    .key_agreement()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder
            .append_extension(
                ExtendedKeyUsage::new()
                    .server_auth()
                    .client_auth()
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(Some(&*self.ca.cert), None))
            .unwrap();
        builder.append_extension(ski).unwrap();
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&builder.x509v3_context(Some(&*self.ca.cert), None))
            .unwrap();
        builder.append_extension(aki).unwrap();

        if !sans.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for entry in sans {
                if entry.parse::<IpAddr>().is_ok() {
                    san.ip(entry);
                } else {
                    san.dns(entry);
                }
            }
            let ext = san
                .build(&builder.x509v3_context(Some(&*self.ca.cert), None))
                .unwrap();
            builder.append_extension(ext).unwrap();
        }

        builder.sign(&self.ca.key, MessageDigest::sha256()).unwrap();

        Identity {
            cert: builder.build(),
            key,
        }
    }

    /// Write a PEM file into the PKI directory
    pub fn write(&self, file_name: &str, pem: &[u8]) -> PathBuf {
        let path = self.dir.path().join(file_name);
        std::fs::write(&path, pem).unwrap();
        path
    }

    pub fn ca_path(&self) -> PathBuf {
        self.write("root-ca.pem", &self.ca.cert_pem())
    }
}

/// Server-side TLS settings for a test peer
pub struct ServerOptions<'a> {
    pub identity: &'a Identity,
    /// Require a client certificate issued by this CA
    pub client_ca: Option<&'a X509>,
    /// ALPN protocol the server agrees to
    pub alpn: Option<&'static str>,
}

impl<'a> ServerOptions<'a> {
    pub fn new(identity: &'a Identity) -> Self {
        ServerOptions {
            identity,
            client_ca: None,
            alpn: None,
        }
    }

    pub fn acceptor(&self) -> SslAcceptor {
        let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
        builder.set_private_key(&self.identity.key).unwrap();
        builder.set_certificate(&self.identity.cert).unwrap();
        builder.check_private_key().unwrap();

        if let Some(ca) = self.client_ca {
            builder.cert_store_mut().add_cert(ca.clone()).unwrap();
            builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
        }

        if let Some(proto) = self.alpn {
            let mut wire = vec![proto.len() as u8];
            wire.extend_from_slice(proto.as_bytes());
            let wire: &'static [u8] = Box::leak(wire.into_boxed_slice());
            builder.set_alpn_select_callback(move |_ssl, client_protos| {
                select_next_proto(wire, client_protos).ok_or(AlpnError::NOACK)
            });
        }

        builder.build()
    }
}

/// What the echo server saw on one connection
#[derive(Debug)]
pub struct ServerReport {
    /// Bytes received before the client went away
    pub received: Vec<u8>,
    /// Peer certificate subject CN, if the client sent one
    pub client_cn: Option<String>,
    /// The client closed the connection (as opposed to a server read timeout)
    pub client_closed: bool,
}

fn client_cn(stream: &SslStream<TcpStream>) -> Option<String> {
    let cert = stream.ssl().peer_certificate()?;
    let entry = cert.subject_name().entries_by_nid(Nid::COMMONNAME).next()?;
    entry.data().as_utf8().ok().map(|s| s.to_string())
}

/// Spawn a TLS echo server accepting `connections` connections in turn
///
/// Each accepted connection echoes everything back until the client closes,
/// then a `ServerReport` is sent on the returned channel. Failed handshakes
/// are skipped without a report.
pub fn spawn_echo_server(
    acceptor: SslAcceptor,
    connections: usize,
) -> (u16, mpsc::Receiver<ServerReport>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        for _ in 0..connections {
            let (tcp_stream, _) = match listener.accept() {
                Ok(conn) => conn,
                Err(_) => return,
            };
            tcp_stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();

            let mut stream = match acceptor.accept(tcp_stream) {
                Ok(stream) => stream,
                Err(_) => continue,
            };

            let mut report = ServerReport {
                received: Vec::new(),
                client_cn: client_cn(&stream),
                client_closed: false,
            };

            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => {
                        report.client_closed = true;
                        break;
                    }
                    Ok(n) => {
                        report.received.extend_from_slice(&buf[..n]);
                        if stream.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        report.client_closed = !matches!(
                            e.kind(),
                            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                        );
                        break;
                    }
                }
            }

            let _ = tx.send(report);
        }
    });

    (port, rx, handle)
}

/// Spawn a TLS server that reads exactly `len` bytes, then sends them back
pub fn spawn_collecting_server(acceptor: SslAcceptor, len: usize) -> (u16, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (tcp_stream, _) = listener.accept().unwrap();
        let mut stream = acceptor.accept(tcp_stream).unwrap();

        let mut data = vec![0u8; len];
        stream.read_exact(&mut data).unwrap();
        stream.write_all(&data).unwrap();
        data
    });

    (port, handle)
}

/// Spawn a TLS server that completes the handshake and hangs up immediately
pub fn spawn_hangup_server(acceptor: SslAcceptor) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (tcp_stream, _) = listener.accept().unwrap();
        if let Ok(mut stream) = acceptor.accept(tcp_stream) {
            let _ = stream.shutdown();
        }
    });

    (port, handle)
}

/// Spawn a peer that keeps a TLS record open by trickling bytes
///
/// Sends the record header `header`, then one byte every `interval` until
/// `total` has passed or the client goes away. Without an acceptor the
/// header answers the ClientHello, so the client is stuck mid-handshake.
/// With one, the handshake completes first and the bytes are written under
/// the TLS layer, so the client is stuck mid-record in a read.
pub fn spawn_trickle_server(
    acceptor: Option<SslAcceptor>,
    header: &'static [u8],
    interval: Duration,
    total: Duration,
) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut tcp_stream, _) = listener.accept().unwrap();

        // Kept alive so the TLS session is not torn down under the trickle
        let _tls = match acceptor {
            Some(acceptor) => {
                let tls = match acceptor.accept(tcp_stream.try_clone().unwrap()) {
                    Ok(tls) => tls,
                    Err(_) => return,
                };
                Some(tls)
            }
            None => {
                let mut hello = [0u8; 4096];
                let _ = tcp_stream.read(&mut hello);
                None
            }
        };

        let started = std::time::Instant::now();
        if tcp_stream.write_all(header).is_err() {
            return;
        }
        while started.elapsed() < total {
            thread::sleep(interval);
            if tcp_stream.write_all(&[0u8]).is_err() {
                return;
            }
        }
    });

    (port, handle)
}

/// A port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
