//! TLS handshake logic
//!
//! Runs the client handshake over an open TCP stream within the connect
//! deadline and maps its outcome onto transport error kinds.

use super::config::TlsContext;
use crate::net::{self, Deadline, DeadlineStream};
use crate::transport::{Error, Result};
use log::{debug, warn};
use openssl::ssl::{HandshakeError, SslStream, SslVerifyMode};
use openssl::x509::X509VerifyResult;
use std::net::TcpStream;

/// Perform the client handshake
///
/// With `verify` set, the peer chain is checked against the context's trust
/// anchors and the certificate must name `host` (DNS name or IP address).
/// Without it, no certificate checks happen at all.
///
/// Every socket read and write of the handshake is bounded by `deadline`, so
/// a peer that keeps sending a byte now and then still cannot hold the
/// handshake past it. The returned stream carries no deadline.
pub fn client_handshake(
    context: &TlsContext,
    host: &str,
    verify: bool,
    stream: TcpStream,
    deadline: &Deadline,
) -> Result<SslStream<DeadlineStream>> {
    let mut config = context
        .connector
        .configure()
        .map_err(|e| Error::HandshakeFailed(format!("TLS setup failed: {}", e)))?;

    config.set_verify_hostname(verify);
    if !verify {
        warn!("server verification disabled for {}", host);
        config.set_verify(SslVerifyMode::NONE);
    }

    deadline.remaining("TLS handshake")?;
    let mut stream = DeadlineStream::new(stream);
    stream.set_deadline(Some(*deadline));

    let mut result = config.connect(host, stream);
    loop {
        match result {
            Ok(mut stream) => {
                stream.get_mut().set_deadline(None);
                debug!("TLS handshake with {} complete", host);
                return Ok(stream);
            }
            Err(HandshakeError::WouldBlock(mid)) => {
                // Only a spurious wakeup gets here with time left
                deadline.remaining("TLS handshake")?;
                result = mid.handshake();
            }
            Err(e) => return Err(map_handshake_error(e, host, deadline)),
        }
    }
}

fn map_handshake_error(
    e: HandshakeError<DeadlineStream>,
    host: &str,
    deadline: &Deadline,
) -> Error {
    match e {
        HandshakeError::SetupFailure(stack) => {
            Error::HandshakeFailed(format!("TLS setup failed: {}", stack))
        }
        HandshakeError::WouldBlock(_) => {
            Error::Timeout(format!("TLS handshake with {} timed out", host))
        }
        HandshakeError::Failure(mid) => {
            let timed_out = mid
                .error()
                .io_error()
                .map(net::is_timeout)
                .unwrap_or(false);
            if timed_out || deadline.expired() {
                return Error::Timeout(format!("TLS handshake with {} timed out", host));
            }

            let verify_result = mid.ssl().verify_result();
            if verify_result != X509VerifyResult::OK {
                return Error::HandshakeFailed(format!(
                    "certificate verification failed for {}: {}",
                    host,
                    verify_result.error_string()
                ));
            }

            Error::HandshakeFailed(format!("TLS handshake with {} failed: {}", host, mid.error()))
        }
    }
}
