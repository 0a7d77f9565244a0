//! TLS session operations
//!
//! This module implements the `Session` trait over an OpenSSL stream, and
//! the `OpenSslBackend` that produces such sessions.

use super::config::TlsContext;
use super::handshake::client_handshake;
use super::info::TlsInfo;
use crate::net::{self, Deadline, DeadlineStream, PollEvents};
use crate::transport::{Backend, ConnectParams, Error, Result, Session};
use log::debug;
use openssl::ssl::SslStream;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// OpenSSL backend
///
/// Keeps the TLS context built from the parameters. A connect with different
/// TLS settings rebuilds it.
#[derive(Default)]
pub struct OpenSslBackend {
    context: Option<TlsContext>,
}

impl OpenSslBackend {
    pub fn new() -> Self {
        OpenSslBackend { context: None }
    }

    /// Whether a TLS context is currently allocated
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    fn context_for(&mut self, params: &ConnectParams) -> Result<&TlsContext> {
        let stale = match &self.context {
            Some(context) => !context.matches(params),
            None => true,
        };
        if stale {
            debug!("building TLS context for {}", params.host());
            self.context = Some(TlsContext::build(params)?);
        }
        self.context
            .as_ref()
            .ok_or_else(|| Error::ConfigInvalid("TLS context unavailable".to_string()))
    }
}

impl Backend for OpenSslBackend {
    type Session = TlsSession;

    fn init(&mut self, params: &ConnectParams) -> Result<()> {
        self.context_for(params)?;
        Ok(())
    }

    fn connect(&mut self, params: &ConnectParams) -> Result<TlsSession> {
        let deadline = Deadline::after(params.timeout());
        let verify = params.server_verification();
        let context = self.context_for(params)?;

        let tcp_stream = net::connect_tcp(params.host(), params.port(), &deadline)?;
        let stream = client_handshake(context, params.host(), verify, tcp_stream, &deadline)?;

        let info = TlsInfo::from_ssl(stream.ssl(), verify);
        debug!(
            "TLS session with {}: {} {}",
            params.host(),
            info.version,
            info.cipher
        );

        Ok(TlsSession {
            stream,
            info,
            io_timeout: params.io_timeout(),
            failed: false,
        })
    }

    fn release(&mut self) {
        self.context = None;
    }
}

/// TLS session
///
/// Wraps an OpenSSL stream and provides read/write/poll/shutdown operations.
/// Each operation as a whole, not each syscall under it, is bounded by the
/// I/O timeout.
pub struct TlsSession {
    stream: SslStream<DeadlineStream>,
    info: TlsInfo,
    io_timeout: Duration,
    failed: bool,
}

impl TlsSession {
    /// Get negotiated session details
    pub fn info(&self) -> &TlsInfo {
        &self.info
    }

    /// Check if TLS failed
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Get reference to underlying TCP stream
    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref().get_ref()
    }

    fn arm(&mut self) {
        self.stream
            .get_mut()
            .set_deadline(Some(Deadline::after(self.io_timeout)));
    }

    fn fail(&mut self, e: io::Error, what: &str) -> Error {
        let err = net::map_io_error(e, what);
        if err.is_fatal() {
            self.failed = true;
        }
        err
    }
}

impl Session for TlsSession {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.arm();
        loop {
            match self.stream.read(buf) {
                // close_notify or EOF from the peer
                Ok(0) => {
                    self.failed = true;
                    return Err(Error::ConnectionClosed);
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(e, "read")),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.arm();
        loop {
            match self.stream.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(e, "write")),
            }
        }
    }

    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        // Check if SSL has pending data
        if events != PollEvents::Write && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }

        net::poll_fd(self.get_ref(), events, timeout)
    }

    fn shutdown(&mut self) -> Result<()> {
        // Perform SSL shutdown if not failed
        if !self.failed {
            self.arm();
            if let Err(e) = self.stream.shutdown() {
                debug!("TLS close-notify failed: {}", e);
            }
        }

        // Shutdown the underlying TCP connection
        match self.stream.get_mut().get_mut().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
