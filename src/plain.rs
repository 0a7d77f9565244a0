//! Plain socket backend
//!
//! Unencrypted TCP transport. Credentials and the verification flag are
//! ignored; everything else (deadline, timeouts, error kinds) behaves like the
//! TLS backend, which makes it useful for brokers on private networks and for
//! tests.

use crate::net::{self, Deadline, PollEvents};
use crate::transport::{Backend, ConnectParams, Error, Result, Session};
use log::debug;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// Plain TCP backend
#[derive(Debug, Default)]
pub struct PlainSocketBackend;

impl PlainSocketBackend {
    pub fn new() -> Self {
        PlainSocketBackend
    }
}

impl Backend for PlainSocketBackend {
    type Session = PlainSession;

    fn init(&mut self, params: &ConnectParams) -> Result<()> {
        if params.root_ca().is_some() || params.device_cert().is_some() {
            debug!("plain socket backend ignores TLS credentials");
        }
        Ok(())
    }

    fn connect(&mut self, params: &ConnectParams) -> Result<PlainSession> {
        let deadline = Deadline::after(params.timeout());
        let stream = net::connect_tcp(params.host(), params.port(), &deadline)?;
        net::set_timeouts(&stream, params.io_timeout())?;
        Ok(PlainSession { stream })
    }
}

/// Plain TCP session
pub struct PlainSession {
    stream: TcpStream,
}

impl PlainSession {
    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl Session for PlainSession {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.stream.read(buf) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(net::map_io_error(e, "read")),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            match self.stream.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(net::map_io_error(e, "write")),
            }
        }
    }

    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        net::poll_fd(&self.stream, events, timeout)
    }

    fn shutdown(&mut self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already gone
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
