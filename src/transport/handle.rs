//! Transport handle
//!
//! The handle owns one backend, one copy of the connection parameters and at
//! most one live session, and enforces the lifecycle:
//!
//! ```text
//! Uninitialized --initialize--> Unconnected --connect--> Connected
//!                                    ^                      |
//!                                    |          disconnect / fatal I/O error
//!                                 (connect)                 v
//!                                    +---------------------Closed
//!
//! any state --destroy--> Destroyed (terminal)
//! ```

use super::{Backend, ConnectParams, Error, ErrorKind, Result, Session};
use crate::net::PollEvents;
use log::{debug, info, warn};
use std::mem;
use std::time::Duration;

/// Observable lifecycle state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Unconnected,
    Connected,
    Closed,
    Destroyed,
}

enum State<S> {
    Uninitialized,
    Unconnected,
    Connected(S),
    Closed,
    Destroyed,
}

/// `write_all` failure, with the progress made before it
#[derive(Debug, thiserror::Error)]
#[error("{error} (after {written} bytes)")]
pub struct PartialWrite {
    /// Bytes the transport accepted before the failure; the caller resumes
    /// with `buf[written..]` after a reconnect
    pub written: usize,
    #[source]
    pub error: Error,
}

impl PartialWrite {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl From<PartialWrite> for Error {
    fn from(partial: PartialWrite) -> Self {
        partial.error
    }
}

/// Transport handle
///
/// A single-owner connection object. Calls block the caller's thread up to
/// the configured timeouts; the handle does no locking, so callers serialize
/// use of one handle.
pub struct TransportHandle<B: Backend> {
    backend: Option<B>,
    params: Option<ConnectParams>,
    state: State<B::Session>,
}

impl<B: Backend> TransportHandle<B> {
    /// Create a handle bound to a backend
    ///
    /// No I/O happens until `connect`.
    pub fn new(backend: B) -> Self {
        TransportHandle {
            backend: Some(backend),
            params: None,
            state: State::Uninitialized,
        }
    }

    /// Store the parameters and let the backend set up its context
    ///
    /// A handle is initialized once; later calls return `AlreadyInitialized`
    /// and leave the stored parameters untouched.
    pub fn initialize(&mut self, params: ConnectParams) -> Result<()> {
        match self.state {
            State::Destroyed => return Err(Error::Destroyed),
            State::Uninitialized => {}
            _ => return Err(Error::AlreadyInitialized),
        }

        params.validate()?;
        self.backend_mut()?.init(&params)?;

        debug!(
            "transport initialized for {}:{} (timeout {} ms, verify {})",
            params.host(),
            params.port(),
            params.timeout_ms(),
            params.server_verification()
        );

        self.params = Some(params);
        self.state = State::Unconnected;
        Ok(())
    }

    /// Connect with the stored parameters
    pub fn connect(&mut self) -> Result<()> {
        let params = match (&self.state, &self.params) {
            (State::Destroyed, _) => return Err(Error::Destroyed),
            (_, None) => return Err(Error::NotInitialized),
            (_, Some(params)) => params.clone(),
        };
        self.connect_with(params)
    }

    /// Connect with the given parameters
    ///
    /// The parameters are authoritative for this call and, on success,
    /// replace the stored copy so a later `connect` reuses them.
    pub fn connect_with(&mut self, params: ConnectParams) -> Result<()> {
        match self.state {
            State::Destroyed => return Err(Error::Destroyed),
            State::Uninitialized => return Err(Error::NotInitialized),
            State::Connected(_) => return Err(Error::AlreadyConnected),
            State::Unconnected | State::Closed => {}
        }

        params.validate()?;

        debug!("connecting to {}:{}", params.host(), params.port());
        let session = match self.backend_mut()?.connect(&params) {
            Ok(session) => session,
            Err(e) => {
                warn!("connect to {}:{} failed: {}", params.host(), params.port(), e);
                return Err(e);
            }
        };

        info!("connected to {}:{}", params.host(), params.port());
        self.params = Some(params);
        self.state = State::Connected(session);
        Ok(())
    }

    /// Read from the connection
    ///
    /// Returns the number of bytes read, which may be less than `buf.len()`.
    /// A fatal error closes the connection.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let session = self.session_mut()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let result = session.read(buf);
        self.check_io(result, "read")
    }

    /// Write to the connection
    ///
    /// Returns the number of bytes accepted; the caller resumes with the
    /// remainder. A fatal error closes the connection.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let session = self.session_mut()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let result = session.write(buf);
        self.check_io(result, "write")
    }

    /// Write the whole buffer, resuming after partial writes
    ///
    /// On error, `PartialWrite::written` tells how many bytes were accepted
    /// before it. A write that makes no progress is `ConnectionClosed`.
    pub fn write_all(&mut self, buf: &[u8]) -> std::result::Result<(), PartialWrite> {
        let mut written = 0;

        while written < buf.len() {
            let result = match self.write(&buf[written..]) {
                Ok(0) => self.check_io(Err(Error::ConnectionClosed), "write"),
                other => other,
            };
            match result {
                Ok(n) => written += n,
                Err(error) => return Err(PartialWrite { written, error }),
            }
        }

        Ok(())
    }

    /// Poll the connection for events
    ///
    /// Returns true if the session is ready for the requested operation
    pub fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        match &self.state {
            State::Connected(session) => session.poll(events, timeout),
            State::Destroyed => Err(Error::Destroyed),
            _ => Err(Error::NotConnected),
        }
    }

    /// Close the connection, keeping the parameters for a later `connect`
    ///
    /// Disconnecting a handle that is not connected is a no-op.
    pub fn disconnect(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, State::Closed) {
            State::Connected(mut session) => {
                // Dropping the session closes the socket even if close-notify failed
                if let Err(e) = session.shutdown() {
                    debug!("graceful shutdown failed: {}", e);
                }
                drop(session);
                info!("disconnected");
                Ok(())
            }
            State::Destroyed => {
                self.state = State::Destroyed;
                Err(Error::Destroyed)
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }

    /// Release everything the handle owns
    ///
    /// Disconnects first if needed. The handle is unusable afterwards: every
    /// operation, including another `destroy`, returns `Destroyed`.
    pub fn destroy(&mut self) -> Result<()> {
        if let State::Destroyed = self.state {
            return Err(Error::Destroyed);
        }

        self.disconnect()?;

        if let Some(mut backend) = self.backend.take() {
            backend.release();
        }
        self.params = None;
        self.state = State::Destroyed;
        debug!("transport destroyed");
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        match self.state {
            State::Uninitialized => ConnectionState::Uninitialized,
            State::Unconnected => ConnectionState::Unconnected,
            State::Connected(_) => ConnectionState::Connected,
            State::Closed => ConnectionState::Closed,
            State::Destroyed => ConnectionState::Destroyed,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_))
    }

    /// Stored connection parameters
    pub fn params(&self) -> Option<&ConnectParams> {
        self.params.as_ref()
    }

    /// Live session, for backend-specific details
    pub fn session(&self) -> Option<&B::Session> {
        match &self.state {
            State::Connected(session) => Some(session),
            _ => None,
        }
    }

    /// Get a reference to the backend (`None` after destroy)
    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    fn backend_mut(&mut self) -> Result<&mut B> {
        self.backend.as_mut().ok_or(Error::Destroyed)
    }

    fn session_mut(&mut self) -> Result<&mut B::Session> {
        match &mut self.state {
            State::Connected(session) => Ok(session),
            State::Destroyed => Err(Error::Destroyed),
            _ => Err(Error::NotConnected),
        }
    }

    fn check_io<T>(&mut self, result: Result<T>, what: &str) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                warn!("{} failed, closing connection: {}", what, e);
                // Forced teardown: the session is dropped without close-notify
                self.state = State::Closed;
            }
        }
        result
    }
}

impl<B: Backend> Drop for TransportHandle<B> {
    fn drop(&mut self) {
        if !matches!(self.state, State::Destroyed) {
            let _ = self.destroy();
        }
    }
}
