//! Backend operations traits
//!
//! A backend is the platform-specific half of the transport: it knows how to
//! open a connection and how to move bytes over it. The handle drives it and
//! enforces the lifecycle, so backends do not track connection state.

use super::{ConnectParams, Result};
use crate::net::PollEvents;
use std::time::Duration;

/// Backend operations
///
/// Owns whatever context the platform needs across connections (for TLS,
/// the configured context holding CA, certificate and key).
pub trait Backend {
    /// Live connection produced by `connect`
    type Session: Session;

    /// One-time setup with the parameters given at initialization
    ///
    /// May allocate backend context, must not open a socket.
    fn init(&mut self, params: &ConnectParams) -> Result<()>;

    /// Open a connection and complete any handshake before `params.timeout()`
    ///
    /// On error nothing opened by this call may survive.
    fn connect(&mut self, params: &ConnectParams) -> Result<Self::Session>;

    /// Release backend context
    ///
    /// Called once, after the last session has been torn down.
    fn release(&mut self) {}
}

/// Session operations
///
/// Dropping a session is the forced teardown and must close the underlying
/// socket.
pub trait Session {
    /// Read decrypted bytes; short reads are fine
    ///
    /// Returns `ConnectionClosed` when the peer ended the stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes, returning how many were accepted
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Poll the session for events
    ///
    /// Returns true if the session is ready for the requested operation
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Graceful teardown (close-notify, then transport shutdown)
    fn shutdown(&mut self) -> Result<()>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    type Session = B::Session;

    fn init(&mut self, params: &ConnectParams) -> Result<()> {
        (**self).init(params)
    }

    fn connect(&mut self, params: &ConnectParams) -> Result<Self::Session> {
        (**self).connect(params)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        (**self).poll(events, timeout)
    }

    fn shutdown(&mut self) -> Result<()> {
        (**self).shutdown()
    }
}
