//! Network helpers shared by the backends
//!
//! Resolution, timed TCP connect, deadline-bounded socket I/O, readiness
//! polling and I/O error mapping.

use crate::transport::{Error, Result};
use log::debug;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

/// A fixed point in time that bounds a whole connect sequence
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Deadline {
            at: Instant::now() + timeout,
        }
    }

    /// Time left, zero once the deadline has passed
    pub fn left(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Time left, or `Timeout` once the deadline has passed
    pub fn remaining(&self, what: &str) -> Result<Duration> {
        let left = self.left();
        if left.is_zero() {
            return Err(Error::Timeout(format!("deadline exceeded during {}", what)));
        }
        Ok(left)
    }

    pub fn expired(&self) -> bool {
        self.left().is_zero()
    }
}

/// Resolve `host:port` to socket addresses before the deadline
///
/// IP literals are returned as is. Names go through the system resolver on a
/// helper thread; if the deadline passes first the lookup is abandoned (the
/// thread finishes in the background) and `Timeout` is returned.
pub fn resolve(host: &str, port: u16, deadline: &Deadline) -> Result<Vec<SocketAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let remaining = deadline.remaining("name resolution")?;
    let (tx, rx) = mpsc::channel();
    let name = host.to_string();
    thread::Builder::new()
        .name("resolve".to_string())
        .spawn(move || {
            let result = (name.as_str(), port)
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<_>>());
            let _ = tx.send(result);
        })
        .map_err(|e| Error::ConnectFailed(format!("cannot start resolver for {}: {}", host, e)))?;

    let addrs = match rx.recv_timeout(remaining) {
        Ok(result) => {
            result.map_err(|e| Error::ConnectFailed(format!("cannot resolve {}: {}", host, e)))?
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            return Err(Error::Timeout(format!("resolving {} timed out", host)));
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            return Err(Error::ConnectFailed(format!("resolver for {} exited", host)));
        }
    };

    if addrs.is_empty() {
        return Err(Error::ConnectFailed(format!("no address for {}", host)));
    }

    Ok(addrs)
}

/// Open a TCP connection to the first reachable address before the deadline
///
/// The remaining budget is split evenly across the addresses still to try,
/// so one black-holed address (say, IPv6 without a route) leaves time for
/// the next.
pub fn connect_tcp(host: &str, port: u16, deadline: &Deadline) -> Result<TcpStream> {
    let addrs = resolve(host, port, deadline)?;
    connect_addrs(host, &addrs, deadline)
}

/// Try `addrs` in order, each with an even share of the time left
pub fn connect_addrs(host: &str, addrs: &[SocketAddr], deadline: &Deadline) -> Result<TcpStream> {
    let count = addrs.len();
    let mut last_err = None;

    for (i, &addr) in addrs.iter().enumerate() {
        let remaining = deadline.remaining("TCP connect")?;
        let budget = (remaining / (count - i) as u32).max(Duration::from_millis(1));
        debug!("connecting to {} ({}) within {:?}", addr, host, budget);

        match connect_addr(addr, budget) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connect to {} failed: {}", addr, e);
                last_err = Some((addr, e));
            }
        }
    }

    match last_err {
        Some((addr, e)) if is_timeout(&e) => {
            Err(Error::Timeout(format!("connect to {} timed out", addr)))
        }
        Some((addr, e)) => Err(Error::ConnectFailed(format!("{}: {}", addr, e))),
        None => Err(Error::ConnectFailed(format!("no address for {}", host))),
    }
}

fn connect_addr(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;
    socket.connect_timeout(&SockAddr::from(addr), timeout)?;
    Ok(socket.into())
}

/// TCP stream whose reads and writes all share one deadline
///
/// Socket timeouts bound a single syscall only, so a peer trickling one byte
/// at a time could stretch a TLS record read forever. Before every syscall
/// the socket timeout is reset to the time left; once the deadline has
/// passed, I/O fails with `WouldBlock` without touching the socket, which
/// OpenSSL treats as retryable.
#[derive(Debug)]
pub struct DeadlineStream {
    inner: TcpStream,
    deadline: Option<Deadline>,
}

impl DeadlineStream {
    pub fn new(inner: TcpStream) -> Self {
        DeadlineStream {
            inner,
            deadline: None,
        }
    }

    /// Bound all I/O until the next call; `None` leaves the socket timeouts alone
    pub fn set_deadline(&mut self, deadline: Option<Deadline>) {
        self.deadline = deadline;
    }

    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut TcpStream {
        &mut self.inner
    }

    fn time_left(&self) -> io::Result<Option<Duration>> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let left = deadline.left();
                if left.is_zero() {
                    return Err(io::Error::new(io::ErrorKind::WouldBlock, "deadline exceeded"));
                }
                Ok(Some(left))
            }
        }
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(left) = self.time_left()? {
            self.inner.set_read_timeout(Some(left))?;
        }
        self.inner.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(left) = self.time_left()? {
            self.inner.set_write_timeout(Some(left))?;
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Set both socket timeouts
pub fn set_timeouts(stream: &TcpStream, timeout: Duration) -> Result<()> {
    stream.set_read_timeout(Some(timeout)).map_err(Error::Io)?;
    stream.set_write_timeout(Some(timeout)).map_err(Error::Io)?;
    Ok(())
}

/// Poll a socket for events
///
/// Returns true if the socket is ready for the requested operation.
pub fn poll_fd<S: AsRawFd>(sock: &S, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd: sock.as_raw_fd(),
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
            PollEvents::Both => POLLIN | POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    if result < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }

    Ok(result > 0)
}

/// Whether an I/O error means a socket timeout expired
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Map an I/O error from an established session
pub fn map_io_error(e: io::Error, what: &str) -> Error {
    if is_timeout(&e) {
        Error::Timeout(format!("{} timed out", what))
    } else {
        Error::Io(e)
    }
}
