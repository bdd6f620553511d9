//! `std::net`-backed [`SocketBackend`] for the socket/network stack
//! module, kept in a standalone crate so the core stays transport-agnostic
//! and swapping in another backend never touches it.
//!
//! Blocking `std::net::{TcpListener, TcpStream}` rather than an async
//! runtime: this suite's dataport discipline is a strictly serialized,
//! synchronous request/response model with no pipelining to make async
//! worthwhile.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use trentos_core::error::{CoreError, ErrorCode, Result};
use trentos_core::socket::SocketBackend;
use tracing::debug;

enum Entry {
    Listener(TcpListener),
    Stream(Mutex<TcpStream>),
}

/// Maps `std::io::Error` onto the network error range, folding OS error
/// kinds onto stable codes.
fn map_io_error(err: io::Error) -> CoreError {
    let code = match err.kind() {
        io::ErrorKind::ConnectionRefused => ErrorCode::NetworkConnRefused,
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => ErrorCode::NetworkConnShutdown,
        io::ErrorKind::AddrInUse => ErrorCode::NetworkAddrInUse,
        io::ErrorKind::AddrNotAvailable | io::ErrorKind::InvalidInput => ErrorCode::NetworkInvalidAddress,
        io::ErrorKind::TimedOut => ErrorCode::Timeout,
        io::ErrorKind::WouldBlock => ErrorCode::WouldBlock,
        io::ErrorKind::NotConnected => ErrorCode::NetworkConnNone,
        _ => ErrorCode::NetworkUnreachable,
    };
    CoreError::new(code, err.to_string())
}

fn lookup_error(token: u64) -> CoreError {
    CoreError::new(ErrorCode::InvalidHandle, format!("no socket registered for backend token {token}"))
}

/// A concrete, process-wide table of live TCP listeners/streams keyed by
/// opaque token, the thing `trentos-core`'s `SocketEntry` actually talks
/// to once its `backend_token` is set.
#[derive(Default)]
pub struct TcpBackend {
    next: AtomicU64,
    entries: Mutex<HashMap<u64, Entry>>,
}

impl TcpBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_token(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl SocketBackend for TcpBackend {
    fn connect(&self, peer: SocketAddr) -> Result<u64> {
        let stream = TcpStream::connect(peer).map_err(map_io_error)?;
        let token = self.next_token();
        debug!(%peer, token, "tcp connect");
        self.entries.lock().unwrap().insert(token, Entry::Stream(Mutex::new(stream)));
        Ok(token)
    }

    fn bind(&self, local: SocketAddr) -> Result<u64> {
        let listener = TcpListener::bind(local).map_err(map_io_error)?;
        let token = self.next_token();
        debug!(%local, token, "tcp listener bound");
        self.entries.lock().unwrap().insert(token, Entry::Listener(listener));
        Ok(token)
    }

    fn accept(&self, listener_token: u64) -> Result<(u64, SocketAddr)> {
        let (stream, peer) = {
            let entries = self.entries.lock().unwrap();
            let Entry::Listener(listener) = entries.get(&listener_token).ok_or_else(|| lookup_error(listener_token))?
            else {
                return Err(CoreError::invalid_state("backend token does not refer to a listening socket"));
            };
            listener.accept().map_err(map_io_error)?
        };
        let token = self.next_token();
        debug!(listener_token, token, %peer, "tcp connection accepted");
        self.entries.lock().unwrap().insert(token, Entry::Stream(Mutex::new(stream)));
        Ok((token, peer))
    }

    fn send(&self, token: u64, data: &[u8]) -> Result<usize> {
        use std::io::Write;
        let entries = self.entries.lock().unwrap();
        let Entry::Stream(stream) = entries.get(&token).ok_or_else(|| lookup_error(token))? else {
            return Err(CoreError::invalid_state("backend token does not refer to a connected stream"));
        };
        stream.lock().unwrap().write(data).map_err(map_io_error)
    }

    fn recv(&self, token: u64, buf: &mut [u8]) -> Result<usize> {
        use std::io::Read;
        let entries = self.entries.lock().unwrap();
        let Entry::Stream(stream) = entries.get(&token).ok_or_else(|| lookup_error(token))? else {
            return Err(CoreError::invalid_state("backend token does not refer to a connected stream"));
        };
        stream.lock().unwrap().read(buf).map_err(map_io_error)
    }

    fn close(&self, token: u64) -> Result<()> {
        self.entries.lock().unwrap().remove(&token);
        Ok(())
    }
}
