//! Socket / Network Stack.
//!
//! `SocketTable` is a bounded, fixed-capacity table sized at construction,
//! grounded in the `kernel::ids` fixed-capacity handle pattern.
//! Actual I/O is delegated to a [`SocketBackend`] implementation (the
//! companion `trentos-transport-tcp` crate provides a `std::net`-backed
//! one) so this module stays transport-agnostic.

use crate::context::ContextCore;
use crate::error::{CoreError, ErrorCode, Result};
use crate::handle::RoutingMode;
use std::net::SocketAddr;

/// Event bitmask constants.
pub const EVENT_CONN_EST: u32 = 1 << 0;
pub const EVENT_CONN_ACPT: u32 = 1 << 1;
pub const EVENT_READ: u32 = 1 << 2;
pub const EVENT_WRITE: u32 = 1 << 3;
pub const EVENT_FIN: u32 = 1 << 4;
pub const EVENT_CLOSE: u32 = 1 << 5;
pub const EVENT_ERROR: u32 = 1 << 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketDomain {
    Inet,
    Inet6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketType {
    Stream,
    Datagram,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketState {
    Unbound,
    Bound,
    Listening,
    Connected,
    /// Local write direction shut down (`shutdown(Write)` was called); reads
    /// still work, writes fail `NetworkConnShutdown`.
    ShutdownLocal,
    /// Remote peer's write direction shut down (FIN observed on `read`);
    /// writes still work, reads return `Ok(0)` without touching the backend.
    ShutdownRemote,
    Closed,
}

/// Which half of a connection `shutdown` affects, mirroring BSD
/// `SHUT_RD`/`SHUT_WR`/`SHUT_RDWR`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownHow {
    Read,
    Write,
    Both,
}

/// Concrete I/O backend a [`NetworkStackContext`] delegates to. The
/// `trentos-transport-tcp` crate implements this over `std::net`; tests use
/// an in-memory stand-in.
pub trait SocketBackend: Send + Sync {
    fn connect(&self, peer: SocketAddr) -> Result<u64>;
    fn bind(&self, local: SocketAddr) -> Result<u64>;
    fn accept(&self, listener_token: u64) -> Result<(u64, SocketAddr)>;
    fn send(&self, token: u64, data: &[u8]) -> Result<usize>;
    fn recv(&self, token: u64, buf: &mut [u8]) -> Result<usize>;
    fn close(&self, token: u64) -> Result<()>;
}

/// One entry in the socket table: address pair, state, a
/// sticky level-triggered event bitmap (cleared only by
/// `get_pending_events`), and the last latched error.
pub struct SocketEntry {
    pub domain: SocketDomain,
    pub kind: SocketType,
    pub local: Option<SocketAddr>,
    pub peer: Option<SocketAddr>,
    pub state: SocketState,
    events: u32,
    last_error: Option<ErrorCode>,
    backend_token: Option<u64>,
    /// Children accepted off this (listening) socket since the last
    /// `get_pending_events` call.
    accepted_children: Vec<SocketHandle>,
}

impl SocketEntry {
    fn new(domain: SocketDomain, kind: SocketType) -> Self {
        Self {
            domain,
            kind,
            local: None,
            peer: None,
            state: SocketState::Unbound,
            events: 0,
            last_error: None,
            backend_token: None,
            accepted_children: Vec::new(),
        }
    }

    fn raise(&mut self, mask: u32) {
        self.events |= mask;
    }

    fn latch_error(&mut self, code: ErrorCode) {
        self.last_error = Some(code);
        self.raise(EVENT_ERROR);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketHandle(usize);

/// Bounded socket table, sized once at construction.
struct SocketTable {
    slots: Vec<Option<SocketEntry>>,
}

impl SocketTable {
    fn new(capacity: usize) -> Self {
        Self { slots: (0..capacity).map(|_| None).collect() }
    }

    fn insert(&mut self, entry: SocketEntry) -> Result<SocketHandle> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(entry);
                return Ok(SocketHandle(i));
            }
        }
        Err(CoreError::insufficient_space("socket table is full"))
    }

    fn get(&self, handle: SocketHandle) -> Result<&SocketEntry> {
        self.slots
            .get(handle.0)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| CoreError::invalid_handle("socket handle does not map to a live socket"))
    }

    fn get_mut(&mut self, handle: SocketHandle) -> Result<&mut SocketEntry> {
        self.slots
            .get_mut(handle.0)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| CoreError::invalid_handle("socket handle does not map to a live socket"))
    }

    fn remove(&mut self, handle: SocketHandle) -> Result<SocketEntry> {
        self.slots
            .get_mut(handle.0)
            .and_then(|s| s.take())
            .ok_or_else(|| CoreError::invalid_handle("socket handle does not map to a live socket"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackState {
    Uninitialized,
    Initialized,
    Running,
    FatalError,
}

/// Owns the socket table and the stack's own lifecycle state.
pub struct NetworkStackContext {
    core: ContextCore,
    stack_state: parking_lot::Mutex<StackState>,
    table: parking_lot::Mutex<SocketTable>,
    backend: Box<dyn SocketBackend>,
}

impl NetworkStackContext {
    pub fn new(routing_mode: RoutingMode, capacity: usize, backend: Box<dyn SocketBackend>) -> Self {
        Self {
            core: ContextCore::new("network-stack", routing_mode),
            stack_state: parking_lot::Mutex::new(StackState::Uninitialized),
            table: parking_lot::Mutex::new(SocketTable::new(capacity)),
            backend,
        }
    }

    /// Transition `Uninitialized -> Initialized`.
    pub fn init(&self) -> Result<()> {
        self.core.check_live()?;
        let mut state = self.stack_state.lock();
        if *state != StackState::Uninitialized {
            return Err(CoreError::invalid_state("network stack already initialized"));
        }
        *state = StackState::Initialized;
        Ok(())
    }

    /// Transition `Initialized -> Running` once the stack is servicing
    /// sockets.
    pub fn start(&self) -> Result<()> {
        self.core.check_live()?;
        let mut state = self.stack_state.lock();
        if *state != StackState::Initialized {
            return Err(CoreError::invalid_state("network stack must be initialized before starting"));
        }
        *state = StackState::Running;
        Ok(())
    }

    fn require_running(&self) -> Result<()> {
        self.core.check_live()?;
        if *self.stack_state.lock() != StackState::Running {
            return Err(CoreError::new(ErrorCode::NetworkNotInitialized, "network stack is not running"));
        }
        Ok(())
    }

    pub fn create(&self, domain: SocketDomain, kind: SocketType) -> Result<SocketHandle> {
        self.require_running()?;
        self.table.lock().insert(SocketEntry::new(domain, kind))
    }

    pub fn bind(&self, handle: SocketHandle, local: SocketAddr) -> Result<()> {
        self.require_running()?;
        let token = self.backend.bind(local)?;
        let mut table = self.table.lock();
        let entry = table.get_mut(handle)?;
        entry.local = Some(local);
        entry.state = SocketState::Bound;
        entry.backend_token = Some(token);
        Ok(())
    }

    pub fn listen(&self, handle: SocketHandle) -> Result<()> {
        self.require_running()?;
        let mut table = self.table.lock();
        let entry = table.get_mut(handle)?;
        if entry.state != SocketState::Bound {
            return Err(CoreError::invalid_state("listen requires a bound socket"));
        }
        entry.state = SocketState::Listening;
        Ok(())
    }

    pub fn connect(&self, handle: SocketHandle, peer: SocketAddr) -> Result<()> {
        self.require_running()?;
        let token = match self.backend.connect(peer) {
            Ok(t) => t,
            Err(e) => {
                let mut table = self.table.lock();
                if let Ok(entry) = table.get_mut(handle) {
                    entry.latch_error(e.code());
                }
                return Err(e);
            }
        };
        let mut table = self.table.lock();
        let entry = table.get_mut(handle)?;
        entry.peer = Some(peer);
        entry.state = SocketState::Connected;
        entry.backend_token = Some(token);
        entry.raise(EVENT_CONN_EST);
        Ok(())
    }

    pub fn accept(&self, handle: SocketHandle) -> Result<SocketHandle> {
        self.require_running()?;
        let (domain, kind, listener_token) = {
            let table = self.table.lock();
            let entry = table.get(handle)?;
            if entry.state != SocketState::Listening {
                return Err(CoreError::invalid_state("accept requires a listening socket"));
            }
            (entry.domain, entry.kind, entry.backend_token.ok_or_else(|| {
                CoreError::invalid_state("listening socket has no backend token")
            })?)
        };
        let (token, peer) = self.backend.accept(listener_token)?;
        let mut entry = SocketEntry::new(domain, kind);
        entry.peer = Some(peer);
        entry.state = SocketState::Connected;
        entry.backend_token = Some(token);
        entry.raise(EVENT_CONN_EST);
        let mut table = self.table.lock();
        let child = table.insert(entry)?;
        // The *parent* listening socket's next `get_pending_events` surfaces
        // `CONN_ACPT` together with the new child handle, not the child
        // surfacing its own acceptance.
        if let Ok(parent) = table.get_mut(handle) {
            parent.raise(EVENT_CONN_ACPT);
            parent.accepted_children.push(child);
        }
        Ok(child)
    }

    /// Read with the dataport-bounded transfer-length check: never reads
    /// more than `buf.len()` bytes in one call. Once the peer's write
    /// direction has shut down (`ShutdownRemote`), returns `Ok(0)` without
    /// touching the backend, matching the "peer closed cleanly" contract.
    pub fn read(&self, handle: SocketHandle, buf: &mut [u8]) -> Result<usize> {
        self.require_running()?;
        let (token, state) = self.connected_token(handle)?;
        if state == SocketState::ShutdownRemote {
            return Ok(0);
        }
        let n = self.backend.recv(token, buf)?;
        let mut table = self.table.lock();
        if let Ok(entry) = table.get_mut(handle) {
            if n == 0 {
                entry.raise(EVENT_FIN);
                entry.state = match entry.state {
                    SocketState::ShutdownLocal => SocketState::Closed,
                    _ => SocketState::ShutdownRemote,
                };
            } else {
                entry.raise(EVENT_READ);
            }
        }
        Ok(n)
    }

    /// Write with the dataport-bounded transfer-length check. Fails
    /// `NetworkConnShutdown` once the local write direction has shut down
    /// (`ShutdownLocal`).
    pub fn write(&self, handle: SocketHandle, data: &[u8]) -> Result<usize> {
        self.require_running()?;
        let (token, state) = self.connected_token(handle)?;
        if state == SocketState::ShutdownLocal {
            return Err(CoreError::new(ErrorCode::NetworkConnShutdown, "local write direction is shut down"));
        }
        let n = self.backend.send(token, data)?;
        let mut table = self.table.lock();
        if let Ok(entry) = table.get_mut(handle) {
            entry.raise(EVENT_WRITE);
        }
        Ok(n)
    }

    /// Half- or fully close a connected socket, the way BSD `shutdown(2)`
    /// does. From `Connected`, one direction shuts down (`ShutdownLocal` for
    /// `Write`, `ShutdownRemote` for `Read`, `ShutdownLocal` for `Both` since
    /// the remote direction still closes independently on FIN). Calling it
    /// again from either shutdown state completes the close.
    pub fn shutdown(&self, handle: SocketHandle, how: ShutdownHow) -> Result<()> {
        self.require_running()?;
        let mut table = self.table.lock();
        let entry = table.get_mut(handle)?;
        match entry.state {
            SocketState::Connected => {
                entry.state = match how {
                    ShutdownHow::Write | ShutdownHow::Both => SocketState::ShutdownLocal,
                    ShutdownHow::Read => SocketState::ShutdownRemote,
                };
                entry.raise(EVENT_CLOSE);
                Ok(())
            }
            SocketState::ShutdownLocal | SocketState::ShutdownRemote => {
                entry.state = SocketState::Closed;
                entry.raise(EVENT_CLOSE);
                Ok(())
            }
            _ => Err(CoreError::invalid_state("shutdown requires a connected or half-closed socket")),
        }
    }

    /// Fetch the backend token for a read/write-eligible socket: `Connected`
    /// or either half-shutdown state. `NetworkConnNone` otherwise.
    fn connected_token(&self, handle: SocketHandle) -> Result<(u64, SocketState)> {
        let table = self.table.lock();
        let entry = table.get(handle)?;
        match entry.state {
            SocketState::Connected | SocketState::ShutdownLocal | SocketState::ShutdownRemote => {
                let token = entry
                    .backend_token
                    .ok_or_else(|| CoreError::invalid_state("connected socket has no backend token"))?;
                Ok((token, entry.state))
            }
            _ => Err(CoreError::new(ErrorCode::NetworkConnNone, "socket is not connected")),
        }
    }

    pub fn close(&self, handle: SocketHandle) -> Result<()> {
        self.require_running()?;
        let entry = self.table.lock().remove(handle)?;
        if let Some(token) = entry.backend_token {
            self.backend.close(token)?;
        }
        Ok(())
    }

    /// Drain pending events across every socket in the table into a packed
    /// sequence of records, bounded by `capacity`. Mirrors the dataport
    /// transport's own overflow contract (§4.2/§6): if the buffer cannot
    /// hold even one record, the call fails `BufferTooSmall` rather than
    /// silently returning nothing; otherwise it returns as many records as
    /// fit, clearing only what it returns — anything left over stays
    /// pending (sticky) for the next call. An accepted connection is
    /// reported as its own record, carrying `parent_socket_handle` pointing
    /// back to the listening socket, rather than bundled into the parent's
    /// own event record.
    pub fn get_pending_events(&self, capacity: usize) -> Result<Vec<SocketEventRecord>> {
        self.core.check_live()?;
        let mut table = self.table.lock();

        enum Pending {
            Generic(SocketHandle),
            Accepted(SocketHandle, SocketHandle),
        }

        let mut pending = Vec::new();
        for (i, slot) in table.slots.iter().enumerate() {
            if let Some(entry) = slot {
                let handle = SocketHandle(i);
                if entry.events & !EVENT_CONN_ACPT != 0 {
                    pending.push(Pending::Generic(handle));
                }
                for &child in &entry.accepted_children {
                    pending.push(Pending::Accepted(handle, child));
                }
            }
        }

        if pending.is_empty() {
            return Ok(Vec::new());
        }
        if capacity == 0 {
            return Err(CoreError::new(
                ErrorCode::BufferTooSmall,
                format!("buffer holds 0 records but {} event record(s) are pending; need room for at least 1", pending.len()),
            ));
        }

        let mut records = Vec::with_capacity(pending.len().min(capacity));
        for item in pending.into_iter().take(capacity) {
            match item {
                Pending::Generic(handle) => {
                    let entry = table.get_mut(handle)?;
                    let mask = entry.events & !EVENT_CONN_ACPT;
                    let current_error = entry.last_error;
                    entry.events &= !mask;
                    records.push(SocketEventRecord {
                        socket_handle: handle,
                        parent_socket_handle: None,
                        event_mask: mask,
                        current_error,
                    });
                }
                Pending::Accepted(parent, child) => {
                    let entry = table.get_mut(parent)?;
                    entry.accepted_children.retain(|&c| c != child);
                    if entry.accepted_children.is_empty() {
                        entry.events &= !EVENT_CONN_ACPT;
                    }
                    records.push(SocketEventRecord {
                        socket_handle: child,
                        parent_socket_handle: Some(parent),
                        event_mask: EVENT_CONN_ACPT,
                        current_error: None,
                    });
                }
            }
        }
        Ok(records)
    }

    /// Non-clearing peek at the pending event bitmap, used by `poll`/`wait`
    /// across many sockets without consuming any socket's events.
    pub fn peek_pending_events(&self, handle: SocketHandle) -> Result<u32> {
        Ok(self.table.lock().get(handle)?.events)
    }

    /// Block until at least one socket in the table has a pending event.
    /// Modeled as a spin-check over the table rather than a real OS wait
    /// primitive — the actual blocking mechanism (CAmkES notification) is
    /// out of scope.
    pub fn wait(&self) -> Result<()> {
        self.require_running()?;
        loop {
            if self.table.lock().slots.iter().flatten().any(|e| e.events != 0) {
                return Ok(());
            }
            std::thread::yield_now();
        }
    }

    /// Non-blocking variant of [`Self::wait`]:
    /// `TryAgain` if no socket currently has a pending event.
    pub fn poll(&self) -> Result<()> {
        self.require_running()?;
        if self.table.lock().slots.iter().flatten().any(|e| e.events != 0) {
            Ok(())
        } else {
            Err(CoreError::new(ErrorCode::TryAgain, "no socket has a pending event"))
        }
    }
}

/// One packed record out of [`NetworkStackContext::get_pending_events`]:
/// `socket_handle` identifies the socket the event(s) occurred on;
/// `parent_socket_handle` is `Some` only for a newly accepted connection,
/// naming the listening socket it came from; `event_mask` is the union of
/// event bits this record reports; `current_error` is the latched error
/// code, meaningful only when `event_mask` includes `EVENT_ERROR`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketEventRecord {
    pub socket_handle: SocketHandle,
    pub parent_socket_handle: Option<SocketHandle>,
    pub event_mask: u32,
    pub current_error: Option<ErrorCode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct LoopbackBackend {
        next: AtomicU64,
        peers: Mutex<HashMap<u64, SocketAddr>>,
    }

    impl SocketBackend for LoopbackBackend {
        fn connect(&self, peer: SocketAddr) -> Result<u64> {
            let token = self.next.fetch_add(1, Ordering::Relaxed);
            self.peers.lock().unwrap().insert(token, peer);
            Ok(token)
        }
        fn bind(&self, _local: SocketAddr) -> Result<u64> {
            Ok(self.next.fetch_add(1, Ordering::Relaxed))
        }
        fn accept(&self, _listener_token: u64) -> Result<(u64, SocketAddr)> {
            let token = self.next.fetch_add(1, Ordering::Relaxed);
            Ok((token, "127.0.0.1:9".parse().unwrap()))
        }
        fn send(&self, _token: u64, data: &[u8]) -> Result<usize> {
            Ok(data.len())
        }
        fn recv(&self, _token: u64, buf: &mut [u8]) -> Result<usize> {
            Ok(buf.len().min(4))
        }
        fn close(&self, _token: u64) -> Result<()> {
            Ok(())
        }
    }

    /// A backend whose `recv` always reports EOF, standing in for a peer
    /// that already shut down its write direction.
    #[derive(Default)]
    struct EofBackend {
        next: AtomicU64,
    }

    impl SocketBackend for EofBackend {
        fn connect(&self, _peer: SocketAddr) -> Result<u64> {
            Ok(self.next.fetch_add(1, Ordering::Relaxed))
        }
        fn bind(&self, _local: SocketAddr) -> Result<u64> {
            Ok(self.next.fetch_add(1, Ordering::Relaxed))
        }
        fn accept(&self, _listener_token: u64) -> Result<(u64, SocketAddr)> {
            Ok((self.next.fetch_add(1, Ordering::Relaxed), "127.0.0.1:9".parse().unwrap()))
        }
        fn send(&self, _token: u64, data: &[u8]) -> Result<usize> {
            Ok(data.len())
        }
        fn recv(&self, _token: u64, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }
        fn close(&self, _token: u64) -> Result<()> {
            Ok(())
        }
    }

    fn running_stack() -> NetworkStackContext {
        let stack = NetworkStackContext::new(RoutingMode::Library, 4, Box::new(LoopbackBackend::default()));
        stack.init().unwrap();
        stack.start().unwrap();
        stack
    }

    #[test]
    fn operations_before_running_fail_not_initialized() {
        let stack = NetworkStackContext::new(RoutingMode::Library, 4, Box::new(LoopbackBackend::default()));
        let err = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkNotInitialized);
    }

    #[test]
    fn events_are_sticky_until_read() {
        let stack = running_stack();
        let handle = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
        stack.connect(handle, "127.0.0.1:9999".parse().unwrap()).unwrap();
        assert_eq!(stack.peek_pending_events(handle).unwrap(), EVENT_CONN_EST);
        assert_eq!(stack.peek_pending_events(handle).unwrap(), EVENT_CONN_EST);

        let records = stack.get_pending_events(8).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].socket_handle, handle);
        assert_eq!(records[0].parent_socket_handle, None);
        assert_eq!(records[0].event_mask, EVENT_CONN_EST);

        assert!(stack.get_pending_events(8).unwrap().is_empty());
    }

    #[test]
    fn accept_raises_conn_acpt_on_parent_with_child_handle() {
        let stack = running_stack();
        let listener = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
        stack.bind(listener, "127.0.0.1:0".parse().unwrap()).unwrap();
        stack.listen(listener).unwrap();
        let child = stack.accept(listener).unwrap();

        let records = stack.get_pending_events(8).unwrap();
        let accepted = records
            .iter()
            .find(|r| r.parent_socket_handle == Some(listener))
            .expect("an accepted-child record for the listener");
        assert_eq!(accepted.socket_handle, child);
        assert_eq!(accepted.event_mask, EVENT_CONN_ACPT);

        // sticky-until-read: a second call sees nothing new.
        assert!(stack.get_pending_events(8).unwrap().is_empty());
    }

    #[test]
    fn get_pending_events_fails_buffer_too_small_when_nothing_fits() {
        let stack = running_stack();
        let handle = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
        stack.connect(handle, "127.0.0.1:9999".parse().unwrap()).unwrap();
        let err = stack.get_pending_events(0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BufferTooSmall);
    }

    #[test]
    fn get_pending_events_fills_up_to_capacity_and_leaves_the_rest_pending() {
        let stack = running_stack();
        let a = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
        let b = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
        stack.connect(a, "127.0.0.1:1".parse().unwrap()).unwrap();
        stack.connect(b, "127.0.0.1:2".parse().unwrap()).unwrap();

        let first = stack.get_pending_events(1).unwrap();
        assert_eq!(first.len(), 1);
        let second = stack.get_pending_events(1).unwrap();
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].socket_handle, second[0].socket_handle);
        assert!(stack.get_pending_events(8).unwrap().is_empty());
    }

    #[test]
    fn shutdown_write_blocks_writes_but_not_reads() {
        let stack = running_stack();
        let handle = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
        stack.connect(handle, "127.0.0.1:9999".parse().unwrap()).unwrap();
        stack.shutdown(handle, ShutdownHow::Write).unwrap();

        let err = stack.write(handle, b"x").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkConnShutdown);

        let mut buf = [0u8; 4];
        stack.read(handle, &mut buf).unwrap();
    }

    #[test]
    fn shutdown_requires_a_connected_socket() {
        let stack = running_stack();
        let handle = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
        let err = stack.shutdown(handle, ShutdownHow::Both).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }

    #[test]
    fn peer_fin_moves_to_shutdown_remote_and_read_then_returns_zero_without_backend() {
        let stack = NetworkStackContext::new(RoutingMode::Library, 4, Box::new(EofBackend::default()));
        stack.init().unwrap();
        stack.start().unwrap();
        let handle = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
        stack.connect(handle, "127.0.0.1:9999".parse().unwrap()).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(stack.read(handle, &mut buf).unwrap(), 0);
        // still allowed to write after the peer's FIN.
        assert_eq!(stack.write(handle, b"ok").unwrap(), 2);
        // reading again short-circuits to Ok(0) without calling the backend again.
        assert_eq!(stack.read(handle, &mut buf).unwrap(), 0);
    }

    #[test]
    fn table_capacity_is_enforced() {
        let stack = NetworkStackContext::new(RoutingMode::Library, 1, Box::new(LoopbackBackend::default()));
        stack.init().unwrap();
        stack.start().unwrap();
        stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
        let err = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientSpace);
    }

    #[test]
    fn read_before_connect_fails() {
        let stack = running_stack();
        let handle = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
        let mut buf = [0u8; 4];
        let err = stack.read(handle, &mut buf).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkConnNone);
    }
}
