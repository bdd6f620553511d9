//! Shared-memory framing discipline for everything that crosses an
//! isolation boundary.
//!
//! A dataport is a bounded window of bytes. Bulk inputs are written into it
//! before an RPC call; bulk outputs are read back out after. Exactly one
//! logical message occupies a dataport at a time — the transport is
//! strictly request-then-response, never pipelined.

use crate::error::{CoreError, ErrorCode, Result};
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default dataport size used throughout the suite unless a context
/// overrides it.
pub const DEFAULT_DATAPORT_SIZE: usize = 4096;

/// A typed shared-memory window. Implementations may back this with a real
/// `seL4`/CAmkES mapping (out of scope here) or, as below, a
/// plain owned buffer for in-process and test use.
pub trait Dataport: Send + Sync {
    /// Read-only view of the window's current contents.
    fn as_slice(&self) -> &[u8];
    /// Mutable view of the window's current contents.
    fn as_mut_slice(&mut self) -> &mut [u8];
    /// Current usable size. Queried at call time rather than baked in as a
    /// compile-time constant, since some backends report a dynamic size.
    fn size(&self) -> usize;
    /// Whether the window is currently backed by valid memory.
    fn is_valid(&self) -> bool;

    /// Pointer accessor, kept for parity with the C ABI this crate
    /// specifies. Safe callers should prefer [`Dataport::as_slice`].
    fn as_ptr(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.as_mut_slice().as_mut_ptr()
    }
}

/// An owned, heap-backed dataport standing in for the real shared-memory
/// window (the actual seL4/CAmkES mapping mechanics are out of scope).
/// Used by every in-process backend and by tests. Backed by `BytesMut`
/// rather than a plain `Vec<u8>`, the same buffer type pooled allocators
/// hand out for shared, reusable byte storage.
pub struct SharedMemoryDataport {
    buf: BytesMut,
    valid: bool,
    in_flight: AtomicBool,
}

impl SharedMemoryDataport {
    pub fn new(size: usize) -> Self {
        let mut buf = BytesMut::with_capacity(size);
        buf.resize(size, 0);
        Self {
            buf,
            valid: true,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_default_size() -> Self {
        Self::new(DEFAULT_DATAPORT_SIZE)
    }

    /// Mark the dataport invalid, e.g. after the peer has torn down the
    /// mapping. Subsequent calls observe `is_valid() == false`.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Acquire exclusive use of this dataport for one request/response
    /// cycle. Panics in debug builds if a lease is already outstanding —
    /// overlapping use of one dataport is undefined caller
    /// behavior, so this is a best-effort misuse detector, not a load-bearing
    /// safety mechanism.
    pub fn lease(&self) -> DataportLease<'_> {
        let already_leased = self.in_flight.swap(true, Ordering::AcqRel);
        debug_assert!(
            !already_leased,
            "dataport must not carry more than one in-flight message"
        );
        DataportLease { port: self }
    }
}

impl Dataport for SharedMemoryDataport {
    fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn size(&self) -> usize {
        self.buf.len()
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// RAII guard marking one dataport as busy for the duration of a single
/// request/response cycle. Dropping it releases the dataport for reuse.
pub struct DataportLease<'a> {
    port: &'a SharedMemoryDataport,
}

impl Drop for DataportLease<'_> {
    fn drop(&mut self) {
        self.port.in_flight.store(false, Ordering::Release);
    }
}

/// A bidirectional length parameter: carries the caller's buffer capacity
/// in, and the actual produced length out on success — or, on
/// `BufferTooSmall`, the minimum size that would have been required.
/// The output length is only meaningful when the call returned
/// `Ok` or a `BufferTooSmall` error.
#[derive(Clone, Copy, Debug, Default)]
pub struct OutLen {
    capacity: usize,
    produced: usize,
}

impl OutLen {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            produced: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn produced(&self) -> usize {
        self.produced
    }

    /// Record a successful write of `len` bytes, which must fit in the
    /// capacity supplied at construction time.
    pub fn set_produced(&mut self, len: usize) {
        debug_assert!(len <= self.capacity);
        self.produced = len;
    }
}

/// Pre-flight capacity check that must run *before* any marshalling: any
/// single bulk input or output whose declared size
/// exceeds the dataport's current size fails the whole call with
/// `InsufficientSpace`, with no observable side effect.
pub fn check_capacity(dataport_size: usize, declared_len: usize) -> Result<()> {
    if declared_len > dataport_size {
        return Err(CoreError::insufficient_space(format!(
            "declared size {declared_len} exceeds dataport size {dataport_size}"
        )));
    }
    Ok(())
}

/// Write a bulk input into the dataport ahead of an RPC call.
pub fn write_bulk_input(port: &mut dyn Dataport, data: &[u8]) -> Result<()> {
    check_capacity(port.size(), data.len())?;
    let slice = port.as_mut_slice();
    slice[..data.len()].copy_from_slice(data);
    Ok(())
}

/// Read a bulk output back out of the dataport after a successful call, or
/// after a `BufferTooSmall` response (in which case `out_len.produced()`
/// carries the minimum required size rather than valid output bytes).
pub fn read_bulk_output(port: &dyn Dataport, out_len: &OutLen) -> Result<Vec<u8>> {
    let produced = out_len.produced();
    if produced > port.size() {
        return Err(CoreError::new(
            ErrorCode::Generic,
            "server reported a produced length larger than the dataport",
        ));
    }
    Ok(port.as_slice()[..produced].to_vec())
}
