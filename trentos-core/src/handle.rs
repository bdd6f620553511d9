//! The capability/handle dispatch core — the uniform mechanism by which
//! every service in the suite hands out stateful object references that may
//! live locally or be serviced remotely over RPC.
//!
//! A typed local path and a type-erased remote path are bridged by one
//! adapter (`Proxy<T>`) so a handle table can hold either, with the "which
//! one" decision frozen at construction time.

use crate::error::{CoreError, ErrorCode, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Where a proxied object's implementation actually lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Serviced in-process by this library.
    Library,
    /// Serviced by a remote RPC server; this process holds only a proxy.
    RpcClient,
}

/// How a context picks the backend for newly created objects. `Switching`
/// is the Rust name for the legacy `SeosCryptoApi_Mode_ROUTER` /
/// `OS_Crypto_MODE_CLIENT` modes, treated here as one equivalent variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingMode {
    /// Every object is serviced locally.
    Library,
    /// Every object is forwarded to the remote server.
    RpcClient,
    /// Per-object: `Attributes::keep_local` decides.
    Switching,
}

impl RoutingMode {
    /// Resolve the backend for a new object given its attributes.
    pub fn resolve(self, attributes: &Attributes) -> Backend {
        match self {
            RoutingMode::Library => Backend::Library,
            RoutingMode::RpcClient => Backend::RpcClient,
            RoutingMode::Switching => {
                if attributes.keep_local {
                    Backend::Library
                } else {
                    Backend::RpcClient
                }
            }
        }
    }
}

/// Per-object attributes relevant to proxy routing. `keep_local` is the
/// `keepLocal`/`exportable` attribute: it governs both which backend a
/// `Switching`-mode context selects at creation time, and whether the
/// object may later be exported to a less-trusted caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct Attributes {
    pub keep_local: bool,
    pub flags: u32,
}

impl Attributes {
    pub fn new(keep_local: bool) -> Self {
        Self {
            keep_local,
            flags: 0,
        }
    }

    /// An object is reachable by the caller — and thus exportable — iff it
    /// is library-local, or it is remote but `keep_local` permits export.
    pub fn is_exportable(&self, backend: Backend) -> bool {
        match backend {
            Backend::Library => true,
            Backend::RpcClient => !self.keep_local,
        }
    }
}

/// Opaque remote reference: an id meaningful only to the RPC server that
/// owns the real object. Actual RPC/IPC mechanics (CAmkES, seL4) are out of
/// scope — this crate models only the routing and bookkeeping discipline
/// around them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RemoteRef(pub u64);

enum ProxyObject<T> {
    Local(Box<T>),
    Remote(RemoteRef),
}

/// A caller-side object representing a backend library object and its
/// routing. Once created, a proxy's [`Backend`] is immutable for its
/// lifetime — no method on `Proxy` can change it.
pub struct Proxy<T> {
    backend: Backend,
    attributes: Attributes,
    object: ProxyObject<T>,
}

impl<T> Proxy<T> {
    /// Create a proxy for a freshly constructed local object.
    pub fn new_local(value: T, attributes: Attributes) -> Self {
        Self {
            backend: Backend::Library,
            attributes,
            object: ProxyObject::Local(Box::new(value)),
        }
    }

    /// Create a proxy that forwards to a remote server.
    pub fn new_remote(remote: RemoteRef, attributes: Attributes) -> Self {
        Self {
            backend: Backend::RpcClient,
            attributes,
            object: ProxyObject::Remote(remote),
        }
    }

    /// Create a proxy whose backend is resolved from `mode` and
    /// `attributes`. Fails `NotSupported` if the resolved backend requires a
    /// local value we were not given, or a remote ref we were not given.
    pub fn create(
        mode: RoutingMode,
        attributes: Attributes,
        local: Option<T>,
        remote: Option<RemoteRef>,
    ) -> Result<Self> {
        match mode.resolve(&attributes) {
            Backend::Library => {
                let value = local.ok_or_else(|| {
                    CoreError::not_supported("routing mode selected Library backend but no local object was supplied")
                })?;
                Ok(Self::new_local(value, attributes))
            }
            Backend::RpcClient => {
                let remote = remote.ok_or_else(|| {
                    CoreError::not_supported("routing mode selected RpcClient backend but no remote reference was supplied")
                })?;
                Ok(Self::new_remote(remote, attributes))
            }
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    pub fn is_exportable(&self) -> bool {
        self.attributes.is_exportable(self.backend)
    }

    /// Read access to the local object. `InvalidHandle` if this proxy is
    /// remote — there is no local object to borrow.
    pub fn local(&self) -> Result<&T> {
        match &self.object {
            ProxyObject::Local(v) => Ok(v),
            ProxyObject::Remote(_) => Err(CoreError::new(
                ErrorCode::InvalidHandle,
                "proxy backend is RpcClient; no local object is available",
            )),
        }
    }

    pub fn local_mut(&mut self) -> Result<&mut T> {
        match &mut self.object {
            ProxyObject::Local(v) => Ok(v),
            ProxyObject::Remote(_) => Err(CoreError::new(
                ErrorCode::InvalidHandle,
                "proxy backend is RpcClient; no local object is available",
            )),
        }
    }

    pub fn remote(&self) -> Result<RemoteRef> {
        match &self.object {
            ProxyObject::Remote(r) => Ok(*r),
            ProxyObject::Local(_) => Err(CoreError::new(
                ErrorCode::InvalidHandle,
                "proxy backend is Library; there is no remote reference",
            )),
        }
    }

    /// Extract the backend pointer for expert use. Never invalidates the
    /// proxy.
    pub fn raw(&self) -> RawBackendRef<'_, T> {
        match &self.object {
            ProxyObject::Local(v) => RawBackendRef::Local(v),
            ProxyObject::Remote(r) => RawBackendRef::Remote(*r),
        }
    }

    /// Wrap an existing backend object into a new proxy sharing the same
    /// underlying object. The caller is responsible for ensuring exactly
    /// one of the resulting proxies eventually frees the object — using
    /// both independently is a double-free, treated as caller error rather
    /// than designed around with reference counting.
    pub fn migrate_local(value: T, attributes: Attributes) -> Self {
        Self::new_local(value, attributes)
    }

    pub fn migrate_remote(remote: RemoteRef, attributes: Attributes) -> Result<Self> {
        Ok(Self::new_remote(remote, attributes))
    }
}

/// Result of [`Proxy::raw`]: expert-level access to the backend reference
/// without invalidating the proxy.
pub enum RawBackendRef<'a, T> {
    Local(&'a T),
    Remote(RemoteRef),
}

/// Opaque handle identifying a proxy within a [`HandleTable`]. Carries no
/// information about the object kind; each subsystem keeps its own table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Per-context table mapping opaque [`Handle`]s to [`Proxy`] entries,
/// generalized to the caller's object kind `T`.
pub struct HandleTable<T> {
    next_id: AtomicU64,
    entries: HashMap<u64, Proxy<T>>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: HashMap::new(),
        }
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a proxy and return a fresh handle for it.
    pub fn insert(&mut self, proxy: Proxy<T>) -> Handle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(id, proxy);
        Handle(id)
    }

    pub fn get(&self, handle: Handle) -> Result<&Proxy<T>> {
        self.entries.get(&handle.0).ok_or_else(|| {
            CoreError::new(
                ErrorCode::InvalidHandle,
                format!("handle {} does not map to a live object", handle.0),
            )
        })
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut Proxy<T>> {
        self.entries.get_mut(&handle.0).ok_or_else(|| {
            CoreError::new(
                ErrorCode::InvalidHandle,
                format!("handle {} does not map to a live object", handle.0),
            )
        })
    }

    /// Tear down the backend object and release the proxy. Using `handle`
    /// again after this call is a fatal caller
    /// error — idempotent-by-handle semantics are explicitly not
    /// guaranteed.
    pub fn free(&mut self, handle: Handle) -> Result<Proxy<T>> {
        self.entries.remove(&handle.0).ok_or_else(|| {
            CoreError::new(
                ErrorCode::InvalidHandle,
                format!("handle {} does not map to a live object", handle.0),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_mode_routes_by_keep_local() {
        let kept = Attributes::new(true);
        let exported = Attributes::new(false);
        assert_eq!(RoutingMode::Switching.resolve(&kept), Backend::Library);
        assert_eq!(RoutingMode::Switching.resolve(&exported), Backend::RpcClient);
    }

    #[test]
    fn library_mode_always_local_regardless_of_attribute() {
        let attrs = Attributes::new(false);
        assert_eq!(RoutingMode::Library.resolve(&attrs), Backend::Library);
    }

    #[test]
    fn export_denied_for_remote_non_keep_local_false() {
        // keep_local=false on a remote object means "may be exported".
        let attrs = Attributes::new(false);
        assert!(attrs.is_exportable(Backend::RpcClient));
        let attrs = Attributes::new(true);
        assert!(!attrs.is_exportable(Backend::RpcClient));
        // library-local objects are always exportable regardless of the flag.
        assert!(Attributes::new(true).is_exportable(Backend::Library));
    }

    #[test]
    fn backend_tag_is_immutable_and_handle_table_round_trips() {
        let mut table: HandleTable<u32> = HandleTable::new();
        let proxy = Proxy::new_local(42u32, Attributes::new(true));
        assert_eq!(proxy.backend(), Backend::Library);
        let handle = table.insert(proxy);
        assert_eq!(*table.get(handle).unwrap().local().unwrap(), 42);
        let freed = table.free(handle).unwrap();
        assert_eq!(freed.backend(), Backend::Library);
        assert!(table.get(handle).is_err());
    }

    #[test]
    fn using_freed_handle_is_invalid_handle() {
        let mut table: HandleTable<u32> = HandleTable::new();
        let handle = table.insert(Proxy::new_local(1u32, Attributes::default()));
        table.free(handle).unwrap();
        let err = table.free(handle).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidHandle);
    }

    #[test]
    fn create_fails_not_supported_on_incoherent_mode_attribute_combination() {
        let err = Proxy::<u32>::create(RoutingMode::Library, Attributes::default(), None, None)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);
    }
}
