//! Library implementation of the TRENTOS-M public API surface: a
//! capability/handle dispatch core plus the subsystems reached through
//! it — crypto, keystore, TLS, certificate parsing, sockets, filesystem,
//! logging, timers, and configuration.
//!
//! Every subsystem follows the same shape: a `Context` struct owning one or
//! more handle tables, constructed with an explicit [`handle::RoutingMode`]
//! and any backend dependencies it needs injected (entropy source, block
//! device, socket backend, stream factory, config source). Handles are
//! opaque newtypes; objects reached through them are freed explicitly, with
//! secret-bearing ones zeroized on drop.

pub mod cert;
pub mod config;
pub mod context;
pub mod crypto;
pub mod dataport;
pub mod entropy;
pub mod error;
pub mod fs;
pub mod handle;
pub mod keystore;
pub mod logger;
pub mod socket;
pub mod timer;
pub mod tls;

pub use error::{CoreError, ErrorCode, ErrorKind, Result};
pub use handle::{Attributes, Backend, Handle, HandleTable, Proxy, RoutingMode};
