//! Shared context-lifecycle scaffolding.
//!
//! Every subsystem (`CryptoContext`, `TlsSession`, `NetworkStackContext`,
//! `KeystoreContext`, `FilesystemContext`, ...) is constructed once from
//! configuration, used for the lifetime of the enclosing service, and
//! destroyed exactly once. [`ContextCore`] factors out that common shape —
//! the per-context `RoutingMode`, a name for diagnostics, and a
//! single-destruction guard — into one small base type rather than
//! repeating it per service.

use crate::error::{CoreError, ErrorCode, Result};
use crate::handle::RoutingMode;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Shared fields every subsystem context embeds. Subsystems compose this
/// rather than inherit from it (no inheritance in Rust) — see
/// `crypto::CryptoContext` for the pattern.
pub struct ContextCore {
    name: &'static str,
    routing_mode: RoutingMode,
    destroyed: AtomicBool,
}

impl ContextCore {
    pub fn new(name: &'static str, routing_mode: RoutingMode) -> Self {
        debug!(context = name, ?routing_mode, "context constructed");
        Self {
            name,
            routing_mode,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.routing_mode
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Mark this context destroyed. Fails `InvalidState` if already
    /// destroyed — contexts are destroyed exactly once.
    pub fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Err(CoreError::new(
                ErrorCode::InvalidState,
                format!("context '{}' was already destroyed", self.name),
            ));
        }
        debug!(context = self.name, "context destroyed");
        Ok(())
    }

    /// Fail fast with `InvalidState` if this context has already been torn
    /// down. Every per-subsystem operation should call this first.
    pub fn check_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(CoreError::new(
                ErrorCode::InvalidState,
                format!("context '{}' is destroyed", self.name),
            ));
        }
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroy_is_single_shot() {
        let ctx = ContextCore::new("test", RoutingMode::Library);
        ctx.destroy().unwrap();
        let err = ctx.destroy().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }

    #[test]
    fn check_live_fails_after_destroy() {
        let ctx = ContextCore::new("test", RoutingMode::Library);
        ctx.check_live().unwrap();
        ctx.destroy().unwrap();
        assert!(ctx.check_live().is_err());
    }
}
