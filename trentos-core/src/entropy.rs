//! Entropy source abstraction feeding the RNG's CTR_DRBG.
//!
//! Entropy injection is modeled as an explicit callback rather than a
//! hidden global, so tests can supply deterministic bytes and production
//! code can wire in whatever hardware source the platform provides.

use crate::error::{CoreError, Result};

/// Supplies entropy to seed or reseed a DRBG. Implementations must not
/// block indefinitely; a source that is temporarily unavailable should
/// return `Err` with [`crate::error::ErrorCode::TryAgain`].
pub trait EntropySource: Send + Sync {
    /// Fill `buf` completely with fresh entropy, or fail without partially
    /// filling it.
    fn fill(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// Production entropy source backed by the OS CSPRNG via the `rand` crate.
pub struct StdEntropySource {
    rng: rand::rngs::OsRng,
}

impl StdEntropySource {
    pub fn new() -> Self {
        Self { rng: rand::rngs::OsRng }
    }
}

impl Default for StdEntropySource {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropySource for StdEntropySource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        use rand_core::RngCore;
        self.rng
            .try_fill_bytes(buf)
            .map_err(|e| CoreError::new(crate::error::ErrorCode::Io, "OS entropy source failed").with_cause(e))
    }
}

/// Deterministic entropy source for tests: replays a fixed byte sequence,
/// cycling if exhausted. Never fails.
pub struct FixedEntropySource {
    bytes: Vec<u8>,
    cursor: usize,
}

impl FixedEntropySource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        assert!(!bytes.is_empty(), "FixedEntropySource needs at least one byte to cycle");
        Self { bytes, cursor: 0 }
    }

    /// A source that always yields zero bytes — useful when a test wants
    /// reproducibility but doesn't care about the actual key material.
    pub fn zeroed() -> Self {
        Self::new(vec![0u8])
    }
}

impl EntropySource for FixedEntropySource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        for slot in buf.iter_mut() {
            *slot = self.bytes[self.cursor];
            self.cursor = (self.cursor + 1) % self.bytes.len();
        }
        Ok(())
    }
}
