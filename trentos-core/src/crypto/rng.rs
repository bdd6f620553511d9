//! Deterministic random bit generator: a CTR_DRBG built over
//! AES-128, seeded and periodically reseeded from an injected
//! [`EntropySource`]. Follows the NIST SP 800-90A CTR_DRBG construction
//! without a derivation function (our seed material is always exactly
//! `seedlen` bytes, so the optional df is unnecessary complexity).

use crate::entropy::EntropySource;
use crate::error::{CoreError, ErrorCode, Result};
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use generic_array::GenericArray;

const KEY_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const SEED_LEN: usize = KEY_LEN + BLOCK_LEN;

/// Number of `get_bytes` calls permitted between automatic reseeds, mirroring
/// SP 800-90A's reseed-interval guidance. Chosen conservatively small since
/// this crate cannot assume a hardware reseed budget.
const RESEED_INTERVAL: u64 = 1 << 16;

/// Flags accepted by [`Rng::get_bytes`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RngFlags {
    /// Force a fresh reseed from the entropy source before generating,
    /// regardless of the reseed interval.
    pub prediction_resistance: bool,
}

/// CTR_DRBG-backed random bit generator.
pub struct Rng {
    key: [u8; KEY_LEN],
    v: [u8; BLOCK_LEN],
    entropy: Box<dyn EntropySource>,
    calls_since_reseed: u64,
}

impl Rng {
    /// Construct and instantiate (seed) the generator from `entropy`.
    pub fn new(mut entropy: Box<dyn EntropySource>) -> Result<Self> {
        let mut seed = [0u8; SEED_LEN];
        entropy
            .fill(&mut seed)
            .map_err(|e| CoreError::aborted("entropy source failed during RNG instantiation").with_cause(e))?;
        let mut rng = Self {
            key: [0u8; KEY_LEN],
            v: [0u8; BLOCK_LEN],
            entropy,
            calls_since_reseed: 0,
        };
        rng.update(&seed);
        Ok(rng)
    }

    fn encrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        let cipher = Aes128::new(GenericArray::from_slice(&self.key));
        let mut ga = GenericArray::clone_from_slice(block);
        cipher.encrypt_block(&mut ga);
        block.copy_from_slice(&ga);
    }

    fn increment_v(&mut self) {
        for byte in self.v.iter_mut().rev() {
            let (next, overflow) = byte.overflowing_add(1);
            *byte = next;
            if !overflow {
                break;
            }
        }
    }

    /// CTR_DRBG `Update`: rekey from `provided_data` (exactly `SEED_LEN` bytes).
    fn update(&mut self, provided_data: &[u8; SEED_LEN]) {
        let mut temp = [0u8; SEED_LEN];
        let mut offset = 0;
        while offset < SEED_LEN {
            self.increment_v();
            let mut block = self.v;
            self.encrypt_block(&mut block);
            let n = (SEED_LEN - offset).min(BLOCK_LEN);
            temp[offset..offset + n].copy_from_slice(&block[..n]);
            offset += n;
        }
        for i in 0..SEED_LEN {
            temp[i] ^= provided_data[i];
        }
        self.key.copy_from_slice(&temp[..KEY_LEN]);
        self.v.copy_from_slice(&temp[KEY_LEN..]);
    }

    fn reseed(&mut self) -> Result<()> {
        let mut seed = [0u8; SEED_LEN];
        self.entropy
            .fill(&mut seed)
            .map_err(|e| CoreError::aborted("entropy source failed during RNG reseed").with_cause(e))?;
        self.update(&seed);
        self.calls_since_reseed = 0;
        Ok(())
    }

    /// Inject additional deterministic material directly into the DRBG
    /// state without drawing from the entropy source.
    pub fn reseed_with(&mut self, seed: &[u8]) -> Result<()> {
        if seed.len() != SEED_LEN {
            return Err(CoreError::invalid_parameter(format!(
                "reseed material must be exactly {SEED_LEN} bytes, got {}",
                seed.len()
            )));
        }
        let mut buf = [0u8; SEED_LEN];
        buf.copy_from_slice(seed);
        self.update(&buf);
        self.calls_since_reseed = 0;
        Ok(())
    }

    /// Fill `buf` with random bytes. Fails
    /// `Aborted` if a required reseed cannot draw fresh entropy, and
    /// `InsufficientSpace` if `buf` exceeds `dataport_size` (the caller's
    /// transport bound — checked here rather than trusted, since this is a
    /// public entry point, not an internal helper).
    pub fn get_bytes(&mut self, flags: RngFlags, buf: &mut [u8], dataport_size: usize) -> Result<()> {
        if buf.len() > dataport_size {
            return Err(CoreError::insufficient_space(format!(
                "requested {} bytes exceeds dataport size {dataport_size}",
                buf.len()
            )));
        }
        if flags.prediction_resistance || self.calls_since_reseed >= RESEED_INTERVAL {
            self.reseed()?;
        }
        let mut offset = 0;
        while offset < buf.len() {
            self.increment_v();
            let mut block = self.v;
            self.encrypt_block(&mut block);
            let n = (buf.len() - offset).min(BLOCK_LEN);
            buf[offset..offset + n].copy_from_slice(&block[..n]);
            offset += n;
        }
        // Rekey after generate, per SP 800-90A, using an all-zero
        // provided_data (no additional input supplied by this API).
        self.update(&[0u8; SEED_LEN]);
        self.calls_since_reseed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::FixedEntropySource;

    #[test]
    fn deterministic_seed_yields_deterministic_output() {
        let mut a = Rng::new(Box::new(FixedEntropySource::new((0u8..32).collect::<Vec<_>>()))).unwrap();
        let mut b = Rng::new(Box::new(FixedEntropySource::new((0u8..32).collect::<Vec<_>>()))).unwrap();
        let mut out_a = [0u8; 48];
        let mut out_b = [0u8; 48];
        a.get_bytes(RngFlags::default(), &mut out_a, 4096).unwrap();
        b.get_bytes(RngFlags::default(), &mut out_b, 4096).unwrap();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn successive_calls_do_not_repeat() {
        let mut rng = Rng::new(Box::new(FixedEntropySource::new((1u8..33).collect::<Vec<_>>()))).unwrap();
        let mut first = [0u8; 16];
        let mut second = [0u8; 16];
        rng.get_bytes(RngFlags::default(), &mut first, 4096).unwrap();
        rng.get_bytes(RngFlags::default(), &mut second, 4096).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn request_larger_than_dataport_is_insufficient_space() {
        let mut rng = Rng::new(Box::new(FixedEntropySource::zeroed())).unwrap();
        let mut buf = [0u8; 32];
        let err = rng.get_bytes(RngFlags::default(), &mut buf, 16).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientSpace);
    }
}
