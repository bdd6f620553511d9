//! Digest state machine: `Ready -> Processed* -> Done`,
//! re-arming back to `Ready` after `finalize` so one `Digest` can be reused
//! across many messages without reconstruction.

use crate::error::{CoreError, ErrorCode, Result};
use md5::Md5;
use sha2::{Digest as _, Sha256};

/// Supported digest algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub const fn output_len(self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 16,
            DigestAlgorithm::Sha256 => 32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Ready,
    Processed,
    Done,
}

#[derive(Clone)]
enum Inner {
    Md5(Md5),
    Sha256(Sha256),
}

/// A digest computation in progress. `process` may be called any number of
/// times in `Ready`/`Processed` state; `finalize` requires at least one
/// `process` call.
pub struct Digest {
    algorithm: DigestAlgorithm,
    inner: Inner,
    state: State,
}

impl Digest {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            inner: match algorithm {
                DigestAlgorithm::Md5 => Inner::Md5(Md5::new()),
                DigestAlgorithm::Sha256 => Inner::Sha256(Sha256::new()),
            },
            state: State::Ready,
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Feed more input. Valid from `Ready` or `Processed`; a call from
    /// `Done` is `InvalidState` (the caller must re-arm is implicit — `Done`
    /// only exists transiently, since `finalize` re-arms to `Ready`, so in
    /// practice this path is unreachable through the public API, but is
    /// kept for defense in depth).
    pub fn process(&mut self, data: &[u8]) -> Result<()> {
        if self.state == State::Done {
            return Err(CoreError::invalid_state("digest already finalized; call finalize again to re-arm"));
        }
        match &mut self.inner {
            Inner::Md5(h) => h.update(data),
            Inner::Sha256(h) => h.update(data),
        }
        self.state = State::Processed;
        Ok(())
    }

    /// Finalize and return the digest, re-arming this `Digest` for reuse
    /// with a freshly reset internal hasher. `Aborted` if `process` was
    /// never called.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        if self.state != State::Processed {
            return Err(CoreError::aborted("finalize called without a preceding process"));
        }
        let out = match std::mem::replace(
            &mut self.inner,
            match self.algorithm {
                DigestAlgorithm::Md5 => Inner::Md5(Md5::new()),
                DigestAlgorithm::Sha256 => Inner::Sha256(Sha256::new()),
            },
        ) {
            Inner::Md5(h) => h.finalize().to_vec(),
            Inner::Sha256(h) => h.finalize().to_vec(),
        };
        self.state = State::Ready;
        Ok(out)
    }

    /// Reset back to `Ready` with no output, discarding any processed
    /// input.
    pub fn reset(&mut self) {
        self.inner = match self.algorithm {
            DigestAlgorithm::Md5 => Inner::Md5(Md5::new()),
            DigestAlgorithm::Sha256 => Inner::Sha256(Sha256::new()),
        };
        self.state = State::Ready;
    }

    /// Copy the entire internal state into a freshly allocated `Digest`,
    /// so the clone can keep processing independently of `self` from the
    /// exact point this call was made.
    pub fn clone_digest(&self) -> Digest {
        Digest {
            algorithm: self.algorithm,
            inner: self.inner.clone(),
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input_matches_known_vector() {
        let mut d = Digest::new(DigestAlgorithm::Sha256);
        d.process(b"").unwrap();
        let out = d.finalize().unwrap();
        assert_eq!(
            hex::encode(out),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn finalize_without_process_is_aborted() {
        let mut d = Digest::new(DigestAlgorithm::Sha256);
        let err = d.finalize().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Aborted);
    }

    #[test]
    fn clone_digest_diverges_independently_after_cloning() {
        let mut d = Digest::new(DigestAlgorithm::Sha256);
        d.process(b"shared-prefix").unwrap();
        let mut cloned = d.clone_digest();

        d.process(b"-original").unwrap();
        cloned.process(b"-clone").unwrap();

        let mut reference_original = Digest::new(DigestAlgorithm::Sha256);
        reference_original.process(b"shared-prefix-original").unwrap();
        let mut reference_clone = Digest::new(DigestAlgorithm::Sha256);
        reference_clone.process(b"shared-prefix-clone").unwrap();

        assert_eq!(d.finalize().unwrap(), reference_original.finalize().unwrap());
        assert_eq!(cloned.finalize().unwrap(), reference_clone.finalize().unwrap());
    }

    #[test]
    fn digest_re_arms_after_finalize() {
        let mut d = Digest::new(DigestAlgorithm::Sha256);
        d.process(b"hello").unwrap();
        let first = d.finalize().unwrap();
        d.process(b"hello").unwrap();
        let second = d.finalize().unwrap();
        assert_eq!(first, second);
    }
}
