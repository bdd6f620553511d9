//! MAC state machine: `New -> Started -> Processed* -> Done`.
//! Unlike [`super::digest::Digest`], a MAC must be explicitly (re)started
//! with a key before it can process input — `process` from `New` or after
//! `finalize` is `Aborted`, mirroring HMAC's key-dependent initialization.

use super::key::Key;
use crate::error::{CoreError, ErrorCode, Result};
use hmac::{Hmac, Mac as HmacTrait};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacAlgorithm {
    HmacSha256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    New,
    Started,
    Processed,
    Done,
}

enum Inner {
    Empty,
    HmacSha256(HmacSha256),
}

pub struct Mac {
    algorithm: MacAlgorithm,
    inner: Inner,
    state: State,
}

impl Mac {
    pub fn new(algorithm: MacAlgorithm) -> Self {
        Self {
            algorithm,
            inner: Inner::Empty,
            state: State::New,
        }
    }

    /// Arm the MAC with key material. Valid from
    /// `New` or `Done` (re-arm); `InvalidState` from `Started`/`Processed`
    /// — a MAC in progress must be finalized or abandoned, not restarted
    /// mid-flight.
    pub fn start(&mut self, key: &Key) -> Result<()> {
        if matches!(self.state, State::Started | State::Processed) {
            return Err(CoreError::invalid_state("MAC already started; finalize before restarting"));
        }
        let Key::Mac(bytes) = key else {
            return Err(CoreError::invalid_parameter("MAC start requires a Mac key"));
        };
        let mac = match self.algorithm {
            MacAlgorithm::HmacSha256 => HmacSha256::new_from_slice(bytes.as_slice())
                .map_err(|e| CoreError::invalid_parameter("HMAC key length rejected by implementation").with_cause(e))?,
        };
        self.inner = Inner::HmacSha256(mac);
        self.state = State::Started;
        Ok(())
    }

    /// Feed input. Valid from `Started`/`Processed`; `Aborted` from
    /// `New`/`Done`.
    pub fn process(&mut self, data: &[u8]) -> Result<()> {
        match (&mut self.inner, self.state) {
            (Inner::HmacSha256(m), State::Started | State::Processed) => {
                m.update(data);
                self.state = State::Processed;
                Ok(())
            }
            _ => Err(CoreError::aborted("MAC must be started before processing input")),
        }
    }

    /// Finalize and return the tag. `Aborted` if no input was processed.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        if self.state != State::Processed {
            return Err(CoreError::aborted("finalize called without a preceding process"));
        }
        let inner = std::mem::replace(&mut self.inner, Inner::Empty);
        let tag = match inner {
            Inner::HmacSha256(m) => m.finalize().into_bytes().to_vec(),
            Inner::Empty => unreachable!("state invariant guarantees inner is populated when Processed"),
        };
        self.state = State::Done;
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::KeyBytes;

    fn mac_key() -> Key {
        Key::Mac(KeyBytes::from_slice(&[0x0bu8; 20]).unwrap())
    }

    #[test]
    fn process_before_start_is_aborted() {
        let mut mac = Mac::new(MacAlgorithm::HmacSha256);
        let err = mac.process(b"data").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Aborted);
    }

    #[test]
    fn finalize_without_process_is_aborted() {
        let mut mac = Mac::new(MacAlgorithm::HmacSha256);
        mac.start(&mac_key()).unwrap();
        let err = mac.finalize().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Aborted);
    }

    #[test]
    fn restart_after_finalize_is_allowed_and_deterministic() {
        let mut mac = Mac::new(MacAlgorithm::HmacSha256);
        mac.start(&mac_key()).unwrap();
        mac.process(b"hi there").unwrap();
        let first = mac.finalize().unwrap();
        mac.start(&mac_key()).unwrap();
        mac.process(b"hi there").unwrap();
        let second = mac.finalize().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn restart_while_in_progress_is_rejected() {
        let mut mac = Mac::new(MacAlgorithm::HmacSha256);
        mac.start(&mac_key()).unwrap();
        mac.process(b"partial").unwrap();
        let err = mac.start(&mac_key()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }
}
