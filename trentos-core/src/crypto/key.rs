//! Key material and key-management operations.
//!
//! Field order within each variant is significant and documented as part of
//! the wire layout: length field(s) always precede the bytes they
//! describe, matching the C struct layout the dataport marshalling is
//! derived from.

use crate::error::{CoreError, ErrorCode, Result};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum serialized size of any key byte array this crate handles. Chosen
/// to comfortably fit a 4096-bit RSA modulus.
pub const MAX_KEY_BYTES: usize = 512;

/// A raw byte buffer with an explicit occupied length, matching the
/// "fixed-capacity array + length field" layout for every key variant.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyBytes {
    len: usize,
    bytes: Box<[u8; MAX_KEY_BYTES]>,
}

impl KeyBytes {
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_KEY_BYTES {
            return Err(CoreError::insufficient_space(format!(
                "key material of {} bytes exceeds the {MAX_KEY_BYTES} byte capacity",
                data.len()
            )));
        }
        let mut bytes = Box::new([0u8; MAX_KEY_BYTES]);
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self { len: data.len(), bytes })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Key variant discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    Aes,
    RsaPub,
    RsaPrv,
    DhPub,
    DhPrv,
    Secp256r1Pub,
    Secp256r1Prv,
    Mac,
}

/// RSA key parameters, big-endian serialized.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RsaParams {
    pub modulus: KeyBytes,
    pub exponent: KeyBytes,
}

/// DH domain parameters shared by public and private DH keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DhParams {
    pub prime: KeyBytes,
    pub generator: KeyBytes,
}

/// Tagged key material. Each variant carries exactly the fields the
/// wire layout names for that key type; no variant carries fields another
/// key type would need.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub enum Key {
    Aes(KeyBytes),
    RsaPub(RsaParams),
    RsaPrv { params: RsaParams, private_exponent: KeyBytes },
    DhPub { params: DhParams, public_value: KeyBytes },
    DhPrv { params: DhParams, private_value: KeyBytes },
    Secp256r1Pub { x: KeyBytes, y: KeyBytes },
    Secp256r1Prv(KeyBytes),
    Mac(KeyBytes),
}

impl Key {
    pub fn key_type(&self) -> KeyType {
        match self {
            Key::Aes(_) => KeyType::Aes,
            Key::RsaPub(_) => KeyType::RsaPub,
            Key::RsaPrv { .. } => KeyType::RsaPrv,
            Key::DhPub { .. } => KeyType::DhPub,
            Key::DhPrv { .. } => KeyType::DhPrv,
            Key::Secp256r1Pub { .. } => KeyType::Secp256r1Pub,
            Key::Secp256r1Prv(_) => KeyType::Secp256r1Prv,
            Key::Mac(_) => KeyType::Mac,
        }
    }

    /// `true` for the symmetric/private variants treated as as secret
    /// material never returned by `export` on a non-exportable key.
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            Key::Aes(_) | Key::RsaPrv { .. } | Key::DhPrv { .. } | Key::Secp256r1Prv(_) | Key::Mac(_)
        )
    }
}

/// Requested key size, either a bit length (symmetric/RSA/DH generation) or
/// explicit domain parameters (DH with caller-supplied group).
pub enum KeySpec {
    Bits(u32),
    Params(DhParams),
}

/// Valid AES key bit lengths.
const VALID_AES_BITS: &[u32] = &[128, 192, 256];
/// Valid RSA modulus bit lengths.
const VALID_RSA_BITS: &[u32] = &[1024, 2048, 3072, 4096];
/// Valid DH modulus bit lengths.
const VALID_DH_BITS: &[u32] = &[1024, 2048, 3072, 4096];

fn check_bits(bits: u32, valid: &[u32], what: &str) -> Result<()> {
    if valid.contains(&bits) {
        Ok(())
    } else {
        Err(CoreError::new(
            ErrorCode::InvalidParameter,
            format!("{bits} is not a valid {what} bit length"),
        ))
    }
}

/// Generate fresh key material of `key_type` per `spec`. DH/RSA generation defers the actual prime search to
/// [`super::agreement`]/the `rsa` crate; this entry point validates the
/// requested size and dispatches.
pub fn generate(key_type: KeyType, spec: &KeySpec, rng: &mut super::rng::Rng) -> Result<Key> {
    match (key_type, spec) {
        (KeyType::Aes, KeySpec::Bits(bits)) => {
            check_bits(*bits, VALID_AES_BITS, "AES key")?;
            let mut bytes = vec![0u8; (*bits / 8) as usize];
            rng.get_bytes(super::rng::RngFlags::default(), &mut bytes, bytes.len())?;
            Ok(Key::Aes(KeyBytes::from_slice(&bytes)?))
        }
        (KeyType::Mac, KeySpec::Bits(bits)) => {
            let mut bytes = vec![0u8; (*bits / 8) as usize];
            rng.get_bytes(super::rng::RngFlags::default(), &mut bytes, bytes.len())?;
            Ok(Key::Mac(KeyBytes::from_slice(&bytes)?))
        }
        (KeyType::RsaPrv, KeySpec::Bits(bits)) => {
            check_bits(*bits, VALID_RSA_BITS, "RSA modulus")?;
            super::signature::generate_rsa_keypair(*bits)
        }
        (KeyType::DhPrv, KeySpec::Bits(bits)) => {
            check_bits(*bits, VALID_DH_BITS, "DH modulus")?;
            super::agreement::generate_dh_keypair_default_group(*bits)
        }
        (KeyType::DhPrv, KeySpec::Params(params)) => {
            super::agreement::generate_dh_keypair(params.clone())
        }
        (KeyType::Secp256r1Prv, _) => super::agreement::generate_secp256r1_keypair(),
        _ => Err(CoreError::not_supported(format!(
            "generate is not supported for key type {:?} with the supplied spec",
            key_type
        ))),
    }
}

/// Import externally supplied key material without validating its
/// cryptographic soundness beyond basic length checks. `wrap_key_handle` is
/// a reserved extension point for importing under wrap: always
/// `NotSupported` when `Some`.
pub fn import(key_type: KeyType, raw: &[u8], wrap_key_handle: Option<u64>) -> Result<Key> {
    if wrap_key_handle.is_some() {
        return Err(CoreError::not_supported("wrapped key import is not supported"));
    }
    match key_type {
        KeyType::Aes => Ok(Key::Aes(KeyBytes::from_slice(raw)?)),
        KeyType::Mac => Ok(Key::Mac(KeyBytes::from_slice(raw)?)),
        KeyType::Secp256r1Prv => Ok(Key::Secp256r1Prv(KeyBytes::from_slice(raw)?)),
        _ => Err(CoreError::not_supported(format!(
            "import of composite key type {:?} requires the typed constructor, not raw bytes",
            key_type
        ))),
    }
}

/// Derive the public counterpart of a private key. `InvalidParameter` if `key` is already a public key.
pub fn make_public(key: &Key) -> Result<Key> {
    match key {
        Key::RsaPrv { params, .. } => Ok(Key::RsaPub(params.clone())),
        Key::DhPrv { params, private_value } => {
            super::agreement::dh_public_from_private(params, private_value)
        }
        Key::Secp256r1Prv(scalar) => super::agreement::secp256r1_public_from_private(scalar),
        _ => Err(CoreError::invalid_parameter(
            "make_public requires a private key",
        )),
    }
}

/// Export key bytes for transport/storage. Gated by
/// `exportable`: callers must check `Attributes::is_exportable` before
/// calling this, but this function re-checks so it is safe to call
/// directly in tests.
pub fn export(key: &Key, exportable: bool, wrap_key_handle: Option<u64>) -> Result<Vec<u8>> {
    if wrap_key_handle.is_some() {
        return Err(CoreError::not_supported("wrapped key export is not supported"));
    }
    if key.is_secret() && !exportable {
        return Err(CoreError::new(
            ErrorCode::OperationDenied,
            "key is not marked exportable",
        ));
    }
    Ok(match key {
        Key::Aes(b) | Key::Mac(b) | Key::Secp256r1Prv(b) => b.as_slice().to_vec(),
        Key::RsaPub(p) => p.modulus.as_slice().to_vec(),
        Key::RsaPrv { private_exponent, .. } => private_exponent.as_slice().to_vec(),
        Key::DhPub { public_value, .. } | Key::DhPrv { private_value: public_value, .. } => {
            public_value.as_slice().to_vec()
        }
        Key::Secp256r1Pub { x, .. } => x.as_slice().to_vec(),
    })
}

/// Read non-secret domain parameters off a key.
/// Always permitted, regardless of `exportable`.
pub fn get_params(key: &Key) -> Result<KeyParams> {
    match key {
        Key::RsaPub(p) | Key::RsaPrv { params: p, .. } => Ok(KeyParams::Rsa(p.clone())),
        Key::DhPub { params, .. } | Key::DhPrv { params, .. } => Ok(KeyParams::Dh(params.clone())),
        _ => Err(CoreError::not_supported(
            "this key type carries no separable domain parameters",
        )),
    }
}

#[derive(Clone)]
pub enum KeyParams {
    Rsa(RsaParams),
    Dh(DhParams),
}
