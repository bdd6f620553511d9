//! Key agreement: finite-field Diffie-Hellman over
//! caller-supplied or generated domain parameters, and ECDH over SECP256R1.
//! Serialization follows the big-endian rule exactly: DH shared
//! secrets are left-padded to the prime's byte length, ECDH coordinates are
//! left-trimmed (no leading zero padding). Neither path applies a KDF —
//! that is left to the caller.

use super::key::{DhParams, Key, KeyBytes};
use crate::error::{CoreError, ErrorCode, Result};
use num_bigint::BigUint;
use num_traits::Zero;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey as P256PublicKey, SecretKey as P256SecretKey};
use rand::rngs::OsRng;

/// Well-known safe-prime DH groups, by modulus bit length. Using RFC 3526-style fixed groups rather than
/// generating fresh primes at every call keeps `generate` fast and
/// deterministic enough for the test suite; callers needing a custom group
/// go through `KeySpec::Params`.
fn default_group(bits: u32) -> Result<DhParams> {
    // 1024-bit MODP group (RFC 2409, second Oakley group) kept as the only
    // built-in for brevity; other bit lengths require explicit parameters.
    const MODP_1024_HEX: &str = "\
        FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E0\
        88A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A43\
        1B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C4\
        2E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B\
        1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF6955817183995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF";
    if bits != 1024 {
        return Err(CoreError::not_supported(format!(
            "no built-in DH group for a {bits}-bit modulus; supply explicit parameters"
        )));
    }
    let prime = BigUint::parse_bytes(MODP_1024_HEX.as_bytes(), 16)
        .expect("static MODP group constant is well-formed hex");
    Ok(DhParams {
        prime: KeyBytes::from_slice(&prime.to_bytes_be())?,
        generator: KeyBytes::from_slice(&[2])?,
    })
}

pub fn generate_dh_keypair_default_group(bits: u32) -> Result<Key> {
    generate_dh_keypair(default_group(bits)?)
}

pub fn generate_dh_keypair(params: DhParams) -> Result<Key> {
    let prime = BigUint::from_bytes_be(params.prime.as_slice());
    let generator = BigUint::from_bytes_be(params.generator.as_slice());
    let mut rng = OsRng;
    use rand::RngCore;
    let mut exponent_bytes = vec![0u8; params.prime.len()];
    rng.fill_bytes(&mut exponent_bytes);
    let private_scalar = BigUint::from_bytes_be(&exponent_bytes) % &prime;
    let public_value = generator.modpow(&private_scalar, &prime);
    let private_value = left_pad(&private_scalar.to_bytes_be(), params.prime.len());
    Ok(Key::DhPrv {
        params: params.clone(),
        private_value: KeyBytes::from_slice(&private_value)?,
    })
}

pub fn dh_public_from_private(params: &DhParams, private_value: &KeyBytes) -> Result<Key> {
    let prime = BigUint::from_bytes_be(params.prime.as_slice());
    let generator = BigUint::from_bytes_be(params.generator.as_slice());
    let private_scalar = BigUint::from_bytes_be(private_value.as_slice());
    let public_value = generator.modpow(&private_scalar, &prime);
    let padded = left_pad(&public_value.to_bytes_be(), params.prime.len());
    Ok(Key::DhPub {
        params: params.clone(),
        public_value: KeyBytes::from_slice(&padded)?,
    })
}

/// Compute the DH shared secret `peer_public ^ our_private mod prime`,
/// left-padded to the prime's byte length.
pub fn dh_agree(our_private: &Key, peer_public_value: &[u8]) -> Result<Vec<u8>> {
    let Key::DhPrv { params, private_value } = our_private else {
        return Err(CoreError::invalid_parameter("DH agreement requires a DH private key"));
    };
    let prime = BigUint::from_bytes_be(params.prime.as_slice());
    if prime.is_zero() {
        return Err(CoreError::invalid_parameter("DH domain parameters have a zero modulus"));
    }
    let private_scalar = BigUint::from_bytes_be(private_value.as_slice());
    let peer = BigUint::from_bytes_be(peer_public_value);
    let shared = peer.modpow(&private_scalar, &prime);
    Ok(left_pad(&shared.to_bytes_be(), params.prime.len()))
}

/// Which family of key agreement an [`Agreement`] object performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgreementKind {
    Dh,
    Ecdh,
}

/// A key-agreement object: carries one private key and computes the shared
/// secret against a caller-supplied public key. Mirrors the
/// `Signature` object's "create, then bind a key, then operate" shape —
/// the private key is what a derived proxy would inherit its backend
/// from.
pub struct Agreement {
    kind: AgreementKind,
    private_key: Option<Key>,
}

impl Agreement {
    pub fn new(kind: AgreementKind) -> Self {
        Self { kind, private_key: None }
    }

    pub fn kind(&self) -> AgreementKind {
        self.kind
    }

    /// Bind the private key this object agrees with. Rejects a key whose
    /// kind does not match `self.kind`.
    pub fn set_private_key(&mut self, key: Key) -> Result<()> {
        let matches_kind = match self.kind {
            AgreementKind::Dh => matches!(key, Key::DhPrv { .. }),
            AgreementKind::Ecdh => matches!(key, Key::Secp256r1Prv(_)),
        };
        if !matches_kind {
            return Err(CoreError::invalid_parameter("private key kind does not match this agreement object"));
        }
        self.private_key = Some(key);
        Ok(())
    }

    /// Compute the shared secret against `peer_public`. `Aborted` if no
    /// private key has been bound yet.
    pub fn agree(&self, peer_public: &Key) -> Result<Vec<u8>> {
        let private = self
            .private_key
            .as_ref()
            .ok_or_else(|| CoreError::aborted("agreement object has no private key bound"))?;
        match (self.kind, peer_public) {
            (AgreementKind::Dh, Key::DhPub { public_value, .. }) => dh_agree(private, public_value.as_slice()),
            (AgreementKind::Ecdh, Key::Secp256r1Pub { x, y }) => ecdh_agree(private, x.as_slice(), y.as_slice()),
            _ => Err(CoreError::invalid_parameter("peer public key kind does not match this agreement object")),
        }
    }
}

fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes[bytes.len() - len..].to_vec();
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

/// Left-trim leading zero bytes (ECDH coordinate serialization rule).
fn left_trim(bytes: &[u8]) -> Vec<u8> {
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    bytes[first_nonzero..].to_vec()
}

pub fn generate_secp256r1_keypair() -> Result<Key> {
    let secret = P256SecretKey::random(&mut OsRng);
    let scalar_bytes = secret.to_bytes();
    Ok(Key::Secp256r1Prv(KeyBytes::from_slice(&scalar_bytes)?))
}

pub fn secp256r1_public_from_private(scalar: &KeyBytes) -> Result<Key> {
    let secret = P256SecretKey::from_slice(scalar.as_slice())
        .map_err(|err| CoreError::invalid_parameter("invalid SECP256R1 scalar").with_cause(err))?;
    let public = secret.public_key();
    let point = public.to_encoded_point(false);
    let (x, y) = (
        point.x().expect("uncompressed point always has an x coordinate"),
        point.y().expect("uncompressed point always has a y coordinate"),
    );
    Ok(Key::Secp256r1Pub {
        x: KeyBytes::from_slice(&left_trim(x))?,
        y: KeyBytes::from_slice(&left_trim(y))?,
    })
}

/// ECDH over SECP256R1: returns the shared secret's x-coordinate,
/// left-trimmed per the serialization rule. No KDF is applied.
pub fn ecdh_agree(our_private: &Key, peer_x: &[u8], peer_y: &[u8]) -> Result<Vec<u8>> {
    let Key::Secp256r1Prv(scalar) = our_private else {
        return Err(CoreError::invalid_parameter("ECDH agreement requires a SECP256R1 private key"));
    };
    let secret = P256SecretKey::from_slice(scalar.as_slice())
        .map_err(|err| CoreError::invalid_parameter("invalid SECP256R1 scalar").with_cause(err))?;
    let mut sec1 = vec![0x04u8];
    sec1.extend_from_slice(&left_pad(peer_x, 32));
    sec1.extend_from_slice(&left_pad(peer_y, 32));
    let peer_public = P256PublicKey::from_sec1_bytes(&sec1)
        .map_err(|err| CoreError::invalid_parameter("invalid peer SECP256R1 public point").with_cause(err))?;
    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer_public.as_affine());
    Ok(left_trim(shared.raw_secret_bytes().as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_agreement_is_symmetric() {
        let params = default_group(1024).unwrap();
        let a = generate_dh_keypair(params.clone()).unwrap();
        let b = generate_dh_keypair(params).unwrap();
        let a_pub = dh_public_from_private(
            match &a { Key::DhPrv { params, .. } => params, _ => unreachable!() },
            match &a { Key::DhPrv { private_value, .. } => private_value, _ => unreachable!() },
        ).unwrap();
        let b_pub = dh_public_from_private(
            match &b { Key::DhPrv { params, .. } => params, _ => unreachable!() },
            match &b { Key::DhPrv { private_value, .. } => private_value, _ => unreachable!() },
        ).unwrap();
        let a_pub_bytes = match &a_pub { Key::DhPub { public_value, .. } => public_value.as_slice().to_vec(), _ => unreachable!() };
        let b_pub_bytes = match &b_pub { Key::DhPub { public_value, .. } => public_value.as_slice().to_vec(), _ => unreachable!() };
        let secret_a = dh_agree(&a, &b_pub_bytes).unwrap();
        let secret_b = dh_agree(&b, &a_pub_bytes).unwrap();
        assert_eq!(secret_a, secret_b);
    }

    #[test]
    fn ecdh_agreement_is_symmetric() {
        let a = generate_secp256r1_keypair().unwrap();
        let b = generate_secp256r1_keypair().unwrap();
        let a_pub = secp256r1_public_from_private(match &a { Key::Secp256r1Prv(s) => s, _ => unreachable!() }).unwrap();
        let b_pub = secp256r1_public_from_private(match &b { Key::Secp256r1Prv(s) => s, _ => unreachable!() }).unwrap();
        let (ax, ay) = match &a_pub { Key::Secp256r1Pub { x, y } => (x.as_slice().to_vec(), y.as_slice().to_vec()), _ => unreachable!() };
        let (bx, by) = match &b_pub { Key::Secp256r1Pub { x, y } => (x.as_slice().to_vec(), y.as_slice().to_vec()), _ => unreachable!() };
        let secret_a = ecdh_agree(&a, &bx, &by).unwrap();
        let secret_b = ecdh_agree(&b, &ax, &ay).unwrap();
        assert_eq!(secret_a, secret_b);
    }

    #[test]
    fn agreement_object_requires_private_key_before_agreeing() {
        let obj = Agreement::new(AgreementKind::Ecdh);
        let b = generate_secp256r1_keypair().unwrap();
        let b_pub = secp256r1_public_from_private(match &b { Key::Secp256r1Prv(s) => s, _ => unreachable!() }).unwrap();
        let err = obj.agree(&b_pub).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Aborted);
    }

    #[test]
    fn agreement_object_ecdh_round_trip_is_symmetric() {
        let a = generate_secp256r1_keypair().unwrap();
        let b = generate_secp256r1_keypair().unwrap();
        let a_pub = secp256r1_public_from_private(match &a { Key::Secp256r1Prv(s) => s, _ => unreachable!() }).unwrap();
        let b_pub = secp256r1_public_from_private(match &b { Key::Secp256r1Prv(s) => s, _ => unreachable!() }).unwrap();

        let mut obj_a = Agreement::new(AgreementKind::Ecdh);
        obj_a.set_private_key(a).unwrap();
        let mut obj_b = Agreement::new(AgreementKind::Ecdh);
        obj_b.set_private_key(b).unwrap();

        let secret_a = obj_a.agree(&b_pub).unwrap();
        let secret_b = obj_b.agree(&a_pub).unwrap();
        assert_eq!(secret_a, secret_b);
    }

    #[test]
    fn agreement_object_rejects_mismatched_key_kind() {
        let mut obj = Agreement::new(AgreementKind::Dh);
        let ecdh_key = generate_secp256r1_keypair().unwrap();
        let err = obj.set_private_key(ecdh_key).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
    }
}
