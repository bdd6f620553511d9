//! RSA signature operations:
//! PKCS#1 v1.5 and PSS, both via the `rsa` crate. Verification failure is a
//! named testable property: the `rsa` crate's signature
//! comparison is constant-time internally, so no additional measures are
//! needed here — this module's job is only to surface that failure as
//! `Aborted` rather than leaking timing or partial information.

use super::digest::DigestAlgorithm;
use super::key::{Key, KeyBytes, RsaParams};
use crate::error::{CoreError, ErrorCode, Result};
use rsa::pkcs1v15::{Signature as Pkcs1Signature, SigningKey as Pkcs1SigningKey, VerifyingKey as Pkcs1VerifyingKey};
use rsa::pss::{BlindedSigningKey as PssSigningKey, VerifyingKey as PssVerifyingKey};
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, Signature as _, Verifier};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignaturePadding {
    Pkcs1v15,
    Pss,
}

/// A signature object: carries up to two keys (prv for signing, pub for
/// verification) plus the padding scheme and digest algorithm the object
/// was bound to at construction. `sign` requires a private key, `verify`
/// requires a public key — neither key is required at construction time,
/// matching the handle layer's "create then populate" shape for objects
/// that derive their backend from a key supplied after the object exists.
pub struct Signature {
    padding: SignaturePadding,
    digest_algorithm: DigestAlgorithm,
    private_key: Option<Key>,
    public_key: Option<Key>,
}

impl Signature {
    pub fn new(padding: SignaturePadding, digest_algorithm: DigestAlgorithm) -> Self {
        Self {
            padding,
            digest_algorithm,
            private_key: None,
            public_key: None,
        }
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Bind the signing key. Rejects anything other than an RSA private key.
    pub fn set_signing_key(&mut self, key: Key) -> Result<()> {
        if !matches!(key, Key::RsaPrv { .. }) {
            return Err(CoreError::invalid_parameter("signing key must be an RSA private key"));
        }
        self.private_key = Some(key);
        Ok(())
    }

    /// Bind the verification key. Rejects anything other than an RSA public
    /// key.
    pub fn set_verification_key(&mut self, key: Key) -> Result<()> {
        if !matches!(key, Key::RsaPub(_)) {
            return Err(CoreError::invalid_parameter("verification key must be an RSA public key"));
        }
        self.public_key = Some(key);
        Ok(())
    }

    /// Sign `digest` (already hashed by the caller at `self.digest_algorithm`)
    /// with the bound private key. `Aborted` if no private key is set — a
    /// verify-only object can never sign.
    pub fn sign(&self, digest: &[u8]) -> Result<Vec<u8>> {
        let key = self
            .private_key
            .as_ref()
            .ok_or_else(|| CoreError::aborted("signature object has no private key bound; cannot sign"))?;
        sign(key, self.padding, digest)
    }

    /// Verify `signature` over `digest` with the bound public key. `Aborted`
    /// if no public key is set, or if the signature fails verification.
    pub fn verify(&self, digest: &[u8], signature: &[u8]) -> Result<()> {
        let key = self
            .public_key
            .as_ref()
            .ok_or_else(|| CoreError::aborted("signature object has no public key bound; cannot verify"))?;
        verify(key, self.padding, digest, signature)
    }
}

fn public_key_from_params(params: &RsaParams) -> Result<RsaPublicKey> {
    let n = BigUint::from_bytes_be(params.modulus.as_slice());
    let e = BigUint::from_bytes_be(params.exponent.as_slice());
    RsaPublicKey::new(n, e).map_err(|err| CoreError::invalid_parameter("RSA public key parameters rejected").with_cause(err))
}

fn private_key_from(params: &RsaParams, private_exponent: &KeyBytes) -> Result<RsaPrivateKey> {
    let n = BigUint::from_bytes_be(params.modulus.as_slice());
    let e = BigUint::from_bytes_be(params.exponent.as_slice());
    let d = BigUint::from_bytes_be(private_exponent.as_slice());
    RsaPrivateKey::from_components(n, e, d, vec![])
        .map_err(|err| CoreError::invalid_parameter("RSA private key components rejected").with_cause(err))
}

/// Sign `digest` (already hashed by the caller; this module does not hash)
/// with the given padding.
pub fn sign(key: &Key, padding: SignaturePadding, digest: &[u8]) -> Result<Vec<u8>> {
    let Key::RsaPrv { params, private_exponent } = key else {
        return Err(CoreError::invalid_parameter("sign requires an RSA private key"));
    };
    let private = private_key_from(params, private_exponent)?;
    let mut rng = rand::rngs::OsRng;
    let sig = match padding {
        SignaturePadding::Pkcs1v15 => {
            let signing_key = Pkcs1SigningKey::<Sha256>::new(private);
            signing_key
                .try_sign_with_rng(&mut rng, digest)
                .map_err(|err| CoreError::aborted("RSA PKCS#1v1.5 signing failed").with_cause(err))?
                .as_bytes()
                .to_vec()
        }
        SignaturePadding::Pss => {
            let signing_key = PssSigningKey::<Sha256>::new(private);
            signing_key
                .try_sign_with_rng(&mut rng, digest)
                .map_err(|err| CoreError::aborted("RSA PSS signing failed").with_cause(err))?
                .as_bytes()
                .to_vec()
        }
    };
    Ok(sig)
}

/// Verify `signature` over `digest`. Returns
/// `Aborted` on any mismatch — this module classifies signature failure as a
/// crypto-abort condition, not a plain boolean, so callers cannot
/// accidentally ignore the result.
pub fn verify(key: &Key, padding: SignaturePadding, digest: &[u8], signature: &[u8]) -> Result<()> {
    let Key::RsaPub(params) = key else {
        return Err(CoreError::invalid_parameter("verify requires an RSA public key"));
    };
    let public = public_key_from_params(params)?;
    match padding {
        SignaturePadding::Pkcs1v15 => {
            let verifying_key = Pkcs1VerifyingKey::<Sha256>::new(public);
            let sig = Pkcs1Signature::try_from(signature)
                .map_err(|err| CoreError::invalid_parameter("malformed PKCS#1v1.5 signature encoding").with_cause(err))?;
            verifying_key
                .verify(digest, &sig)
                .map_err(|_| CoreError::aborted("PKCS#1v1.5 signature verification failed"))
        }
        SignaturePadding::Pss => {
            let verifying_key = PssVerifyingKey::<Sha256>::new(public);
            let sig = rsa::pss::Signature::try_from(signature)
                .map_err(|err| CoreError::invalid_parameter("malformed PSS signature encoding").with_cause(err))?;
            verifying_key
                .verify(digest, &sig)
                .map_err(|_| CoreError::aborted("PSS signature verification failed"))
        }
    }
}

/// Generate a fresh RSA key pair of the requested modulus size.
pub fn generate_rsa_keypair(bits: u32) -> Result<Key> {
    let mut rng = rand::rngs::OsRng;
    let private = RsaPrivateKey::new(&mut rng, bits as usize)
        .map_err(|err| CoreError::new(ErrorCode::Generic, "RSA key generation failed").with_cause(err))?;
    let public = private.to_public_key();
    let params = RsaParams {
        modulus: KeyBytes::from_slice(&public.n().to_bytes_be())?,
        exponent: KeyBytes::from_slice(&public.e().to_bytes_be())?,
    };
    let private_exponent = KeyBytes::from_slice(&private.d().to_bytes_be())?;
    Ok(Key::RsaPrv { params, private_exponent })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let key = generate_rsa_keypair(1024).unwrap();
        let public = super::super::key::make_public(&key).unwrap();
        let digest = [0x11u8; 32];
        let sig = sign(&key, SignaturePadding::Pkcs1v15, &digest).unwrap();
        verify(&public, SignaturePadding::Pkcs1v15, &digest, &sig).unwrap();
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let key = generate_rsa_keypair(1024).unwrap();
        let public = super::super::key::make_public(&key).unwrap();
        let digest = [0x22u8; 32];
        let mut sig = sign(&key, SignaturePadding::Pkcs1v15, &digest).unwrap();
        sig[0] ^= 0xFF;
        let err = verify(&public, SignaturePadding::Pkcs1v15, &digest, &sig).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Aborted);
    }

    #[test]
    fn signature_object_sign_requires_private_key() {
        let obj = Signature::new(SignaturePadding::Pkcs1v15, DigestAlgorithm::Sha256);
        let err = obj.sign(&[0u8; 32]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Aborted);
    }

    #[test]
    fn signature_object_verify_requires_public_key() {
        let obj = Signature::new(SignaturePadding::Pkcs1v15, DigestAlgorithm::Sha256);
        let err = obj.verify(&[0u8; 32], &[0u8; 128]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Aborted);
    }

    #[test]
    fn signature_object_round_trips_via_bound_keys() {
        let key = generate_rsa_keypair(1024).unwrap();
        let public = super::super::key::make_public(&key).unwrap();
        let digest = [0x33u8; 32];

        let mut signer = Signature::new(SignaturePadding::Pss, DigestAlgorithm::Sha256);
        signer.set_signing_key(key).unwrap();
        let sig = signer.sign(&digest).unwrap();

        let mut verifier = Signature::new(SignaturePadding::Pss, DigestAlgorithm::Sha256);
        verifier.set_verification_key(public).unwrap();
        verifier.verify(&digest, &sig).unwrap();
    }

    #[test]
    fn signature_object_rejects_wrong_key_kind() {
        let mut obj = Signature::new(SignaturePadding::Pkcs1v15, DigestAlgorithm::Sha256);
        let err = obj.set_signing_key(Key::Mac(KeyBytes::from_slice(&[0u8; 16]).unwrap())).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
    }
}
