//! Crypto Core: RNG, key management, and the digest/MAC/cipher/
//! signature/agreement state machines, all reached through handles on a
//! [`CryptoContext`] the way every other subsystem's objects are reached
//! through its own context.

pub mod agreement;
pub mod cipher;
pub mod digest;
pub mod key;
pub mod mac;
pub mod rng;
pub mod signature;

use crate::context::ContextCore;
use crate::entropy::EntropySource;
use crate::error::Result;
use crate::handle::{Attributes, Handle, HandleTable, Proxy, RoutingMode};
use agreement::Agreement;
use cipher::Cipher;
use digest::Digest;
use key::Key;
use mac::Mac;
use parking_lot::Mutex;
use rng::Rng;
use signature::Signature;

/// Owns the RNG and the per-kind handle tables for every object the Crypto
/// Core hands out: one context per service, many object kinds share it,
/// one mutex-guarded struct rather than one lock per object.
pub struct CryptoContext {
    core: ContextCore,
    rng: Mutex<Rng>,
    keys: Mutex<HandleTable<Key>>,
    digests: Mutex<HandleTable<Digest>>,
    macs: Mutex<HandleTable<Mac>>,
    ciphers: Mutex<HandleTable<Cipher>>,
    signatures: Mutex<HandleTable<Signature>>,
    agreements: Mutex<HandleTable<Agreement>>,
}

impl CryptoContext {
    pub fn new(routing_mode: RoutingMode, entropy: Box<dyn EntropySource>) -> Result<Self> {
        Ok(Self {
            core: ContextCore::new("crypto", routing_mode),
            rng: Mutex::new(Rng::new(entropy)?),
            keys: Mutex::new(HandleTable::new()),
            digests: Mutex::new(HandleTable::new()),
            macs: Mutex::new(HandleTable::new()),
            ciphers: Mutex::new(HandleTable::new()),
            signatures: Mutex::new(HandleTable::new()),
            agreements: Mutex::new(HandleTable::new()),
        })
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.core.routing_mode()
    }

    pub fn destroy(&self) -> Result<()> {
        self.core.destroy()
    }

    /// Fill `buf` with fresh random bytes via the context's shared RNG.
    pub fn get_random_bytes(&self, flags: rng::RngFlags, buf: &mut [u8], dataport_size: usize) -> Result<()> {
        self.core.check_live()?;
        self.rng.lock().get_bytes(flags, buf, dataport_size)
    }

    pub fn reseed_rng(&self, seed: &[u8]) -> Result<()> {
        self.core.check_live()?;
        self.rng.lock().reseed_with(seed)
    }

    /// Generate a key and register it under a fresh handle.
    pub fn generate_key(&self, key_type: key::KeyType, spec: &key::KeySpec, attributes: Attributes) -> Result<Handle> {
        self.core.check_live()?;
        let generated = key::generate(key_type, spec, &mut self.rng.lock())?;
        let proxy = Proxy::create(self.core.routing_mode(), attributes, Some(generated), None)?;
        Ok(self.keys.lock().insert(proxy))
    }

    pub fn import_key(&self, key_type: key::KeyType, raw: &[u8], attributes: Attributes) -> Result<Handle> {
        self.core.check_live()?;
        let imported = key::import(key_type, raw, None)?;
        let proxy = Proxy::create(self.core.routing_mode(), attributes, Some(imported), None)?;
        Ok(self.keys.lock().insert(proxy))
    }

    pub fn export_key(&self, handle: Handle) -> Result<Vec<u8>> {
        self.core.check_live()?;
        let table = self.keys.lock();
        let proxy = table.get(handle)?;
        key::export(proxy.local()?, proxy.is_exportable(), None)
    }

    pub fn free_key(&self, handle: Handle) -> Result<()> {
        self.core.check_live()?;
        self.keys.lock().free(handle)?;
        Ok(())
    }

    pub fn new_digest(&self, algorithm: digest::DigestAlgorithm, attributes: Attributes) -> Result<Handle> {
        self.core.check_live()?;
        let proxy = Proxy::create(self.core.routing_mode(), attributes, Some(Digest::new(algorithm)), None)?;
        Ok(self.digests.lock().insert(proxy))
    }

    pub fn digest_process(&self, handle: Handle, data: &[u8]) -> Result<()> {
        self.core.check_live()?;
        self.digests.lock().get_mut(handle)?.local_mut()?.process(data)
    }

    pub fn digest_finalize(&self, handle: Handle) -> Result<Vec<u8>> {
        self.core.check_live()?;
        self.digests.lock().get_mut(handle)?.local_mut()?.finalize()
    }

    pub fn new_mac(&self, algorithm: mac::MacAlgorithm, attributes: Attributes) -> Result<Handle> {
        self.core.check_live()?;
        let proxy = Proxy::create(self.core.routing_mode(), attributes, Some(Mac::new(algorithm)), None)?;
        Ok(self.macs.lock().insert(proxy))
    }

    pub fn mac_start(&self, handle: Handle, key_handle: Handle) -> Result<()> {
        self.core.check_live()?;
        let keys = self.keys.lock();
        let key_proxy = keys.get(key_handle)?;
        self.macs.lock().get_mut(handle)?.local_mut()?.start(key_proxy.local()?)
    }

    pub fn mac_process(&self, handle: Handle, data: &[u8]) -> Result<()> {
        self.core.check_live()?;
        self.macs.lock().get_mut(handle)?.local_mut()?.process(data)
    }

    pub fn mac_finalize(&self, handle: Handle) -> Result<Vec<u8>> {
        self.core.check_live()?;
        self.macs.lock().get_mut(handle)?.local_mut()?.finalize()
    }

    /// Create a cipher bound to `key_handle`/`iv` immediately: key and IV
    /// are init-time parameters, not supplied later through `cipher_start`.
    pub fn new_cipher(
        &self,
        algorithm: cipher::CipherAlgorithm,
        direction: cipher::Direction,
        key_handle: Handle,
        iv: &[u8],
        attributes: Attributes,
    ) -> Result<Handle> {
        self.core.check_live()?;
        let keys = self.keys.lock();
        let key_proxy = keys.get(key_handle)?;
        let cipher = Cipher::new(algorithm, direction, key_proxy.local()?, iv)?;
        let proxy = Proxy::create(self.core.routing_mode(), attributes, Some(cipher), None)?;
        Ok(self.ciphers.lock().insert(proxy))
    }

    /// Move a GCM cipher into its processing state. `Aborted` for
    /// block-mode ciphers, which are ready to process right after
    /// `new_cipher` and never require a separate start.
    pub fn cipher_start(&self, handle: Handle) -> Result<()> {
        self.core.check_live()?;
        self.ciphers.lock().get_mut(handle)?.local_mut()?.start()
    }

    pub fn cipher_process(&self, handle: Handle, data: &[u8]) -> Result<Vec<u8>> {
        self.core.check_live()?;
        self.ciphers.lock().get_mut(handle)?.local_mut()?.process(data)
    }

    /// Feed additional authenticated data into a GCM cipher ahead of
    /// `cipher_process`/`cipher_finalize_*`.
    pub fn cipher_process_aad(&self, handle: Handle, aad: &[u8]) -> Result<()> {
        self.core.check_live()?;
        self.ciphers.lock().get_mut(handle)?.local_mut()?.process_aad(aad)
    }

    pub fn cipher_finalize_encrypt(&self, handle: Handle) -> Result<Vec<u8>> {
        self.core.check_live()?;
        self.ciphers.lock().get_mut(handle)?.local_mut()?.finalize_encrypt()
    }

    pub fn cipher_finalize_decrypt(&self, handle: Handle, tag: Option<&[u8]>) -> Result<Vec<u8>> {
        self.core.check_live()?;
        self.ciphers.lock().get_mut(handle)?.local_mut()?.finalize_decrypt(tag)
    }

    /// Create a signature object bound to no key yet; `signature_set_*_key`
    /// populates it before `sign`/`verify` can succeed.
    pub fn new_signature(
        &self,
        padding: signature::SignaturePadding,
        digest_algorithm: digest::DigestAlgorithm,
        attributes: Attributes,
    ) -> Result<Handle> {
        self.core.check_live()?;
        let proxy = Proxy::create(self.core.routing_mode(), attributes, Some(Signature::new(padding, digest_algorithm)), None)?;
        Ok(self.signatures.lock().insert(proxy))
    }

    /// Bind the signing key. A derived proxy inherits its routing from the
    /// key it is built on, per the handle layer's derived-proxy rule: the
    /// key's own proxy must already share this context's backend.
    pub fn signature_set_signing_key(&self, handle: Handle, key_handle: Handle) -> Result<()> {
        self.core.check_live()?;
        let keys = self.keys.lock();
        let key_proxy = keys.get(key_handle)?;
        self.signatures.lock().get_mut(handle)?.local_mut()?.set_signing_key(key_proxy.local()?.clone())
    }

    pub fn signature_set_verification_key(&self, handle: Handle, key_handle: Handle) -> Result<()> {
        self.core.check_live()?;
        let keys = self.keys.lock();
        let key_proxy = keys.get(key_handle)?;
        self.signatures.lock().get_mut(handle)?.local_mut()?.set_verification_key(key_proxy.local()?.clone())
    }

    pub fn signature_sign(&self, handle: Handle, digest: &[u8]) -> Result<Vec<u8>> {
        self.core.check_live()?;
        self.signatures.lock().get(handle)?.local()?.sign(digest)
    }

    pub fn signature_verify(&self, handle: Handle, digest: &[u8], sig: &[u8]) -> Result<()> {
        self.core.check_live()?;
        self.signatures.lock().get(handle)?.local()?.verify(digest, sig)
    }

    pub fn free_signature(&self, handle: Handle) -> Result<()> {
        self.core.check_live()?;
        self.signatures.lock().free(handle)?;
        Ok(())
    }

    /// Create a key-agreement object bound to no key yet.
    pub fn new_agreement(&self, kind: agreement::AgreementKind, attributes: Attributes) -> Result<Handle> {
        self.core.check_live()?;
        let proxy = Proxy::create(self.core.routing_mode(), attributes, Some(Agreement::new(kind)), None)?;
        Ok(self.agreements.lock().insert(proxy))
    }

    pub fn agreement_set_private_key(&self, handle: Handle, key_handle: Handle) -> Result<()> {
        self.core.check_live()?;
        let keys = self.keys.lock();
        let key_proxy = keys.get(key_handle)?;
        self.agreements.lock().get_mut(handle)?.local_mut()?.set_private_key(key_proxy.local()?.clone())
    }

    pub fn agreement_agree(&self, handle: Handle, peer_public_key_handle: Handle) -> Result<Vec<u8>> {
        self.core.check_live()?;
        let keys = self.keys.lock();
        let peer_proxy = keys.get(peer_public_key_handle)?;
        self.agreements.lock().get(handle)?.local()?.agree(peer_proxy.local()?)
    }

    pub fn free_agreement(&self, handle: Handle) -> Result<()> {
        self.core.check_live()?;
        self.agreements.lock().free(handle)?;
        Ok(())
    }
}
