//! Keystore: persists key material to a
//! caller-supplied byte stream, wrapping/unwrapping through the Crypto
//! Core's cipher state machine. The persistence backend is injected as a
//! [`StreamFactory`], so this crate never opens a file or socket itself.

use crate::context::ContextCore;
use crate::crypto::cipher::{Cipher, CipherAlgorithm, Direction};
use crate::crypto::key::Key;
use crate::error::{CoreError, ErrorCode, Result};
use crate::handle::RoutingMode;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

/// A writable handle to one named entry in the backing store.
pub trait WriteStream: Write + Send {}
impl<T: Write + Send> WriteStream for T {}

/// A readable handle to one named entry in the backing store.
pub trait ReadStream: Read + Send {}
impl<T: Read + Send> ReadStream for T {}

/// Pluggable persistence backend for the keystore. Real
/// implementations might back onto the Filesystem module of this same
/// crate, or onto a raw partition — both are the caller's choice, not
/// this module's concern.
pub trait StreamFactory: Send + Sync {
    fn open_write(&self, name: &str) -> Result<Box<dyn WriteStream>>;
    fn open_read(&self, name: &str) -> Result<Box<dyn ReadStream>>;
    fn delete(&self, name: &str) -> Result<()>;
    fn exists(&self, name: &str) -> bool;
}

/// In-memory [`StreamFactory`] for tests and for embedders that want a
/// keystore without touching real storage. Cheaply cloneable: the backing
/// map is reference-counted, so a write stream can own its own handle onto
/// it without borrowing from the factory.
#[derive(Default, Clone)]
pub struct MemoryStreamFactory {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

struct MemoryWriteStream {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    name: String,
    buffer: Vec<u8>,
}

impl Write for MemoryWriteStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.entries.lock().unwrap().insert(self.name.clone(), self.buffer.clone());
        Ok(())
    }
}

impl Drop for MemoryWriteStream {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl MemoryStreamFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamFactory for MemoryStreamFactory {
    fn open_write(&self, name: &str) -> Result<Box<dyn WriteStream>> {
        Ok(Box::new(MemoryWriteStream {
            entries: Arc::clone(&self.entries),
            name: name.to_string(),
            buffer: Vec::new(),
        }))
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn ReadStream>> {
        let data = self
            .entries
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::new(ErrorCode::NotFound, format!("no keystore entry named '{name}'")))?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CoreError::new(ErrorCode::NotFound, format!("no keystore entry named '{name}'")))
    }

    fn exists(&self, name: &str) -> bool {
        self.entries.lock().unwrap().contains_key(name)
    }
}

/// A keystore bound to one [`StreamFactory`].
pub struct KeystoreContext {
    core: ContextCore,
    backend: Box<dyn StreamFactory>,
}

impl KeystoreContext {
    pub fn new(routing_mode: RoutingMode, backend: Box<dyn StreamFactory>) -> Self {
        Self {
            core: ContextCore::new("keystore", routing_mode),
            backend,
        }
    }

    pub fn destroy(&self) -> Result<()> {
        self.core.destroy()
    }

    /// Serialize and persist `key` under `name`, optionally wrapping it with
    /// `wrap_cipher`/`wrap_key` first. Fails `Exists` if `name` is already
    /// present — overwrite requires an explicit `delete` first.
    pub fn store(&self, name: &str, key: &Key, wrap: Option<(&Key, &[u8])>) -> Result<()> {
        self.core.check_live()?;
        if self.backend.exists(name) {
            return Err(CoreError::new(ErrorCode::Exists, format!("keystore entry '{name}' already exists")));
        }
        let plain = crate::crypto::key::export(key, true, None)?;
        let payload = match wrap {
            Some((wrap_key, iv)) => wrap_bytes(wrap_key, iv, &plain)?,
            None => plain,
        };
        let mut stream = self.backend.open_write(name)?;
        stream
            .write_all(&payload)
            .map_err(|e| CoreError::new(ErrorCode::FsWriteFailed, "keystore write failed").with_cause(e))?;
        Ok(())
    }

    /// Load raw key bytes previously stored under `name`, unwrapping if
    /// `unwrap` is supplied. Returns the decrypted/plain bytes; the caller
    /// re-imports them via the Crypto Core as the appropriate key type.
    pub fn load(&self, name: &str, unwrap: Option<(&Key, &[u8], &[u8])>) -> Result<Vec<u8>> {
        self.core.check_live()?;
        let mut stream = self.backend.open_read(name)?;
        let mut payload = Vec::new();
        stream
            .read_to_end(&mut payload)
            .map_err(|e| CoreError::new(ErrorCode::FsReadFailed, "keystore read failed").with_cause(e))?;
        match unwrap {
            Some((unwrap_key, iv, tag)) => unwrap_bytes(unwrap_key, iv, tag, &payload),
            None => Ok(payload),
        }
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        self.core.check_live()?;
        self.backend.delete(name)
    }

    /// Copy the entry named `name` from `self` into `dest` under the same
    /// name, without altering wrapping.
    pub fn copy(&self, name: &str, dest: &KeystoreContext) -> Result<()> {
        self.core.check_live()?;
        dest.core.check_live()?;
        let raw = self.load(name, None)?;
        if dest.backend.exists(name) {
            return Err(CoreError::new(ErrorCode::Exists, format!("destination already has an entry named '{name}'")));
        }
        let mut stream = dest.backend.open_write(name)?;
        stream
            .write_all(&raw)
            .map_err(|e| CoreError::new(ErrorCode::FsWriteFailed, "keystore write failed").with_cause(e))?;
        Ok(())
    }

    /// Move an entry between keystores (named `move_key` since `move` is a
    /// keyword). Implemented as copy-then-delete: if the source delete
    /// fails after a successful copy, the destination write is rolled back
    /// so the entry does not end up duplicated.
    pub fn move_key(&self, name: &str, dest: &KeystoreContext) -> Result<()> {
        self.copy(name, dest)?;
        if let Err(delete_err) = self.delete(name) {
            let _ = dest.delete(name);
            return Err(delete_err);
        }
        Ok(())
    }
}

fn wrap_bytes(wrap_key: &Key, iv: &[u8], plain: &[u8]) -> Result<Vec<u8>> {
    let mut cipher = Cipher::new(CipherAlgorithm::AesGcm, Direction::Encrypt, wrap_key, iv)?;
    cipher.start()?;
    cipher.process(plain)?;
    cipher.finalize_encrypt()
}

fn unwrap_bytes(unwrap_key: &Key, iv: &[u8], tag: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    let mut cipher = Cipher::new(CipherAlgorithm::AesGcm, Direction::Decrypt, unwrap_key, iv)?;
    cipher.start()?;
    cipher.process(payload)?;
    cipher.finalize_decrypt(Some(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::KeyBytes;

    #[test]
    fn store_then_load_round_trips() {
        let ks = KeystoreContext::new(RoutingMode::Library, Box::new(MemoryStreamFactory::new()));
        let key = Key::Aes(KeyBytes::from_slice(&[9u8; 16]).unwrap());
        ks.store("my-key", &key, None).unwrap();
        let loaded = ks.load("my-key", None).unwrap();
        assert_eq!(loaded, vec![9u8; 16]);
    }

    #[test]
    fn storing_over_existing_entry_is_rejected() {
        let ks = KeystoreContext::new(RoutingMode::Library, Box::new(MemoryStreamFactory::new()));
        let key = Key::Aes(KeyBytes::from_slice(&[1u8; 16]).unwrap());
        ks.store("dup", &key, None).unwrap();
        let err = ks.store("dup", &key, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Exists);
    }

    #[test]
    fn move_key_removes_from_source_and_adds_to_destination() {
        let src = KeystoreContext::new(RoutingMode::Library, Box::new(MemoryStreamFactory::new()));
        let dst = KeystoreContext::new(RoutingMode::Library, Box::new(MemoryStreamFactory::new()));
        let key = Key::Aes(KeyBytes::from_slice(&[3u8; 16]).unwrap());
        src.store("shared", &key, None).unwrap();
        src.move_key("shared", &dst).unwrap();
        assert!(src.load("shared", None).is_err());
        assert_eq!(dst.load("shared", None).unwrap(), vec![3u8; 16]);
    }
}
