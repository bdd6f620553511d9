//! End-to-end scenarios exercised against the public API surface, one per
//! named scenario: AES-128 ECB round trip, AES-GCM tag mismatch, SHA-256 of
//! empty input, keystore move, socket event mask stickiness, dataport
//! overflow, and certificate chain CN mismatch. Unit tests inline in each
//! module already cover the same invariants at finer grain; these drive the
//! whole stack through its outermost entry points instead.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Once};

use trentos_core::cert::{Cert, Chain, VerifyFailureFlags};
use trentos_core::crypto::cipher::{Cipher, CipherAlgorithm, Direction};
use trentos_core::crypto::digest::{Digest, DigestAlgorithm};
use trentos_core::crypto::key::{Key, KeyBytes};
use trentos_core::dataport::{check_capacity, write_bulk_input, Dataport, SharedMemoryDataport};
use trentos_core::error::ErrorCode;
use trentos_core::keystore::{KeystoreContext, MemoryStreamFactory};
use trentos_core::socket::{NetworkStackContext, SocketBackend, SocketDomain, SocketType, EVENT_CONN_ACPT};
use trentos_core::RoutingMode;
use tracing_subscriber::layer::SubscriberExt;

// AES-128 ECB of an all-zero block under key 00112233445566778899aabbccddeeff.
const ECB_KEY: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];
const ECB_PLAINTEXT: [u8; 16] = [0u8; 16];
const ECB_CIPHERTEXT: [u8; 16] = [
    0xfd, 0xe4, 0xfb, 0xae, 0x4a, 0x09, 0xe0, 0x20, 0xef, 0xf7, 0x22, 0x96, 0x9f, 0x83, 0x83, 0x2b,
];

static TRACING_INIT: Once = Once::new();

// Scenarios log through `tracing` the same way the production code paths
// do; installing a subscriber here makes that output visible under
// `cargo test -- --nocapture` instead of going to a no-op default.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer());
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[test]
fn aes_128_ecb_round_trips_a_known_vector() {
    init_tracing();
    let key = Key::Aes(KeyBytes::from_slice(&ECB_KEY).unwrap());

    let mut enc = Cipher::new(CipherAlgorithm::AesEcb, Direction::Encrypt, &key, &[]).unwrap();
    let ciphertext = enc.process(&ECB_PLAINTEXT).unwrap();
    assert_eq!(ciphertext, ECB_CIPHERTEXT);

    let mut dec = Cipher::new(CipherAlgorithm::AesEcb, Direction::Decrypt, &key, &[]).unwrap();
    let recovered = dec.process(&ciphertext).unwrap();
    assert_eq!(recovered, ECB_PLAINTEXT);
}

#[test]
fn aes_gcm_flipped_tag_aborts_decryption_of_an_empty_message() {
    let key = Key::Aes(KeyBytes::from_slice(&[0u8; 16]).unwrap());
    let iv = [0u8; 12];

    let mut enc = Cipher::new(CipherAlgorithm::AesGcm, Direction::Encrypt, &key, &iv).unwrap();
    enc.start().unwrap();
    enc.process(&[]).unwrap();
    let mut tag = enc.finalize_encrypt().unwrap();
    assert_eq!(tag.len(), 16); // empty message: output is the tag alone
    tag[0] ^= 0x01;

    let mut dec = Cipher::new(CipherAlgorithm::AesGcm, Direction::Decrypt, &key, &iv).unwrap();
    dec.start().unwrap();
    dec.process(&[]).unwrap();
    let err = dec.finalize_decrypt(Some(&tag)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Aborted);
}

#[test]
fn sha256_empty_stream_requires_at_least_one_process_call() {
    let mut never_processed = Digest::new(DigestAlgorithm::Sha256);
    let err = never_processed.finalize().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Aborted);

    let mut empty_input = Digest::new(DigestAlgorithm::Sha256);
    empty_input.process(b"").unwrap();
    let out = empty_input.finalize().unwrap();
    assert_eq!(hex::encode(out), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
}

#[test]
fn keystore_move_key_relocates_between_two_stores() {
    let store_a = KeystoreContext::new(RoutingMode::Library, Box::new(MemoryStreamFactory::new()));
    let store_b = KeystoreContext::new(RoutingMode::Library, Box::new(MemoryStreamFactory::new()));
    let key = Key::Aes(KeyBytes::from_slice(&[7u8; 16]).unwrap());

    store_a.store("n", &key, None).unwrap();
    store_a.move_key("n", &store_b).unwrap();

    assert_eq!(store_a.load("n", None).unwrap_err().code(), ErrorCode::NotFound);
    assert_eq!(store_b.load("n", None).unwrap(), vec![7u8; 16]);
}

#[derive(Default)]
struct LoopbackBackend {
    next: AtomicU64,
    peers: Mutex<HashMap<u64, SocketAddr>>,
}

impl SocketBackend for LoopbackBackend {
    fn connect(&self, peer: SocketAddr) -> trentos_core::error::Result<u64> {
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        self.peers.lock().unwrap().insert(token, peer);
        Ok(token)
    }
    fn bind(&self, _local: SocketAddr) -> trentos_core::error::Result<u64> {
        Ok(self.next.fetch_add(1, Ordering::Relaxed))
    }
    fn accept(&self, _listener_token: u64) -> trentos_core::error::Result<(u64, SocketAddr)> {
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        Ok((token, "127.0.0.1:9".parse().unwrap()))
    }
    fn send(&self, _token: u64, data: &[u8]) -> trentos_core::error::Result<usize> {
        Ok(data.len())
    }
    fn recv(&self, _token: u64, _buf: &mut [u8]) -> trentos_core::error::Result<usize> {
        Ok(0)
    }
    fn close(&self, _token: u64) -> trentos_core::error::Result<()> {
        Ok(())
    }
}

#[test]
fn accepted_connection_surfaces_on_the_parent_listening_socket_once() {
    let stack = NetworkStackContext::new(RoutingMode::Library, 4, Box::new(LoopbackBackend::default()));
    stack.init().unwrap();
    stack.start().unwrap();

    let listener = stack.create(SocketDomain::Inet, SocketType::Stream).unwrap();
    stack.bind(listener, "127.0.0.1:0".parse().unwrap()).unwrap();
    stack.listen(listener).unwrap();
    let child = stack.accept(listener).unwrap();

    let first = stack.get_pending_events(8).unwrap();
    let accepted = first
        .iter()
        .find(|r| r.parent_socket_handle == Some(listener))
        .expect("an accepted-child record for the listener");
    assert_eq!(accepted.socket_handle, child);
    assert_ne!(accepted.event_mask & EVENT_CONN_ACPT, 0);

    let second = stack.get_pending_events(8).unwrap();
    assert!(second.iter().all(|r| r.parent_socket_handle != Some(listener)));
}

#[test]
fn bulk_input_exceeding_dataport_size_leaves_the_buffer_untouched() {
    let mut port = SharedMemoryDataport::new(32);
    let oversized = vec![0xABu8; 33];
    let err = write_bulk_input(&mut port, &oversized).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InsufficientSpace);
    assert!(port.as_slice().iter().all(|&b| b == 0));
    assert!(check_capacity(port.size(), 32).is_ok());
}

const MISMATCH_LEAF_PEM: &str = "-----BEGIN CERTIFICATE-----
MIIDKTCCAhGgAwIBAgIUbJOmENJ/367MZxNZOlyxw8eQ2YIwDQYJKoZIhvcNAQEL
BQAwJDEiMCAGA1UEAwwZbWlzbWF0Y2gtdGVzdC5leGFtcGxlLmNvbTAeFw0yNjA3
MjkwMzQ3NThaFw0zNjA3MjYwMzQ3NThaMCQxIjAgBgNVBAMMGW1pc21hdGNoLXRl
c3QuZXhhbXBsZS5jb20wggEiMA0GCSqGSIb3DQEBAQUAA4IBDwAwggEKAoIBAQC3
4j5ed7ij4ElBZF0h6GyNzBv+p5XfjzscfJXlvzoFiKs4xav8Ah6NGpLenBmw6WMD
RXrZTp4okzUD5R00T8uETV5Kvk6gUEdAY1fYw5PQlYwDsLhnZ8hyzBB/f1UZWwLG
rQuRPufP5PVon86J0XR1+Z1EiS/ZX6BKRedugb93f5L6G4duzU0PsNg26jf4dkO5
flzW0O2IzMDZ8MNKzQkj8qizBAAhgY16PAYM5WUfubLO6HPPhk2eUhzuabsL+2de
ccYOhzT1HVUN5B/fZnrNfbcz7MRj6+y2TL6TrO10lH2CohbN4uZwPcJTC8xWGzOx
7UFwUsR3PD/6cEoQK7RNAgMBAAGjUzBRMB0GA1UdDgQWBBSblY41R2N+o5PSnnEM
gSeD7VywCDAfBgNVHSMEGDAWgBSblY41R2N+o5PSnnEMgSeD7VywCDAPBgNVHRMB
Af8EBTADAQH/MA0GCSqGSIb3DQEBCwUAA4IBAQAps86c7otsO1IKhyeELlW4G5VB
/oeYZhbSt7TNPg3WotDvim3rFW200GcKnvJU0UqySxGhJaAaIHMiE3AofoXxvaYx
F8F5eLAReuHrzLndZQLVtKa/+D6CAiE3PoSGu7wOiVIQEQq3R+4pR41nQjjsBA06
2hZSdVoAKwZXcddnpRpVNtwKAG/KzcgKlWtkoINbwC25jALGtmVU+nJjgXX/R29Z
ec2rTGuohk9luH5lY5OD25truDuqvN8iFHjcT60kQZv3R+YIOXsK9TzEOqVYkQB7
FtpWoL5YC3oPpf5mk3K4rWm8M2qbBcDUOYlcdetUN4IR2UQhvyAsavXYAUP8
-----END CERTIFICATE-----
";

#[test]
fn verify_chain_parses_a_real_certificate_and_flags_cn_mismatch() {
    let leaf = Cert::from_pem(MISMATCH_LEAF_PEM.as_bytes()).unwrap();
    assert_eq!(leaf.subject_cn, "mismatch-test.example.com");

    let mut chain = Chain::new();
    chain.add_cert(leaf).unwrap();

    let (err, flags) = trentos_core::cert::verify_chain(&chain, Some("other-name.example.com")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Generic);
    assert!(flags.contains(VerifyFailureFlags::CN_MISMATCH));
}
