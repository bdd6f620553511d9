//! Property-based checks for the quantified invariants that the
//! hand-picked unit tests elsewhere only sample a few points of: the
//! dataport capacity gate, and digest determinism under arbitrary input
//! chunking.

use proptest::prelude::*;

use trentos_core::crypto::digest::{Digest, DigestAlgorithm};
use trentos_core::dataport::{check_capacity, read_bulk_output, write_bulk_input, OutLen, SharedMemoryDataport};

proptest! {
    /// `check_capacity` succeeds iff the declared length does not exceed the
    /// dataport's size, for every size/length pair, not just the boundary
    /// cases exercised in `dataport::tests`.
    #[test]
    fn check_capacity_accepts_iff_declared_len_fits(
        dataport_size in 0usize..4096,
        declared_len in 0usize..8192,
    ) {
        let result = check_capacity(dataport_size, declared_len);
        prop_assert_eq!(result.is_ok(), declared_len <= dataport_size);
    }

    /// Writing a bulk input that fits and reading it back through an
    /// `OutLen` sized to match always recovers the exact bytes written.
    #[test]
    fn bulk_input_round_trips_through_a_dataport(
        size in 1usize..256,
        data in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        prop_assume!(data.len() <= size);
        let mut port = SharedMemoryDataport::new(size);
        write_bulk_input(&mut port, &data).unwrap();

        let mut out_len = OutLen::with_capacity(size);
        out_len.set_produced(data.len());
        let recovered = read_bulk_output(&port, &out_len).unwrap();
        prop_assert_eq!(recovered, data);
    }

    /// SHA-256 of a message does not depend on how the message is split
    /// across `process` calls.
    #[test]
    fn sha256_is_independent_of_how_input_is_chunked(
        first in prop::collection::vec(any::<u8>(), 0..64),
        second in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut combined = first.clone();
        combined.extend_from_slice(&second);

        let mut whole = Digest::new(DigestAlgorithm::Sha256);
        whole.process(&combined).unwrap();
        let whole_digest = whole.finalize().unwrap();

        let mut chunked = Digest::new(DigestAlgorithm::Sha256);
        chunked.process(&first).unwrap();
        chunked.process(&second).unwrap();
        let chunked_digest = chunked.finalize().unwrap();

        prop_assert_eq!(whole_digest, chunked_digest);
    }
}
