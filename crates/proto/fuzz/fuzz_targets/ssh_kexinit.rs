//! Fuzz target for SSH_MSG_KEXINIT decoding.
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run ssh_kexinit -- -max_total_time=300
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use sushi_proto::ssh::kex::{resolve_algorithms, KexAlgorithms, KexInit};

fuzz_target!(|data: &[u8]| {
    if let Ok((kexinit, raw)) = KexInit::decode(data) {
        // The consumed slice is a prefix of the input
        assert!(data.starts_with(raw));

        // Negotiating against anything must not panic
        let selection = resolve_algorithms(&KexAlgorithms::default(), kexinit.algorithms());
        let _ = selection.require_negotiated();

        // Our own encoding of the record decodes to the same record
        let again = KexInit::from_bytes(&kexinit.to_bytes()).expect("re-encoded KEXINIT must decode");
        assert_eq!(again, kexinit);
    }
});
