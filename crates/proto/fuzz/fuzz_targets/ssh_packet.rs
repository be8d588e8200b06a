//! Fuzz target for SSH packet parsing.
//!
//! Feeds arbitrary bytes to the packet decoder looking for:
//! - Panics
//! - Length accounting errors
//! - Frames that decode but do not re-encode
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run ssh_packet -- -max_total_time=300
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use sushi_proto::ssh::Packet;

fuzz_target!(|data: &[u8]| {
    // First byte picks a MAC length so trailing MAC handling is covered too
    let (mac_len, frame) = match data.split_first() {
        Some((selector, rest)) => ((*selector % 3) as usize * 32, rest),
        None => (0, data),
    };

    if let Ok((packet, used)) = Packet::decode(frame, mac_len) {
        assert!(used <= frame.len());
        assert_eq!(packet.mac().len(), mac_len);

        // Declared length must match what was consumed
        assert_eq!(4 + packet.packet_length() + mac_len, used);

        // Re-encoding reproduces the consumed bytes
        assert_eq!(packet.to_bytes(), &frame[..used]);
    }
});
