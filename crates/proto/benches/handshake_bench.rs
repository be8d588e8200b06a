//! Handshake Performance Benchmarks
//!
//! Benchmarks for packet framing, key exchange, key derivation and the
//! outbound cipher.
//!
//! Run with: `cargo bench --bench handshake_bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sushi_proto::ssh::crypto::{CipherAlgorithm, MacAlgorithm, OutboundCipher};
use sushi_proto::ssh::kex::{resolve_algorithms, KexAlgorithms, KexInit};
use sushi_proto::ssh::kex_dh::{import_peer_public, Curve25519Exchange, SharedSecret};
use sushi_proto::ssh::keys::{
    compute_exchange_hash, derive_key, KexTranscript, KeySizes, SessionKeys,
};
use sushi_proto::ssh::Packet;

/// Transcript with realistic field sizes
fn create_test_transcript() -> KexTranscript {
    KexTranscript {
        client_version: b"SSH-2.0-Sushi_0.1.0".to_vec(),
        server_version: b"SSH-2.0-OpenSSH_9.6p1 Ubuntu-3ubuntu13".to_vec(),
        client_kexinit: KexInit::new([1; 16], KexAlgorithms::default(), false).to_bytes(),
        server_kexinit: vec![0x14; 1100],
        host_key_blob: vec![0xAB; 51],
        client_public: vec![0x11; 32],
        server_public: vec![0x22; 32],
    }
}

fn bench_packet_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet");

    for size in [32usize, 1024, 32 * 1024] {
        let payload = vec![0x5A; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("frame_{}bytes", size), |b| {
            b.iter(|| Packet::new(black_box(payload.clone())).unwrap())
        });

        let wire = Packet::new(payload.clone()).unwrap().to_bytes();
        group.bench_function(format!("parse_{}bytes", size), |b| {
            b.iter(|| Packet::from_bytes(black_box(&wire), 0).unwrap())
        });
    }

    group.finish();
}

fn bench_negotiation(c: &mut Criterion) {
    let mut group = c.benchmark_group("kexinit");

    let kexinit = KexInit::new([7; 16], KexAlgorithms::default(), false);
    let bytes = kexinit.to_bytes();

    group.bench_function("decode", |b| {
        b.iter(|| KexInit::decode(black_box(&bytes)).unwrap())
    });

    group.bench_function("resolve", |b| {
        b.iter(|| {
            resolve_algorithms(
                black_box(kexinit.algorithms()),
                black_box(kexinit.algorithms()),
            )
        })
    });

    group.finish();
}

fn bench_curve25519(c: &mut Criterion) {
    let mut group = c.benchmark_group("curve25519");

    group.bench_function("generate_and_agree", |b| {
        let peer = Curve25519Exchange::generate().unwrap();
        let peer_public = import_peer_public(peer.public_key()).unwrap();
        b.iter(|| {
            let exchange = Curve25519Exchange::generate().unwrap();
            black_box(exchange.compute_shared_secret(&peer_public).unwrap())
        })
    });

    group.finish();
}

fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_derivation");

    let shared_secret = SharedSecret::new(vec![0x9C; 32]);
    let transcript = create_test_transcript();
    let exchange_hash = compute_exchange_hash(&shared_secret, &transcript);
    let algorithms = KexAlgorithms::default();
    let sizes = KeySizes::for_selection(&resolve_algorithms(&algorithms, &algorithms)).unwrap();

    group.bench_function("exchange_hash", |b| {
        b.iter(|| compute_exchange_hash(black_box(&shared_secret), black_box(&transcript)))
    });

    group.bench_function("derive_key_64", |b| {
        b.iter(|| derive_key(&shared_secret, &exchange_hash, &exchange_hash, b'F', black_box(64)))
    });

    group.bench_function("session_keys", |b| {
        b.iter(|| SessionKeys::derive(&shared_secret, &exchange_hash, &exchange_hash, &sizes))
    });

    group.finish();
}

fn bench_outbound_cipher(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbound_cipher");

    for size in [64usize, 512, 1500] {
        let mut cipher = OutboundCipher::new(
            CipherAlgorithm::Aes128Ctr,
            MacAlgorithm::HmacSha256,
            &[0x44; 16],
            &[0x55; 16],
            &[0x66; 32],
            3,
        )
        .unwrap();
        let payload = vec![0xAB; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("seal_{}bytes", size), |b| {
            b.iter(|| cipher.seal(black_box(payload.clone())).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_packet_framing,
    bench_negotiation,
    bench_curve25519,
    bench_key_derivation,
    bench_outbound_cipher,
);

criterion_main!(benches);
