//! Benchmarks for the FiSH primitives.
//!
//! Covers the Blowfish key schedule, single-block encryption, whole-line
//! encryption across message sizes, and a full DH1080 exchange.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fishcrypt::cipher::{BlowfishKey, CipherMode};
use fishcrypt::dh1080::{Dh1080Exchange, ExchangeConfig};
use fishcrypt::message::{decrypt_message, encrypt_message};

const BENCH_KEY: &[u8] = b"BenchmarkKey2024";

fn bench_key_schedule(c: &mut Criterion) {
    c.bench_function("blowfish_key_schedule", |b| {
        b.iter(|| BlowfishKey::new(black_box(BENCH_KEY)).unwrap());
    });
}

fn bench_block(c: &mut Criterion) {
    let key = BlowfishKey::new(BENCH_KEY).unwrap();
    let mut group = c.benchmark_group("blowfish_block");
    group.throughput(Throughput::Bytes(8));

    group.bench_function("encrypt", |b| {
        let mut block = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];
        b.iter(|| key.encrypt_block(black_box(&mut block)));
    });
    group.bench_function("decrypt", |b| {
        let mut block = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];
        b.iter(|| key.decrypt_block(black_box(&mut block)));
    });

    group.finish();
}

/// Line encryption at typical IRC message lengths, both modes.
fn bench_message(c: &mut Criterion) {
    let key = BlowfishKey::new(BENCH_KEY).unwrap();
    let mut group = c.benchmark_group("message");

    for &len in &[16usize, 128, 400] {
        let text = vec![b'x'; len];
        group.throughput(Throughput::Bytes(len as u64));
        for mode in [CipherMode::Ecb, CipherMode::Cbc] {
            let line = encrypt_message(&key, mode, &text);
            let encrypt_id = BenchmarkId::new(format!("encrypt_{}", mode), len);
            group.bench_with_input(encrypt_id, &text, |b, t| {
                b.iter(|| encrypt_message(&key, mode, black_box(t)));
            });
            let decrypt_id = BenchmarkId::new(format!("decrypt_{}", mode), len);
            group.bench_with_input(decrypt_id, &line, |b, l| {
                b.iter(|| decrypt_message(&key, black_box(l)).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_dh1080(c: &mut Criterion) {
    let mut group = c.benchmark_group("dh1080");
    group.sample_size(10);

    group.bench_function("full_exchange", |b| {
        b.iter(|| {
            let mut alice = Dh1080Exchange::new(ExchangeConfig::default());
            let mut bob = Dh1080Exchange::new(ExchangeConfig::default());
            let init = alice.initiate().unwrap();
            let finish = bob.respond_to_init(&init).unwrap();
            alice.complete_init(&finish).unwrap().key_text()
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_key_schedule,
    bench_block,
    bench_message,
    bench_dh1080,
);
criterion_main!(benches);
