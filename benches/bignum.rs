//! Big-number and key agreement benchmarks.
//!
//! Run with: `cargo bench --bench bignum`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use plasma_net::core::bignum::BigNum;
use plasma_net::core::dh::{DhKeyPair, DhParams};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

fn random_bignum(rng: &mut StdRng, bytes: usize) -> BigNum {
    let mut buf = vec![0u8; bytes];
    rng.fill_bytes(&mut buf);
    BigNum::from_be_bytes(&buf)
}

/// modpow against the session group modulus, for growing exponents.
fn bench_modpow(c: &mut Criterion) {
    let params = DhParams::default();
    let mut rng = StdRng::seed_from_u64(7);
    let mut group = c.benchmark_group("modpow");

    for exponent_bytes in [16, 32, 64, 96] {
        let exponent = random_bignum(&mut rng, exponent_bytes);
        group.bench_with_input(
            BenchmarkId::from_parameter(exponent_bytes * 8),
            &exponent,
            |b, exponent| {
                b.iter(|| {
                    params
                        .generator
                        .modpow(black_box(exponent), &params.modulus)
                        .unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_mul_rem(c: &mut Criterion) {
    let params = DhParams::default();
    let mut rng = StdRng::seed_from_u64(11);
    let a = random_bignum(&mut rng, params.key_bytes());
    let b = random_bignum(&mut rng, params.key_bytes());

    c.bench_function("mul_rem_768", |bench| {
        bench.iter(|| black_box(&a).mul(black_box(&b)).rem(&params.modulus).unwrap());
    });
}

/// Both halves of one key exchange.
fn bench_key_agreement(c: &mut Criterion) {
    let params = DhParams::default();
    let mut rng = StdRng::seed_from_u64(13);

    c.bench_function("dh_agree", |b| {
        b.iter(|| {
            let client = DhKeyPair::generate(&params, &mut rng).unwrap();
            let server = DhKeyPair::generate(&params, &mut rng).unwrap();
            let server_public = server.public_bytes(&params).unwrap();
            client.agree(&params, black_box(&server_public)).unwrap()
        });
    });
}

criterion_group!(benches, bench_modpow, bench_mul_rem, bench_key_agreement);
criterion_main!(benches);
