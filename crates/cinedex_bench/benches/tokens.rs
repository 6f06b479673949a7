//! Token issue and lookup benchmarks.

use cinedex_bench::random_token;
use cinedex_core::token::{hash_plaintext, is_well_formed};
use cinedex_core::{Token, TokenScope};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

/// Benchmark generating a fresh token.
fn bench_generate(c: &mut Criterion) {
    c.bench_function("token_generate", |b| {
        b.iter(|| {
            black_box(Token::generate(
                black_box(42),
                Duration::from_secs(24 * 60 * 60),
                TokenScope::Authentication,
            ))
        });
    });
}

/// Benchmark the per-request work before a credential lookup.
fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_verify");
    let token = random_token();

    group.bench_function("surface_check", |b| {
        b.iter(|| black_box(is_well_formed(black_box(&token))));
    });

    group.bench_function("hash", |b| {
        b.iter(|| black_box(hash_plaintext(black_box(&token))));
    });

    group.finish();
}

criterion_group!(benches, bench_generate, bench_verify);
criterion_main!(benches);
