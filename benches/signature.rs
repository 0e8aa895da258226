//! Signature engine benchmark suite.
//!
//! Benchmarks the request-signing hot path at different parameter counts.
//!
//! Run with: cargo bench --bench signature
//! Results saved to: target/criterion/

use std::collections::BTreeMap;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use mailru_api::Credentials;
use mailru_api::session::signature::sign;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PARAM_COUNTS: &[usize] = &[4, 16, 64];

fn query_of(count: usize) -> BTreeMap<String, String> {
    (0..count)
        .map(|i| (format!("param_{i:03}"), format!("value_{i}")))
        .collect()
}

// ============================================================================
// Benchmark: Sign
// ============================================================================

fn bench_sign(c: &mut Criterion) {
    let credentials = Credentials::server_server("423004", "secret key", "access token");

    let mut group = c.benchmark_group("sign");

    for &count in PARAM_COUNTS {
        let query = query_of(count);
        group.bench_with_input(BenchmarkId::new("params", count), &query, |b, query| {
            b.iter(|| sign(query, &credentials).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sign);
criterion_main!(benches);
