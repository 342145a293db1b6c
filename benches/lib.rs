use criterion::{criterion_group, criterion_main};

use background::{bench_cash, bench_fit_background, bench_fit_polynomial};

use posterior::bench_posterior;

criterion_group!(
    benches,
    bench_cash,
    bench_fit_polynomial,
    bench_fit_background,
    bench_posterior
);
criterion_main!(benches);
