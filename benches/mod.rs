use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    resequence_bench::bench_in_order_throughput,
    resequence_bench::bench_reverse_order_throughput
);
criterion_main!(benches);
