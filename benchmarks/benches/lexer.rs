//! Benchmarks du lexer et du parser (Criterion)
//!
//! ▶ Paramètres via variables d’environnement :
//!   - CRIT_SAMPLES      (def=60)   : taille d’échantillon Criterion
//!   - CRIT_WARMUP_MS    (def=300)  : warmup en ms
//!   - CRIT_MEASURE_MS   (def=1000) : fenêtre de mesure en ms

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stackathon_benches::{synthetic, MICRO};
use stackathon_core::SourceId;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok()).unwrap_or(default)
}

fn configured() -> Criterion {
    Criterion::default()
        .sample_size(usize::try_from(env_u64("CRIT_SAMPLES", 60)).unwrap_or(60))
        .warm_up_time(Duration::from_millis(env_u64("CRIT_WARMUP_MS", 300)))
        .measurement_time(Duration::from_millis(env_u64("CRIT_MEASURE_MS", 1000)))
}

fn bench_micro(c: &mut Criterion) {
    let mut g = c.benchmark_group("lex/micro");
    for (name, src) in MICRO {
        g.throughput(Throughput::Bytes(src.len() as u64));
        g.bench_with_input(BenchmarkId::from_parameter(name), src, |b, src| {
            b.iter(|| stackathon_lexer::tokenize(black_box(src), SourceId(0)).map(|t| t.len()));
        });
    }
    g.finish();
}

fn bench_synthetic(c: &mut Criterion) {
    let mut g = c.benchmark_group("lex/synthetic");
    for kib in [16usize, 64, 256] {
        let src = synthetic(kib);
        g.throughput(Throughput::Bytes(src.len() as u64));
        g.bench_with_input(BenchmarkId::new("tokenize", kib), &src, |b, src| {
            b.iter(|| stackathon_lexer::tokenize(black_box(src), SourceId(0)).map(|t| t.len()));
        });
        g.bench_with_input(BenchmarkId::new("parse", kib), &src, |b, src| {
            b.iter(|| stackathon_parser::parse_source(black_box(src), SourceId(0)).map(|p| p.body.len()));
        });
    }
    g.finish();
}

criterion_group! {
    name = benches;
    config = configured();
    targets = bench_micro, bench_synthetic
}
criterion_main!(benches);
