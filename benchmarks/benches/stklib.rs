//! Benchmarks du codec `.stk.lib` : encode / decode (CRC compris).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stackathon_benches::library_source;
use stackathon_core::SourceId;
use stackathon_parser::parse_source;
use stackathon_stklib::{decode, encode};

fn bench_codec(c: &mut Criterion) {
    let mut g = c.benchmark_group("stklib");
    for n in [16usize, 256, 2048] {
        let decls = parse_source(&library_source(n), SourceId(0)).expect("library source parses").declarations;
        let bytes = encode(&decls);
        g.throughput(Throughput::Bytes(bytes.len() as u64));
        g.bench_with_input(BenchmarkId::new("encode", n), &decls, |b, d| b.iter(|| encode(black_box(d)).len()));
        g.bench_with_input(BenchmarkId::new("decode", n), &bytes, |b, bytes| {
            b.iter(|| decode(black_box(bytes), SourceId(1)).map(|d| d.len()));
        });
    }
    g.finish();
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
