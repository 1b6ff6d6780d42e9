//! Benchmarks de l’évaluateur : micro workloads (Criterion)
//!
//! Chaque itération parse, charge et exécute le programme dans une VM neuve ;
//! la suite `run_only` isole l’exécution d’un programme déjà parsé.
//!
//! Criterion :
//!   CRIT_SAMPLES (def=30) | CRIT_WARMUP_MS (def=300) | CRIT_MEASURE_MS (def=1500)

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stackathon_benches::MICRO;
use stackathon_core::SourceId;
use stackathon_parser::parse_source;
use stackathon_vm::{BufferHost, NoLibraries, Vm, VmConfig};

fn env_u64(k: &str, d: u64) -> u64 {
    std::env::var(k).ok().and_then(|s| s.parse().ok()).unwrap_or(d)
}

fn configured() -> Criterion {
    Criterion::default()
        .sample_size(usize::try_from(env_u64("CRIT_SAMPLES", 30)).unwrap_or(30))
        .warm_up_time(Duration::from_millis(env_u64("CRIT_WARMUP_MS", 300)))
        .measurement_time(Duration::from_millis(env_u64("CRIT_MEASURE_MS", 1500)))
}

fn fresh_vm() -> Vm {
    let (host, _) = BufferHost::new();
    Vm::new(VmConfig::default(), host)
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut g = c.benchmark_group("vm/end_to_end");
    for (name, src) in MICRO {
        g.bench_with_input(BenchmarkId::from_parameter(name), src, |b, src| {
            b.iter(|| {
                let prog = parse_source(black_box(src), SourceId(0)).expect("bench source parses");
                let mut vm = fresh_vm();
                vm.run_program(&prog, &mut NoLibraries).expect("bench program runs");
                vm.stack().len()
            });
        });
    }
    g.finish();
}

fn bench_run_only(c: &mut Criterion) {
    let mut g = c.benchmark_group("vm/run_only");
    for (name, src) in MICRO {
        let prog = parse_source(src, SourceId(0)).expect("bench source parses");
        g.bench_with_input(BenchmarkId::from_parameter(name), &prog, |b, prog| {
            b.iter(|| {
                let mut vm = fresh_vm();
                vm.merge(&prog.declarations);
                let entry = vm.load(prog);
                vm.run(black_box(entry)).expect("bench program runs");
                vm.stack().len()
            });
        });
    }
    g.finish();
}

criterion_group! {
    name = benches;
    config = configured();
    targets = bench_end_to_end, bench_run_only
}
criterion_main!(benches);
