use criterion::{criterion_group, criterion_main, Criterion};
use lattice_runner::core::config::EngineSettings;
use lattice_runner::core::expansion::{expand, ArgValue, CaseSource, CombiningStrategy, DataSourceRegistry, ParamDef};
use lattice_runner::core::metadata::{FixtureDef, MethodDef, TestRegistry};
use lattice_runner::core::pairwise;
use tokio::runtime::Runtime;

fn grid_params(dimensions: &[usize]) -> Vec<ParamDef> {
    dimensions
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            ParamDef::new(format!("p{}", i))
                .with_values((0..count as i64).map(ArgValue::Int))
        })
        .collect()
}

fn bench_expansion(c: &mut Criterion) {
    let combinatorial = grid_params(&[4, 4, 4, 4]);
    c.bench_function("expand_combinatorial_4x4x4x4", |b| {
        b.iter(|| {
            expand(
                "case",
                &combinatorial,
                Some(&CaseSource::Values(CombiningStrategy::Combinatorial)),
                &DataSourceRegistry::new(),
            )
        });
    });

    c.bench_function("pairwise_generate_5x5x5x5", |b| {
        b.iter(|| pairwise::generate(&[5, 5, 5, 5]));
    });
}

fn bench_run(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let method = MethodDef::new("grid", |_ctx| Ok(())).with_source(CaseSource::Values(
        CombiningStrategy::Combinatorial,
    ));
    let method = grid_params(&[4, 4, 4])
        .into_iter()
        .fold(method, |m, p| m.param(p));
    let registry = TestRegistry::new("Bench")
        .fixture(FixtureDef::new("Bench.Tests", "Grid").test(method));
    let settings = EngineSettings::default().sequential();

    c.bench_function("run_64_case_grid", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = lattice_runner::run_registry(&registry, &settings).await;
        });
    });
}

criterion_group!(benches, bench_expansion, bench_run);
criterion_main!(benches);
