//! Benchmarks for fusion scheduling and lowering.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tensorfuse_core::device::DeviceCapability;
use tensorfuse_core::ir::iter_domain::IterType;
use tensorfuse_core::ir::{Fusion, LiteralValue, TensorDomain};
use tensorfuse_core::runtime_info::RuntimeInfo;
use tensorfuse_core::{schedule_and_lower, Options};

fn build_pointwise_fusion(rank: usize, extent: i64) -> Fusion {
    let mut fusion = Fusion::new();
    let zero = fusion.add_literal(LiteralValue::Int(0));
    let mut root = Vec::with_capacity(rank);
    for _ in 0..rank {
        let e = fusion.add_literal(LiteralValue::Int(extent));
        root.push(fusion.add_root_iter_domain(zero, e, IterType::Iteration));
    }
    let domain = TensorDomain::from_root(root, &fusion);
    fusion.add_tensor_view(domain, tensorfuse_core::dtype::DataType::Float);
    fusion
}

fn bench_schedule_and_lower(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_and_lower");
    let runtime = RuntimeInfo::new(0, DeviceCapability::lookup_defaults(8, 0));
    let options = Options::default();

    for &rank in &[1usize, 2, 4] {
        group.throughput(Throughput::Elements(rank as u64));
        group.bench_function(format!("rank_{}", rank), |b| {
            b.iter(|| {
                let fusion = build_pointwise_fusion(rank, 1024);
                let result = schedule_and_lower(fusion, &runtime, &options);
                black_box(result)
            })
        });
    }

    group.finish();
}

fn bench_domain_graph_build(c: &mut Criterion) {
    use tensorfuse_core::domain_graph::DomainGraph;

    c.bench_function("domain_graph_build_rank8", |b| {
        b.iter(|| {
            let fusion = build_pointwise_fusion(8, 64);
            let graph = DomainGraph::build(&fusion);
            black_box(graph)
        })
    });
}

criterion_group!(benches, bench_schedule_and_lower, bench_domain_graph_build);
criterion_main!(benches);
