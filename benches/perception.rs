//! Perception pass benchmarks
//!
//! Compares the three strategies and the tree operations at several
//! population sizes.
//!
//! Run with: cargo bench --bench perception

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;
use situated_perception::config::PerceptionConfig;
use situated_perception::cull::FrustumCuller;
use situated_perception::geom::{Frustum, SphericalFrustum};
use situated_perception::metrics::PerceptionMetrics;
use situated_perception::perception::{create_algorithm, PerceptionScene, PerceptionStrategy};
use situated_perception::scenario::{Scenario, ScenarioConfig};
use situated_perception::tree::{Binary, Icosep, TreeManipulator};
use situated_perception::world::ground::FlatGround;

fn scenario(bodies: usize) -> Scenario<2> {
    let config = ScenarioConfig {
        world_size: 1000.0,
        static_count: bodies * 10,
        body_count: bodies,
        ..ScenarioConfig::default()
    };
    Scenario::generate(config, &mut StdRng::seed_from_u64(7))
}

/// One full pass per strategy
fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("perception_pass");
    group.sample_size(20);

    for count in [100, 500, 1000] {
        let scenario = scenario(count);
        let static_tree = Arc::new(scenario.static_tree::<Binary>(8));
        let dynamic_tree = match scenario.dynamic_tree::<Binary>(8) {
            Ok(tree) => Arc::new(tree),
            Err(e) => panic!("scenario bodies are unique: {}", e),
        };
        let scene = PerceptionScene::new(static_tree, dynamic_tree).with_ground(Arc::new(FlatGround::new(0.0)));
        let population = scenario.population();

        group.throughput(Throughput::Elements(count as u64));
        for strategy in [
            PerceptionStrategy::Sequential,
            PerceptionStrategy::Parallel,
            PerceptionStrategy::Hybrid,
        ] {
            let config = PerceptionConfig {
                strategy,
                task_timeout: Duration::from_secs(60),
                ..PerceptionConfig::default()
            };
            let mut algorithm = create_algorithm::<2>(&config, Arc::new(PerceptionMetrics::new()));
            group.bench_with_input(BenchmarkId::new(strategy.to_string(), count), &count, |b, _| {
                b.iter(|| black_box(algorithm.compute_perceptions(&population, &scene)));
            });
        }
    }

    group.finish();
}

/// Static tree construction for both shapes
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_build");
    group.sample_size(20);

    for count in [1000, 5000, 10000] {
        let scenario = scenario(count / 10);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("binary", count), &count, |b, _| {
            b.iter(|| black_box(scenario.static_tree::<Binary>(8)));
        });
        group.bench_with_input(BenchmarkId::new("icosep", count), &count, |b, _| {
            b.iter(|| black_box(scenario.static_tree::<Icosep>(8)));
        });
    }

    group.finish();
}

/// Single-frustum culling, top-down against bottom-up
fn bench_cull(c: &mut Criterion) {
    let mut group = c.benchmark_group("cull");
    let scenario = scenario(1000);
    let tree = scenario.static_tree::<Binary>(8);
    let frustum = SphericalFrustum::new([500.0, 500.0], 40.0);

    group.bench_function("top_down", |b| {
        b.iter(|| black_box(FrustumCuller::top_down(&tree, &frustum as &dyn Frustum<2>).count()));
    });
    group.bench_function("bottom_up", |b| {
        b.iter(|| black_box(FrustumCuller::bottom_up(&tree, &frustum as &dyn Frustum<2>, None).count()));
    });

    group.finish();
}

/// Relocating every body after one random step
fn bench_relocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("relocate");
    group.sample_size(30);

    for count in [100, 500, 1000] {
        let mut scenario = scenario(count);
        let mut tree = match scenario.dynamic_tree::<Binary>(8) {
            Ok(tree) => tree,
            Err(e) => panic!("scenario bodies are unique: {}", e),
        };
        let mut rng = StdRng::seed_from_u64(11);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("binary", count), &count, |b, _| {
            b.iter(|| {
                for entity in scenario.step(&mut rng, 2.0) {
                    black_box(tree.relocate(entity).ok());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_strategies, bench_build, bench_cull, bench_relocate);
criterion_main!(benches);
