use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kftrack::hungarian::HungarianSolver;
use ndarray::Array2;
use rand::prelude::*;

fn random_cost_matrix(rows: usize, cols: usize) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(42);
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(0.0..100.0))
}

fn bench_hungarian_small(c: &mut Criterion) {
    let cost = random_cost_matrix(10, 10);
    c.bench_function("hungarian_10x10", |b| {
        b.iter(|| HungarianSolver::solve(black_box(cost.view())))
    });
}

fn bench_hungarian_medium(c: &mut Criterion) {
    let cost = random_cost_matrix(50, 50);
    c.bench_function("hungarian_50x50", |b| {
        b.iter(|| HungarianSolver::solve(black_box(cost.view())))
    });
}

fn bench_hungarian_rectangular(c: &mut Criterion) {
    let cost = random_cost_matrix(20, 60);
    c.bench_function("hungarian_20x60", |b| {
        b.iter(|| HungarianSolver::solve(black_box(cost.view())))
    });
}

criterion_group!(
    benches,
    bench_hungarian_small,
    bench_hungarian_medium,
    bench_hungarian_rectangular
);
criterion_main!(benches);
