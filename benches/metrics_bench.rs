//! Derived metrics, ranking and comparison cost

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use player_analytics::{compare_players, compute_metrics, rank_players, sample_players};

fn bench_metrics(c: &mut Criterion) {
    let players = sample_players();
    let refs: Vec<_> = players.iter().collect();

    c.bench_function("compute_metrics", |b| {
        b.iter(|| compute_metrics(black_box(&players[0])))
    });
    c.bench_function("rank_samples", |b| b.iter(|| rank_players(black_box(&players))));
    c.bench_function("compare_samples", |b| {
        b.iter(|| compare_players(black_box(&refs)))
    });
}

criterion_group!(benches, bench_metrics);
criterion_main!(benches);
