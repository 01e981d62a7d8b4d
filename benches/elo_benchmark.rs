use criterion::{black_box, criterion_group, criterion_main, Criterion};
use elo_consensus::{unrank, EloEngine, EnsembleConfig, Match, RatingState, SimulationHarness};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn generate_matches(n_items: usize, n_matches: usize, seed: u64) -> (Vec<String>, Vec<Match<String>>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let items: Vec<String> = (0..n_items).map(|i| format!("item_{}", i)).collect();

    let mut matches = Vec::with_capacity(n_matches);
    for _ in 0..n_matches {
        let pair: Vec<&String> = items.choose_multiple(&mut rng, 2).collect();
        let score = [0.0, 0.5, 1.0][rng.gen_range(0..3)];
        matches.push(Match::new(pair[0].clone(), pair[1].clone(), score).unwrap());
    }

    (items, matches)
}

fn bench_apply(c: &mut Criterion) {
    let (items, matches) = generate_matches(100, 1000, 42);
    let engine = EloEngine::new(16.0);

    c.bench_function("apply_1000_matches", |b| {
        b.iter(|| {
            let mut state = RatingState::uniform(items.iter().cloned(), 1500.0);
            for game in &matches {
                engine.apply(game, &mut state).unwrap();
            }
            black_box(state.ranking());
        })
    });
}

fn bench_unrank(c: &mut Criterion) {
    let n = 200_000;
    let total = (n as u128) * (n as u128 - 1) / 2;

    c.bench_function("unrank_pair_200k", |b| {
        let mut index = 0u128;
        b.iter(|| {
            index = (index + 7_919_999_981) % total;
            black_box(unrank(n, 2, index).unwrap());
        })
    });
}

fn bench_ensemble(c: &mut Criterion) {
    let (items, matches) = generate_matches(30, 300, 42);
    let config = EnsembleConfig {
        ensemble_size: 8,
        epochs: 2,
        ..EnsembleConfig::default()
    };
    let harness = SimulationHarness::new(config).unwrap();

    c.bench_function("ensemble_8_replicas", |b| {
        b.iter(|| {
            black_box(harness.run(&items, &matches).unwrap());
        })
    });
}

criterion_group!(benches, bench_apply, bench_unrank, bench_ensemble);
criterion_main!(benches);
