use elo_consensus::{
    binomial, expected_score, rank_combination, unrank, EloEngine, EloError, Match, Outcome, PairSampler,
    RatingState,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Win), Just(Outcome::Lose), Just(Outcome::Tie)]
}

// ── Expectation ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn expected_scores_sum_to_one(a in -4000.0f64..4000.0, b in -4000.0f64..4000.0) {
        let total = expected_score(a, b) + expected_score(b, a);
        prop_assert!((total - 1.0).abs() < 1e-12, "sum was {}", total);
    }

    #[test]
    fn expected_score_is_a_probability(a in -4000.0f64..4000.0, b in -4000.0f64..4000.0) {
        let e = expected_score(a, b);
        prop_assert!((0.0..=1.0).contains(&e));
    }
}

// ── Updates ──────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn updates_conserve_rating_mass(
        ratings in proptest::collection::vec(1000.0f64..2000.0, 2..12),
        games in proptest::collection::vec((0usize..12, 0usize..12, arb_outcome()), 1..60),
        k in 1.0f64..64.0,
    ) {
        let n = ratings.len();
        let mut state = RatingState::from_ratings(ratings.iter().copied().enumerate().collect());
        let engine = EloEngine::new(k);
        let before: f64 = state.iter().map(|(_, r)| r).sum();

        for (a, b, outcome) in games {
            let game = Match::from_outcome(a % n, b % n, outcome);
            match engine.apply(&game, &mut state) {
                Ok(()) => prop_assert_ne!(game.player_a(), game.player_b()),
                Err(EloError::InvalidComparison(item)) => prop_assert_eq!(item, *game.player_a()),
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }

        let after: f64 = state.iter().map(|(_, r)| r).sum();
        prop_assert!((before - after).abs() < 1e-6, "{} -> {}", before, after);
    }

    #[test]
    fn winner_never_loses_rating(a in 1000.0f64..2000.0, b in 1000.0f64..2000.0, k in 1.0f64..64.0) {
        let mut state = RatingState::from_ratings([("a", a), ("b", b)].into_iter().collect());
        EloEngine::new(k).apply(&Match::from_outcome("a", "b", Outcome::Win), &mut state).unwrap();

        prop_assert!(state.get(&"a").unwrap() >= a);
        prop_assert!(state.get(&"b").unwrap() <= b);
    }

    #[test]
    fn equal_ratings_move_symmetrically(r in -500.0f64..3000.0, k in 1.0f64..64.0) {
        let mut state = RatingState::uniform(["a", "b"], r);
        EloEngine::new(k).apply(&Match::from_outcome("a", "b", Outcome::Win), &mut state).unwrap();

        let gain = state.get(&"a").unwrap() - r;
        let loss = r - state.get(&"b").unwrap();
        prop_assert!((gain - k / 2.0).abs() < 1e-9);
        prop_assert!((gain - loss).abs() < 1e-9);
    }
}

// ── Combinations ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn rank_inverts_unrank(n in 1usize..40, r_seed in 0usize..40, index_seed in any::<u64>()) {
        let r = r_seed % (n + 1);
        let total = binomial(n, r).unwrap();
        let index = index_seed as u128 % total;

        let combination = unrank(n, r, index).unwrap();
        prop_assert_eq!(combination.len(), r);
        prop_assert!(combination.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(combination.iter().all(|&p| p < n));
        prop_assert_eq!(rank_combination(n, &combination).unwrap(), index);
    }

    #[test]
    fn sampled_pairs_are_unique(population in 2usize..60, fraction in 0.0f64..1.0, seed in any::<u64>()) {
        let available = population * (population - 1) / 2;
        let amount = (available as f64 * fraction) as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut sampler = PairSampler::new(population, amount, &mut rng).unwrap();

        let mut seen = BTreeSet::new();
        while let Some((a, b)) = sampler.next_pair().unwrap() {
            prop_assert!(a < b && b < population);
            prop_assert!(seen.insert((a, b)));
        }
        prop_assert_eq!(seen.len(), amount);
    }
}
