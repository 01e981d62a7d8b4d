use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::harness::sample_population;
use crate::rating::{EloEngine, Match, RatingState};
use crate::scoring::{elo_labels, f1_score, median_rating, threshold_labels, LabelPolicy};
use crate::synthetic::Checkpoint;
use crate::{EloError, ItemKey};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmpiricalConfig {
    /// Size of the evaluated item subset.
    pub items: usize,
    pub selection_seed: u64,
    pub shuffle_seed: u64,
    pub report_distance: usize,
    pub epochs: usize,
    pub k: f64,
}

impl Default for EmpiricalConfig {
    fn default() -> Self {
        EmpiricalConfig {
            items: 100,
            selection_seed: 0,
            shuffle_seed: 0,
            report_distance: 1000,
            epochs: 20,
            k: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EmpiricalReport<K: Ord> {
    pub params: EmpiricalConfig,
    /// Comparisons left after dropping repeated ordered pairs.
    pub unique_comparisons: usize,
    /// Unique comparisons with both items inside the subset.
    pub subset_comparisons: usize,
    pub selected: Vec<K>,
    pub reference_median: f64,
    pub checkpoints: Vec<Checkpoint>,
}

/// Keeps the first occurrence of every ordered `(a, b)` pair.
fn drop_repeated_pairs<K: ItemKey>(comparisons: Vec<Match<K>>) -> Vec<Match<K>> {
    let mut seen = BTreeSet::new();
    comparisons
        .into_iter()
        .filter(|game| seen.insert((game.player_a().clone(), game.player_b().clone())))
        .collect()
}

pub fn run_empirical<K: ItemKey>(
    mut comparisons: Vec<Match<K>>,
    config: &EmpiricalConfig,
) -> Result<EmpiricalReport<K>, EloError<K>> {
    if config.report_distance == 0 {
        return Err(EloError::InvalidParameter("report distance must be positive".to_string()));
    }
    if config.items == 0 {
        return Err(EloError::InvalidParameter("item subset must not be empty".to_string()));
    }

    let mut shuffle_rng = ChaCha8Rng::seed_from_u64(config.shuffle_seed);
    let engine = EloEngine::new(config.k);

    let all_items: Vec<K> = comparisons
        .iter()
        .flat_map(|game| [game.player_a().clone(), game.player_b().clone()])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    // Canonical order first so the shuffle alone decides which duplicate survives.
    comparisons.sort_by(|x, y| {
        x.player_a()
            .cmp(y.player_a())
            .then_with(|| x.player_b().cmp(y.player_b()))
            .then_with(|| x.score_a().total_cmp(&y.score_a()))
    });
    comparisons.shuffle(&mut shuffle_rng);
    let mut unique = drop_repeated_pairs(comparisons);

    let mut reference = RatingState::uniform(all_items.iter().cloned(), 0.0);
    engine.fit_epochs(&mut unique, &mut reference, config.epochs, &mut shuffle_rng)?;

    let mut selection_rng = ChaCha8Rng::seed_from_u64(config.selection_seed);
    let selected = sample_population(&all_items, config.items, &mut selection_rng)?;
    let selected_set: BTreeSet<&K> = selected.iter().collect();

    let subset_reference = RatingState::from_ratings(
        reference
            .iter()
            .filter(|(item, _)| selected_set.contains(item))
            .map(|(item, rating)| (item.clone(), rating))
            .collect(),
    );
    let reference_median = median_rating(&subset_reference)
        .ok_or_else(|| EloError::InvalidParameter("item subset must not be empty".to_string()))?;
    let truth = threshold_labels(&subset_reference, reference_median);

    let subset: Vec<Match<K>> = unique
        .iter()
        .filter(|game| selected_set.contains(game.player_a()) && selected_set.contains(game.player_b()))
        .cloned()
        .collect();
    info!(
        items = all_items.len(),
        unique = unique.len(),
        selected = selected.len(),
        subset = subset.len(),
        reference_median,
        "reference fit complete"
    );

    let mut checkpoints = Vec::new();
    for target in (0..subset.len()).step_by(config.report_distance) {
        let mut ratings = RatingState::uniform(selected.iter().cloned(), 0.0);
        let mut round = subset[..target].to_vec();
        engine.fit_epochs(&mut round, &mut ratings, config.epochs, &mut shuffle_rng)?;

        let labels = elo_labels(&ratings, LabelPolicy::ZeroThreshold);
        let checkpoint = Checkpoint {
            comparisons: target,
            f1: f1_score(&truth, &labels)?,
            bias: None,
        };
        debug!(comparisons = target, f1 = checkpoint.f1, "checkpoint");
        checkpoints.push(checkpoint);
    }

    Ok(EmpiricalReport {
        params: config.clone(),
        unique_comparisons: unique.len(),
        subset_comparisons: subset.len(),
        selected,
        reference_median,
        checkpoints,
    })
}
