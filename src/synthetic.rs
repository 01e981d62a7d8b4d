//! Synthetic scaling experiment: Elo labels against a majority-vote baseline.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::combination::PairSampler;
use crate::rater::{generate_items, generate_raters, vote_items, RaterPopulation};
use crate::rating::{EloEngine, Match, RatingState};
use crate::scoring::{bias, elo_labels, f1_score, majority_vote_labels, LabelPolicy};
use crate::EloError;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyntheticConfig {
    pub items: usize,
    pub population: RaterPopulation,
    /// Votes collected per item for the majority-vote baseline.
    pub votes_per_item: usize,
    pub seed: u64,
    pub max_comparisons: usize,
    /// Evaluate after every this many comparisons.
    pub report_distance: usize,
    pub epochs: usize,
    pub k: f64,
    pub label_policy: LabelPolicy,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            items: 1000,
            population: RaterPopulation::default(),
            votes_per_item: 3,
            seed: 0,
            max_comparisons: 10_000,
            report_distance: 1000,
            epochs: 20,
            k: 0.15,
            label_policy: LabelPolicy::ZeroThreshold,
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> Result<(), EloError<usize>> {
        self.population.validate()?;
        if self.report_distance == 0 {
            return Err(EloError::InvalidParameter("report distance must be positive".to_string()));
        }
        if self.items < 2 {
            return Err(EloError::InvalidParameter(format!(
                "at least two items are required, got {}",
                self.items
            )));
        }
        if !self.k.is_finite() {
            return Err(EloError::InvalidParameter(format!("k must be finite, got {}", self.k)));
        }
        Ok(())
    }
}

/// Label quality after a given number of comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Checkpoint {
    pub comparisons: usize,
    pub f1: f64,
    /// `None` where the experiment does not track a sensitive feature.
    pub bias: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SyntheticReport {
    pub params: SyntheticConfig,
    pub majority_vote_f1: f64,
    pub majority_vote_bias: f64,
    pub checkpoints: Vec<Checkpoint>,
}

pub fn run_synthetic(config: &SyntheticConfig) -> Result<SyntheticReport, EloError<usize>> {
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let items = generate_items(config.items, &mut rng);
    let raters = generate_raters(&config.population, config.seed, &mut rng)?;

    let truth: BTreeMap<usize, bool> = items.iter().map(|item| (item.id, item.quality > 0.0)).collect();
    let sensitive: BTreeMap<usize, bool> = items.iter().map(|item| (item.id, item.sensitive)).collect();

    let votes = vote_items(&items, &raters, &mut rng, config.votes_per_item)?;
    let majority = majority_vote_labels(&votes);
    let majority_vote_f1 = f1_score(&truth, &majority)?;
    let majority_vote_bias = bias(&truth, &majority, &sensitive)?;
    info!(
        items = items.len(),
        raters = raters.len(),
        spammers = config.population.spammers,
        f1 = majority_vote_f1,
        bias = majority_vote_bias,
        "majority vote baseline"
    );

    let mut sampler = PairSampler::new(items.len(), config.max_comparisons, &mut rng)?;
    let engine = EloEngine::new(config.k);
    let mut comparisons: Vec<Match<usize>> = Vec::with_capacity(config.max_comparisons);
    let mut checkpoints = Vec::new();

    for target in (0..=config.max_comparisons).step_by(config.report_distance) {
        while comparisons.len() < target {
            let (first, second) = sampler.next_pair()?.ok_or_else(|| {
                EloError::InvalidParameter(format!("pair sample exhausted after {} comparisons", comparisons.len()))
            })?;
            let rater = raters
                .choose(&mut rng)
                .ok_or_else(|| EloError::InvalidParameter("cannot compare without raters".to_string()))?;
            let preference = rater.compare(&items[first], &items[second], &mut rng);
            comparisons.push(preference.to_match(items[first].id, items[second].id));
        }

        let mut ratings = RatingState::uniform(items.iter().map(|item| item.id), 0.0);
        engine.fit_epochs(&mut comparisons, &mut ratings, config.epochs, &mut rng)?;

        let labels = elo_labels(&ratings, config.label_policy);
        let checkpoint = Checkpoint {
            comparisons: target,
            f1: f1_score(&truth, &labels)?,
            bias: Some(bias(&truth, &labels, &sensitive)?),
        };
        debug!(comparisons = target, f1 = checkpoint.f1, bias = ?checkpoint.bias, "checkpoint");
        checkpoints.push(checkpoint);
    }

    if let Some(last) = checkpoints.last() {
        info!(comparisons = last.comparisons, f1 = last.f1, "synthetic run complete");
    }

    Ok(SyntheticReport {
        params: config.clone(),
        majority_vote_f1,
        majority_vote_bias,
        checkpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SyntheticConfig {
        SyntheticConfig {
            items: 40,
            max_comparisons: 300,
            report_distance: 100,
            epochs: 5,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn test_checkpoint_cadence() {
        let report = run_synthetic(&small_config()).unwrap();

        let counts: Vec<usize> = report.checkpoints.iter().map(|c| c.comparisons).collect();
        assert_eq!(counts, vec![0, 100, 200, 300]);
        assert!((0.0..=1.0).contains(&report.majority_vote_f1));
        // With no comparisons every rating stays at 0 and nothing is positive.
        assert_eq!(report.checkpoints[0].f1, 0.0);
    }

    #[test]
    fn test_same_seed_same_report() {
        let config = small_config();
        // Checkpoint 0 flags nothing, so its bias is NaN and `==` cannot be used.
        assert_eq!(
            format!("{:?}", run_synthetic(&config).unwrap()),
            format!("{:?}", run_synthetic(&config).unwrap())
        );
    }

    #[test]
    fn test_rejects_bad_spammer_count() {
        let mut config = small_config();
        config.population.spammers = config.population.raters + 1;
        assert!(matches!(
            run_synthetic(&config),
            Err(EloError::InvalidSpammerCount { .. })
        ));
    }

    #[test]
    fn test_rejects_more_comparisons_than_pairs() {
        let config = SyntheticConfig {
            items: 5,
            max_comparisons: 11,
            report_distance: 5,
            ..SyntheticConfig::default()
        };
        assert!(matches!(run_synthetic(&config), Err(EloError::Combination(_))));
    }
}
